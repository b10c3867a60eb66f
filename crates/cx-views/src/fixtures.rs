//! Shared test fixtures

use std::sync::Arc;

use cx_core::{EventKind, Texture, TexturePixels, ViewEvent};
use cx_data::testing::{solid_image, ScriptedFetcher};
use cx_data::{DatasetDescription, LoaderConfig, Registry};
use serde_json::json;
use tokio::sync::mpsc;

use crate::colormap::ColormapTable;
use crate::config::ViewOptions;
use crate::factory::ViewFactory;
use crate::shading::{AttributeLayout, ShaderOptions, ShaderSource};
use crate::view::View;

pub fn colormaps() -> ColormapTable {
    ["RdBu_r", "RdBu_covar", "gray", "viridis"]
        .into_iter()
        .fold(ColormapTable::new(), |table, name| {
            table.with(name, Texture::rgba(256, 1, vec![0; 256 * 4]))
        })
}

pub fn factory() -> ViewFactory {
    ViewFactory::new(Arc::new(colormaps()), ViewOptions::default())
}

/// Image URLs of a volume named `name`
pub fn frame_urls(name: &str, frames: usize) -> Vec<String> {
    (0..frames).map(|i| format!("{}_{}.png", name, i)).collect()
}

/// Serve `frames` 13x13 raw atlas images for `name`; every byte of frame `i` is `i`
pub fn with_volume(fetcher: ScriptedFetcher, name: &str, frames: usize) -> ScriptedFetcher {
    frame_urls(name, frames)
        .iter()
        .enumerate()
        .fold(fetcher, |f, (i, url)| f.image(url, solid_image(13, 13, i as u8)))
}

/// Frame index encoded in a raw test texture
pub fn frame_of(texture: &Texture) -> u8 {
    match texture.pixels() {
        TexturePixels::Rgba(bytes) => bytes[0],
        TexturePixels::Luminance(_) => panic!("expected an RGBA texture"),
    }
}

pub fn volume_json(name: &str) -> serde_json::Value {
    json!({"kind": "volume", "name": name, "mosaic": [2, 2], "raw": true})
}

pub fn surface_json(name: &str, frames: usize) -> serde_json::Value {
    json!({"kind": "surface", "name": name, "split": 2, "frames": frames})
}

pub fn description(value: serde_json::Value) -> DatasetDescription {
    DatasetDescription::from_json(&value.to_string()).unwrap()
}

pub fn registry(fetcher: ScriptedFetcher) -> Registry {
    Registry::new(Arc::new(fetcher), &LoaderConfig::default()).unwrap()
}

/// Build every view of `description`, panicking on rejected views
pub fn build(description: &DatasetDescription, registry: &mut Registry) -> Vec<View> {
    factory()
        .build_from_description(description, registry)
        .into_iter()
        .map(|view| view.unwrap())
        .collect()
}

/// Forward every event of `kinds` into a channel
pub fn record(view: &View, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<ViewEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in kinds {
        let tx = tx.clone();
        view.subscribe(
            *kind,
            cx_core::handler_from_fn(move |event: &ViewEvent| {
                let _ = tx.send(event.clone());
            }),
        );
    }
    rx
}

pub fn shader(options: &ShaderOptions) -> ShaderSource {
    ShaderSource {
        vertex: format!("// sampler {:?}", options.sampler),
        fragment: format!("// rgb {} bivariate {}", options.rgb, options.bivariate),
        attributes: vec![AttributeLayout {
            name: "position".to_string(),
            item_size: 3,
        }],
    }
}
