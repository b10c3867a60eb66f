//! Demo mode
//! Serves a synthetic dataset with simulated network latency

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use cx_core::{
    ArrayChunk, ArrayStream, DecodedImage, EventKind, Fetcher, Texture, UniformMap, ViewEvent,
};
use cx_data::{DatasetDescription, LoaderConfig, Registry};
use cx_views::{
    AttributeLayout, ColormapTable, ShaderOptions, ShaderSource, View, ViewFactory, ViewOptions,
};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Tile edge of the synthetic atlases
const TILE: u32 = 16;
/// Atlas grid, `[cols, rows]`
const MOSAIC: [u32; 2] = [4, 4];
const VERTICES: usize = 64;

/// Command line options of `cortex-demo`
#[derive(Debug, Clone, Parser)]
#[command(name = "cortex-demo", about = "Stream a synthetic dataset and play it back")]
pub struct DemoConfig {
    /// Frames per movie
    #[arg(long, default_value = "8", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub frames: usize,

    /// Simulated latency per request, e.g. `40ms`
    #[arg(long, default_value = "40ms", value_parser = humantime::parse_duration)]
    pub latency: Duration,

    /// Playback steps to run
    #[arg(long, default_value = "12")]
    pub ticks: usize,

    /// Seconds between playback steps
    #[arg(long, default_value = "0.75")]
    pub step: f64,
}

/// Fetcher that synthesizes atlas images and vertex series on request
pub struct SyntheticFetcher {
    frames: usize,
    latency: Duration,
}

impl SyntheticFetcher {
    pub fn new(frames: usize, latency: Duration) -> Self {
        Self { frames, latency }
    }

    fn wave(&self, frame: usize, offset: f32) -> f32 {
        (TAU * frame as f32 / self.frames as f32 + offset).sin()
    }
}

/// Frame index encoded in `name_{index}.png`
fn frame_index(url: &str) -> Result<usize> {
    let stem = url.strip_suffix(".png").unwrap_or(url);
    let index = stem
        .rsplit('_')
        .next()
        .ok_or_else(|| anyhow!("no frame index in {}", url))?;
    index
        .parse()
        .with_context(|| format!("bad frame index in {}", url))
}

#[async_trait]
impl Fetcher for SyntheticFetcher {
    async fn fetch_image(&self, url: &str) -> Result<DecodedImage> {
        tokio::time::sleep(self.latency).await;
        let frame = frame_index(url)?;
        let width = MOSAIC[0] * (TILE + 1) + 1;
        let height = MOSAIC[1] * (TILE + 1) + 1;
        let texels = (width * height) as usize;

        let offset = if url.starts_with("contrast") { 1.0 } else { 0.0 };
        let value = self.wave(frame, offset);
        let rgba = (0..texels).flat_map(|_| value.to_ne_bytes()).collect();
        Ok(DecodedImage { width, height, rgba })
    }

    async fn stream_array(&self, url: &str) -> Result<ArrayStream> {
        if !url.ends_with(".npy") {
            bail!("{} is not an array", url);
        }
        let frames = self.frames;
        let latency = self.latency;
        let series: Arc<[f32]> = (0..frames * VERTICES)
            .map(|i| self.wave(i / VERTICES, (i % VERTICES) as f32 / VERTICES as f32))
            .collect();
        let (tx, rx) = mpsc::channel(2);

        tokio::spawn(async move {
            for available in 1..=frames {
                tokio::time::sleep(latency).await;
                let chunk = ArrayChunk {
                    available,
                    data: Arc::from(&series[..available * VERTICES]),
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });

        Ok(ArrayStream {
            shape: vec![frames, VERTICES],
            chunks: rx,
        })
    }
}

/// Two functional movies and a surface movie
pub fn description(frames: usize) -> Result<DatasetDescription> {
    let urls = |name: &str, count: usize| -> Vec<String> {
        (0..count).map(|i| format!("{}_{}.png", name, i)).collect()
    };

    let value = json!({
        "data": {
            "movie": {"kind": "volume", "name": "movie", "subject": "S1", "min": -1, "max": 1, "mosaic": MOSAIC},
            "contrast": {"kind": "volume", "name": "contrast", "subject": "S1", "min": -1, "max": 1, "mosaic": MOSAIC},
            "ret": {"kind": "surface", "name": "ret", "subject": "S1", "split": VERTICES / 2, "frames": frames}
        },
        "views": [
            {"data": ["movie"], "name": "Movie", "cmap": ["RdBu_r"], "vmin": [-1], "vmax": [1],
             "attrs": {"rate": 1, "delay": 1, "filter": "trilinear"}},
            {"data": ["contrast"], "name": "Contrast", "cmap": ["RdBu_r"], "vmin": [-0.5], "vmax": [0.5],
             "attrs": {"rate": 1, "delay": 1}},
            {"data": ["ret"], "name": "Surface", "cmap": ["RdBu_r"], "vmin": [-1], "vmax": [1]}
        ],
        "images": {
            "movie": urls("movie", frames),
            "contrast": urls("contrast", frames),
            "ret": ["ret.npy"]
        }
    });
    Ok(DatasetDescription::from_json(&value.to_string())?)
}

/// A diverging map and its bivariate companion
pub fn colormaps() -> ColormapTable {
    let ramp = |f: fn(u8) -> [u8; 4]| -> Vec<u8> { (0..=255u8).flat_map(f).collect() };

    ColormapTable::new()
        .with("RdBu_r", Texture::rgba(256, 1, ramp(|v| [v, 64, 255 - v, 255])))
        .with(
            "RdBu_covar",
            Texture::rgba(16, 16, (0..256u32).flat_map(|i| {
                let (x, y) = ((i % 16) as u8 * 16, (i / 16) as u8 * 16);
                [x, 64, y, 255]
            }).collect()),
        )
}

fn demo_shader(options: &ShaderOptions) -> ShaderSource {
    let sampler = options.sampler.map_or("nearest", |s| s.as_str());
    ShaderSource {
        vertex: format!("#define SAMPLER_{}\n#define RGB {}\n", sampler.to_uppercase(), options.rgb as u8),
        fragment: format!("#define BIVARIATE {}\n#define VOXLINES {}\n", options.bivariate as u8, options.voxlines as u8),
        attributes: vec![
            AttributeLayout { name: "position".to_string(), item_size: 3 },
            AttributeLayout { name: "normal".to_string(), item_size: 3 },
        ],
    }
}

fn log_progress(view: &View) {
    let name = view.name().to_string();
    view.subscribe(
        EventKind::Progress,
        cx_core::handler_from_fn(move |event: &ViewEvent| {
            if let ViewEvent::Progress { available } = event {
                info!("{}: {} frame(s) available", name, available);
            }
        }),
    );
}

fn find<'a>(views: &'a [View], name: &str) -> Result<&'a View> {
    views
        .iter()
        .find(|view| view.name() == name)
        .ok_or_else(|| anyhow!("view '{}' was not built", name))
}

/// Load the dataset, combine two movies and play them back
pub async fn run(config: DemoConfig) -> Result<()> {
    let fetcher = Arc::new(SyntheticFetcher::new(config.frames, config.latency));
    let mut registry = Registry::new(fetcher, &LoaderConfig::with_timeout(Duration::from_secs(10)))?;
    let factory = ViewFactory::new(Arc::new(colormaps()), ViewOptions::default());

    let description = description(config.frames)?;
    let mut views = Vec::new();
    for view in factory.build_from_description(&description, &mut registry) {
        match view {
            Ok(view) => {
                log_progress(&view);
                views.push(view);
            }
            Err(error) => warn!("Skipping view: {}", error),
        }
    }

    for view in &views {
        view.wait_ready().await?;
        let position = view.init()?;
        info!(
            "{} ready: {} frame(s), {:.1}s, starts at frame {}",
            view.name(),
            view.frame_count(),
            view.duration(),
            position.floored
        );
    }

    let combined = factory.combine(find(&views, "Movie")?, find(&views, "Contrast")?)?;
    log_progress(&combined);
    combined.wait_ready().await?;
    combined.init()?;

    let surface = find(&views, "Surface")?;

    for tick in 0..config.ticks {
        let time = tick as f64 * config.step;
        match combined.set_frame(time) {
            Ok(position) => info!(
                "t={:.2}s '{}' frame {} -> {} (mix {:.2})",
                time,
                combined.name(),
                position.floored,
                position.next,
                position.mix
            ),
            Err(error) => warn!("t={:.2}s: {}", time, error),
        }
        if let Err(error) = surface.set_frame(time) {
            warn!("t={:.2}s: {}", time, error);
        }
    }

    for material in combined.shading_parameters(demo_shader, &UniformMap::new(), &ShaderOptions::default()) {
        info!(
            "material slot {}: {} uniform(s), {} attribute(s), blending {:?}",
            material.slot,
            material.uniforms().len(),
            material.attributes.len(),
            material.blending
        );
    }

    registry.join_all().await;
    info!("Demo finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let config = DemoConfig::try_parse_from(["cortex-demo", "--frames", "3", "--latency", "5ms"]).unwrap();
        assert_eq!(config.frames, 3);
        assert_eq!(config.latency, Duration::from_millis(5));
        assert_eq!(config.ticks, 12);
        assert_eq!(config.step, 0.75);

        let defaults = DemoConfig::try_parse_from(["cortex-demo"]).unwrap();
        assert_eq!(defaults.frames, 8);
        assert_eq!(defaults.latency, Duration::from_millis(40));
    }

    #[test]
    fn test_rejects_bad_args() {
        assert!(DemoConfig::try_parse_from(["cortex-demo", "--bogus", "1"]).is_err());
        assert!(DemoConfig::try_parse_from(["cortex-demo", "--frames", "0"]).is_err());
        assert!(DemoConfig::try_parse_from(["cortex-demo", "--latency", "soon"]).is_err());
    }

    #[test]
    fn test_frame_index() {
        assert_eq!(frame_index("movie_12.png").unwrap(), 12);
        assert!(frame_index("movie.png").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_runs_to_completion() {
        let config = DemoConfig::try_parse_from(["cortex-demo", "--frames", "3", "--ticks", "4"]).unwrap();
        run(config).await.unwrap();
    }
}
