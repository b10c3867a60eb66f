//! Mosaic-atlas volume source

use std::sync::Arc;

use async_trait::async_trait;
use cx_core::{
    next_frame, AttributeUpdate, DataSource, DatasetError, DecodedImage, FilterMode, LoadContext,
    LoadState, LoadTracker, Result, SourceInfo, SourceKind, Texture, UniformBag,
};
use glam::{Mat4, Vec2};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::VolumeDescriptor;

/// Tile shape assumed until the first atlas image has been decoded
const DEFAULT_TILE_SHAPE: [u32; 2] = [100, 100];

/// Per-slice pixel size recovered from an atlas image.
///
/// `(floor((width - 1) / cols) - 1, floor((height - 1) / rows) - 1)`, or
/// `None` when the grid is empty or the image too small for it.
pub fn tile_shape(width: u32, height: u32, mosaic: [u32; 2]) -> Option<[u32; 2]> {
    let [cols, rows] = mosaic;
    if cols == 0 || rows == 0 {
        return None;
    }
    let tile_w = (width.checked_sub(1)? / cols).checked_sub(1)?;
    let tile_h = (height.checked_sub(1)? / rows).checked_sub(1)?;
    Some([tile_w, tile_h])
}

/// Frames decoded so far
struct VolumeFrames {
    textures: Vec<Arc<Texture>>,
    tile_shape: [u32; 2],
    filter: FilterMode,
}

/// A volume movie stored as one mosaic atlas image per frame
pub struct VolumeSource {
    info: SourceInfo,
    mosaic: [u32; 2],
    urls: Vec<String>,
    frames: RwLock<VolumeFrames>,
    tracker: LoadTracker,
}

impl VolumeSource {
    /// Create a source for `urls`, one atlas image per frame
    pub fn new(descriptor: &VolumeDescriptor, urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(DatasetError::config(format!(
                "volume '{}' lists no images",
                descriptor.name
            )));
        }
        if descriptor.mosaic.contains(&0) {
            return Err(DatasetError::config(format!(
                "volume '{}' has an empty mosaic grid {:?}",
                descriptor.name, descriptor.mosaic
            )));
        }

        Ok(Self {
            info: descriptor.info(urls.len()),
            mosaic: descriptor.mosaic,
            urls,
            frames: RwLock::new(VolumeFrames {
                textures: Vec::new(),
                tile_shape: descriptor.shape.unwrap_or(DEFAULT_TILE_SHAPE),
                filter: FilterMode::default(),
            }),
            tracker: LoadTracker::new(descriptor.name.clone()),
        })
    }

    /// Atlas grid as `[cols, rows]`
    pub fn mosaic(&self) -> [u32; 2] {
        self.mosaic
    }

    /// Tile shape derived from the latest decoded image
    pub fn tile_shape(&self) -> [u32; 2] {
        self.frames.read().tile_shape
    }

    pub fn frames_loaded(&self) -> usize {
        self.frames.read().textures.len()
    }

    pub fn texture(&self, frame: usize) -> Option<Arc<Texture>> {
        self.frames.read().textures.get(frame).cloned()
    }

    fn decode(&self, image: &DecodedImage) -> Result<(Texture, [u32; 2])> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.rgba.len() != expected {
            return Err(DatasetError::load_failure(
                &self.info.name,
                format!(
                    "{}x{} image carries {} bytes, expected {}",
                    image.width,
                    image.height,
                    image.rgba.len(),
                    expected
                ),
            ));
        }

        let shape = tile_shape(image.width, image.height, self.mosaic).ok_or_else(|| {
            DatasetError::load_failure(
                &self.info.name,
                format!(
                    "{}x{} image is too small for a {:?} mosaic",
                    image.width, image.height, self.mosaic
                ),
            )
        })?;

        let texture = if self.info.raw {
            Texture::rgba(image.width, image.height, image.rgba.clone())
        } else {
            // Each RGBA texel carries the bytes of one packed float
            let samples = image
                .rgba
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect();
            Texture::luminance(image.width, image.height, samples)
        };

        Ok((texture, shape))
    }

    async fn load_frames(&self, ctx: &LoadContext) -> Result<()> {
        let total = self.info.frame_count;

        // Strictly sequential: frame i+1 is requested only once frame i is decoded
        for (idx, url) in self.urls.iter().enumerate() {
            let image = ctx.fetch_image(&self.info.name, url).await?;
            let (texture, shape) = self.decode(&image)?;

            let ready = {
                let mut frames = self.frames.write();
                texture.set_filter(frames.filter.texture_filter());
                frames.tile_shape = shape;
                frames.textures.push(Arc::new(texture));
                frames.textures.len()
            };
            debug!("{}: decoded frame {} ({})", self.info.name, idx, url);

            if ready < total {
                self.tracker.progress(ready);
            } else {
                self.tracker.ready(ready);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DataSource for VolumeSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Volume
    }

    fn load_state(&self) -> LoadState {
        self.tracker.state()
    }

    fn watch_load(&self) -> watch::Receiver<LoadState> {
        self.tracker.subscribe()
    }

    async fn load(&self, ctx: LoadContext) -> Result<()> {
        info!(
            "Loading volume '{}' ({} frame(s), mosaic {:?})",
            self.info.name, self.info.frame_count, self.mosaic
        );
        let result = self.load_frames(&ctx).await;
        if let Err(error) = &result {
            self.tracker.fail(failure_reason(error));
        }
        result
    }

    fn init(&self, uniforms: &mut UniformBag, slot: usize, transform: &Mat4, filter: FilterMode) {
        let shape = self.tile_shape();
        uniforms.mosaic[slot] = Vec2::new(self.mosaic[0] as f32, self.mosaic[1] as f32);
        uniforms.dshape[slot] = Vec2::new(shape[0] as f32, shape[1] as f32);
        uniforms.volxfm[slot] = *transform;
        self.set_filter(filter);
    }

    fn sample_frame(
        &self,
        uniforms: &mut UniformBag,
        slot: usize,
        frame: usize,
        _emit: &mut dyn FnMut(AttributeUpdate),
    ) -> Result<()> {
        let frames = self.frames.read();
        let current = frames.textures.get(frame).ok_or_else(|| {
            DatasetError::state(format!(
                "volume '{}' frame {} is not loaded ({} of {} ready)",
                self.info.name,
                frame,
                frames.textures.len(),
                self.info.frame_count
            ))
        })?;

        // The blend partner may still be loading; it is bound once it arrives
        let next = if self.info.is_movie() {
            frames
                .textures
                .get(next_frame(frame, self.info.frame_count))
                .cloned()
        } else {
            None
        };

        let unit = 2 * slot;
        let same = |bound: &Option<Arc<Texture>>, wanted: Option<&Arc<Texture>>| match (bound, wanted) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same(&uniforms.data[unit], Some(current)) && same(&uniforms.data[unit + 1], next.as_ref()) {
            return Ok(());
        }

        uniforms.data[unit] = Some(current.clone());
        uniforms.data[unit + 1] = next;
        Ok(())
    }

    fn set_filter(&self, filter: FilterMode) {
        let mut frames = self.frames.write();
        frames.filter = filter;
        for texture in &frames.textures {
            texture.set_filter(filter.texture_filter());
        }
    }
}

/// Reason stored in a failed load state
pub(crate) fn failure_reason(error: &DatasetError) -> String {
    match error {
        DatasetError::LoadFailure { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
