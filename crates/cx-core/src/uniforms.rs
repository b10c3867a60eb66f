//! Textures, filter modes and the per-view uniform bag

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec2};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Maximum number of data sources a view can bind
pub const MAX_SLOTS: usize = 2;

/// Interpolation mode requested for a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Nearest,
    Trilinear,
    /// Linear texture filtering with nearest-neighbour shader sampling
    Nearlin,
    Debug,
}

impl FilterMode {
    /// Filter applied to the texture objects themselves
    pub fn texture_filter(self) -> TextureFilter {
        match self {
            FilterMode::Nearest | FilterMode::Debug => TextureFilter::Nearest,
            FilterMode::Trilinear | FilterMode::Nearlin => TextureFilter::Linear,
        }
    }

    /// Sampler variant baked into the generated shader
    pub fn sampler(self) -> Sampler {
        match self {
            FilterMode::Nearest | FilterMode::Nearlin => Sampler::Nearest,
            FilterMode::Trilinear => Sampler::Trilinear,
            FilterMode::Debug => Sampler::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Nearest => "nearest",
            FilterMode::Trilinear => "trilinear",
            FilterMode::Nearlin => "nearlin",
            FilterMode::Debug => "debug",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(FilterMode::Nearest),
            "trilinear" => Ok(FilterMode::Trilinear),
            "nearlin" => Ok(FilterMode::Nearlin),
            "debug" => Ok(FilterMode::Debug),
            other => Err(DatasetError::config(format!("unknown filter mode '{}'", other))),
        }
    }
}

/// Min/mag filter of a texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

/// Shader sampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampler {
    Nearest,
    Trilinear,
    Debug,
}

impl Sampler {
    pub fn as_str(self) -> &'static str {
        match self {
            Sampler::Nearest => "nearest",
            Sampler::Trilinear => "trilinear",
            Sampler::Debug => "debug",
        }
    }
}

/// Pixel storage of a texture
#[derive(Debug, Clone, PartialEq)]
pub enum TexturePixels {
    /// Pre-quantized 8-bit RGBA
    Rgba(Vec<u8>),
    /// One float sample per texel
    Luminance(Vec<f32>),
}

/// Sampling parameters; `version` increases whenever the texture must be re-uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSampling {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub version: u64,
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// A GPU-ready texture description
#[derive(Debug)]
pub struct Texture {
    id: u64,
    width: u32,
    height: u32,
    pixels: TexturePixels,
    premultiply_alpha: bool,
    flip_y: bool,
    sampling: Mutex<TextureSampling>,
}

impl Texture {
    fn new(width: u32, height: u32, pixels: TexturePixels, premultiply_alpha: bool) -> Self {
        Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            pixels,
            premultiply_alpha,
            flip_y: false,
            sampling: Mutex::new(TextureSampling {
                min_filter: TextureFilter::Nearest,
                mag_filter: TextureFilter::Nearest,
                version: 1,
            }),
        }
    }

    /// RGBA texture with premultiplied alpha
    pub fn rgba(width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self::new(width, height, TexturePixels::Rgba(bytes), true)
    }

    /// Float luminance texture, alpha untouched
    pub fn luminance(width: u32, height: u32, samples: Vec<f32>) -> Self {
        Self::new(width, height, TexturePixels::Luminance(samples), false)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &TexturePixels {
        &self.pixels
    }

    pub fn premultiply_alpha(&self) -> bool {
        self.premultiply_alpha
    }

    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    pub fn sampling(&self) -> TextureSampling {
        *self.sampling.lock()
    }

    /// Change min/mag filtering and flag the texture for re-upload
    pub fn set_filter(&self, filter: TextureFilter) {
        let mut sampling = self.sampling.lock();
        sampling.min_filter = filter;
        sampling.mag_filter = filter;
        sampling.version += 1;
    }
}

/// A single shading input
#[derive(Debug, Clone)]
pub enum UniformValue {
    Float(f32),
    /// Two-component value such as a dual-range minimum
    Pair([f32; 2]),
    Texture(Option<Arc<Texture>>),
    Textures(Vec<Option<Arc<Texture>>>),
    Vec2s(Vec<Vec2>),
    Mat4s(Vec<Mat4>),
}

/// Named shading inputs in merge order
pub type UniformMap = IndexMap<String, UniformValue>;

/// Uniform state shared by every slot of a view
#[derive(Debug, Clone)]
pub struct UniformBag {
    pub frame_mix: f32,
    pub data_alpha: f32,
    /// Texture units `2*slot` (current frame) and `2*slot + 1` (next frame)
    pub data: [Option<Arc<Texture>>; 2 * MAX_SLOTS],
    pub mosaic: [Vec2; MAX_SLOTS],
    pub dshape: [Vec2; MAX_SLOTS],
    pub volxfm: [Mat4; MAX_SLOTS],
}

impl Default for UniformBag {
    fn default() -> Self {
        Self {
            frame_mix: 0.0,
            data_alpha: 1.0,
            data: [None, None, None, None],
            mosaic: [Vec2::new(6.0, 6.0); MAX_SLOTS],
            dshape: [Vec2::new(100.0, 100.0); MAX_SLOTS],
            volxfm: [Mat4::IDENTITY; MAX_SLOTS],
        }
    }
}

impl UniformBag {
    /// Shader-facing view of the bag. Volume entries are only present for volume views.
    pub fn to_uniforms(&self, volume: bool) -> UniformMap {
        let mut map = UniformMap::new();
        map.insert("framemix".to_string(), UniformValue::Float(self.frame_mix));
        map.insert("dataAlpha".to_string(), UniformValue::Float(self.data_alpha));
        if volume {
            map.insert("data".to_string(), UniformValue::Textures(self.data.to_vec()));
            map.insert("mosaic".to_string(), UniformValue::Vec2s(self.mosaic.to_vec()));
            map.insert("dshape".to_string(), UniformValue::Vec2s(self.dshape.to_vec()));
            map.insert("volxfm".to_string(), UniformValue::Mat4s(self.volxfm.to_vec()));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_mode_mapping() {
        assert_eq!(FilterMode::Nearlin.texture_filter(), TextureFilter::Linear);
        assert_eq!(FilterMode::Nearlin.sampler(), Sampler::Nearest);
        assert_eq!(FilterMode::Debug.texture_filter(), TextureFilter::Nearest);
        assert_eq!(FilterMode::Trilinear.sampler(), Sampler::Trilinear);
        assert_eq!("debug".parse::<FilterMode>().unwrap(), FilterMode::Debug);
        assert!("bicubic".parse::<FilterMode>().is_err());
    }

    #[test]
    fn test_set_filter_marks_reupload() {
        let tex = Texture::rgba(2, 2, vec![0; 16]);
        let before = tex.sampling().version;
        tex.set_filter(TextureFilter::Linear);
        let after = tex.sampling();
        assert_eq!(after.min_filter, TextureFilter::Linear);
        assert_eq!(after.mag_filter, TextureFilter::Linear);
        assert!(after.version > before);
    }

    #[test]
    fn test_texture_alpha_handling() {
        assert!(Texture::rgba(1, 1, vec![0; 4]).premultiply_alpha());
        assert!(!Texture::luminance(1, 1, vec![0.0]).premultiply_alpha());
    }

    #[test]
    fn test_surface_uniforms_skip_volume_entries() {
        let bag = UniformBag::default();
        let surface = bag.to_uniforms(false);
        assert!(surface.contains_key("framemix"));
        assert!(!surface.contains_key("mosaic"));
        let volume = bag.to_uniforms(true);
        assert_eq!(volume.len(), 6);
    }
}
