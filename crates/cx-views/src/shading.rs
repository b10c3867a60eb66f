//! Shading-parameter assembly

use cx_core::{Sampler, UniformMap, UniformValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::barrier::Readiness;
use crate::view::{SharedUniforms, View};

/// Which faces a material renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blending {
    None,
    #[default]
    Normal,
    Additive,
    Multiply,
}

/// Options handed to the shader function.
///
/// `sampler`, `rgb`, `bivariate` and `voxlines` are derived from the view
/// and overwrite whatever the caller set; the material flags left `None`
/// take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderOptions {
    pub sampler: Option<Sampler>,
    pub rgb: bool,
    pub bivariate: bool,
    pub voxlines: bool,
    pub lights: Option<bool>,
    pub depth_test: Option<bool>,
    pub depth_write: Option<bool>,
    pub transparent: Option<bool>,
    pub blending: Option<Blending>,
}

/// A vertex attribute the shader reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLayout {
    pub name: String,
    pub item_size: usize,
}

/// Output of the shader function
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
    pub attributes: Vec<AttributeLayout>,
}

/// Everything a rendering layer needs to build the material of one slot.
///
/// Uniforms are resolved on each call to [`MaterialDescriptor::uniforms`],
/// so later frame, range and colormap changes on the view show up without
/// rebuilding the descriptor. Filter changes do require a rebuild.
#[derive(Debug, Clone)]
pub struct MaterialDescriptor {
    pub slot: usize,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub attributes: Vec<AttributeLayout>,
    pub side: Side,
    pub lights: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub transparent: bool,
    pub blending: Blending,
    volume: bool,
    extra: UniformMap,
    shared: SharedUniforms,
}

impl MaterialDescriptor {
    /// Merged uniforms: slot entries, then view-wide entries, then the caller's extras
    pub fn uniforms(&self) -> UniformMap {
        let state = self.shared.read();
        let mut merged = UniformMap::new();

        if let Some(slot) = state.slots.get(self.slot) {
            merged.insert(
                "colormap".to_string(),
                UniformValue::Texture(Some(slot.colormap.clone())),
            );
            merged.insert("vmin".to_string(), UniformValue::Pair(slot.vmin));
            merged.insert("vmax".to_string(), UniformValue::Pair(slot.vmax));
        }
        merged.extend(state.bag.to_uniforms(self.volume));
        merged.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl View {
    /// Assemble one material descriptor per slot.
    ///
    /// `shader_fn` is called once per slot with the completed options.
    pub fn shading_parameters<F>(
        &self,
        shader_fn: F,
        extra_uniforms: &UniformMap,
        options: &ShaderOptions,
    ) -> Vec<MaterialDescriptor>
    where
        F: Fn(&ShaderOptions) -> ShaderSource,
    {
        if !matches!(self.readiness(), Readiness::Ready) {
            debug!("Shading view '{}' before its data is ready", self.name());
        }

        let mut options = options.clone();
        options.sampler = Some(self.filter().sampler());
        options.rgb = self.slots().first().map_or(false, |s| s.info().raw);
        options.bivariate = self.slot_count() > 1;
        options.voxlines = self.voxlines();

        (0..self.slot_count())
            .map(|slot| {
                let source = shader_fn(&options);
                MaterialDescriptor {
                    slot,
                    vertex_shader: source.vertex,
                    fragment_shader: source.fragment,
                    attributes: source.attributes,
                    side: Side::Front,
                    lights: options.lights.unwrap_or(true),
                    depth_test: options.depth_test.unwrap_or(true),
                    depth_write: options.depth_write.unwrap_or(true),
                    transparent: options.transparent.unwrap_or(false),
                    blending: options.blending.unwrap_or_default(),
                    volume: self.is_volume(),
                    extra: extra_uniforms.clone(),
                    shared: self.uniforms.clone(),
                }
            })
            .collect()
    }
}
