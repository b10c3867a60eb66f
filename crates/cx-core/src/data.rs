//! The data source capability shared by volume and surface sources

use std::sync::Arc;

use async_trait::async_trait;
use glam::Mat4;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::load::LoadState;
use crate::transport::LoadContext;
use crate::uniforms::{FilterMode, UniformBag};

/// Declared variant of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Volume,
    Surface,
}

/// Identity and value range of a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub subject: Option<String>,
    /// Samples are pre-quantized RGBA rather than packed floats
    pub raw: bool,
    pub min: f32,
    pub max: f32,
    pub frame_count: usize,
}

impl SourceInfo {
    pub fn is_movie(&self) -> bool {
        self.frame_count > 1
    }
}

/// A fixed-stride vertex attribute buffer
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    pub stride: usize,
    pub data: Arc<[f32]>,
}

impl VertexBuffer {
    /// Number of stride-sized items
    pub fn len(&self) -> usize {
        self.data.len() / self.stride.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-hemisphere buffers for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceFrame {
    pub left: VertexBuffer,
    pub right: VertexBuffer,
}

/// A named vertex attribute pushed to the binding layer
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUpdate {
    pub name: String,
    pub frame: usize,
    pub value: SurfaceFrame,
}

/// A single independently loaded imaging stream.
///
/// Sources are owned by the registry; views share them and only read their
/// frames, writing into their own uniform bag.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    fn kind(&self) -> SourceKind;

    /// Current load progress
    fn load_state(&self) -> LoadState;

    /// Subscribe to load progress
    fn watch_load(&self) -> watch::Receiver<LoadState>;

    /// Run the load to completion, failure or cancellation
    async fn load(&self, ctx: LoadContext) -> Result<()>;

    /// Bind frame-independent state into `slot` of the uniform bag
    fn init(&self, uniforms: &mut UniformBag, slot: usize, transform: &Mat4, filter: FilterMode);

    /// Bind frame `frame` and its successor into `slot`
    fn sample_frame(
        &self,
        uniforms: &mut UniformBag,
        slot: usize,
        frame: usize,
        emit: &mut dyn FnMut(AttributeUpdate),
    ) -> Result<()>;

    fn set_filter(&self, filter: FilterMode);

    fn name(&self) -> &str {
        &self.info().name
    }

    fn frame_count(&self) -> usize {
        self.info().frame_count
    }
}
