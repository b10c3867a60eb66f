//! Core abstractions for streaming brain imaging data
//!
//! This crate provides the data source capability, load-state tracking,
//! per-view events, time to frame mapping and the uniform types consumed by
//! the shading layer.

pub mod data;
pub mod error;
pub mod events;
pub mod load;
pub mod timing;
pub mod transport;
pub mod uniforms;

// Re-export commonly used types
pub use data::{AttributeUpdate, DataSource, SourceInfo, SourceKind, SurfaceFrame, VertexBuffer};
pub use error::{DatasetError, Result};
pub use events::{handler_from_fn, EventBus, EventHandler, EventKind, SubscriptionId, ViewEvent, ViewId};
pub use load::{CancelToken, LoadState, LoadStatus, LoadTracker};
pub use timing::{next_frame, FrameClock, FramePosition};
pub use transport::{ArrayChunk, ArrayStream, DecodedImage, Fetcher, LoadContext};
pub use uniforms::{
    FilterMode, Sampler, Texture, TextureFilter, TexturePixels, TextureSampling, UniformBag,
    UniformMap, UniformValue, MAX_SLOTS,
};
