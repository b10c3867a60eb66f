//! Data sources and the registry that owns them
//!
//! Sources are created from a dataset description and load progressively in
//! the background: volumes as one mosaic atlas image per frame, surfaces as a
//! single streamed per-vertex array.

pub mod config;
pub mod registry;
pub mod sources;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports
pub use config::{
    DatasetDescription, LoaderConfig, RangeValue, SlotRef, SourceDescriptor, SurfaceDescriptor,
    TransformValue, ViewAttrs, ViewDescriptor, VolumeDescriptor,
};
pub use registry::Registry;
pub use sources::{create_source, tile_shape, SurfaceSource, VolumeSource};
