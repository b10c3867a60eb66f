//! Views over progressively loaded imaging data
//!
//! A [`View`] binds one or two data sources under a name with colormaps,
//! value ranges, transforms and playback timing. Views map playback time
//! to frames, track readiness across their sources and assemble the
//! per-slot material descriptors a rendering layer consumes.

pub mod barrier;
pub mod colormap;
pub mod config;
pub mod factory;
pub mod shading;
pub mod view;

#[cfg(test)]
mod fixtures;

pub use barrier::{Readiness, ReadinessBarrier};
pub use colormap::{ColormapLookup, ColormapTable};
pub use config::ViewOptions;
pub use factory::ViewFactory;
pub use shading::{AttributeLayout, Blending, MaterialDescriptor, ShaderOptions, ShaderSource, Side};
pub use view::{SlotSpec, View, ViewSpec};
