pub mod surface_source;
pub mod volume_source;

use std::sync::Arc;

use cx_core::{DataSource, Result};

use crate::config::SourceDescriptor;

pub use surface_source::SurfaceSource;
pub use volume_source::{tile_shape, VolumeSource};

/// Instantiate the variant declared by `descriptor`
pub fn create_source(descriptor: &SourceDescriptor, urls: &[String]) -> Result<Arc<dyn DataSource>> {
    Ok(match descriptor {
        SourceDescriptor::Volume(volume) => Arc::new(VolumeSource::new(volume, urls.to_vec())?),
        SourceDescriptor::Surface(surface) => Arc::new(SurfaceSource::new(surface, urls)?),
    })
}
