//! Building views from descriptions and combining existing views

use std::sync::Arc;

use cx_core::{DatasetError, Result};
use cx_data::{DatasetDescription, Registry, ViewDescriptor};
use tracing::{info, warn};

use crate::colormap::ColormapLookup;
use crate::config::ViewOptions;
use crate::view::{SlotSpec, View, ViewSpec};

/// Creates views over the sources of a [`Registry`]
#[derive(Clone)]
pub struct ViewFactory {
    colormaps: Arc<dyn ColormapLookup>,
    options: ViewOptions,
}

impl ViewFactory {
    pub fn new(colormaps: Arc<dyn ColormapLookup>, options: ViewOptions) -> Self {
        Self { colormaps, options }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    /// Register the sources of `description` and build each of its views.
    ///
    /// Views are returned in description order. A view that fails validation
    /// yields its error without affecting the others.
    pub fn build_from_description(
        &self,
        description: &DatasetDescription,
        registry: &mut Registry,
    ) -> Vec<Result<View>> {
        for error in registry.ingest(description) {
            warn!("Source rejected: {}", error);
        }

        let views: Vec<Result<View>> = description
            .views
            .iter()
            .map(|descriptor| {
                self.build_view(descriptor, registry).map_err(|error| {
                    warn!("View '{}' rejected: {}", descriptor.name, error);
                    error
                })
            })
            .collect();

        info!(
            "Built {} of {} view(s)",
            views.iter().filter(|v| v.is_ok()).count(),
            views.len()
        );
        views
    }

    /// Build a single view from its descriptor
    pub fn build_view(&self, descriptor: &ViewDescriptor, registry: &Registry) -> Result<View> {
        let names = descriptor.slot_names();
        let mut slots = Vec::with_capacity(names.len());

        for (slot, name) in names.iter().enumerate() {
            let source = registry.resolve(name)?;
            let (vmin, vmax) = descriptor.range_for(slot);
            slots.push(SlotSpec {
                source,
                colormap: descriptor
                    .colormap_for(slot)
                    .unwrap_or(self.options.default_colormap.as_str())
                    .to_string(),
                vmin,
                vmax,
                transform: descriptor.transform_for(slot),
            });
        }

        View::new(
            ViewSpec {
                name: descriptor.name.clone(),
                description: descriptor.desc.clone(),
                attrs: descriptor.attrs.clone(),
                state: descriptor.state.clone(),
                slots,
            },
            self.colormaps.clone(),
            &self.options,
        )
    }

    /// Pair the first slots of `a` and `b` into a bivariate view.
    ///
    /// Both inputs are left unchanged.
    pub fn combine(&self, a: &View, b: &View) -> Result<View> {
        let first = slot_of(a)?;
        let second = slot_of(b)?;
        let colormap = self.options.default_bivariate_colormap.clone();

        View::new(
            ViewSpec {
                name: format!("{} vs. {}", a.name(), b.name()),
                description: format!("2D colormap for {} and {}", a.name(), b.name()),
                attrs: a.attrs().clone(),
                state: a.state().cloned(),
                slots: vec![
                    SlotSpec {
                        colormap: colormap.clone(),
                        ..first
                    },
                    SlotSpec { colormap, ..second },
                ],
            },
            self.colormaps.clone(),
            &self.options,
        )
    }
}

fn slot_of(view: &View) -> Result<SlotSpec> {
    let source = view
        .slots()
        .first()
        .cloned()
        .ok_or_else(|| DatasetError::config(format!("view '{}' has no slots", view.name())))?;
    let (vmin, vmax) = view.value_range(0).unwrap_or_default();

    Ok(SlotSpec {
        source,
        colormap: view.colormap(0).unwrap_or_default(),
        vmin,
        vmax,
        transform: view.transform(0).unwrap_or_default(),
    })
}
