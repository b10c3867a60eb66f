//! Views: named bindings of one or two sources with playback and display state

use std::sync::Arc;

use cx_core::{
    AttributeUpdate, DataSource, DatasetError, EventBus, EventHandler, EventKind, FilterMode,
    FrameClock, FramePosition, Result, SourceKind, SubscriptionId, Texture, UniformBag, ViewEvent,
    ViewId, MAX_SLOTS,
};
use cx_data::ViewAttrs;
use glam::Mat4;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::barrier::{self, Readiness};
use crate::colormap::ColormapLookup;
use crate::config::ViewOptions;

/// Construction parameters of one slot
#[derive(Clone)]
pub struct SlotSpec {
    pub source: Arc<dyn DataSource>,
    pub colormap: String,
    pub vmin: [f32; 2],
    pub vmax: [f32; 2],
    pub transform: Mat4,
}

/// Construction parameters of a view
#[derive(Clone)]
pub struct ViewSpec {
    pub name: String,
    pub description: String,
    pub attrs: ViewAttrs,
    pub state: Option<serde_json::Value>,
    pub slots: Vec<SlotSpec>,
}

/// Display state of one slot
#[derive(Debug, Clone)]
pub(crate) struct SlotUniforms {
    pub colormap_name: String,
    pub colormap: Arc<Texture>,
    pub vmin: [f32; 2],
    pub vmax: [f32; 2],
}

/// Mutable shading state of a view, shared with the material descriptors built from it
#[derive(Debug, Clone, Default)]
pub(crate) struct ViewUniforms {
    pub bag: UniformBag,
    pub slots: Vec<SlotUniforms>,
}

pub(crate) type SharedUniforms = Arc<RwLock<ViewUniforms>>;

/// A named binding of one or two data sources, with display parameters,
/// playback timing and its own observers.
///
/// Creating a view spawns its readiness barrier, so it must happen inside a
/// tokio runtime. Subscribe to readiness events before yielding to the
/// runtime to observe every transition.
pub struct View {
    id: ViewId,
    name: String,
    description: String,
    attrs: ViewAttrs,
    stim: Option<String>,
    state: Option<serde_json::Value>,
    slots: Vec<Arc<dyn DataSource>>,
    transforms: Vec<Mat4>,
    kind: SourceKind,
    clock: FrameClock,
    filter: RwLock<FilterMode>,
    voxlines: bool,
    pub(crate) uniforms: SharedUniforms,
    colormaps: Arc<dyn ColormapLookup>,
    events: Arc<EventBus>,
    readiness: watch::Receiver<Readiness>,
    barrier: JoinHandle<()>,
}

impl View {
    /// Validate `spec` and build a view from it
    pub fn new(
        spec: ViewSpec,
        colormaps: Arc<dyn ColormapLookup>,
        options: &ViewOptions,
    ) -> Result<Self> {
        let slot_count = spec.slots.len();
        if slot_count == 0 || slot_count > MAX_SLOTS {
            return Err(DatasetError::config(format!(
                "view '{}' binds {} sources, expected 1 to {}",
                spec.name, slot_count, MAX_SLOTS
            )));
        }

        let first = &spec.slots[0].source;
        for slot in &spec.slots[1..] {
            if slot.source.kind() != first.kind() {
                return Err(DatasetError::config(format!(
                    "view '{}' mixes a {:?} source with a {:?} source",
                    spec.name,
                    first.kind(),
                    slot.source.kind()
                )));
            }
            if slot.source.frame_count() != first.frame_count() {
                return Err(DatasetError::config(format!(
                    "view '{}': '{}' has {} frames but '{}' has {}",
                    spec.name,
                    first.name(),
                    first.frame_count(),
                    slot.source.name(),
                    slot.source.frame_count()
                )));
            }
        }

        let clock = FrameClock::new(first.frame_count(), spec.attrs.rate, spec.attrs.delay)?;

        let mut slot_uniforms = Vec::with_capacity(slot_count);
        for slot in &spec.slots {
            let colormap = lookup_colormap(colormaps.as_ref(), &slot.colormap)?;
            slot_uniforms.push(SlotUniforms {
                colormap_name: slot.colormap.clone(),
                colormap,
                vmin: slot.vmin,
                vmax: slot.vmax,
            });
        }

        let id = Uuid::new_v4();
        let events = Arc::new(EventBus::new());
        let slots: Vec<Arc<dyn DataSource>> =
            spec.slots.iter().map(|slot| slot.source.clone()).collect();
        let (readiness, barrier) =
            barrier::spawn(id, &spec.name, &slots, spec.attrs.delay, events.clone());

        info!(
            "Created view '{}' over {} ({} frames)",
            spec.name,
            slots.iter().map(|s| s.name()).collect::<Vec<_>>().join(", "),
            clock.frame_count()
        );

        Ok(Self {
            id,
            stim: spec.attrs.stim.as_ref().map(|stim| format!("stim/{}", stim)),
            filter: RwLock::new(spec.attrs.filter),
            kind: first.kind(),
            transforms: spec.slots.iter().map(|slot| slot.transform).collect(),
            name: spec.name,
            description: spec.description,
            attrs: spec.attrs,
            state: spec.state,
            slots,
            clock,
            voxlines: options.voxlines,
            uniforms: Arc::new(RwLock::new(ViewUniforms {
                bag: UniformBag::default(),
                slots: slot_uniforms,
            })),
            colormaps,
            events,
            readiness,
            barrier,
        })
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Attributes the view was described with
    pub fn attrs(&self) -> &ViewAttrs {
        &self.attrs
    }

    /// Resource path of the stimulus movie, if any
    pub fn stim(&self) -> Option<&str> {
        self.stim.as_deref()
    }

    /// Opaque viewer state carried through from the description
    pub fn state(&self) -> Option<&serde_json::Value> {
        self.state.as_ref()
    }

    pub fn slots(&self) -> &[Arc<dyn DataSource>] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_volume(&self) -> bool {
        self.kind == SourceKind::Volume
    }

    pub fn frame_count(&self) -> usize {
        self.clock.frame_count()
    }

    pub fn rate(&self) -> f64 {
        self.clock.rate()
    }

    pub fn delay(&self) -> f64 {
        self.clock.delay()
    }

    /// Playback length in seconds
    pub fn duration(&self) -> f64 {
        self.clock.duration()
    }

    pub fn filter(&self) -> FilterMode {
        *self.filter.read()
    }

    pub fn voxlines(&self) -> bool {
        self.voxlines
    }

    /// Transform applied to `slot`
    pub fn transform(&self, slot: usize) -> Option<Mat4> {
        self.transforms.get(slot).copied()
    }

    /// `(vmin, vmax)` of `slot`
    pub fn value_range(&self, slot: usize) -> Option<([f32; 2], [f32; 2])> {
        self.uniforms
            .read()
            .slots
            .get(slot)
            .map(|s| (s.vmin, s.vmax))
    }

    /// Name of the colormap bound to `slot`
    pub fn colormap(&self, slot: usize) -> Option<String> {
        self.uniforms
            .read()
            .slots
            .get(slot)
            .map(|s| s.colormap_name.clone())
    }

    /// Snapshot of the view-wide uniform state
    pub fn uniforms(&self) -> UniformBag {
        self.uniforms.read().bag.clone()
    }

    /// Bind frame-independent state of every slot, then show time zero
    pub fn init(&self) -> Result<FramePosition> {
        let filter = self.filter();
        {
            let mut uniforms = self.uniforms.write();
            for (slot, source) in self.slots.iter().enumerate() {
                source.init(&mut uniforms.bag, slot, &self.transforms[slot], filter);
            }
        }
        debug!("Initialized view '{}'", self.name);
        self.set_frame(0.0)
    }

    /// Show the frame at playback time `time` (seconds).
    ///
    /// Fails with a state error when a needed frame has not loaded yet; the
    /// uniforms of slots sampled before the failure keep their new values.
    pub fn set_frame(&self, time: f64) -> Result<FramePosition> {
        let position = self.clock.locate(time);
        let mut updates: Vec<AttributeUpdate> = Vec::new();

        let sampled = {
            let mut uniforms = self.uniforms.write();
            uniforms.bag.frame_mix = position.mix;
            self.slots
                .iter()
                .enumerate()
                .try_for_each(|(slot, source)| {
                    source.sample_frame(&mut uniforms.bag, slot, position.floored, &mut |update: AttributeUpdate| {
                        updates.push(update)
                    })
                })
        };

        // Emit outside the lock so handlers may read the view
        for update in updates {
            self.events.emit(ViewEvent::Attribute(update));
        }
        sampled.map(|_| position)
    }

    /// Change the sampling filter of every slot and notify observers once
    pub fn set_filter(&self, filter: FilterMode) {
        *self.filter.write() = filter;
        for source in &self.slots {
            source.set_filter(filter);
        }
        debug!("View '{}' filter set to {}", self.name, filter);
        self.events.emit(ViewEvent::Update { view: self.id });
    }

    /// Set component `dim` of the value range of `slot`, or of every slot when `None`
    pub fn set_value_range(&self, min: f32, max: f32, dim: usize, slot: Option<usize>) -> Result<()> {
        if dim > 1 {
            return Err(DatasetError::config(format!(
                "range component {} out of bounds, expected 0 or 1",
                dim
            )));
        }

        let mut uniforms = self.uniforms.write();
        for state in select_slots(&mut uniforms.slots, slot)? {
            state.vmin[dim] = min;
            state.vmax[dim] = max;
        }
        Ok(())
    }

    /// Bind colormap `name` to `slot`, or to every slot when `None`
    pub fn set_colormap(&self, name: &str, slot: Option<usize>) -> Result<()> {
        let texture = lookup_colormap(self.colormaps.as_ref(), name)?;

        let mut uniforms = self.uniforms.write();
        for state in select_slots(&mut uniforms.slots, slot)? {
            state.colormap_name = name.to_string();
            state.colormap = texture.clone();
        }
        Ok(())
    }

    /// Current readiness
    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    /// Wait until every slot has enough data to play, or one of them failed
    pub async fn wait_ready(&self) -> Result<()> {
        let mut readiness = self.readiness.clone();
        loop {
            let current = readiness.borrow_and_update().clone();
            match current {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(error) => return Err(error),
                Readiness::Pending { .. } => {}
            }
            if readiness.changed().await.is_err() {
                return Err(DatasetError::state(format!(
                    "view '{}' stopped waiting for its sources",
                    self.name
                )));
            }
        }
    }

    /// Observers of this view
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self, kind: EventKind, handler: Box<dyn EventHandler>) -> SubscriptionId {
        self.events.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.barrier.abort();
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("slots", &self.slots.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("frames", &self.clock.frame_count())
            .finish()
    }
}

fn lookup_colormap(colormaps: &dyn ColormapLookup, name: &str) -> Result<Arc<Texture>> {
    colormaps
        .lookup(name)
        .ok_or_else(|| DatasetError::config(format!("unknown colormap '{}'", name)))
}

fn select_slots(slots: &mut [SlotUniforms], slot: Option<usize>) -> Result<&mut [SlotUniforms]> {
    match slot {
        None => Ok(slots),
        Some(index) if index < slots.len() => Ok(&mut slots[index..=index]),
        Some(index) => Err(DatasetError::config(format!(
            "slot {} out of range, view has {}",
            index,
            slots.len()
        ))),
    }
}
