use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;
use uuid::Uuid;

use crate::data::AttributeUpdate;
use crate::error::DatasetError;

/// Unique identifier for a view
pub type ViewId = Uuid;

/// Events a view publishes to its observers
#[derive(Debug, Clone)]
pub enum ViewEvent {
    /// Filter mode changed; shaders bound to the view must be rebuilt
    Update { view: ViewId },

    /// A surface slot bound new vertex data
    Attribute(AttributeUpdate),

    /// Frames available in every slot
    Progress { available: usize },

    /// The view has enough data to play
    Ready,

    /// A source failed before the view became ready
    Failed { error: DatasetError },
}

/// Subscription key for [`ViewEvent`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Update,
    Attribute,
    Progress,
    Ready,
    Failed,
}

impl ViewEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ViewEvent::Update { .. } => EventKind::Update,
            ViewEvent::Attribute(_) => EventKind::Attribute,
            ViewEvent::Progress { .. } => EventKind::Progress,
            ViewEvent::Ready => EventKind::Ready,
            ViewEvent::Failed { .. } => EventKind::Failed,
        }
    }
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &ViewEvent);
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HandlerList = Vec<(SubscriptionId, Box<dyn EventHandler>)>;

/// Per-view observer registry.
///
/// Handlers run synchronously inside [`EventBus::emit`] and must not emit,
/// subscribe or unsubscribe on the same bus.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<EventKind, HandlerList>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to events of a specific kind
    pub fn subscribe(&self, kind: EventKind, handler: Box<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.lock();
        handlers.entry(kind).or_insert_with(Vec::new).push((id, handler));
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sub, _)| *sub == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Publish an event
    pub fn emit(&self, event: ViewEvent) {
        let mut handlers = self.handlers.lock();

        if let Some(event_handlers) = handlers.get_mut(&event.kind()) {
            for (_, handler) in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }

    /// Number of live subscriptions for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&ViewEvent) + Send + Sync,
{
    fn handle(&mut self, event: &ViewEvent) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&ViewEvent) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<Mutex<Vec<EventKind>>>, Box<dyn EventHandler>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = handler_from_fn(move |event| sink.lock().push(event.kind()));
        (seen, handler)
    }

    #[test]
    fn test_events_routed_by_kind() {
        let bus = EventBus::new();
        let (seen, handler) = counter();
        bus.subscribe(EventKind::Ready, handler);

        bus.emit(ViewEvent::Progress { available: 1 });
        bus.emit(ViewEvent::Ready);

        assert_eq!(*seen.lock(), vec![EventKind::Ready]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (seen, handler) = counter();
        let id = bus.subscribe(EventKind::Update, handler);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(ViewEvent::Update { view: Uuid::new_v4() });

        assert!(seen.lock().is_empty());
        assert_eq!(bus.subscriber_count(EventKind::Update), 0);
    }
}
