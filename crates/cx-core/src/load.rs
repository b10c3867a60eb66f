//! Load state published by every data source

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Status of a source's background load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Snapshot of a source's progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadState {
    pub frames_ready: usize,
    pub status: LoadStatus,
}

impl LoadState {
    pub fn loading() -> Self {
        Self {
            frames_ready: 0,
            status: LoadStatus::Loading,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == LoadStatus::Ready
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LoadStatus::Failed(_))
    }

    /// Ready and Failed are terminal
    pub fn is_settled(&self) -> bool {
        self.status != LoadStatus::Loading
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            LoadStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl Default for LoadState {
    fn default() -> Self {
        Self::loading()
    }
}

/// Publishing side of a source's load state.
///
/// Subscribers receive a `watch` receiver, so they always observe the most
/// recent state. Once the state is settled, further updates are ignored.
pub struct LoadTracker {
    name: String,
    tx: watch::Sender<LoadState>,
}

impl LoadTracker {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(LoadState::loading());
        Self {
            name: name.into(),
            tx,
        }
    }

    /// Current state
    pub fn state(&self) -> LoadState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.tx.subscribe()
    }

    /// Report that `frames_ready` frames are now available
    pub fn progress(&self, frames_ready: usize) {
        let changed = self.tx.send_if_modified(|state| {
            if state.is_settled() || state.frames_ready == frames_ready {
                return false;
            }
            state.frames_ready = frames_ready;
            true
        });
        if changed {
            debug!("{}: {} frame(s) ready", self.name, frames_ready);
        }
    }

    /// Mark the load as complete
    pub fn ready(&self, frames_ready: usize) {
        let changed = self.tx.send_if_modified(|state| {
            if state.is_settled() {
                return false;
            }
            state.frames_ready = frames_ready;
            state.status = LoadStatus::Ready;
            true
        });
        if changed {
            info!("{}: loaded {} frame(s)", self.name, frames_ready);
        }
    }

    /// Mark the load as failed, keeping the frames already delivered
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let changed = self.tx.send_if_modified(|state| {
            if state.is_settled() {
                return false;
            }
            state.status = LoadStatus::Failed(reason.clone());
            true
        });
        if changed {
            warn!("{}: load failed: {}", self.name, reason);
        }
    }
}

/// Cooperative cancellation flag checked by loaders at every suspension point
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
