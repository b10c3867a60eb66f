//! Readiness barrier across the sources of a view

use std::sync::Arc;

use cx_core::{DataSource, DatasetError, EventBus, LoadState, ViewEvent, ViewId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Playback readiness of a view
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// Waiting for data; `available` is the smallest frame count loaded by any slot
    Pending { available: usize },
    Ready,
    Failed(DatasetError),
}

impl Readiness {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Readiness::Pending { .. })
    }
}

/// Folds per-slot load states into a single readiness transition.
///
/// A slot counts as ready once its loaded frame count exceeds the view's
/// delay, or once its source finished loading. The barrier settles on the
/// first `Ready` or `Failed` and ignores everything afterwards.
#[derive(Debug)]
pub struct ReadinessBarrier {
    names: Vec<String>,
    delay: f64,
    slot_ready: Vec<bool>,
    available: usize,
    settled: bool,
}

impl ReadinessBarrier {
    /// A barrier over slots fed by the sources named `names`
    pub fn new(names: Vec<String>, delay: f64) -> Self {
        Self {
            slot_ready: vec![false; names.len()],
            names,
            delay,
            available: 0,
            settled: false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Feed the latest state of every slot; returns the transition to publish, if any
    pub fn observe(&mut self, states: &[LoadState]) -> Option<Readiness> {
        if self.settled {
            return None;
        }

        let failure = states
            .iter()
            .enumerate()
            .find_map(|(slot, state)| state.failure_reason().map(|reason| (slot, reason)));
        if let Some((slot, reason)) = failure {
            self.settled = true;
            let name = self.names.get(slot).cloned().unwrap_or_default();
            return Some(Readiness::Failed(DatasetError::load_failure(name, reason)));
        }

        for (ready, state) in self.slot_ready.iter_mut().zip(states) {
            if state.is_ready() || state.frames_ready as f64 > self.delay {
                *ready = true;
            }
        }

        if self.slot_ready.iter().all(|ready| *ready) {
            self.settled = true;
            return Some(Readiness::Ready);
        }

        let available = states.iter().map(|s| s.frames_ready).min().unwrap_or(0);
        if available != self.available {
            self.available = available;
            return Some(Readiness::Pending { available });
        }
        None
    }
}

/// Watch the load state of `sources` and publish readiness events on `events`.
///
/// The task exits once the view settles; later source failures only show in
/// the sources' own load state.
pub(crate) fn spawn(
    view: ViewId,
    view_name: &str,
    sources: &[Arc<dyn DataSource>],
    delay: f64,
    events: Arc<EventBus>,
) -> (watch::Receiver<Readiness>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(Readiness::Pending { available: 0 });
    let names: Vec<String> = sources.iter().map(|s| s.name().to_string()).collect();
    let mut receivers: Vec<_> = sources.iter().map(|s| s.watch_load()).collect();
    let mut barrier = ReadinessBarrier::new(names, delay);
    let view_name = view_name.to_string();

    let handle = tokio::spawn(async move {
        loop {
            let states: Vec<LoadState> = receivers
                .iter_mut()
                .map(|rx| rx.borrow_and_update().clone())
                .collect();

            if let Some(transition) = barrier.observe(&states) {
                match &transition {
                    Readiness::Failed(error) => {
                        warn!("View '{}' ({}) failed to load: {}", view_name, view, error);
                        events.emit(ViewEvent::Failed { error: error.clone() });
                    }
                    Readiness::Ready => {
                        info!("View '{}' ready", view_name);
                        events.emit(ViewEvent::Ready);
                    }
                    Readiness::Pending { available } => {
                        debug!("View '{}': {} frame(s) available", view_name, available);
                        events.emit(ViewEvent::Progress { available: *available });
                    }
                }
                tx.send_replace(transition);
            }

            if barrier.is_settled() {
                break;
            }

            let changed = match receivers.as_mut_slice() {
                [only] => only.changed().await,
                [first, second] => tokio::select! {
                    changed = first.changed() => changed,
                    changed = second.changed() => changed,
                },
                _ => break,
            };
            if changed.is_err() {
                debug!("Sources of view '{}' dropped before it settled", view_name);
                break;
            }
        }
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_core::LoadStatus;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("source{}", i)).collect()
    }

    fn loading(frames: usize) -> LoadState {
        LoadState {
            frames_ready: frames,
            status: LoadStatus::Loading,
        }
    }

    fn done(frames: usize) -> LoadState {
        LoadState {
            frames_ready: frames,
            status: LoadStatus::Ready,
        }
    }

    #[test]
    fn test_ready_requires_frames_beyond_delay() {
        let mut barrier = ReadinessBarrier::new(names(1), 2.0);

        assert_eq!(barrier.observe(&[loading(0)]), None);
        assert_eq!(
            barrier.observe(&[loading(1)]),
            Some(Readiness::Pending { available: 1 })
        );
        assert_eq!(
            barrier.observe(&[loading(2)]),
            Some(Readiness::Pending { available: 2 })
        );
        assert_eq!(barrier.observe(&[loading(3)]), Some(Readiness::Ready));
        assert!(barrier.is_settled());
    }

    #[test]
    fn test_finished_source_is_ready_regardless_of_delay() {
        let mut barrier = ReadinessBarrier::new(names(1), 5.0);
        assert_eq!(barrier.observe(&[done(2)]), Some(Readiness::Ready));
    }

    #[test]
    fn test_waits_for_every_slot() {
        let mut barrier = ReadinessBarrier::new(names(2), 0.0);

        assert_eq!(
            barrier.observe(&[loading(4), loading(0)]),
            None,
            "minimum availability is still zero"
        );
        assert_eq!(barrier.observe(&[loading(4), loading(1)]), Some(Readiness::Ready));
    }

    #[test]
    fn test_progress_reports_minimum_availability() {
        let mut barrier = ReadinessBarrier::new(names(2), 10.0);

        assert_eq!(
            barrier.observe(&[loading(3), loading(1)]),
            Some(Readiness::Pending { available: 1 })
        );
        assert_eq!(barrier.observe(&[loading(5), loading(1)]), None);
        assert_eq!(
            barrier.observe(&[loading(5), loading(2)]),
            Some(Readiness::Pending { available: 2 })
        );
    }

    #[test]
    fn test_ready_fires_once() {
        let mut barrier = ReadinessBarrier::new(names(1), 0.0);

        assert_eq!(barrier.observe(&[loading(1)]), Some(Readiness::Ready));
        assert_eq!(barrier.observe(&[loading(2)]), None);
        assert_eq!(barrier.observe(&[done(3)]), None);
    }

    proptest::proptest! {
        #[test]
        fn prop_settles_at_most_once(
            steps in proptest::collection::vec((0usize..3, 0usize..4), 1..40),
            delay in 0.0f64..6.0,
        ) {
            let mut barrier = ReadinessBarrier::new(names(2), delay);
            let mut frames = [0usize; 2];
            let mut settled = 0;
            let mut last_available = 0;

            for (slot, grow) in steps {
                if slot < 2 {
                    frames[slot] += grow;
                }
                let states = [loading(frames[0]), loading(frames[1])];
                match barrier.observe(&states) {
                    Some(Readiness::Pending { available }) => {
                        proptest::prop_assert_eq!(settled, 0);
                        proptest::prop_assert!(available > last_available);
                        last_available = available;
                    }
                    Some(Readiness::Ready) => settled += 1,
                    Some(Readiness::Failed(_)) => proptest::prop_assert!(false, "no source failed"),
                    None => {}
                }
            }
            proptest::prop_assert!(settled <= 1);
        }
    }

    #[test]
    fn test_failure_before_ready_rejects() {
        let mut barrier = ReadinessBarrier::new(names(2), 0.0);
        let failed = LoadState {
            frames_ready: 0,
            status: LoadStatus::Failed("404".to_string()),
        };

        let transition = barrier.observe(&[loading(1), failed]);
        assert_eq!(
            transition,
            Some(Readiness::Failed(DatasetError::load_failure("source1", "404")))
        );
        assert_eq!(barrier.observe(&[done(2), done(2)]), None);
    }
}
