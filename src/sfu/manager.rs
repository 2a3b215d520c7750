//! Per-publisher aggregation of layer trackers into an available-layer set.
//!
//! The manager owns one tracker per announced spatial layer, folds their
//! status transitions into a sorted set of available layers, and publishes
//! every membership change to a single subscriber-side sink.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::tracker::{StreamStatus, StreamTracker};
use crate::config::StreamTrackerConfig;

/// Highest spatial layer the manager tracks.
pub const DEFAULT_MAX_SPATIAL_LAYER: i32 = 2;

const LAYER_SLOTS: usize = DEFAULT_MAX_SPATIAL_LAYER as usize + 1;

pub type AvailableLayersHandler = Arc<dyn Fn(&[i32]) + Send + Sync>;

/// Simulcast health monitor for one published track.
pub struct StreamTrackerManager {
    config: StreamTrackerConfig,
    state: RwLock<ManagerState>,
    notifications: Mutex<NotifyQueue>,
    on_available_changed: Mutex<Option<AvailableLayersHandler>>,
}

struct ManagerState {
    trackers: [Option<Arc<StreamTracker>>; LAYER_SLOTS],
    /// Strictly ascending; exactly the layers whose tracker is active.
    available_layers: Vec<i32>,
    max_expected_layer: i32,
}

/// Pending availability snapshots, delivered in mutation order by a single
/// draining thread.
#[derive(Default)]
struct NotifyQueue {
    queue: VecDeque<Vec<i32>>,
    draining: bool,
}

fn slot_index(layer: i32) -> Option<usize> {
    (0..LAYER_SLOTS as i32)
        .contains(&layer)
        .then_some(layer as usize)
}

impl StreamTrackerManager {
    pub fn new(config: StreamTrackerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: RwLock::new(ManagerState {
                trackers: Default::default(),
                available_layers: Vec::new(),
                max_expected_layer: DEFAULT_MAX_SPATIAL_LAYER,
            }),
            notifications: Mutex::new(NotifyQueue::default()),
            on_available_changed: Mutex::new(None),
        })
    }

    /// Register the availability sink. Set once, before the first tracker.
    pub fn on_available_layers_changed(&self, f: impl Fn(&[i32]) + Send + Sync + 'static) {
        *self.on_available_changed.lock() = Some(Arc::new(f));
    }

    /// Install and start a tracker for `layer` with layer-appropriate
    /// tuning. Replaces any existing tracker in the slot.
    pub fn add_tracker(self: &Arc<Self>, layer: i32) {
        let Some(slot) = slot_index(layer) else {
            warn!(layer, "ignoring tracker for out-of-range layer");
            return;
        };
        let tuning = if layer == 0 {
            self.config.base_layer
        } else {
            self.config.higher_layers
        };
        let tracker = Arc::new(StreamTracker::new(
            tuning.samples_required,
            tuning.cycles_required,
            tuning.cycle_duration(),
        ));

        let manager = Arc::downgrade(self);
        tracker.on_status_changed(move |status| {
            let Some(manager) = Weak::upgrade(&manager) else {
                return;
            };
            if status == StreamStatus::Stopped {
                manager.remove_available_layer(layer);
            } else {
                manager.add_available_layer(layer);
            }
        });

        let previous = {
            let mut state = self.state.write();
            state.trackers[slot].replace(Arc::clone(&tracker))
        };
        if let Some(previous) = previous {
            previous.stop();
            // the replacement starts over; the layer must re-earn its place
            self.remove_available_layer(layer);
        }

        tracker.start();
        debug!(layer, "stream tracker added");
    }

    /// Detach and stop the layer's tracker.
    ///
    /// If the layer was still available the change is published, the same
    /// as a tracker-driven stop.
    pub fn remove_tracker(&self, layer: i32) {
        let Some(slot) = slot_index(layer) else {
            return;
        };
        let tracker = {
            let mut state = self.state.write();
            state.trackers[slot].take()
        };
        if let Some(tracker) = tracker {
            tracker.stop();
            self.remove_available_layer(layer);
            debug!(layer, "stream tracker removed");
        }
    }

    /// Stop every tracker and clear the slots.
    ///
    /// Terminal teardown of the publication: the available set is cleared
    /// without publishing a change.
    pub fn remove_all_trackers(&self) {
        let trackers = {
            let mut state = self.state.write();
            state.available_layers.clear();
            std::mem::take(&mut state.trackers)
        };
        for tracker in trackers.into_iter().flatten() {
            tracker.stop();
        }
    }

    #[must_use]
    pub fn get_tracker(&self, layer: i32) -> Option<Arc<StreamTracker>> {
        let slot = slot_index(layer)?;
        self.state.read().trackers[slot].clone()
    }

    #[must_use]
    pub fn has_spatial_layer(&self, layer: i32) -> bool {
        self.state.read().available_layers.contains(&layer)
    }

    /// Snapshot of the currently available layers, ascending.
    #[must_use]
    pub fn get_available_layers(&self) -> Vec<i32> {
        self.state.read().available_layers.clone()
    }

    /// Fewer layers available than the subscriber side expects.
    #[must_use]
    pub fn is_reduced_quality(&self) -> bool {
        let state = self.state.read();
        (state.available_layers.len() as i32) < state.max_expected_layer + 1
    }

    pub fn set_paused(&self, paused: bool) {
        let trackers: Vec<_> = {
            let state = self.state.read();
            state.trackers.iter().flatten().cloned().collect()
        };
        for tracker in trackers {
            tracker.set_paused(paused);
        }
    }

    /// Record the highest layer the subscriber side expects.
    ///
    /// Lowering the bound is bookkeeping only: the higher layers are
    /// expected to stop on their own. Raising it resets the tracker of each
    /// newly expected layer that is not currently available, so its next
    /// packet re-declares it without waiting out the hysteresis. A layer
    /// may stop between the check and the reset; that only delays its
    /// restart.
    pub fn set_max_expected_spatial_layer(&self, layer: i32) {
        let to_reset = {
            let mut state = self.state.write();
            if layer <= state.max_expected_layer {
                state.max_expected_layer = layer;
                return;
            }

            let mut to_reset = Vec::new();
            for l in (state.max_expected_layer + 1)..=layer {
                if state.available_layers.contains(&l) {
                    continue;
                }
                if let Some(slot) = slot_index(l) {
                    if let Some(tracker) = &state.trackers[slot] {
                        to_reset.push(Arc::clone(tracker));
                    }
                }
            }
            state.max_expected_layer = layer;
            to_reset
        };

        for tracker in to_reset {
            tracker.reset();
        }
    }

    fn add_available_layer(&self, layer: i32) {
        {
            let mut state = self.state.write();
            if state.available_layers.contains(&layer) {
                return;
            }
            state.available_layers.push(layer);
            state.available_layers.sort_unstable();
            self.queue_notification(state.available_layers.clone());
        }
        self.drain_notifications();
    }

    fn remove_available_layer(&self, layer: i32) {
        {
            let mut state = self.state.write();
            if !state.available_layers.contains(&layer) {
                return;
            }
            state.available_layers.retain(|&l| l != layer);
            self.queue_notification(state.available_layers.clone());
        }
        self.drain_notifications();
    }

    /// Called with the state write lock held, so snapshots enqueue in
    /// mutation order.
    fn queue_notification(&self, layers: Vec<i32>) {
        self.notifications.lock().queue.push_back(layers);
    }

    /// Deliver queued snapshots in order. Only one caller drains at a time;
    /// the handler runs with no locks held and may call back in.
    fn drain_notifications(&self) {
        loop {
            let layers = {
                let mut pending = self.notifications.lock();
                if pending.draining {
                    return;
                }
                match pending.queue.pop_front() {
                    Some(layers) => {
                        pending.draining = true;
                        layers
                    }
                    None => return,
                }
            };
            let handler = self.on_available_changed.lock().clone();
            if let Some(handler) = &handler {
                handler(&layers);
            }
            self.notifications.lock().draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn out_of_range_layers_are_ignored() {
        let manager = StreamTrackerManager::new(StreamTrackerConfig::default());
        manager.add_tracker(-1);
        manager.add_tracker(DEFAULT_MAX_SPATIAL_LAYER + 1);
        for layer in [-1, DEFAULT_MAX_SPATIAL_LAYER + 1] {
            assert!(manager.get_tracker(layer).is_none());
        }
        // removal of a layer that was never added is a no-op
        manager.remove_tracker(1);
    }

    #[tokio::test]
    async fn starts_with_nothing_available() {
        let manager = StreamTrackerManager::new(StreamTrackerConfig::default());
        assert!(manager.get_available_layers().is_empty());
        assert!(!manager.has_spatial_layer(0));
        assert!(manager.is_reduced_quality());
    }

    #[tokio::test]
    async fn tracker_slots_are_replaceable() {
        let manager = StreamTrackerManager::new(StreamTrackerConfig::default());
        manager.add_tracker(1);
        let first = manager.get_tracker(1).unwrap();
        manager.add_tracker(1);
        let second = manager.get_tracker(1).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn lowering_expected_layer_keeps_trackers_untouched() {
        let manager = StreamTrackerManager::new(StreamTrackerConfig::default());
        manager.add_tracker(0);
        manager.add_tracker(1);
        manager.set_max_expected_spatial_layer(0);
        // neither tracker was reset, so a packet does not fast-resume it
        let tracker = manager.get_tracker(1).unwrap();
        tracker.observe_packet();
        assert_eq!(tracker.status(), StreamStatus::New);
    }

    #[tokio::test]
    async fn raising_expected_layer_resets_unavailable_trackers() {
        let manager = StreamTrackerManager::new(StreamTrackerConfig::default());
        manager.add_tracker(1);
        manager.set_max_expected_spatial_layer(0);
        manager.set_max_expected_spatial_layer(2);

        // the reset arms the fast-resume path
        let tracker = manager.get_tracker(1).unwrap();
        tracker.observe_packet();
        assert_eq!(tracker.status(), StreamStatus::Active);
        assert_eq!(manager.get_available_layers(), vec![1]);
    }

    #[tokio::test]
    async fn remove_all_clears_slots() {
        let manager = StreamTrackerManager::new(StreamTrackerConfig::default());
        manager.add_tracker(0);
        manager.add_tracker(1);
        manager.remove_all_trackers();
        assert!(manager.get_tracker(0).is_none());
        assert!(manager.get_tracker(1).is_none());
        assert!(manager.get_available_layers().is_empty());
    }
}
