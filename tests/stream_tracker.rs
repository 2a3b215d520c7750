//! End-to-end liveness scenarios driven on a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbar::{StreamStatus, StreamTracker, StreamTrackerConfig, StreamTrackerManager};
use tokio::time::{advance, sleep};

fn status_recorder(tracker: &StreamTracker) -> Arc<Mutex<Vec<StreamStatus>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    tracker.on_status_changed(move |status| sink.lock().unwrap().push(status));
    events
}

/// One packet every two seconds keeps a base layer alive; a full silent
/// cycle stops it.
#[tokio::test(start_paused = true)]
async fn base_layer_hysteresis() {
    let tracker = StreamTracker::new(1, 1, Duration::from_secs(2));
    let events = status_recorder(&tracker);
    tracker.start();
    tokio::task::yield_now().await;

    sleep(Duration::from_millis(100)).await;
    tracker.observe_packet();
    assert_eq!(tracker.status(), StreamStatus::New);

    // past the tick at t=2s
    sleep(Duration::from_millis(2000)).await;
    assert_eq!(tracker.status(), StreamStatus::Active);

    // silence through the tick at t=4s
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(tracker.status(), StreamStatus::Stopped);

    assert_eq!(
        *events.lock().unwrap(),
        vec![StreamStatus::Active, StreamStatus::Stopped]
    );
    tracker.stop();
}

/// A high layer needs 60 good cycles to activate, shrugs off one thin
/// cycle, and stops only on a fully silent one.
#[tokio::test(start_paused = true)]
async fn high_layer_stability() {
    let tracker = StreamTracker::new(5, 60, Duration::from_millis(500));
    let events = status_recorder(&tracker);
    tracker.start();
    tokio::task::yield_now().await;

    for _ in 0..59 {
        for _ in 0..5 {
            tracker.observe_packet();
        }
        advance(Duration::from_millis(500)).await;
    }
    assert_eq!(tracker.status(), StreamStatus::New);

    for _ in 0..5 {
        tracker.observe_packet();
    }
    advance(Duration::from_millis(500)).await;
    // t = 30s: the 60th good cycle flips the stream active
    assert_eq!(tracker.status(), StreamStatus::Active);

    // one cycle with too few samples resets the streak but does not stop
    for _ in 0..4 {
        tracker.observe_packet();
    }
    advance(Duration::from_millis(500)).await;
    assert_eq!(tracker.status(), StreamStatus::Active);

    // one fully silent cycle stops the stream
    advance(Duration::from_millis(500)).await;
    assert_eq!(tracker.status(), StreamStatus::Stopped);

    assert_eq!(
        *events.lock().unwrap(),
        vec![StreamStatus::Active, StreamStatus::Stopped]
    );
    tracker.stop();
}

/// A stopped stream re-earns `Active` through the full hysteresis.
#[tokio::test(start_paused = true)]
async fn stopped_stream_needs_full_hysteresis_to_reactivate() {
    let tracker = StreamTracker::new(1, 3, Duration::from_millis(100));
    tracker.start();
    tokio::task::yield_now().await;

    for _ in 0..3 {
        tracker.observe_packet();
        advance(Duration::from_millis(100)).await;
    }
    assert_eq!(tracker.status(), StreamStatus::Active);

    advance(Duration::from_millis(100)).await;
    assert_eq!(tracker.status(), StreamStatus::Stopped);

    // two good cycles are not enough
    for _ in 0..2 {
        tracker.observe_packet();
        advance(Duration::from_millis(100)).await;
    }
    assert_eq!(tracker.status(), StreamStatus::Stopped);

    tracker.observe_packet();
    advance(Duration::from_millis(100)).await;
    assert_eq!(tracker.status(), StreamStatus::Active);
    tracker.stop();
}

fn fast_config() -> StreamTrackerConfig {
    let mut config = StreamTrackerConfig::default();
    config.base_layer.cycle_duration_ms = 100;
    config.higher_layers.samples_required = 1;
    config.higher_layers.cycles_required = 2;
    config.higher_layers.cycle_duration_ms = 100;
    config
}

fn layer_recorder(manager: &StreamTrackerManager) -> Arc<Mutex<Vec<Vec<i32>>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    manager.on_available_layers_changed(move |layers| sink.lock().unwrap().push(layers.to_vec()));
    events
}

/// Raising the expected layer resets stopped trackers but leaves absent
/// slots and the available set untouched.
#[tokio::test(start_paused = true)]
async fn expected_layer_bump() {
    let manager = StreamTrackerManager::new(fast_config());
    let events = layer_recorder(&manager);
    manager.set_max_expected_spatial_layer(0);
    manager.add_tracker(0);
    manager.add_tracker(1);
    tokio::task::yield_now().await;

    // layer 0 goes active, layer 1 earns active then stops
    let tracker0 = manager.get_tracker(0).unwrap();
    let tracker1 = manager.get_tracker(1).unwrap();
    for _ in 0..2 {
        tracker0.observe_packet();
        tracker1.observe_packet();
        advance(Duration::from_millis(100)).await;
    }
    assert_eq!(manager.get_available_layers(), vec![0, 1]);

    // layer 1 goes silent while layer 0 keeps flowing
    tracker0.observe_packet();
    advance(Duration::from_millis(100)).await;
    assert_eq!(tracker1.status(), StreamStatus::Stopped);
    assert_eq!(manager.get_available_layers(), vec![0]);

    manager.set_max_expected_spatial_layer(2);

    // tracker 1 was reset, tracker 2 does not exist
    assert!(manager.get_tracker(2).is_none());
    assert_eq!(manager.get_available_layers(), vec![0]);
    assert!(manager.is_reduced_quality());

    // the reset lets the next packet re-declare the layer immediately
    tracker1.observe_packet();
    assert_eq!(tracker1.status(), StreamStatus::Active);
    assert_eq!(manager.get_available_layers(), vec![0, 1]);

    assert_eq!(
        *events.lock().unwrap(),
        vec![vec![0], vec![0, 1], vec![0], vec![0, 1]]
    );
    manager.remove_all_trackers();
}

/// The available set always mirrors the set of active trackers, and every
/// change is published exactly once, in order.
#[tokio::test(start_paused = true)]
async fn available_layers_follow_tracker_status() {
    let manager = StreamTrackerManager::new(fast_config());
    let events = layer_recorder(&manager);
    manager.add_tracker(0);
    manager.add_tracker(1);
    manager.add_tracker(2);
    tokio::task::yield_now().await;

    for layer in 0..=2 {
        let tracker = manager.get_tracker(layer).unwrap();
        for _ in 0..2 {
            tracker.observe_packet();
        }
    }
    // all three layers feed every cycle until active
    for _ in 0..2 {
        advance(Duration::from_millis(100)).await;
        for layer in 0..=2 {
            manager.get_tracker(layer).unwrap().observe_packet();
        }
    }

    assert_eq!(manager.get_available_layers(), vec![0, 1, 2]);
    assert!(!manager.is_reduced_quality());
    assert!(manager.has_spatial_layer(1));

    for (index, layers) in events.lock().unwrap().iter().enumerate() {
        assert!(layers.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(layers.len(), index + 1);
    }

    // a quiescent check: every active tracker is listed, nothing else
    for layer in 0..=2 {
        let status = manager.get_tracker(layer).unwrap().status();
        assert_eq!(
            manager.has_spatial_layer(layer),
            status == StreamStatus::Active
        );
    }
    manager.remove_all_trackers();
}

/// Removing a tracker for a still-available layer publishes the change,
/// the same as a tracker-driven stop.
#[tokio::test(start_paused = true)]
async fn remove_tracker_publishes_availability_change() {
    let manager = StreamTrackerManager::new(fast_config());
    let events = layer_recorder(&manager);
    manager.add_tracker(0);
    tokio::task::yield_now().await;

    let tracker = manager.get_tracker(0).unwrap();
    tracker.observe_packet();
    advance(Duration::from_millis(100)).await;
    assert_eq!(manager.get_available_layers(), vec![0]);

    manager.remove_tracker(0);
    assert!(manager.get_tracker(0).is_none());
    assert!(manager.get_available_layers().is_empty());
    assert_eq!(*events.lock().unwrap(), vec![vec![0], vec![]]);
}

/// Re-announcing a layer replaces its tracker and clears availability
/// until the replacement re-earns it.
#[tokio::test(start_paused = true)]
async fn readding_tracker_clears_availability() {
    let manager = StreamTrackerManager::new(fast_config());
    let events = layer_recorder(&manager);
    manager.add_tracker(0);
    tokio::task::yield_now().await;

    let tracker = manager.get_tracker(0).unwrap();
    tracker.observe_packet();
    advance(Duration::from_millis(100)).await;
    assert_eq!(manager.get_available_layers(), vec![0]);

    manager.add_tracker(0);
    tokio::task::yield_now().await;
    let replacement = manager.get_tracker(0).unwrap();
    assert_eq!(replacement.status(), StreamStatus::New);
    assert!(manager.get_available_layers().is_empty());

    // the replacement earns the layer back through ordinary hysteresis
    replacement.observe_packet();
    advance(Duration::from_millis(100)).await;
    assert_eq!(manager.get_available_layers(), vec![0]);
    assert_eq!(*events.lock().unwrap(), vec![vec![0], vec![], vec![0]]);
    manager.remove_all_trackers();
}

/// Pausing silences the whole publication without transitioning any layer.
#[tokio::test(start_paused = true)]
async fn paused_manager_holds_state() {
    let manager = StreamTrackerManager::new(fast_config());
    manager.add_tracker(0);
    tokio::task::yield_now().await;

    let tracker = manager.get_tracker(0).unwrap();
    tracker.observe_packet();
    advance(Duration::from_millis(100)).await;
    assert_eq!(tracker.status(), StreamStatus::Active);

    manager.set_paused(true);
    // many silent cycles would normally stop the layer
    advance(Duration::from_millis(500)).await;
    assert_eq!(tracker.status(), StreamStatus::Active);
    assert_eq!(manager.get_available_layers(), vec![0]);

    manager.set_paused(false);
    advance(Duration::from_millis(100)).await;
    assert_eq!(tracker.status(), StreamStatus::Stopped);
    manager.remove_all_trackers();
}
