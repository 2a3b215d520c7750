//! Per-layer stream liveness detection.
//!
//! A tracker watches the packet flow of one simulcast layer and decides
//! whether the layer is alive. Hysteresis keeps it from flapping on
//! packet-loss bursts and bursty codecs: the stream must sustain
//! `samples_required` packets per cycle for `cycles_required` consecutive
//! cycles before it is declared active, and only a full cycle with zero
//! packets stops it again.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Liveness of a single simulcast layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Created or reset; has not yet earned `Active`.
    New,
    Active,
    Stopped,
}

pub type StatusHandler = Arc<dyn Fn(StreamStatus) + Send + Sync>;

/// Hysteresis-based liveness detector for one spatial layer.
pub struct StreamTracker {
    shared: Arc<Shared>,
}

struct Shared {
    samples_required: u32,
    cycles_required: u64,
    cycle_duration: Duration,

    paused: AtomicBool,
    /// Packets seen in the current cycle; swapped out on every tick.
    sample_count: AtomicU32,
    /// Armed by `reset`: the next observed packet re-declares the stream
    /// active without waiting out the cycle hysteresis.
    resume_pending: AtomicBool,
    /// Once stopped, the tracker never restarts.
    finished: AtomicBool,

    state: Mutex<State>,
    last_packet_at: Mutex<Option<Instant>>,
    on_status_changed: Mutex<Option<StatusHandler>>,
    worker: Mutex<Option<CancellationToken>>,
}

struct State {
    status: StreamStatus,
    cycle_count: u64,
}

impl StreamTracker {
    #[must_use]
    pub fn new(samples_required: u32, cycles_required: u64, cycle_duration: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                samples_required,
                cycles_required,
                cycle_duration,
                paused: AtomicBool::new(false),
                sample_count: AtomicU32::new(0),
                resume_pending: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                state: Mutex::new(State {
                    status: StreamStatus::New,
                    cycle_count: 0,
                }),
                last_packet_at: Mutex::new(None),
                on_status_changed: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Register the status sink. Set once, before `start`.
    pub fn on_status_changed(&self, f: impl Fn(StreamStatus) + Send + Sync + 'static) {
        *self.shared.on_status_changed.lock() = Some(Arc::new(f));
    }

    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.shared.state.lock().status
    }

    #[must_use]
    pub fn last_packet_at(&self) -> Option<Instant> {
        *self.shared.last_packet_at.lock()
    }

    /// Start the detection worker. Idempotent; a stopped tracker stays
    /// stopped.
    pub fn start(&self) {
        if self.shared.finished.load(Ordering::Acquire) {
            return;
        }
        let mut worker = self.shared.worker.lock();
        if worker.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *worker = Some(cancel.clone());

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.cycle_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => shared.run_cycle(),
                }
            }
        });
    }

    /// Cancel the detection worker. Terminal and idempotent; no further
    /// status transitions are emitted.
    pub fn stop(&self) {
        self.shared.finished.store(true, Ordering::Release);
        if let Some(cancel) = self.shared.worker.lock().take() {
            cancel.cancel();
        }
    }

    /// Clear counters and return to `New`, keeping the configuration.
    ///
    /// Idempotent and safe while the stream is active. The first packet
    /// observed afterwards re-declares the stream active immediately.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.status = StreamStatus::New;
        state.cycle_count = 0;
        self.shared.sample_count.store(0, Ordering::Release);
        self.shared.resume_pending.store(true, Ordering::Release);
    }

    /// While paused, packets are ignored and ticks do not transition.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
    }

    /// Record one received packet. Called from the media ingress path; the
    /// common case is a single atomic increment.
    pub fn observe_packet(&self) {
        let shared = &self.shared;
        if shared.paused.load(Ordering::Acquire) {
            return;
        }
        *shared.last_packet_at.lock() = Some(Instant::now());
        shared.sample_count.fetch_add(1, Ordering::AcqRel);
        if shared.resume_pending.load(Ordering::Acquire) {
            self.resume_now();
        }
    }

    fn resume_now(&self) {
        let transition = {
            let mut state = self.shared.state.lock();
            if !self.shared.resume_pending.swap(false, Ordering::AcqRel) {
                // another packet won the race
                None
            } else if state.status == StreamStatus::Active {
                None
            } else {
                state.status = StreamStatus::Active;
                state.cycle_count = 0;
                Some(StreamStatus::Active)
            }
        };
        if let Some(status) = transition {
            debug!("stream re-declared active on first packet after reset");
            self.shared.emit(status);
        }
    }
}

impl Shared {
    fn run_cycle(&self) {
        if self.paused.load(Ordering::Acquire) {
            return;
        }
        let samples = self.sample_count.swap(0, Ordering::AcqRel);
        let transition = {
            let mut state = self.state.lock();
            if samples >= self.samples_required {
                state.cycle_count += 1;
            } else {
                state.cycle_count = 0;
            }
            match state.status {
                StreamStatus::New | StreamStatus::Stopped
                    if state.cycle_count >= self.cycles_required =>
                {
                    state.status = StreamStatus::Active;
                    Some(StreamStatus::Active)
                }
                StreamStatus::Active if samples == 0 => {
                    state.status = StreamStatus::Stopped;
                    Some(StreamStatus::Stopped)
                }
                _ => None,
            }
        };
        if let Some(status) = transition {
            debug!(?status, samples, "stream status changed");
            self.emit(status);
        }
    }

    /// Invoked with no locks held; the handler may call back into the
    /// tracker.
    fn emit(&self, status: StreamStatus) {
        let handler = self.on_status_changed.lock().clone();
        if let Some(handler) = handler {
            handler(status);
        }
    }
}
