//! Timer management for the production runner.
//!
//! Each timer is a tokio task that sleeps for the requested duration and
//! then sends the corresponding event into the runner's event channel.
//! Timers are one-shot (the state machine re-arms its periodic loops) and
//! can be cancelled.

use hawklock_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Convert a TimerId to the event it fires.
fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::Detection => Event::DetectionTimer,
        TimerId::PagSample => Event::PagSampleTimer,
        TimerId::ZoneDetection => Event::ZoneDetectionTimer,
    }
}

/// Manages active timers for the production runner.
pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    /// Create a timer manager feeding `event_tx`.
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        TimerManager {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Set a timer to fire after `duration`. An existing timer with the
    /// same id is cancelled first.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(?id, "timer fired");
            // A closed channel just means the runner is shutting down.
            let _ = event_tx.send(timer_event(id)).await;
        });
        self.timers.insert(id, handle);
        debug!(?id, ?duration, "timer set");
    }

    /// Cancel a timer. A timer that does not exist or has already fired is
    /// a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            debug!(?id, "timer cancelled");
        }
    }

    /// Cancel all timers. Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(?id, "timer cancelled (shutdown)");
        }
    }

    /// Number of active timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
