//! Periodic drivers for the monitor.
//!
//! Two background tasks: the refresh loop and the advice reconciler.
//! Starting the refresh loop replaces any running one; the reconciler is
//! only started if it is not already running, so repeated starts never
//! stack timers.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::engine::monitor::Monitor;

pub struct Scheduler {
    monitor: Arc<Monitor>,
    refresh: Mutex<Option<JoinHandle<()>>>,
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

fn take_handle(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

fn is_running(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    slot.lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .is_some_and(|h| !h.is_finished())
}

impl Scheduler {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            refresh: Mutex::new(None),
            reconcile: Mutex::new(None),
        }
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Start the monitor: a refresh loop (replacing any previous one) plus
    /// the reconciler if it is not running yet.
    pub fn start(&self, refresh_every: Duration, reconcile_every: Duration) {
        self.start_refresh(refresh_every);
        if !self.ensure_reconcile(reconcile_every) {
            debug!("Advice reconciler already running");
        }
    }

    /// (Re)start the refresh loop. The first pass runs immediately.
    pub fn start_refresh(&self, every: Duration) {
        let monitor = self.monitor.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = monitor.refresh().await {
                    error!(error = %e, "Refresh pass failed");
                }
            }
        });

        let mut slot = self.refresh.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.replace(handle) {
            old.abort();
            info!("Previous refresh loop replaced");
        }
        info!(interval_secs = every.as_secs(), "Refresh loop started");
    }

    /// Start the reconciler unless one is already running. Returns whether
    /// a new task was spawned.
    ///
    /// The first tick is delayed by one interval, since fresh advice has
    /// nothing to grade yet.
    pub fn ensure_reconcile(&self, every: Duration) -> bool {
        let mut slot = self.reconcile.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let monitor = self.monitor.clone();
        *slot = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + every;
            let mut ticker = tokio::time::interval_at(start, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = monitor.reconcile().await {
                    error!(error = %e, "Reconcile pass failed");
                }
            }
        }));
        info!(interval_secs = every.as_secs(), "Advice reconciler started");
        true
    }

    /// Stop both loops. A pass already in flight is cancelled at its next
    /// await point; persisted state is only written synchronously, so it
    /// is never left half-written.
    pub fn stop(&self) {
        let mut stopped = false;
        for handle in [take_handle(&self.refresh), take_handle(&self.reconcile)]
            .into_iter()
            .flatten()
        {
            handle.abort();
            stopped = true;
        }
        if stopped {
            info!("Monitor stopped");
        }
    }

    pub fn is_refresh_active(&self) -> bool {
        is_running(&self.refresh)
    }

    pub fn is_reconcile_active(&self) -> bool {
        is_running(&self.reconcile)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
