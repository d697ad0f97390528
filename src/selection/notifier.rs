//! Status change delivery for engine listeners

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::models::StatusReport;

/// Callback invoked with each status report
pub type StatusCallback = Arc<dyn Fn(&StatusReport) + Send + Sync>;

/// Fan-out of status reports to registered listeners
///
/// Callbacks run synchronously on the task that caused the transition, in
/// registration order, with no lock held. A callback may therefore call back
/// into the engine. Every listener gets a replay of the current status on
/// registration, so callbacks must tolerate repeated reports.
pub struct StatusNotifier {
    status_listeners: RwLock<Vec<StatusCallback>>,
    connect_listeners: RwLock<Vec<StatusCallback>>,
    latest: watch::Sender<StatusReport>,
}

impl StatusNotifier {
    pub fn new(initial: StatusReport) -> Self {
        let (latest, _) = watch::channel(initial);
        Self {
            status_listeners: RwLock::new(Vec::new()),
            connect_listeners: RwLock::new(Vec::new()),
            latest,
        }
    }

    /// Register a status listener and replay `current` to it
    pub fn register_status(&self, callback: StatusCallback, current: &StatusReport) {
        self.status_listeners.write().push(callback.clone());
        callback(current);
    }

    /// Register a connect listener; replayed only when already connected
    pub fn register_connect(&self, callback: StatusCallback, current: &StatusReport) {
        self.connect_listeners.write().push(callback.clone());
        if current.connected {
            callback(current);
        }
    }

    pub fn notify_status(&self, report: &StatusReport) {
        let listeners = self.status_listeners.read().clone();
        for listener in listeners {
            listener(report);
        }
        self.latest.send_replace(report.clone());
    }

    pub fn notify_connected(&self, report: &StatusReport) {
        let listeners = self.connect_listeners.read().clone();
        for listener in listeners {
            listener(report);
        }
    }

    /// Async view of the most recent report
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.latest.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.status_listeners.read().len() + self.connect_listeners.read().len()
    }
}
