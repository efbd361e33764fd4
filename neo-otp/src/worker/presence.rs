//! Presence polling

use super::{TokenEvent, WorkerHandle, sleep_unless_stopped};
use crate::backend::OtpBackend;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Sender;

/// Debounced present/absent state
///
/// Starts unknown, so the first observation always reports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTracker {
    last: Option<bool>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation; returns the new state if it changed
    pub fn observe(&mut self, present: bool) -> Option<bool> {
        if self.last == Some(present) {
            return None;
        }
        self.last = Some(present);
        Some(present)
    }

    /// Last observed state, `None` before the first observation
    pub fn current(&self) -> Option<bool> {
        self.last
    }
}

/// Start the presence poller
///
/// Probes every `poll_interval` of the backend configuration and sends
/// [`TokenEvent::DeviceStatus`] on each change. Exits when stopped or when
/// the receiver is gone.
pub fn spawn_presence_poller(
    backend: Arc<OtpBackend>,
    events: Sender<TokenEvent>,
) -> std::io::Result<WorkerHandle> {
    let interval = backend.config().poll_interval;

    WorkerHandle::spawn("neo-otp-presence", move |stop| {
        let mut tracker = PresenceTracker::new();

        while !stop.load(Ordering::Acquire) {
            if let Some(present) = tracker.observe(backend.probe_presence()) {
                log::info!("Token {}", if present { "connected" } else { "disconnected" });
                if events.send(TokenEvent::DeviceStatus(present)).is_err() {
                    break;
                }
            }

            if sleep_unless_stopped(&stop, interval) {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_debounces() {
        let mut tracker = PresenceTracker::new();
        assert_eq!(tracker.current(), None);

        assert_eq!(tracker.observe(false), Some(false));
        assert_eq!(tracker.observe(false), None);
        assert_eq!(tracker.observe(true), Some(true));
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.observe(true), None);
        assert_eq!(tracker.observe(false), Some(false));
        assert_eq!(tracker.current(), Some(false));
    }
}
