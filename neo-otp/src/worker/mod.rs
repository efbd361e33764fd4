//! Background workers
//!
//! Two independent threads keep a front end up to date:
//! - the presence poller pings the token and reports changes
//! - the directory refresher lists generators and their current codes
//!
//! Both report through an `mpsc` channel of [`TokenEvent`]s and stop
//! cooperatively. [`TokenService`] wires them together and serializes user
//! operations with refreshes.

mod presence;
mod refresher;
mod service;

pub use presence::{PresenceTracker, spawn_presence_poller};
pub use refresher::{DirectoryRefresher, error_marker};
pub use service::TokenService;

use crate::types::GeneratorEntry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest stretch a worker sleeps without looking at its stop flag
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Events emitted by the background workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// Token presence changed (poller) or was observed by a refresh
    DeviceStatus(bool),
    /// Fresh generator list with codes
    DataReady(Vec<GeneratorEntry>),
    /// A refresh failed; carries the last error string
    Error(String),
}

/// Sleep for `duration` in short slices; returns `true` if `stop` was raised
pub(crate) fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Acquire) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
    }
}

/// A running worker thread
///
/// Dropping the handle stops the worker and joins it.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;

        log::debug!("{} started", name);
        Ok(Self {
            name,
            stop,
            thread: Some(thread),
        })
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Raise the stop flag and wait for the thread to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("{} panicked", self.name);
            } else {
                log::debug!("{} stopped", self.name);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
