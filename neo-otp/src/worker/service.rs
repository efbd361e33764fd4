//! Coordination of background workers and user operations

use super::refresher::InFlight;
use super::{DirectoryRefresher, TokenEvent, WorkerHandle, spawn_presence_poller};
use crate::backend::OtpBackend;
use crate::error::Result;
use crate::types::{NewGenerator, OtpType};

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_BACKOFF_START: Duration = Duration::from_millis(10);
const WAIT_BACKOFF_MAX: Duration = Duration::from_millis(200);

/// Runs the presence poller and the periodic refresher, and routes user
/// operations so they never interleave with a refresh
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use neo_otp::{BackendConfig, OtpBackend, TokenEvent, TokenService};
///
/// let backend = Arc::new(OtpBackend::new(BackendConfig::default()));
/// let (mut service, events) = TokenService::new(backend);
/// service.start().unwrap();
///
/// for event in events {
///     match event {
///         TokenEvent::DeviceStatus(present) => println!("present: {}", present),
///         TokenEvent::DataReady(entries) => println!("{} generators", entries.len()),
///         TokenEvent::Error(message) => println!("error: {}", message),
///     }
/// }
/// ```
pub struct TokenService {
    backend: Arc<OtpBackend>,
    refresher: DirectoryRefresher,
    presence: Option<WorkerHandle>,
    periodic: Option<WorkerHandle>,
}

impl TokenService {
    /// Create the service and the receiving end of its event channel
    pub fn new(backend: Arc<OtpBackend>) -> (Self, Receiver<TokenEvent>) {
        let (tx, rx) = mpsc::channel();
        let service = Self {
            refresher: DirectoryRefresher::new(Arc::clone(&backend), tx),
            backend,
            presence: None,
            periodic: None,
        };
        (service, rx)
    }

    pub fn backend(&self) -> &Arc<OtpBackend> {
        &self.backend
    }

    pub fn refresher(&self) -> &DirectoryRefresher {
        &self.refresher
    }

    /// Start the presence poller and the periodic refresher
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.presence.is_none() {
            let events = self.refresher.events();
            self.presence = Some(spawn_presence_poller(Arc::clone(&self.backend), events)?);
        }
        if self.periodic.is_none() {
            self.periodic = Some(self.refresher.spawn_periodic()?);
        }
        Ok(())
    }

    /// Stop both workers and join their threads
    pub fn stop(&mut self) {
        if let Some(mut presence) = self.presence.take() {
            presence.stop();
        }
        if let Some(mut periodic) = self.periodic.take() {
            periodic.stop();
        }
    }

    /// Trigger a refresh now; `false` if one is already running
    pub fn refresh_now(&self) -> bool {
        self.refresher.refresh_in_background()
    }

    /// Enroll a generator, then refresh
    pub fn create_generator(&self, new: &NewGenerator) -> Result<()> {
        self.user_operation(|backend| backend.create_generator(new))
    }

    /// Remove a generator, then refresh
    pub fn delete_generator(&self, label: &str) -> Result<()> {
        self.user_operation(|backend| backend.delete_generator(label))
    }

    /// Explicitly generate a code (the only way HOTP codes are produced)
    pub fn generate_code(&self, label: &str, otp_type: OtpType, period: Option<u32>) -> Result<String> {
        let _exclusive = self.exclusive();
        self.backend.generate_code(label, otp_type, period)
    }

    fn user_operation<T>(&self, operation: impl FnOnce(&OtpBackend) -> Result<T>) -> Result<T> {
        let exclusive = self.exclusive();
        let result = operation(&self.backend);
        drop(exclusive);
        self.refresher.refresh_in_background();
        result
    }

    /// Hold back new refreshes and take the in-flight flag once the running
    /// one is done
    ///
    /// `None` when the refresh outlives the wait timeout; the caller then
    /// proceeds anyway.
    fn exclusive(&self) -> Option<InFlight> {
        let _held = self.refresher.hold();
        let acquired = self.poll_with_backoff(|| self.refresher.claim());
        if acquired.is_none() {
            log::warn!("Refresh still running after wait timeout, proceeding");
        }
        acquired
    }

    /// Wait until no refresh is running; `false` on timeout
    pub fn wait_for_refresh(&self) -> bool {
        let idle = self.poll_with_backoff(|| (!self.refresher.is_running()).then_some(()));
        if idle.is_none() {
            log::warn!("Refresh still running after wait timeout");
        }
        idle.is_some()
    }

    /// Retry `attempt` with growing backoff until it yields or the refresh
    /// wait timeout passes
    fn poll_with_backoff<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + self.backend.config().refresh_wait_timeout;
        let mut backoff = WAIT_BACKOFF_START;

        loop {
            if let Some(value) = attempt() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(WAIT_BACKOFF_MAX);
        }
    }
}

impl Drop for TokenService {
    fn drop(&mut self) {
        self.stop();
    }
}
