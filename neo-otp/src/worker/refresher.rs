//! Directory refresh

use super::{PresenceTracker, TokenEvent, WorkerHandle, sleep_unless_stopped};
use crate::backend::OtpBackend;
use crate::error::Error;
use crate::types::{Generator, GeneratorEntry, OtpType};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// Code shown for an entry whose Generate call failed
pub fn error_marker(error: &Error) -> String {
    match error.status_code() {
        Some(code) => format!("Err:0x{:02X}", code),
        None => "Err".to_string(),
    }
}

/// Clears the in-flight flag when a run ends, even by panic
pub(crate) struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps new refreshes from starting while alive
pub(crate) struct Held(Arc<AtomicUsize>);

impl Drop for Held {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Lists generators with their codes and publishes the result
///
/// Clones share the in-flight flag, so at most one refresh runs at a time
/// across all of them. They also share the presence last reported, so
/// [`TokenEvent::DeviceStatus`] only goes out when a run sees it change.
#[derive(Clone)]
pub struct DirectoryRefresher {
    backend: Arc<OtpBackend>,
    events: Sender<TokenEvent>,
    in_flight: Arc<AtomicBool>,
    held: Arc<AtomicUsize>,
    presence: Arc<Mutex<PresenceTracker>>,
}

impl DirectoryRefresher {
    pub fn new(backend: Arc<OtpBackend>, events: Sender<TokenEvent>) -> Self {
        Self {
            backend,
            events,
            in_flight: Arc::new(AtomicBool::new(false)),
            held: Arc::new(AtomicUsize::new(0)),
            presence: Arc::new(Mutex::new(PresenceTracker::new())),
        }
    }

    /// Another sender on the same event channel
    pub(crate) fn events(&self) -> Sender<TokenEvent> {
        self.events.clone()
    }

    /// Whether a refresh is running right now
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Refuse new refreshes until the returned guard is dropped
    ///
    /// A refresh already in flight is not affected.
    pub(crate) fn hold(&self) -> Held {
        self.held.fetch_add(1, Ordering::AcqRel);
        Held(Arc::clone(&self.held))
    }

    /// Take the in-flight flag for something other than a refresh
    pub(crate) fn claim(&self) -> Option<InFlight> {
        InFlight::acquire(&self.in_flight)
    }

    fn claim_for_refresh(&self) -> Option<InFlight> {
        if self.held.load(Ordering::Acquire) > 0 {
            log::trace!("Refresh held back by a user operation");
            return None;
        }
        let guard = self.claim();
        if guard.is_none() {
            log::debug!("Refresh already in flight, dropping request");
        }
        guard
    }

    /// Run one refresh on the calling thread
    ///
    /// Returns `false` without doing anything if another refresh or a user
    /// operation is in flight.
    pub fn try_refresh(&self) -> bool {
        let Some(_guard) = self.claim_for_refresh() else {
            return false;
        };
        self.run();
        true
    }

    /// Run one refresh on a new thread
    ///
    /// Returns `false` if another refresh or a user operation is in flight.
    pub fn refresh_in_background(&self) -> bool {
        let Some(guard) = self.claim_for_refresh() else {
            return false;
        };

        let refresher = self.clone();
        match thread::Builder::new()
            .name("neo-otp-refresh-once".into())
            .spawn(move || {
                let _guard = guard;
                refresher.run();
            }) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Cannot spawn refresh thread: {}", e);
                false
            }
        }
    }

    /// Start refreshing every `refresh_interval` of the backend configuration
    pub fn spawn_periodic(&self) -> std::io::Result<WorkerHandle> {
        let refresher = self.clone();
        let interval = self.backend.config().refresh_interval;

        WorkerHandle::spawn("neo-otp-refresh", move |stop| {
            while !stop.load(Ordering::Acquire) {
                refresher.try_refresh();
                if sleep_unless_stopped(&stop, interval) {
                    break;
                }
            }
        })
    }

    fn code_for(&self, generator: &Generator) -> String {
        match generator.otp_type {
            OtpType::Hotp => Generator::code_placeholder().to_string(),
            OtpType::Totp => {
                match self
                    .backend
                    .generate_code(&generator.label, OtpType::Totp, generator.period)
                {
                    Ok(code) => code,
                    Err(e) => {
                        log::warn!("Generate failed for {}: {}", generator.label, e);
                        error_marker(&e)
                    }
                }
            }
        }
    }

    fn run(&self) {
        // Send failures only mean nobody listens any more
        match self.backend.list_generators() {
            Ok(generators) => {
                let entries = generators
                    .into_iter()
                    .map(|generator| GeneratorEntry {
                        code: self.code_for(&generator),
                        generator,
                    })
                    .collect();

                self.report_presence(true);
                let _ = self.events.send(TokenEvent::DataReady(entries));
            }
            Err(e) => {
                let message = self.backend.last_error().unwrap_or_else(|| e.to_string());
                log::warn!("Refresh failed: {}", message);

                let _ = self.events.send(TokenEvent::Error(message));
                self.report_presence(e.is_protocol());
            }
        }
    }

    fn report_presence(&self, present: bool) {
        let changed = self
            .presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(present);
        if let Some(present) = changed {
            let _ = self.events.send(TokenEvent::DeviceStatus(present));
        }
    }
}
