//! Session management
//!
//! [`SessionManager`] owns at most one opened, probed channel. A cached
//! session is reused as long as it still answers the capability probe;
//! otherwise it is closed and the configured transport families are searched
//! again, in priority order.

use crate::codec;
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::executor::{SharedChannel, dispatch};
use crate::transport::{Enumerator, default_enumerators};

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use neo_otp_ctap::OtpCommand;

/// The single live connection to a token
pub struct Session {
    channel: SharedChannel,
    endpoint: String,
}

impl Session {
    /// Description of the endpoint behind this session
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn channel(&self) -> &SharedChannel {
        &self.channel
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Owns the session slot and the discovery policy
///
/// `last_error` survives session teardown.
pub struct SessionManager {
    enumerators: Vec<Box<dyn Enumerator>>,
    session: Option<Session>,
    last_error: Option<String>,
    command_timeout: Duration,
    discovery_attempts: u32,
    discovery_backoff: Duration,
}

impl SessionManager {
    /// Manager searching the transports named in `config`
    pub fn new(config: &BackendConfig) -> Self {
        Self::with_enumerators(default_enumerators(&config.transports), config)
    }

    /// Manager searching the given enumerators, in order
    pub fn with_enumerators(enumerators: Vec<Box<dyn Enumerator>>, config: &BackendConfig) -> Self {
        Self {
            enumerators,
            session: None,
            last_error: None,
            command_timeout: config.command_timeout,
            discovery_attempts: config.discovery_attempts.max(1),
            discovery_backoff: config.discovery_backoff,
        }
    }

    /// Return a usable session, rediscovering if needed
    ///
    /// Fails with [`Error::NoDeviceFound`] when no endpoint passes the probe
    /// in any discovery pass.
    pub fn acquire_session(&mut self) -> Result<&mut Session> {
        let reusable = match &self.session {
            Some(session) => match probe(&session.channel, self.command_timeout) {
                Ok(()) => {
                    log::debug!("Reusing session on {}", session.endpoint);
                    true
                }
                Err(e) => {
                    log::warn!("Session on {} failed its probe: {}", session.endpoint, e);
                    false
                }
            },
            None => false,
        };

        if reusable {
            return self.session.as_mut().ok_or(Error::NoDeviceFound);
        }

        self.close();

        for attempt in 1..=self.discovery_attempts {
            if let Some(session) = self.discover() {
                log::info!("OTP token found on {}", session.endpoint);
                self.last_error = None;
                return Ok(self.session.insert(session));
            }

            if attempt < self.discovery_attempts {
                log::debug!(
                    "No OTP token on pass {}/{}, retrying",
                    attempt,
                    self.discovery_attempts
                );
                thread::sleep(self.discovery_backoff);
            }
        }

        Err(Error::NoDeviceFound)
    }

    /// One pass over every enumerator; the first endpoint passing the probe wins
    fn discover(&self) -> Option<Session> {
        for enumerator in &self.enumerators {
            let endpoints = match enumerator.enumerate() {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    log::error!("{} enumeration failed: {}", enumerator.kind(), e);
                    continue;
                }
            };

            log::debug!("{} {} endpoint(s) found", endpoints.len(), enumerator.kind());

            for endpoint in endpoints {
                let description = endpoint.describe();
                let channel = match endpoint.open() {
                    Ok(channel) => Arc::new(Mutex::new(channel)),
                    Err(e) => {
                        log::debug!("Cannot open {}: {}", description, e);
                        continue;
                    }
                };

                match probe(&channel, self.command_timeout) {
                    Ok(()) => {
                        return Some(Session {
                            channel,
                            endpoint: description,
                        });
                    }
                    // Dropping the channel closes the handle
                    Err(e) => log::debug!("{} does not support OTP: {}", description, e),
                }
            }
        }

        None
    }

    /// Mark the session unusable after `error` and close its handle
    pub fn invalidate(&mut self, error: &Error) {
        if let Some(session) = &self.session {
            log::warn!("Invalidating session on {}: {}", session.endpoint, error);
        }
        self.record_error(error);
        self.close();
    }

    /// Remember the display string of a failure
    pub fn record_error(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
    }

    /// Last recorded failure, cleared only by a successful rediscovery
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The cached session, if any
    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("Closing session on {}", session.endpoint);
        }
    }
}

/// Capability probe: Enumerate with `count = 0` must succeed
fn probe(channel: &SharedChannel, timeout: Duration) -> Result<()> {
    let payload = codec::probe_request()?;
    dispatch(channel, OtpCommand::Enumerate, payload, timeout).map(|_| ())
}
