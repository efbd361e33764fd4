//! Command execution
//!
//! Every OTP command goes through [`CommandExecutor::execute`], which holds a
//! single lock for the whole exchange: session acquisition, dispatch and the
//! response. The wire call itself runs on a helper thread so that a hung
//! token costs at most the command timeout.

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::transport::CtapChannel;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use neo_otp_ctap::{OtpCommand, OtpStatus, WireMap};

/// Opened channel shared between the session and in-flight wire threads
pub(crate) type SharedChannel = Arc<Mutex<Box<dyn CtapChannel>>>;

/// Send one command on `channel` and wait at most `timeout` for the reply
///
/// A timed out wire thread is left to finish on its own; the exchange is not
/// cancelled on the wire.
pub(crate) fn dispatch(
    channel: &SharedChannel,
    command: OtpCommand,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<WireMap> {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(channel);

    log::debug!("-> {} ({} bytes)", command, payload.len());

    thread::Builder::new()
        .name("neo-otp-wire".into())
        .spawn(move || {
            let mut channel = worker.lock().unwrap_or_else(PoisonError::into_inner);
            // The receiver is gone if the caller already timed out
            let _ = tx.send(channel.send_cbor(command.as_u8(), &payload));
        })
        .map_err(|e| Error::Communication(format!("Cannot spawn wire thread: {}", e)))?;

    let raw = match rx.recv_timeout(timeout) {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return Err(e.into()),
        Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout),
        Err(RecvTimeoutError::Disconnected) => {
            return Err(Error::Communication("Wire thread exited without a reply".into()));
        }
    };

    parse_reply(command, &raw)
}

/// Split a raw reply into status byte and CBOR body
fn parse_reply(command: OtpCommand, raw: &[u8]) -> Result<WireMap> {
    let Some((&status, body)) = raw.split_first() else {
        return Err(Error::Communication("Empty response".into()));
    };

    let status = OtpStatus::from_u8(status);
    log::debug!("<- {} {} ({} bytes)", command, status.name(), body.len());

    if !status.is_ok() {
        return Err(Error::protocol(status));
    }

    WireMap::from_bytes(body)
        .map_err(|e| Error::Communication(format!("Invalid CBOR in {} response: {}", command, e)))
}

/// Serializes all token access through one session
pub struct CommandExecutor {
    manager: Mutex<SessionManager>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(manager: SessionManager, config: &BackendConfig) -> Self {
        Self {
            manager: Mutex::new(manager),
            timeout: config.command_timeout,
        }
    }

    /// Run one command and return the reply map
    pub fn execute(&self, command: OtpCommand, payload: Vec<u8>) -> Result<WireMap> {
        self.execute_with(command, payload, Ok)
    }

    /// Run one command and decode its reply with `parse`, under the same lock
    ///
    /// Protocol rejections keep the session; communication faults, timeouts
    /// and replies `parse` cannot make sense of tear it down so the next call
    /// rediscovers.
    pub fn execute_with<T>(
        &self,
        command: OtpCommand,
        payload: Vec<u8>,
        parse: impl FnOnce(WireMap) -> Result<T>,
    ) -> Result<T> {
        let mut manager = self.manager.lock().unwrap_or_else(PoisonError::into_inner);

        let channel = match manager.acquire_session() {
            Ok(session) => Arc::clone(session.channel()),
            Err(e) => {
                let err = Error::Communication(e.to_string());
                manager.record_error(&err);
                return Err(err);
            }
        };

        let result = dispatch(&channel, command, payload, self.timeout).and_then(parse);
        if let Err(err) = &result {
            if err.invalidates_session() {
                manager.invalidate(err);
            } else {
                log::debug!("{} rejected: {}", command, err);
                manager.record_error(err);
            }
        }
        result
    }

    /// Display string of the most recent failure
    pub fn last_error(&self) -> Option<String> {
        let manager = self.manager.lock().unwrap_or_else(PoisonError::into_inner);
        manager.last_error().map(str::to_string)
    }

    /// Record a failure that happened outside `execute`
    pub(crate) fn record_error(&self, error: &Error) {
        let mut manager = self.manager.lock().unwrap_or_else(PoisonError::into_inner);
        manager.record_error(error);
    }

    /// Endpoint of the cached session, if one is open
    pub fn connected_endpoint(&self) -> Option<String> {
        let manager = self.manager.lock().unwrap_or_else(PoisonError::into_inner);
        manager.current().map(|s| s.endpoint().to_string())
    }
}
