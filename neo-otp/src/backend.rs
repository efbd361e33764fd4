//! Consumer facing token API
//!
//! [`OtpBackend`] is what a front end talks to. Every call goes through the
//! shared [`CommandExecutor`], so an `Arc<OtpBackend>` can be used from the
//! background workers and the UI thread at the same time.
//!
//! # Example
//!
//! ```no_run
//! use neo_otp::{BackendConfig, NewGenerator, OtpBackend};
//!
//! # fn main() -> neo_otp::Result<()> {
//! let backend = OtpBackend::new(BackendConfig::default());
//!
//! let secret = neo_otp::secret::decode_base32("JBSWY3DPEHPK3PXP")?;
//! backend.create_generator(&NewGenerator::totp("alice:github", secret))?;
//!
//! for generator in backend.list_generators()? {
//!     let code = backend.generate_code(&generator.label, generator.otp_type, generator.period)?;
//!     println!("{} {}", generator.label, code);
//! }
//! # Ok(())
//! # }
//! ```

use crate::codec;
use crate::config::BackendConfig;
use crate::directory::GeneratorDirectory;
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::secret;
use crate::session::SessionManager;
use crate::transport::Enumerator;
use crate::types::{Algorithm, Generator, NewGenerator, OtpType};

use std::time::{SystemTime, UNIX_EPOCH};

use neo_otp_ctap::OtpCommand;

/// OTP operations on the connected token
pub struct OtpBackend {
    executor: CommandExecutor,
    config: BackendConfig,
}

impl OtpBackend {
    /// Backend searching the transports named in `config`
    pub fn new(config: BackendConfig) -> Self {
        let manager = SessionManager::new(&config);
        Self {
            executor: CommandExecutor::new(manager, &config),
            config,
        }
    }

    /// Backend searching the given enumerators, in order
    pub fn with_enumerators(enumerators: Vec<Box<dyn Enumerator>>, config: BackendConfig) -> Self {
        let manager = SessionManager::with_enumerators(enumerators, &config);
        Self {
            executor: CommandExecutor::new(manager, &config),
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// The underlying executor
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Whether a token answers the capability probe right now
    pub fn probe_presence(&self) -> bool {
        let result = codec::probe_request()
            .and_then(|payload| self.executor.execute(OtpCommand::Enumerate, payload));
        match result {
            Ok(_) => true,
            Err(e) => {
                log::trace!("Presence probe failed: {}", e);
                false
            }
        }
    }

    /// Every generator stored on the token
    pub fn list_generators(&self) -> Result<Vec<Generator>> {
        GeneratorDirectory::new(&self.executor, self.config.page_size).list_all()
    }

    /// Ask the token for the current code of `label`
    pub fn generate_code(&self, label: &str, otp_type: OtpType, period: Option<u32>) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.generate_code_at(label, otp_type, period, now)
    }

    /// Ask the token for the code of `label` at `unix_time` (TOTP only uses the time)
    pub fn generate_code_at(
        &self,
        label: &str,
        otp_type: OtpType,
        period: Option<u32>,
        unix_time: u64,
    ) -> Result<String> {
        let payload = codec::generate_request(label, otp_type, period, unix_time)?;
        self.executor.execute_with(OtpCommand::Generate, payload, |reply| {
            codec::parse_generate_response(&reply)
        })
    }

    /// Enroll a new generator
    pub fn create_generator(&self, new: &NewGenerator) -> Result<()> {
        self.local_check(new.validate())?;
        let payload = codec::create_request(new)?;
        self.executor.execute(OtpCommand::Create, payload)?;
        log::info!("Created {} generator {}", new.otp_type, new.label);
        Ok(())
    }

    /// Enroll a new generator from a base32 secret
    ///
    /// Uses the token's default counter or period.
    pub fn create_generator_b32(
        &self,
        label: &str,
        otp_type: OtpType,
        secret_b32: &str,
        algorithm: Algorithm,
        digits: u8,
    ) -> Result<()> {
        let secret = self.local_check(secret::decode_base32(secret_b32))?;
        let new = NewGenerator {
            label: label.to_string(),
            otp_type,
            algorithm,
            secret,
            digits,
            counter: None,
            period: None,
        };
        self.create_generator(&new)
    }

    /// Remove the generator named `label`
    pub fn delete_generator(&self, label: &str) -> Result<()> {
        let payload = codec::delete_request(label)?;
        self.executor.execute(OtpCommand::Delete, payload)?;
        log::info!("Deleted generator {}", label);
        Ok(())
    }

    /// Display string of the most recent failure
    pub fn last_error(&self) -> Option<String> {
        self.executor.last_error()
    }

    /// Record failures of checks that run before anything reaches the wire
    fn local_check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.executor.record_error(e);
        }
        result
    }
}

impl std::fmt::Debug for OtpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
