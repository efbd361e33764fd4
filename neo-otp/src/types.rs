//! OTP generator types
//!
//! [`Generator`] is a record as the token reports it; the host never changes
//! one. [`NewGenerator`] carries the secret for a Create request and is the
//! only place secret material exists on the host.

use crate::error::{Error, Result};

use std::fmt;
use std::str::FromStr;

/// Shown instead of a code for counter-based generators
pub const HOTP_PLACEHOLDER: &str = "●●●●●●";

/// Default TOTP time step in seconds
pub const DEFAULT_PERIOD: u32 = 30;

/// OTP flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpType {
    /// Counter based (RFC 4226)
    Hotp,
    /// Time based (RFC 6238)
    Totp,
}

impl OtpType {
    /// Wire code
    pub fn code(self) -> u64 {
        match self {
            OtpType::Hotp => 1,
            OtpType::Totp => 2,
        }
    }

    /// Parse a wire code
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(OtpType::Hotp),
            2 => Some(OtpType::Totp),
            _ => None,
        }
    }
}

impl fmt::Display for OtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtpType::Hotp => write!(f, "HOTP"),
            OtpType::Totp => write!(f, "TOTP"),
        }
    }
}

impl FromStr for OtpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HOTP" => Ok(OtpType::Hotp),
            "TOTP" => Ok(OtpType::Totp),
            _ => Err(Error::InvalidParameter(format!("Unknown OTP type: {}", s))),
        }
    }
}

/// HMAC hash algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Wire code (COSE-style)
    pub fn code(self) -> u64 {
        match self {
            Algorithm::Sha1 => 4,
            Algorithm::Sha256 => 5,
            Algorithm::Sha512 => 7,
        }
    }

    /// Parse a wire code
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            4 => Some(Algorithm::Sha1),
            5 => Some(Algorithm::Sha256),
            7 => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    /// Recommended seed length in bytes (the HMAC output size)
    pub fn seed_len(self) -> usize {
        match self {
            Algorithm::Sha1 => 20,
            Algorithm::Sha256 => 32,
            Algorithm::Sha512 => 64,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Sha1 => write!(f, "SHA1"),
            Algorithm::Sha256 => write!(f, "SHA256"),
            Algorithm::Sha512 => write!(f, "SHA512"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Algorithm::Sha1),
            "SHA256" => Ok(Algorithm::Sha256),
            "SHA512" => Ok(Algorithm::Sha512),
            _ => Err(Error::InvalidParameter(format!("Unknown algorithm: {}", s))),
        }
    }
}

/// One OTP generator stored on the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    /// Opaque label, conventionally `account:issuer`
    pub label: String,
    pub otp_type: OtpType,
    pub algorithm: Algorithm,
    pub digits: u8,
    /// HOTP only; the token is authoritative
    pub counter: Option<u64>,
    /// TOTP only
    pub period: Option<u32>,
}

impl Generator {
    /// Account part of the label (everything before the first `:`)
    pub fn account(&self) -> &str {
        match self.label.split_once(':') {
            Some((account, _)) => account,
            None => &self.label,
        }
    }

    /// Issuer part of the label, if the label has one
    pub fn issuer(&self) -> Option<&str> {
        self.label
            .split_once(':')
            .map(|(_, issuer)| issuer)
            .filter(|issuer| !issuer.is_empty())
    }

    /// Placeholder displayed while no code has been generated
    pub fn code_placeholder() -> &'static str {
        HOTP_PLACEHOLDER
    }

    /// Multi-line parameter summary
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("Type: {}", self.otp_type),
            format!("Account: {}", self.account()),
        ];
        if let Some(issuer) = self.issuer() {
            lines.push(format!("Issuer: {}", issuer));
        }
        lines.push(format!("Code length: {}", self.digits));
        match self.otp_type {
            OtpType::Hotp => match self.counter {
                Some(counter) => lines.push(format!("Counter: {}", counter)),
                None => lines.push("Counter: ?".to_string()),
            },
            OtpType::Totp => lines.push(format!(
                "Timestep: {} seconds",
                self.period.unwrap_or(DEFAULT_PERIOD)
            )),
        }
        lines.push(format!("Algorithm: {}", self.algorithm));
        lines.join("\n")
    }
}

/// Parameters of a generator to enroll
#[derive(Clone, PartialEq, Eq)]
pub struct NewGenerator {
    pub label: String,
    pub otp_type: OtpType,
    pub algorithm: Algorithm,
    pub secret: Vec<u8>,
    pub digits: u8,
    /// Initial counter, sent for HOTP only
    pub counter: Option<u64>,
    /// Time step, sent for TOTP only
    pub period: Option<u32>,
}

impl NewGenerator {
    /// A TOTP generator with SHA1, 6 digits and the token's default period
    pub fn totp(label: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            otp_type: OtpType::Totp,
            algorithm: Algorithm::Sha1,
            secret,
            digits: 6,
            counter: None,
            period: None,
        }
    }

    /// An HOTP generator with SHA1, 6 digits and the token's default counter
    pub fn hotp(label: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            otp_type: OtpType::Hotp,
            ..Self::totp(label, secret)
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_digits(mut self, digits: u8) -> Self {
        self.digits = digits;
        self
    }

    pub fn with_counter(mut self, counter: u64) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn with_period(mut self, period: u32) -> Self {
        self.period = Some(period);
        self
    }

    /// Check the parameters before anything is sent
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::InvalidParameter("label must not be empty".into()));
        }
        if !(6..=8).contains(&self.digits) {
            return Err(Error::InvalidParameter(format!(
                "digits must be between 6 and 8, got {}",
                self.digits
            )));
        }
        if self.secret.is_empty() {
            return Err(Error::InvalidParameter("secret must not be empty".into()));
        }
        if self.period == Some(0) {
            return Err(Error::InvalidParameter("period must not be zero".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for NewGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewGenerator")
            .field("label", &self.label)
            .field("otp_type", &self.otp_type)
            .field("algorithm", &self.algorithm)
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .field("digits", &self.digits)
            .field("counter", &self.counter)
            .field("period", &self.period)
            .finish()
    }
}

/// A generator paired with its current code (or placeholder / error marker)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorEntry {
    pub generator: Generator,
    pub code: String,
}
