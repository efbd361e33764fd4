//! Error types for OTP token operations

use neo_otp_ctap::OtpStatus;

/// Result type for OTP token operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for OTP token operations
///
/// Only the command executor decides between [`Error::Protocol`] and the
/// session-invalidating variants; higher layers pass the classification on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No endpoint passed the capability probe
    #[error("No OTP token detected")]
    NoDeviceFound,

    /// The token answered but rejected the request
    #[error("{message}")]
    Protocol {
        code: u8,
        name: &'static str,
        message: String,
    },

    /// I/O or framing fault on the channel
    #[error("Communication error: {0}")]
    Communication(String),

    /// The token did not answer within the command timeout
    #[error("Command timed out")]
    Timeout,

    /// Base32 secret could not be decoded
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    /// Local validation failed before anything was sent
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Build a protocol error from a token status code
    pub fn protocol(status: OtpStatus) -> Self {
        Error::Protocol {
            code: status.to_u8(),
            name: status.name(),
            message: status.message(),
        }
    }

    /// A well-formed reply that does not carry what the command promises
    pub(crate) fn malformed(what: &str, status: OtpStatus) -> Self {
        Error::Communication(format!("Malformed {} response: {}", what, status.name()))
    }

    /// Whether the token rejected the request
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol { .. })
    }

    /// Whether the live session must be torn down after this error
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Error::Communication(_) | Error::Timeout)
    }

    /// Token status code of a protocol error
    pub fn status_code(&self) -> Option<u8> {
        match self {
            Error::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<OtpStatus> for Error {
    fn from(status: OtpStatus) -> Self {
        Error::protocol(status)
    }
}

impl From<neo_otp_transport::Error> for Error {
    fn from(err: neo_otp_transport::Error) -> Self {
        match err {
            neo_otp_transport::Error::Timeout => Error::Timeout,
            other => Error::Communication(other.to_string()),
        }
    }
}
