//! Transport layer error types

use std::fmt;

/// Transport layer result type
pub type Result<T> = std::result::Result<T, Error>;

/// Transport layer errors
///
/// Every variant means the channel itself misbehaved; logical rejections by
/// the token travel inside the response status byte instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid packet format
    InvalidPacket,

    /// Invalid command in a received packet
    InvalidCommand,

    /// Invalid sequence number
    InvalidSequence,

    /// Message too large
    MessageTooLarge,

    /// Timeout waiting for a response packet
    Timeout,

    /// Device reported a CTAPHID error
    DeviceError(u8),

    /// Smartcard answered with an unexpected status word
    StatusWord(u16),

    /// Device not found or no longer present
    DeviceNotFound,

    /// I/O error
    IoError(String),

    /// Other error
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPacket => write!(f, "Invalid packet format"),
            Error::InvalidCommand => write!(f, "Invalid command"),
            Error::InvalidSequence => write!(f, "Invalid sequence number"),
            Error::MessageTooLarge => write!(f, "Message too large"),
            Error::Timeout => write!(f, "Timeout waiting for response"),
            Error::DeviceError(code) => write!(
                f,
                "Device error 0x{:02X}: {}",
                code,
                crate::ctaphid::describe_error_code(*code)
            ),
            Error::StatusWord(sw) => write!(f, "Unexpected status word {:04X}", sw),
            Error::DeviceNotFound => write!(f, "Device not found"),
            Error::IoError(msg) => write!(f, "I/O error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

#[cfg(feature = "pcsc")]
impl From<pcsc::Error> for Error {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::NoSmartcard
            | pcsc::Error::RemovedCard
            | pcsc::Error::ReaderUnavailable
            | pcsc::Error::UnknownReader => Error::DeviceNotFound,
            pcsc::Error::Timeout => Error::Timeout,
            other => Error::IoError(other.to_string()),
        }
    }
}
