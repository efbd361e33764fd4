//! OTP extension status codes
//!
//! The first byte of every response to an OTP command is a status code.
//! `0x00` means success; everything else is a logical rejection by the token.
//! Codes the table does not know are preserved in [`OtpStatus::Unknown`] so
//! they still surface as a readable message.

use std::fmt;

/// Status byte returned in-band by the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpStatus {
    /// Command executed successfully
    Ok,

    /// Command byte not recognized by the CTAP layer
    InvalidCommand,

    /// Request payload is not valid CBOR
    InvalidCbor,

    /// OTP sub-command not recognized
    UnrecognizedCommand,

    /// A parameter is missing or out of range
    InvalidParameter,

    /// A generator with the requested label already exists
    GeneratorExists,

    /// No generator with the requested label
    GeneratorNotFound,

    /// Token storage is full
    MemoryFull,

    /// Code outside the documented table
    Unknown(u8),
}

impl OtpStatus {
    /// Create a status from its byte value
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::InvalidCommand,
            0xF1 => Self::InvalidCbor,
            0xF2 => Self::UnrecognizedCommand,
            0xF3 => Self::InvalidParameter,
            0xF4 => Self::GeneratorExists,
            0xF5 => Self::GeneratorNotFound,
            0xF6 => Self::MemoryFull,
            other => Self::Unknown(other),
        }
    }

    /// Byte value of this status
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::InvalidCommand => 0x01,
            Self::InvalidCbor => 0xF1,
            Self::UnrecognizedCommand => 0xF2,
            Self::InvalidParameter => 0xF3,
            Self::GeneratorExists => 0xF4,
            Self::GeneratorNotFound => 0xF5,
            Self::MemoryFull => 0xF6,
            Self::Unknown(code) => code,
        }
    }

    /// Symbolic name used by the token firmware
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "OTP_OK",
            Self::InvalidCommand => "ERR_INVALID_CMD",
            Self::InvalidCbor => "OTP_ERR_INVALID_CBOR",
            Self::UnrecognizedCommand => "OTP_ERR_INVALID_COMMAND",
            Self::InvalidParameter => "OTP_ERR_INVALID_PARAMETER",
            Self::GeneratorExists => "OTP_ERR_GENERATOR_EXISTS",
            Self::GeneratorNotFound => "OTP_ERR_GENERATOR_NOT_FOUND",
            Self::MemoryFull => "OTP_ERR_MEMORY_FULL",
            Self::Unknown(_) => "OTP_ERR_UNKNOWN",
        }
    }

    /// Human readable message, suitable for showing to the user
    pub fn message(self) -> String {
        match self {
            Self::Ok => "Command executed successfully".to_string(),
            Self::InvalidCommand => "Command not recognized".to_string(),
            Self::InvalidCbor => "The command contains invalid CBOR encoding".to_string(),
            Self::UnrecognizedCommand => "Unrecognized OTP command".to_string(),
            Self::InvalidParameter => "Invalid parameter in command".to_string(),
            Self::GeneratorExists => "A generator with this name already exists".to_string(),
            Self::GeneratorNotFound => "Generator not found".to_string(),
            Self::MemoryFull => "Memory full, unable to create another generator".to_string(),
            Self::Unknown(code) => format!("Unknown error 0x{:02X}", code),
        }
    }

    /// Check if this is a success status
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for OtpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for OtpStatus {}

impl From<u8> for OtpStatus {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

impl From<OtpStatus> for u8 {
    fn from(status: OtpStatus) -> u8 {
        status.to_u8()
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, OtpStatus>;
