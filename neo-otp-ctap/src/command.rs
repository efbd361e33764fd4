//! OTP command ids and wire keys
//!
//! The OTP extension rides the CTAP2 CBOR channel with command bytes taken
//! from the vendor range. Each command carries a CBOR map keyed by the small
//! integers in [`keys`].

/// OTP vendor command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OtpCommand {
    /// Create (0xB1) - store a new generator
    Create = 0xB1,
    /// Generate (0xB2) - compute a code
    Generate = 0xB2,
    /// Delete (0xB3) - remove a generator
    Delete = 0xB3,
    /// Enumerate (0xB4) - list generators, paginated
    Enumerate = 0xB4,
}

impl OtpCommand {
    /// Get the command code as a byte value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create an OtpCommand from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xB1 => Some(Self::Create),
            0xB2 => Some(Self::Generate),
            0xB3 => Some(Self::Delete),
            0xB4 => Some(Self::Enumerate),
            _ => None,
        }
    }
}

impl From<OtpCommand> for u8 {
    fn from(cmd: OtpCommand) -> Self {
        cmd.as_u8()
    }
}

impl std::fmt::Display for OtpCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "Create(0xB1)"),
            Self::Generate => write!(f, "Generate(0xB2)"),
            Self::Delete => write!(f, "Delete(0xB3)"),
            Self::Enumerate => write!(f, "Enumerate(0xB4)"),
        }
    }
}

/// Map keys used in OTP payloads
pub mod keys {
    /// Generator record / create request keys
    pub mod generator {
        pub const LABEL: i32 = 1;
        pub const TYPE: i32 = 2;
        pub const KEY: i32 = 3;
        pub const DIGITS: i32 = 4;
        pub const COUNTER: i32 = 5;
        pub const PERIOD: i32 = 6;
    }

    /// COSE-style symmetric key material nested under `generator::KEY`
    pub mod key_material {
        pub const KTY: i32 = 1;
        pub const ALG: i32 = 3;
        pub const SECRET: i32 = -1;

        /// kty value for a symmetric key
        pub const KTY_SYMMETRIC: u64 = 4;
    }

    /// Generate request / response keys
    pub mod generate {
        pub const LABEL: i32 = 1;
        pub const TIME_COUNTER: i32 = 2;

        pub const RESP_CODE: i32 = 1;
    }

    /// Enumerate request / response keys
    pub mod enumerate {
        pub const INDEX: i32 = 1;
        pub const COUNT: i32 = 2;

        pub const RESP_TOTAL: i32 = 1;
        pub const RESP_RECORDS: i32 = 2;
    }
}
