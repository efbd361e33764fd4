//! OTP extension protocol primitives
//!
//! This crate holds the pieces of the OTP vendor extension that do not depend
//! on a transport:
//! - CBOR map building and parsing with integer keys
//! - OTP command ids and payload keys
//! - The in-band status code table

pub mod cbor;
pub mod command;
pub mod status;

pub use cbor::{MapBuilder, Value, WireMap};
pub use command::{OtpCommand, keys};
pub use status::{OtpStatus, Result};
