//! Host-side token transports
//!
//! This crate moves raw CTAP2 CBOR commands between the host and a token:
//! - CTAPHID framing (fragmentation, reassembly, INIT channel allocation)
//! - USB HID transport (via hidapi) - requires "usb" feature
//! - PC/SC smartcard transport speaking NFCCTAP - requires "pcsc" feature
//!
//! Both transports expose the same `send_cbor(cmd, data)` call which returns
//! the CTAP status byte followed by the CBOR response body.
//!
//! # Features
//!
//! - `usb`: Enable USB HID transport (requires libudev on Linux)
//! - `pcsc`: Enable PC/SC transport (requires pcsc-lite on Linux)

pub mod ctaphid;
pub mod error;
#[cfg(feature = "pcsc")]
pub mod smartcard;
#[cfg(feature = "usb")]
pub mod usb;

// Re-export commonly used types
pub use ctaphid::{Cmd, InitResponse, Message, Packet};
pub use error::{Error, Result};
#[cfg(feature = "pcsc")]
pub use smartcard::{PcscTransport, init_pcsc, list_readers};
#[cfg(feature = "usb")]
pub use usb::{UsbDeviceInfo, UsbTransport, enumerate_devices, init_usb};
