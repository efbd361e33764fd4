//! Transport seams
//!
//! The session layer only sees three traits:
//! - [`Enumerator`] lists endpoints of one transport family
//! - [`Endpoint`] is one discovered device that can be opened
//! - [`CtapChannel`] is an opened command channel
//!
//! USB HID and PC/SC implementations are provided behind the `usb` and `pcsc`
//! features; tests plug in their own.

use crate::config::TransportKind;

use neo_otp_transport::Result as TransportResult;

/// An opened command channel to a token
pub trait CtapChannel: Send {
    /// Send a CBOR command; returns the status byte followed by the CBOR body
    fn send_cbor(&mut self, cmd: u8, data: &[u8]) -> TransportResult<Vec<u8>>;
}

/// A discovered device that has not been opened yet
pub trait Endpoint: Send {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Open the command channel
    fn open(self: Box<Self>) -> TransportResult<Box<dyn CtapChannel>>;
}

/// Lists the endpoints of one transport family
pub trait Enumerator: Send {
    /// Family this enumerator covers
    fn kind(&self) -> TransportKind;

    /// Currently connected endpoints
    fn enumerate(&self) -> TransportResult<Vec<Box<dyn Endpoint>>>;
}

/// Enumerators for the configured families, in priority order
///
/// Families whose feature is disabled are skipped.
pub fn default_enumerators(kinds: &[TransportKind]) -> Vec<Box<dyn Enumerator>> {
    let mut enumerators: Vec<Box<dyn Enumerator>> = Vec::new();

    for kind in kinds {
        match kind {
            #[cfg(feature = "usb")]
            TransportKind::Hid => enumerators.push(Box::new(hid::HidEnumerator)),
            #[cfg(feature = "pcsc")]
            TransportKind::Pcsc => enumerators.push(Box::new(pcsc::PcscEnumerator)),
            #[allow(unreachable_patterns)]
            other => log::warn!("{} transport not compiled in, skipping", other),
        }
    }

    enumerators
}

#[cfg(feature = "usb")]
pub mod hid {
    //! USB HID endpoints

    use super::{CtapChannel, Endpoint, Enumerator};
    use crate::config::TransportKind;

    use neo_otp_transport::{Error as TransportError, Result as TransportResult};
    use neo_otp_transport::{InitResponse, UsbDeviceInfo, UsbTransport, enumerate_devices, init_usb};

    /// Enumerates FIDO HID interfaces
    #[derive(Debug, Default, Clone, Copy)]
    pub struct HidEnumerator;

    impl Enumerator for HidEnumerator {
        fn kind(&self) -> TransportKind {
            TransportKind::Hid
        }

        fn enumerate(&self) -> TransportResult<Vec<Box<dyn Endpoint>>> {
            let api = init_usb()?;
            let devices = enumerate_devices(&api)?;
            Ok(devices
                .into_iter()
                .map(|info| Box::new(HidEndpoint { info }) as Box<dyn Endpoint>)
                .collect())
        }
    }

    /// One FIDO HID interface
    #[derive(Debug, Clone)]
    pub struct HidEndpoint {
        info: UsbDeviceInfo,
    }

    impl Endpoint for HidEndpoint {
        fn describe(&self) -> String {
            format!("HID {}", self.info)
        }

        fn open(self: Box<Self>) -> TransportResult<Box<dyn CtapChannel>> {
            let api = init_usb()?;
            let mut transport = UsbTransport::open(&api, &self.info)?;
            let init = transport.init()?;
            log::debug!(
                "{}: channel {:08x}, capabilities {:02x}",
                self.info,
                init.cid,
                init.capabilities
            );
            require_cbor(init)?;
            Ok(Box::new(transport))
        }
    }

    /// OTP commands ride on CTAPHID_CBOR
    pub(super) fn require_cbor(init: &InitResponse) -> TransportResult<()> {
        if init.supports_cbor() {
            Ok(())
        } else {
            Err(TransportError::Other(format!(
                "no CBOR capability (flags {:02x})",
                init.capabilities
            )))
        }
    }

    impl CtapChannel for UsbTransport {
        fn send_cbor(&mut self, cmd: u8, data: &[u8]) -> TransportResult<Vec<u8>> {
            UsbTransport::send_cbor(self, cmd, data)
        }
    }
}

#[cfg(feature = "pcsc")]
pub mod pcsc {
    //! PC/SC endpoints

    use super::{CtapChannel, Endpoint, Enumerator};
    use crate::config::TransportKind;

    use std::ffi::CString;

    use neo_otp_transport::Result as TransportResult;
    use neo_otp_transport::{PcscTransport, init_pcsc, list_readers};

    /// Enumerates PC/SC readers
    #[derive(Debug, Default, Clone, Copy)]
    pub struct PcscEnumerator;

    impl Enumerator for PcscEnumerator {
        fn kind(&self) -> TransportKind {
            TransportKind::Pcsc
        }

        fn enumerate(&self) -> TransportResult<Vec<Box<dyn Endpoint>>> {
            let ctx = init_pcsc()?;
            Ok(list_readers(&ctx)?
                .into_iter()
                .map(|reader| Box::new(PcscEndpoint { reader }) as Box<dyn Endpoint>)
                .collect())
        }
    }

    /// One PC/SC reader
    #[derive(Debug, Clone)]
    pub struct PcscEndpoint {
        reader: CString,
    }

    impl Endpoint for PcscEndpoint {
        fn describe(&self) -> String {
            format!("PCSC {}", self.reader.to_string_lossy())
        }

        fn open(self: Box<Self>) -> TransportResult<Box<dyn CtapChannel>> {
            let ctx = init_pcsc()?;
            Ok(Box::new(PcscTransport::connect(&ctx, &self.reader)?))
        }
    }

    impl CtapChannel for PcscTransport {
        fn send_cbor(&mut self, cmd: u8, data: &[u8]) -> TransportResult<Vec<u8>> {
            PcscTransport::send_cbor(self, cmd, data)
        }
    }
}
