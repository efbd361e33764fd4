//! USB HID Transport
//!
//! Speaks CTAPHID to a token over USB HID using the hidapi library:
//! channel allocation with INIT, then CBOR messages on the allocated channel.

use crate::ctaphid::{Assembler, BROADCAST_CID, Cmd, InitResponse, Message, PACKET_SIZE, Packet};
use crate::error::{Error, Result};

use std::ffi::CString;
use std::time::{Duration, Instant};

use hidapi::{HidApi, HidDevice};
use smallvec::SmallVec;

/// FIDO HID usage page
const FIDO_USAGE_PAGE: u16 = 0xF1D0;

/// FIDO HID usage
const FIDO_USAGE: u16 = 0x01;

/// Per-read poll interval while waiting for a response packet
const READ_POLL_MS: i32 = 100;

/// INIT exchanges tried before giving up on a nonce echo
const INIT_ATTEMPTS: u32 = 3;

/// Default time to wait for a complete response
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// USB HID device information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vendor_id: u16,

    /// Product ID
    pub product_id: u16,

    /// Device path (platform-specific)
    pub path: String,

    /// Manufacturer string
    pub manufacturer: Option<String>,

    /// Product string
    pub product: Option<String>,

    /// Serial number
    pub serial_number: Option<String>,
}

impl std::fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} {} {} ({})",
            self.vendor_id,
            self.product_id,
            self.manufacturer.as_deref().unwrap_or("Unknown"),
            self.product.as_deref().unwrap_or("Unknown"),
            self.path
        )
    }
}

/// CTAPHID client over one USB HID device
///
/// The device is opened by [`UsbTransport::open`]; the CTAPHID channel is
/// allocated lazily on the first [`UsbTransport::send_cbor`] or explicitly
/// with [`UsbTransport::init`].
pub struct UsbTransport {
    device: HidDevice,
    info: UsbDeviceInfo,
    channel: Option<InitResponse>,
    response_timeout: Duration,
}

impl UsbTransport {
    /// Open a USB HID device by its enumerated info
    pub fn open(api: &HidApi, info: &UsbDeviceInfo) -> Result<Self> {
        let c_path = CString::new(info.path.as_str())
            .map_err(|e| Error::IoError(format!("Invalid device path: {}", e)))?;

        let device = api
            .open_path(&c_path)
            .map_err(|e| Error::IoError(format!("Failed to open device: {}", e)))?;

        Ok(Self {
            device,
            info: info.clone(),
            channel: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    /// Set how long to wait for a complete response
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    /// Get device information
    pub fn device_info(&self) -> &UsbDeviceInfo {
        &self.info
    }

    /// INIT response of the allocated channel, if any
    pub fn channel(&self) -> Option<&InitResponse> {
        self.channel.as_ref()
    }

    /// Write a HID packet to the device
    fn write_packet(&self, packet: &Packet) -> Result<()> {
        // hidapi expects the report id in front; FIDO devices use report 0
        let mut report = [0u8; PACKET_SIZE + 1];
        report[1..].copy_from_slice(packet.as_bytes());

        let written = self
            .device
            .write(&report)
            .map_err(|e| Error::IoError(format!("Failed to write packet: {}", e)))?;

        if written < PACKET_SIZE {
            return Err(Error::IoError(format!(
                "Incomplete write: {} of {} bytes",
                written,
                report.len()
            )));
        }

        Ok(())
    }

    /// Read a HID packet with timeout; `None` if nothing arrived
    fn read_packet_timeout(&self, timeout_ms: i32) -> Result<Option<Packet>> {
        let mut buf = [0u8; PACKET_SIZE];
        let read = self
            .device
            .read_timeout(&mut buf, timeout_ms)
            .map_err(|e| Error::IoError(format!("Failed to read packet: {}", e)))?;

        if read == 0 {
            return Ok(None);
        }

        if read != PACKET_SIZE {
            return Err(Error::IoError(format!(
                "Incomplete read: {} bytes (expected {})",
                read, PACKET_SIZE
            )));
        }

        Ok(Some(Packet::from_bytes(buf)))
    }

    /// Send one message and wait for the matching response
    ///
    /// KEEPALIVE packets extend the wait; an ERROR message fails the call.
    fn transact(&self, message: &Message) -> Result<Message> {
        for packet in message.to_packets()? {
            self.write_packet(&packet)?;
        }

        let mut assembler = Assembler::new(message.cid);
        let mut deadline = Instant::now() + self.response_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }

            let Some(packet) = self.read_packet_timeout(READ_POLL_MS)? else {
                continue;
            };

            let Some(response) = assembler.push(&packet)? else {
                continue;
            };

            match response.cmd {
                Cmd::Keepalive => {
                    deadline = Instant::now() + self.response_timeout;
                }
                Cmd::Error => {
                    return Err(Error::DeviceError(response.data.first().copied().unwrap_or(0x7F)));
                }
                _ => return Ok(response),
            }
        }
    }

    /// Allocate a CTAPHID channel
    ///
    /// Sends INIT with a random nonce on the broadcast channel and keeps the
    /// allocated channel for later commands.
    pub fn init(&mut self) -> Result<&InitResponse> {
        let nonce: [u8; 8] = rand::random();
        let request = Message::new(BROADCAST_CID, Cmd::Init, nonce.to_vec());

        // Responses to other hosts' INITs share the broadcast channel
        let mut attempts = 0;
        let init = loop {
            attempts += 1;
            let response = self.transact(&request)?;
            if response.cmd != Cmd::Init {
                return Err(Error::InvalidCommand);
            }
            match InitResponse::parse(&response.data, &nonce) {
                Ok(init) => break init,
                Err(Error::Other(_)) if attempts < INIT_ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        };

        Ok(&*self.channel.insert(init))
    }

    /// Send a CTAP2 CBOR command and return the raw response
    ///
    /// The response starts with the CTAP status byte followed by the CBOR body.
    pub fn send_cbor(&mut self, cmd: u8, data: &[u8]) -> Result<Vec<u8>> {
        let cid = match self.channel.as_ref().map(|init| init.cid) {
            Some(cid) => cid,
            None => self.init()?.cid,
        };

        let mut payload: SmallVec<[u8; 256]> = SmallVec::new();
        payload.push(cmd);
        payload.extend_from_slice(data);

        let response = self.transact(&Message::new(cid, Cmd::Cbor, payload.to_vec()))?;
        if response.cmd != Cmd::Cbor {
            return Err(Error::InvalidCommand);
        }

        Ok(response.data)
    }
}

/// Enumerate FIDO USB HID devices
///
/// Returns every connected device exposing the FIDO usage page.
pub fn enumerate_devices(api: &HidApi) -> Result<Vec<UsbDeviceInfo>> {
    let mut devices: Vec<UsbDeviceInfo> = Vec::new();

    for device_info in api.device_list() {
        if device_info.usage_page() != FIDO_USAGE_PAGE || device_info.usage() != FIDO_USAGE {
            continue;
        }

        let path = device_info.path().to_string_lossy().to_string();
        if devices.iter().any(|d| d.path == path) {
            continue;
        }

        devices.push(UsbDeviceInfo {
            vendor_id: device_info.vendor_id(),
            product_id: device_info.product_id(),
            path,
            manufacturer: device_info.manufacturer_string().map(|s| s.to_string()),
            product: device_info.product_string().map(|s| s.to_string()),
            serial_number: device_info.serial_number().map(|s| s.to_string()),
        });
    }

    Ok(devices)
}

/// Initialize the HID API
///
/// Must be called before using any USB transport functions.
pub fn init_usb() -> Result<HidApi> {
    HidApi::new().map_err(|e| Error::IoError(format!("Failed to initialize HID API: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_display() {
        let info = UsbDeviceInfo {
            vendor_id: 0x1e0d,
            product_id: 0xf1d0,
            path: "/dev/hidraw3".to_string(),
            manufacturer: Some("NEOWAVE".to_string()),
            product: None,
            serial_number: None,
        };
        assert_eq!(info.to_string(), "1e0d:f1d0 NEOWAVE Unknown (/dev/hidraw3)");
    }

    #[test]
    #[ignore] // Requires actual USB device
    fn test_enumerate_devices() {
        let api = init_usb().unwrap();
        let devices = enumerate_devices(&api).unwrap();
        println!("Found {} FIDO devices", devices.len());
        for dev in devices {
            println!("  {}", dev);
        }
    }

    #[test]
    #[ignore] // Requires actual USB device
    fn test_init_channel() {
        let api = init_usb().unwrap();
        let devices = enumerate_devices(&api).unwrap();
        let Some(first) = devices.first() else {
            println!("No FIDO devices found, skipping test");
            return;
        };

        let mut transport = UsbTransport::open(&api, first).unwrap();
        let init = transport.init().unwrap();
        assert_ne!(init.cid, BROADCAST_CID);
    }
}
