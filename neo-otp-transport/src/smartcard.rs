//! PC/SC (smartcard) Transport
//!
//! Speaks NFCCTAP to a token through a PC/SC reader: SELECT the FIDO applet,
//! then wrap each CBOR command in an NFCCTAP_MSG APDU.

use crate::error::{Error, Result};

use std::ffi::{CStr, CString};

use pcsc::{Card, Context, MAX_BUFFER_SIZE_EXTENDED, Protocols, Scope, ShareMode};

/// FIDO applet AID
pub const FIDO_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01];

const SW_OK: u16 = 0x9000;
const SW_KEEPALIVE: u16 = 0x9100;
const SW1_MORE_DATA: u8 = 0x61;

const CLA_PROPRIETARY: u8 = 0x80;
const INS_NFCCTAP_MSG: u8 = 0x10;
const INS_NFCCTAP_GETRESPONSE: u8 = 0x11;
const INS_SELECT: u8 = 0xA4;
const INS_GET_RESPONSE: u8 = 0xC0;

/// Upper bound on GET RESPONSE / keepalive round trips for one command
const MAX_CONTINUATIONS: usize = 256;

/// Build a command APDU, switching to extended length when needed
fn build_apdu(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![cla, ins, p1, p2];

    if data.is_empty() {
        apdu.push(0x00);
    } else if data.len() <= 255 {
        apdu.push(data.len() as u8);
        apdu.extend_from_slice(data);
        apdu.push(0x00);
    } else {
        apdu.push(0x00);
        apdu.extend_from_slice(&(data.len() as u16).to_be_bytes());
        apdu.extend_from_slice(data);
        apdu.extend_from_slice(&[0x00, 0x00]);
    }

    apdu
}

/// Split a response APDU into its body and status word
fn split_status(response: &[u8]) -> Result<(&[u8], u16)> {
    if response.len() < 2 {
        return Err(Error::InvalidPacket);
    }
    let (body, sw) = response.split_at(response.len() - 2);
    Ok((body, u16::from_be_bytes([sw[0], sw[1]])))
}

/// NFCCTAP client over one PC/SC card connection
pub struct PcscTransport {
    card: Card,
    reader: String,
}

impl PcscTransport {
    /// Connect to the card in `reader` and select the FIDO applet
    pub fn connect(ctx: &Context, reader: &CStr) -> Result<Self> {
        let card = ctx.connect(reader, ShareMode::Shared, Protocols::ANY)?;
        let transport = Self {
            card,
            reader: reader.to_string_lossy().to_string(),
        };

        let select = build_apdu(0x00, INS_SELECT, 0x04, 0x00, &FIDO_AID);
        let mut buf = [0u8; 258];
        let response = transport.card.transmit(&select, &mut buf)?;
        let (_, sw) = split_status(response)?;
        if sw != SW_OK {
            return Err(Error::StatusWord(sw));
        }

        Ok(transport)
    }

    /// Reader this card sits in
    pub fn reader(&self) -> &str {
        &self.reader
    }

    fn transmit(&self, apdu: &[u8]) -> Result<(Vec<u8>, u16)> {
        let mut buf = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
        let response = self.card.transmit(apdu, &mut buf)?;
        let (body, sw) = split_status(response)?;
        Ok((body.to_vec(), sw))
    }

    /// Send a CTAP2 CBOR command and return the raw response
    ///
    /// The response starts with the CTAP status byte followed by the CBOR body.
    /// `61xx` is drained with GET RESPONSE and `9100` is polled with
    /// NFCCTAP_GETRESPONSE until the token answers `9000`.
    pub fn send_cbor(&mut self, cmd: u8, data: &[u8]) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(cmd);
        payload.extend_from_slice(data);

        let (mut body, mut sw) =
            self.transmit(&build_apdu(CLA_PROPRIETARY, INS_NFCCTAP_MSG, 0x00, 0x00, &payload))?;
        let mut response = Vec::new();

        for _ in 0..MAX_CONTINUATIONS {
            if sw == SW_KEEPALIVE {
                log::trace!("{}: keepalive", self.reader);
                (body, sw) = self.transmit(&build_apdu(
                    CLA_PROPRIETARY,
                    INS_NFCCTAP_GETRESPONSE,
                    0x00,
                    0x00,
                    &[],
                ))?;
                continue;
            }

            response.extend_from_slice(&body);

            if (sw >> 8) as u8 == SW1_MORE_DATA {
                let le = (sw & 0xFF) as u8;
                (body, sw) = self.transmit(&[0x00, INS_GET_RESPONSE, 0x00, 0x00, le])?;
                continue;
            }

            if sw != SW_OK {
                return Err(Error::StatusWord(sw));
            }

            return Ok(response);
        }

        Err(Error::Timeout)
    }
}

/// Establish a user-scope PC/SC context
pub fn init_pcsc() -> Result<Context> {
    Ok(Context::establish(Scope::User)?)
}

/// List reader names known to the PC/SC service
///
/// No service or no readers yields an empty list.
pub fn list_readers(ctx: &Context) -> Result<Vec<CString>> {
    let mut buffer = vec![0u8; 2048];
    match ctx.list_readers(&mut buffer) {
        Ok(readers) => Ok(readers.map(CStr::to_owned).collect()),
        Err(pcsc::Error::NoReadersAvailable) | Err(pcsc::Error::NoService) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
