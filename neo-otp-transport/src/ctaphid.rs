//! CTAPHID framing (host side)
//!
//! Splits outgoing messages into 64-byte HID reports and reassembles incoming
//! ones.
//!
//! Packet Format:
//! - Initialization packet: CID(4) + CMD(1) + BCNT(2) + DATA(57)
//! - Continuation packet: CID(4) + SEQ(1) + DATA(59)

use crate::error::{Error, Result};

/// HID packet size (fixed at 64 bytes for USB HID)
pub const PACKET_SIZE: usize = 64;

/// Maximum CTAPHID message size (7609 bytes)
pub const MAX_MESSAGE_SIZE: usize = 7609;

/// Broadcast channel ID (used for INIT command)
pub const BROADCAST_CID: u32 = 0xFFFFFFFF;

const INIT_PACKET_DATA_SIZE: usize = 57;
const CONT_PACKET_DATA_SIZE: usize = 59;

/// CTAPHID commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Transaction that echoes the data back
    Ping = 0x01,

    /// Encapsulated CTAP1/U2F message
    Msg = 0x03,

    /// Allocate a new CID or synchronize channel
    Init = 0x06,

    /// Encapsulated CTAP CBOR encoded message
    Cbor = 0x10,

    /// Cancel any outstanding requests on the given CID
    Cancel = 0x11,

    /// The request is still being processed
    Keepalive = 0x3B,

    /// Error response message
    Error = 0x3F,
}

impl Cmd {
    /// Convert from u8 value, ignoring the TYPE bit
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & 0x7F {
            0x01 => Some(Cmd::Ping),
            0x03 => Some(Cmd::Msg),
            0x06 => Some(Cmd::Init),
            0x10 => Some(Cmd::Cbor),
            0x11 => Some(Cmd::Cancel),
            0x3B => Some(Cmd::Keepalive),
            0x3F => Some(Cmd::Error),
            _ => None,
        }
    }

    /// Convert to u8 value with TYPE bit set (0x80 for initialization packet)
    pub fn to_u8_init(self) -> u8 {
        (self as u8) | 0x80
    }
}

/// Capability flags reported in the INIT response
pub mod capability {
    pub const WINK: u8 = 0x01;
    pub const CBOR: u8 = 0x04;
    pub const NMSG: u8 = 0x08;
}

/// Describe a CTAPHID ERROR payload byte
pub fn describe_error_code(code: u8) -> &'static str {
    match code {
        0x01 => "invalid command",
        0x02 => "invalid parameter",
        0x03 => "invalid message length",
        0x04 => "invalid message sequencing",
        0x05 => "message timed out",
        0x06 => "channel busy",
        0x0A => "command requires channel lock",
        0x0B => "invalid channel",
        _ => "unspecified error",
    }
}

/// A single 64-byte HID packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: [u8; PACKET_SIZE],
}

impl Packet {
    /// Create a new packet from raw data
    pub fn from_bytes(data: [u8; PACKET_SIZE]) -> Self {
        Self { data }
    }

    /// Create a new packet from a slice (must be exactly 64 bytes)
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let data: [u8; PACKET_SIZE] = data.try_into().map_err(|_| Error::InvalidPacket)?;
        Ok(Self { data })
    }

    /// Get raw packet data
    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.data
    }

    /// Get channel ID
    pub fn cid(&self) -> u32 {
        u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// Check if this is an initialization packet
    pub fn is_init(&self) -> bool {
        (self.data[4] & 0x80) != 0
    }

    /// Get command (only valid for initialization packets)
    pub fn cmd(&self) -> Option<Cmd> {
        if !self.is_init() {
            return None;
        }
        Cmd::from_u8(self.data[4])
    }

    /// Get payload length (only valid for initialization packets)
    pub fn payload_len(&self) -> Option<u16> {
        if !self.is_init() {
            return None;
        }
        Some(u16::from_be_bytes([self.data[5], self.data[6]]))
    }

    /// Get sequence number (only valid for continuation packets)
    pub fn seq(&self) -> Option<u8> {
        if self.is_init() {
            return None;
        }
        Some(self.data[4])
    }

    /// Get payload data
    pub fn payload(&self) -> &[u8] {
        if self.is_init() {
            &self.data[7..]
        } else {
            &self.data[5..]
        }
    }
}

/// A complete CTAPHID message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel ID
    pub cid: u32,

    /// Command
    pub cmd: Cmd,

    /// Payload data
    pub data: Vec<u8>,
}

impl Message {
    /// Create a new message
    pub fn new(cid: u32, cmd: Cmd, data: Vec<u8>) -> Self {
        Self { cid, cmd, data }
    }

    /// Fragment this message into HID packets
    pub fn to_packets(&self) -> Result<Vec<Packet>> {
        if self.data.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge);
        }

        let cid = self.cid.to_be_bytes();
        let mut packets = Vec::with_capacity(1 + self.data.len() / CONT_PACKET_DATA_SIZE);

        let mut init = [0u8; PACKET_SIZE];
        init[0..4].copy_from_slice(&cid);
        init[4] = self.cmd.to_u8_init();
        init[5..7].copy_from_slice(&(self.data.len() as u16).to_be_bytes());
        let first = self.data.len().min(INIT_PACKET_DATA_SIZE);
        init[7..7 + first].copy_from_slice(&self.data[..first]);
        packets.push(Packet::from_bytes(init));

        for (seq, chunk) in self.data[first..].chunks(CONT_PACKET_DATA_SIZE).enumerate() {
            if seq > 127 {
                return Err(Error::MessageTooLarge);
            }
            let mut cont = [0u8; PACKET_SIZE];
            cont[0..4].copy_from_slice(&cid);
            cont[4] = seq as u8;
            cont[5..5 + chunk.len()].copy_from_slice(chunk);
            packets.push(Packet::from_bytes(cont));
        }

        Ok(packets)
    }
}

/// Incremental reassembly of a response on one channel
///
/// Feed packets in arrival order; packets for other channels are ignored.
#[derive(Debug)]
pub struct Assembler {
    cid: u32,
    cmd: Option<Cmd>,
    expected: usize,
    next_seq: u8,
    data: Vec<u8>,
}

impl Assembler {
    /// Start assembling a message on `cid`
    pub fn new(cid: u32) -> Self {
        Self {
            cid,
            cmd: None,
            expected: 0,
            next_seq: 0,
            data: Vec::new(),
        }
    }

    /// Add a packet; returns the message once all of its bytes arrived
    pub fn push(&mut self, packet: &Packet) -> Result<Option<Message>> {
        if packet.cid() != self.cid {
            return Ok(None);
        }

        if packet.is_init() {
            let cmd = packet.cmd().ok_or(Error::InvalidCommand)?;
            let expected = packet.payload_len().ok_or(Error::InvalidPacket)? as usize;
            if expected > MAX_MESSAGE_SIZE {
                return Err(Error::MessageTooLarge);
            }
            self.cmd = Some(cmd);
            self.expected = expected;
            self.next_seq = 0;
            self.data.clear();
            let take = expected.min(INIT_PACKET_DATA_SIZE);
            self.data.extend_from_slice(&packet.payload()[..take]);
        } else {
            if self.cmd.is_none() {
                return Err(Error::InvalidSequence);
            }
            let seq = packet.seq().ok_or(Error::InvalidSequence)?;
            if seq != self.next_seq {
                return Err(Error::InvalidSequence);
            }
            self.next_seq = self.next_seq.wrapping_add(1);
            let take = (self.expected - self.data.len()).min(CONT_PACKET_DATA_SIZE);
            self.data.extend_from_slice(&packet.payload()[..take]);
        }

        match self.cmd {
            Some(cmd) if self.data.len() >= self.expected => {
                let data = std::mem::take(&mut self.data);
                self.cmd = None;
                Ok(Some(Message::new(self.cid, cmd, data)))
            }
            _ => Ok(None),
        }
    }
}

/// Parsed CTAPHID INIT response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitResponse {
    /// Channel allocated by the device
    pub cid: u32,
    /// CTAPHID protocol version
    pub protocol_version: u8,
    /// Device version (major, minor, build)
    pub device_version: (u8, u8, u8),
    /// Capability flags, see [`capability`]
    pub capabilities: u8,
}

impl InitResponse {
    /// Parse an INIT response payload and check it echoes `nonce`
    pub fn parse(data: &[u8], nonce: &[u8; 8]) -> Result<Self> {
        if data.len() < 17 {
            return Err(Error::InvalidPacket);
        }
        if &data[0..8] != nonce {
            return Err(Error::Other("INIT nonce mismatch".to_string()));
        }
        Ok(Self {
            cid: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            protocol_version: data[12],
            device_version: (data[13], data[14], data[15]),
            capabilities: data[16],
        })
    }

    /// Whether the device accepts CTAPHID_CBOR
    pub fn supports_cbor(&self) -> bool {
        self.capabilities & capability::CBOR != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(packets: &[Packet], cid: u32) -> Message {
        let mut assembler = Assembler::new(cid);
        for packet in packets {
            if let Some(message) = assembler.push(packet).unwrap() {
                return message;
            }
        }
        panic!("message never completed");
    }

    #[test]
    fn test_cmd_conversion() {
        assert_eq!(Cmd::from_u8(0x90), Some(Cmd::Cbor));
        assert_eq!(Cmd::from_u8(0xBB), Some(Cmd::Keepalive));
        assert_eq!(Cmd::from_u8(0x7E), None);
        assert_eq!(Cmd::Init.to_u8_init(), 0x86);
    }

    #[test]
    fn test_single_packet_message() {
        let message = Message::new(0x01020304, Cmd::Cbor, vec![0xB4, 0xA1, 0x01, 0x00]);
        let packets = message.to_packets().unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].cid(), 0x01020304);
        assert_eq!(packets[0].cmd(), Some(Cmd::Cbor));
        assert_eq!(packets[0].payload_len(), Some(4));
        assert_eq!(reassemble(&packets, 0x01020304), message);
    }

    #[test]
    fn test_multi_packet_message() {
        // 57 bytes in the init packet, then 59 + 59 + 25
        let message = Message::new(0xCAFEBABE, Cmd::Cbor, (0..200).map(|i| i as u8).collect());
        let packets = message.to_packets().unwrap();

        assert_eq!(packets.len(), 4);
        assert_eq!(packets[1].seq(), Some(0));
        assert_eq!(packets[3].seq(), Some(2));
        assert_eq!(reassemble(&packets, 0xCAFEBABE), message);
    }

    #[test]
    fn test_other_channel_ignored() {
        let ours = Message::new(7, Cmd::Cbor, vec![0x00]).to_packets().unwrap();
        let theirs = Message::new(8, Cmd::Cbor, vec![0xF5]).to_packets().unwrap();

        let mut assembler = Assembler::new(7);
        assert!(assembler.push(&theirs[0]).unwrap().is_none());
        let message = assembler.push(&ours[0]).unwrap().unwrap();
        assert_eq!(message.data, vec![0x00]);
    }

    #[test]
    fn test_out_of_order_continuation() {
        let message = Message::new(5, Cmd::Cbor, vec![0x42; 150]);
        let packets = message.to_packets().unwrap();

        let mut assembler = Assembler::new(5);
        assembler.push(&packets[0]).unwrap();
        assert_eq!(assembler.push(&packets[2]).unwrap_err(), Error::InvalidSequence);
    }

    #[test]
    fn test_message_too_large() {
        let message = Message::new(1, Cmd::Cbor, vec![0; MAX_MESSAGE_SIZE + 1]);
        assert_eq!(message.to_packets().unwrap_err(), Error::MessageTooLarge);
    }

    #[test]
    fn test_init_response_parse() {
        let nonce = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut data = nonce.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x2A, 2, 1, 4, 0, capability::CBOR]);

        let init = InitResponse::parse(&data, &nonce).unwrap();
        assert_eq!(init.cid, 0x2A);
        assert_eq!(init.device_version, (1, 4, 0));
        assert!(init.supports_cbor());

        assert!(InitResponse::parse(&data, &[0; 8]).is_err());
    }
}
