//! Fixed-offset packet layout.
//!
//! Every packet is a 127-byte header followed by up to 897 payload bytes,
//! for a fixed capacity of 1024 bytes. [`Block`] owns a full-capacity buffer
//! for building outbound packets; [`PacketView`] borrows a received datagram
//! after checking that the declared payload size fits in it.

use crate::id::{SessionId, SESSION_ID_LEN};
use crate::WireError;

/// Total packet capacity in bytes
pub const BLOCK_SIZE: usize = 1024;

/// Header size in bytes
pub const HEADER_SIZE: usize = 127;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD: usize = BLOCK_SIZE - HEADER_SIZE;

/// Nonce length for the transport stream cipher
pub const NONCE_LEN: usize = 24;

/// Signature length
pub const SIGNATURE_LEN: usize = 64;

const CHECKSUM_OFFSET: usize = 0;
const CHECKSUM_LEN: usize = 4;
const SESSION_ID_OFFSET: usize = 4;
const CODE_OFFSET: usize = 36;
const SIZE_OFFSET: usize = 37;
const SIZE_LEN: usize = 2;
const NONCE_OFFSET: usize = 39;
const SIGNATURE_OFFSET: usize = 63;

/// Packet codes as defined in the wire protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCode {
    /// Handshake message carrying an [`AnnounceMessage`](crate::AnnounceMessage)
    Announce = 0x00,
    /// Receiver has no session for the identifier it was sent
    NotAnnounced = 0x01,
    /// Encrypted application payload
    Payload = 0x02,
    /// Reserved session teardown code
    CloseSession = 0xFF,
}

impl TryFrom<u8> for PacketCode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PacketCode::Announce),
            0x01 => Ok(PacketCode::NotAnnounced),
            0x02 => Ok(PacketCode::Payload),
            0xFF => Ok(PacketCode::CloseSession),
            _ => Err(WireError::Code(value)),
        }
    }
}

/// Fixed-capacity packet buffer with field accessors.
#[derive(Clone, Debug)]
pub struct Block {
    buf: [u8; BLOCK_SIZE],
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Block {
    /// Create a zeroed block
    pub fn new() -> Self {
        Self {
            buf: [0u8; BLOCK_SIZE],
        }
    }

    /// Reserved checksum field
    pub fn checksum(&self) -> &[u8] {
        &self.buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_LEN]
    }

    /// Session identifier field
    pub fn session_id(&self) -> &[u8] {
        &self.buf[SESSION_ID_OFFSET..SESSION_ID_OFFSET + SESSION_ID_LEN]
    }

    /// Mutable session identifier field
    pub fn session_id_mut(&mut self) -> &mut [u8] {
        &mut self.buf[SESSION_ID_OFFSET..SESSION_ID_OFFSET + SESSION_ID_LEN]
    }

    /// Raw code byte
    pub fn code(&self) -> u8 {
        self.buf[CODE_OFFSET]
    }

    /// Set the code byte
    pub fn set_code(&mut self, code: PacketCode) {
        self.buf[CODE_OFFSET] = code as u8;
    }

    /// Declared payload size
    pub fn size(&self) -> usize {
        u16::from_be_bytes([self.buf[SIZE_OFFSET], self.buf[SIZE_OFFSET + 1]]) as usize
    }

    /// Set the declared payload size (big-endian)
    pub fn set_size(&mut self, size: usize) -> Result<(), WireError> {
        if size > MAX_PAYLOAD {
            return Err(WireError::Size(size));
        }
        self.buf[SIZE_OFFSET..SIZE_OFFSET + SIZE_LEN].copy_from_slice(&(size as u16).to_be_bytes());
        Ok(())
    }

    /// Nonce field
    pub fn nonce(&self) -> &[u8] {
        &self.buf[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN]
    }

    /// Mutable nonce field
    pub fn nonce_mut(&mut self) -> &mut [u8] {
        &mut self.buf[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN]
    }

    /// Signature field
    pub fn signature(&self) -> &[u8] {
        &self.buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN]
    }

    /// Mutable signature field
    pub fn signature_mut(&mut self) -> &mut [u8] {
        &mut self.buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN]
    }

    /// Declared payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_SIZE..HEADER_SIZE + self.size()]
    }

    /// Mutable declared payload bytes
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let size = self.size();
        &mut self.buf[HEADER_SIZE..HEADER_SIZE + size]
    }

    /// Bytes to put on the wire: header plus declared payload
    pub fn as_datagram(&self) -> &[u8] {
        &self.buf[..HEADER_SIZE + self.size()]
    }
}

/// Validated read-only view over a received datagram.
///
/// Construction checks the header is complete and the declared size fits
/// in the bytes received, so the accessors never slice out of bounds.
#[derive(Debug)]
pub struct PacketView<'a> {
    buf: &'a [u8],
    size: usize,
}

impl<'a> PacketView<'a> {
    /// Parse and bounds-check a datagram
    pub fn parse(buf: &'a [u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::Incomplete {
                need: HEADER_SIZE,
                got: buf.len(),
            });
        }

        let size = u16::from_be_bytes([buf[SIZE_OFFSET], buf[SIZE_OFFSET + 1]]) as usize;
        if size > MAX_PAYLOAD || size > buf.len() - HEADER_SIZE {
            return Err(WireError::Size(size));
        }

        Ok(Self { buf, size })
    }

    /// Reserved checksum field
    pub fn checksum(&self) -> &'a [u8] {
        &self.buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_LEN]
    }

    /// Session identifier carried by the packet
    pub fn session_id(&self) -> SessionId {
        let mut id = [0u8; SESSION_ID_LEN];
        id.copy_from_slice(&self.buf[SESSION_ID_OFFSET..SESSION_ID_OFFSET + SESSION_ID_LEN]);
        SessionId(id)
    }

    /// Raw code byte
    pub fn code_byte(&self) -> u8 {
        self.buf[CODE_OFFSET]
    }

    /// Decoded packet code
    pub fn code(&self) -> Result<PacketCode, WireError> {
        PacketCode::try_from(self.code_byte())
    }

    /// Declared payload size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Nonce field
    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&self.buf[NONCE_OFFSET..NONCE_OFFSET + NONCE_LEN]);
        nonce
    }

    /// Signature field
    pub fn signature(&self) -> [u8; SIGNATURE_LEN] {
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&self.buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE_LEN]);
        signature
    }

    /// Declared payload bytes as received
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[HEADER_SIZE..HEADER_SIZE + self.size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_code_conversion() {
        assert_eq!(PacketCode::try_from(0x00).unwrap(), PacketCode::Announce);
        assert_eq!(PacketCode::try_from(0x01).unwrap(), PacketCode::NotAnnounced);
        assert_eq!(PacketCode::try_from(0x02).unwrap(), PacketCode::Payload);
        assert_eq!(PacketCode::try_from(0xFF).unwrap(), PacketCode::CloseSession);
        assert_eq!(PacketCode::try_from(0x03), Err(WireError::Code(0x03)));
    }

    #[test]
    fn test_field_offsets() {
        let mut block = Block::new();
        block.session_id_mut().copy_from_slice(&[0xAA; 32]);
        block.set_code(PacketCode::Payload);
        block.set_size(0x0102).unwrap();
        block.nonce_mut().copy_from_slice(&[0xBB; 24]);
        block.signature_mut().copy_from_slice(&[0xCC; 64]);

        let raw = block.as_datagram();
        assert_eq!(raw.len(), HEADER_SIZE + 0x0102);
        assert_eq!(&raw[0..4], &[0, 0, 0, 0]);
        assert_eq!(&raw[4..36], &[0xAA; 32]);
        assert_eq!(raw[36], 0x02);
        assert_eq!(&raw[37..39], &[0x01, 0x02]);
        assert_eq!(&raw[39..63], &[0xBB; 24]);
        assert_eq!(&raw[63..127], &[0xCC; 64]);
    }

    #[test]
    fn test_set_size_rejects_oversized() {
        let mut block = Block::new();
        assert!(block.set_size(MAX_PAYLOAD).is_ok());
        assert_eq!(block.set_size(MAX_PAYLOAD + 1), Err(WireError::Size(MAX_PAYLOAD + 1)));
    }

    #[test]
    fn test_view_reads_back_block() {
        let mut block = Block::new();
        block.session_id_mut().copy_from_slice(&[7; 32]);
        block.set_code(PacketCode::Announce);
        block.set_size(3).unwrap();
        block.payload_mut().copy_from_slice(b"abc");

        let view = PacketView::parse(block.as_datagram()).unwrap();
        assert_eq!(view.session_id(), SessionId([7; 32]));
        assert_eq!(view.code().unwrap(), PacketCode::Announce);
        assert_eq!(view.size(), 3);
        assert_eq!(view.payload(), b"abc");
        assert_eq!(view.checksum(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_view_reads_nonce_and_signature() {
        let mut block = Block::new();
        block.set_code(PacketCode::Payload);
        block.set_size(1).unwrap();
        block.nonce_mut().copy_from_slice(&[0x5A; NONCE_LEN]);
        block.signature_mut().copy_from_slice(&[0xC3; SIGNATURE_LEN]);
        block.payload_mut()[0] = 0xEE;

        let view = PacketView::parse(block.as_datagram()).unwrap();
        assert_eq!(view.nonce(), [0x5A; NONCE_LEN]);
        assert_eq!(view.signature(), [0xC3; SIGNATURE_LEN]);
        assert_eq!(view.payload(), &[0xEE]);

        // Header-only datagram still carries both fields.
        let mut bare = vec![0x11u8; HEADER_SIZE];
        bare[37..39].copy_from_slice(&0u16.to_be_bytes());
        let view = PacketView::parse(&bare).unwrap();
        assert_eq!(view.nonce(), [0x11; NONCE_LEN]);
        assert_eq!(view.signature(), [0x11; SIGNATURE_LEN]);
    }

    #[test]
    fn test_block_debug_output() {
        let block = Block::new();
        assert!(format!("{:?}", block).starts_with("Block"));
    }

    #[test]
    fn test_view_rejects_short_datagram() {
        let raw = [0u8; HEADER_SIZE - 1];
        assert_eq!(
            PacketView::parse(&raw).unwrap_err(),
            WireError::Incomplete {
                need: HEADER_SIZE,
                got: HEADER_SIZE - 1
            }
        );
    }

    #[test]
    fn test_view_rejects_size_past_end() {
        let mut raw = vec![0u8; HEADER_SIZE + 10];
        raw[37..39].copy_from_slice(&11u16.to_be_bytes());
        assert_eq!(PacketView::parse(&raw).unwrap_err(), WireError::Size(11));

        raw[37..39].copy_from_slice(&10u16.to_be_bytes());
        assert_eq!(PacketView::parse(&raw).unwrap().payload().len(), 10);
    }

    #[test]
    fn test_view_rejects_size_past_capacity() {
        let mut raw = vec![0u8; BLOCK_SIZE + 100];
        raw[37..39].copy_from_slice(&((MAX_PAYLOAD + 1) as u16).to_be_bytes());
        assert_eq!(PacketView::parse(&raw).unwrap_err(), WireError::Size(MAX_PAYLOAD + 1));
    }

    #[test]
    fn test_view_keeps_unknown_code_byte() {
        let mut raw = vec![0u8; HEADER_SIZE];
        raw[36] = 0x42;
        let view = PacketView::parse(&raw).unwrap();
        assert_eq!(view.code_byte(), 0x42);
        assert!(view.code().is_err());
    }
}
