//! Packet building and opening.
//!
//! Outbound packets are assembled with [`PacketBuilder`], which applies the
//! encode recipe in a fixed order: header fields, payload, optional
//! encryption under a session key with a fresh nonce, then a signature over
//! the payload bytes as they will be transmitted. Inbound packets are checked
//! with [`verify_packet`] before [`open_payload`] decrypts them.

use crate::crypto::{self, Identity, PublicKey, SharedKey};
use crate::header::{Block, PacketCode, PacketView, MAX_PAYLOAD};
use crate::id::SessionId;
use crate::message::AnnounceMessage;
use crate::WireError;

/// Builder for outbound packets
#[derive(Debug)]
pub struct PacketBuilder<'a> {
    code: PacketCode,
    session: Option<(SessionId, &'a SharedKey)>,
    payload: &'a [u8],
}

impl<'a> PacketBuilder<'a> {
    /// Start a packet with the given code, no session and an empty payload
    pub fn new(code: PacketCode) -> Self {
        Self {
            code,
            session: None,
            payload: &[],
        }
    }

    /// Bind the packet to a session; the payload will be encrypted
    pub fn session(mut self, id: SessionId, key: &'a SharedKey) -> Self {
        self.session = Some((id, key));
        self
    }

    /// Set payload
    pub fn payload(mut self, payload: &'a [u8]) -> Self {
        self.payload = payload;
        self
    }

    /// Build and sign the packet
    pub fn build(self, identity: &Identity) -> Result<Block, WireError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(WireError::Size(self.payload.len()));
        }

        let mut block = Block::new();
        if let Some((id, _)) = self.session {
            block.session_id_mut().copy_from_slice(id.as_bytes());
        }
        block.set_code(self.code);
        block.set_size(self.payload.len())?;
        block.payload_mut().copy_from_slice(self.payload);

        if let Some((_, key)) = self.session {
            let nonce = crypto::random_nonce();
            block.nonce_mut().copy_from_slice(&nonce);
            crypto::apply_keystream(key, &nonce, block.payload_mut());
        }

        let signature = identity.sign(block.payload());
        block.signature_mut().copy_from_slice(&signature);
        Ok(block)
    }
}

/// Build a signed, unencrypted Announce packet
pub fn build_announce(msg: &AnnounceMessage, identity: &Identity) -> Result<Block, WireError> {
    let payload = msg.encode();
    PacketBuilder::new(PacketCode::Announce)
        .payload(&payload)
        .build(identity)
}

/// Build the empty NotAnnounced reply
pub fn build_not_announced(identity: &Identity) -> Result<Block, WireError> {
    PacketBuilder::new(PacketCode::NotAnnounced).build(identity)
}

/// Check the packet signature against `public_key` over the payload as received
pub fn verify_packet(view: &PacketView<'_>, public_key: &PublicKey) -> bool {
    crypto::verify(public_key, view.payload(), &view.signature())
}

/// Decrypt a transport payload. Call only after [`verify_packet`] succeeds.
pub fn open_payload(view: &PacketView<'_>, key: &SharedKey) -> Vec<u8> {
    let mut plaintext = view.payload().to_vec();
    crypto::apply_keystream(key, &view.nonce(), &mut plaintext);
    plaintext
}
