//! Packet layout, handshake messages, and crypto primitives for whisper.
//!
//! This crate holds everything about whisper that is pure data: the
//! fixed-offset packet format, the Announce handshake payload, session
//! identifiers, and the signing, key agreement and stream cipher functions.
//! It does no I/O and keeps no state.
//!
//! ## Wire Format
//!
//! ```text
//! +--------+------------------+-------------------------------------------+
//! | offset | field            | meaning                                   |
//! +--------+------------------+-------------------------------------------+
//! |   0    | checksum (4B)    | reserved, always zero, not validated      |
//! |   4    | session id (32B) | zero when no session is established yet   |
//! |  36    | code (1B)        | 0 Announce, 1 NotAnnounced, 2 Payload,    |
//! |        |                  | 0xFF CloseSession                         |
//! |  37    | size (2B, BE)    | payload length                            |
//! |  39    | nonce (24B)      | XChaCha20 nonce, random per packet        |
//! |  63    | signature (64B)  | Ed25519 over the payload as transmitted   |
//! | 127    | payload (..897B) | Announce bytes or encrypted app bytes     |
//! +--------+------------------+-------------------------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod crypto;
pub mod error;
pub mod header;
pub mod id;
pub mod message;

// Re-export main types
pub use codec::{build_announce, build_not_announced, open_payload, verify_packet, PacketBuilder};
pub use crypto::{
    precompute, EphemeralKeypair, Identity, PublicKey, SharedKey, PUBLIC_KEY_LEN,
};
pub use error::WireError;
pub use header::{
    Block, PacketCode, PacketView, BLOCK_SIZE, HEADER_SIZE, MAX_PAYLOAD, NONCE_LEN, SIGNATURE_LEN,
};
pub use id::{SessionId, SESSION_ID_LEN};
pub use message::{AnnounceMessage, Info};
