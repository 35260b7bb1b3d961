//! Session layer error types.

use thiserror::Error;
use whisper_wire::{SessionId, WireError};

/// Errors raised by the handshake, the engine, and the endpoint API
#[derive(Error, Debug)]
pub enum SessionError {
    /// No established session has this identifier
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The endpoint has been closed
    #[error("endpoint closed")]
    Closed,

    /// Packet signature did not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Announce names an established session that belongs to another peer
    #[error("session {0} already belongs to another peer")]
    SessionConflict(SessionId),

    /// Packet code not understood for an established session
    #[error("unknown packet code {0:#04x}")]
    UnknownCode(u8),

    /// Address could not be resolved
    #[error("failed to resolve address: {0}")]
    Resolve(String),

    /// A background task panicked or was cancelled
    #[error("endpoint task failed: {0}")]
    Task(String),

    /// Wire encoding or decoding error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
