//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Datagram or message shorter than its fixed part
    #[error("incomplete packet: need {need} bytes, got {got}")]
    Incomplete {
        /// Minimum number of bytes required
        need: usize,
        /// Number of bytes available
        got: usize,
    },

    /// Declared or requested payload size does not fit
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Unknown packet code
    #[error("unknown code {0:#04x}")]
    Code(u8),

    /// Address string in a peer descriptor did not parse
    #[error("invalid address: {0}")]
    Address(String),

    /// Display name is not valid UTF-8
    #[error("name is not valid utf-8")]
    Utf8,

    /// Identifier text did not decode to 32 bytes
    #[error("malformed identifier")]
    Malformed,
}
