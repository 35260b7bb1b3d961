//! Session identifiers and their text form.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;

use crate::WireError;

/// Length of a session identifier in bytes
pub const SESSION_ID_LEN: usize = 32;

/// 32-byte identifier naming one secure channel.
///
/// The all-zero value is reserved for packets that belong to no session.
/// Identifiers order bytewise so lists of them can be sorted with
/// `slice::sort`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub [u8; SESSION_ID_LEN]);

impl SessionId {
    /// The reserved "no session" identifier
    pub const ZERO: SessionId = SessionId([0u8; SESSION_ID_LEN]);

    /// Generate a fresh random identifier from the OS CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN];
        loop {
            OsRng.fill_bytes(&mut bytes);
            if bytes != [0u8; SESSION_ID_LEN] {
                return Self(bytes);
            }
        }
    }

    /// Build an identifier from a slice, which must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        let bytes: [u8; SESSION_ID_LEN] = bytes.try_into().map_err(|_| WireError::Malformed)?;
        Ok(Self(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    /// Whether this is the reserved zero identifier
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; SESSION_ID_LEN]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", hex::encode(&self.0[..8]))
    }
}

impl FromStr for SessionId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| WireError::Malformed)?;
        Self::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_form_parses_back() {
        let id = SessionId::random();
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<SessionId>().unwrap(), id);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!("abcd".parse::<SessionId>(), Err(WireError::Malformed));
        assert_eq!("zz".repeat(32).parse::<SessionId>(), Err(WireError::Malformed));
    }

    #[test]
    fn test_random_is_never_zero() {
        for _ in 0..16 {
            assert!(!SessionId::random().is_zero());
        }
        assert!(SessionId::ZERO.is_zero());
    }

    #[test]
    fn test_sorts_bytewise() {
        let mut ids = vec![SessionId([3; 32]), SessionId([1; 32]), SessionId([2; 32])];
        ids.sort();
        assert_eq!(ids, vec![SessionId([1; 32]), SessionId([2; 32]), SessionId([3; 32])]);
    }
}
