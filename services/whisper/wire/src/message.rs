//! Handshake message encoding.
//!
//! ```text
//! Info:     [32B signing key][1B addr len][addr text][name utf-8 ...]
//! Announce: [32B session id][32B ephemeral x25519 key][Info ...]
//! ```

use std::net::SocketAddr;

use crate::crypto::{PublicKey, PUBLIC_KEY_LEN};
use crate::id::{SessionId, SESSION_ID_LEN};
use crate::WireError;

const INFO_FIXED_LEN: usize = PUBLIC_KEY_LEN + 1;
const ANNOUNCE_FIXED_LEN: usize = SESSION_ID_LEN + 32;

/// Descriptor of an endpoint: who it is, where it listens, what it is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// Long-term signing key
    pub public_key: PublicKey,
    /// Advertised network address
    pub address: SocketAddr,
    /// Display name
    pub name: String,
}

impl Info {
    /// Number of bytes [`Info::encode`] will produce
    pub fn encoded_len(&self) -> usize {
        INFO_FIXED_LEN + self.address.to_string().len() + self.name.len()
    }

    /// Encode into `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let address = self.address.to_string();
        // Socket address text is at most ~55 bytes, well under the length byte.
        debug_assert!(address.len() <= u8::MAX as usize);

        buf.extend_from_slice(&self.public_key);
        buf.push(address.len() as u8);
        buf.extend_from_slice(address.as_bytes());
        buf.extend_from_slice(self.name.as_bytes());
    }

    /// Encode to a new buffer
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode from bytes; everything after the address is the name
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < INFO_FIXED_LEN {
            return Err(WireError::Incomplete {
                need: INFO_FIXED_LEN,
                got: data.len(),
            });
        }

        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(&data[..PUBLIC_KEY_LEN]);

        let addr_len = data[PUBLIC_KEY_LEN] as usize;
        let rest = &data[INFO_FIXED_LEN..];
        if rest.len() < addr_len {
            return Err(WireError::Incomplete {
                need: INFO_FIXED_LEN + addr_len,
                got: data.len(),
            });
        }

        let (addr_raw, name_raw) = rest.split_at(addr_len);
        let addr_text = std::str::from_utf8(addr_raw)
            .map_err(|_| WireError::Address(String::from_utf8_lossy(addr_raw).into_owned()))?;
        let address = addr_text
            .parse::<SocketAddr>()
            .map_err(|_| WireError::Address(addr_text.to_string()))?;
        let name = String::from_utf8(name_raw.to_vec()).map_err(|_| WireError::Utf8)?;

        Ok(Self {
            public_key,
            address,
            name,
        })
    }
}

/// Handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceMessage {
    /// Session being established
    pub session_id: SessionId,
    /// Sender's ephemeral X25519 public key
    pub ephemeral_public: [u8; 32],
    /// Sender's descriptor
    pub info: Info,
}

impl AnnounceMessage {
    /// Number of bytes [`AnnounceMessage::encode`] will produce
    pub fn encoded_len(&self) -> usize {
        ANNOUNCE_FIXED_LEN + self.info.encoded_len()
    }

    /// Encode to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(self.session_id.as_bytes());
        buf.extend_from_slice(&self.ephemeral_public);
        self.info.encode_into(&mut buf);
        buf
    }

    /// Decode from bytes
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < ANNOUNCE_FIXED_LEN {
            return Err(WireError::Incomplete {
                need: ANNOUNCE_FIXED_LEN,
                got: data.len(),
            });
        }

        let session_id = SessionId::from_slice(&data[..SESSION_ID_LEN])?;
        let mut ephemeral_public = [0u8; 32];
        ephemeral_public.copy_from_slice(&data[SESSION_ID_LEN..ANNOUNCE_FIXED_LEN]);
        let info = Info::decode(&data[ANNOUNCE_FIXED_LEN..])?;

        Ok(Self {
            session_id,
            ephemeral_public,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> Info {
        Info {
            public_key: [0x5A; 32],
            address: "127.0.0.1:2222".parse().unwrap(),
            name: "test-user".to_string(),
        }
    }

    #[test]
    fn test_info_roundtrip() {
        let info = sample_info();
        let data = info.encode();
        assert_eq!(data.len(), info.encoded_len());
        assert_eq!(data[32] as usize, "127.0.0.1:2222".len());
        assert_eq!(Info::decode(&data).unwrap(), info);
    }

    #[test]
    fn test_info_ipv6_and_empty_name() {
        let info = Info {
            public_key: [1; 32],
            address: "[::1]:3030".parse().unwrap(),
            name: String::new(),
        };
        assert_eq!(Info::decode(&info.encode()).unwrap(), info);
    }

    #[test]
    fn test_info_unicode_name() {
        let info = Info {
            name: "Пользователь".to_string(),
            ..sample_info()
        };
        assert_eq!(Info::decode(&info.encode()).unwrap(), info);
    }

    #[test]
    fn test_info_too_short() {
        assert!(matches!(
            Info::decode(&[0u8; 20]),
            Err(WireError::Incomplete { need: 33, got: 20 })
        ));

        let mut data = vec![0u8; 32];
        data.push(40);
        data.extend_from_slice(b"127.0.0.1:1");
        assert!(matches!(Info::decode(&data), Err(WireError::Incomplete { .. })));
    }

    #[test]
    fn test_info_bad_address() {
        let mut data = vec![0u8; 32];
        data.push(9);
        data.extend_from_slice(b"not-addr!");
        assert_eq!(
            Info::decode(&data),
            Err(WireError::Address("not-addr!".to_string()))
        );
    }

    #[test]
    fn test_info_bad_name() {
        let mut data = sample_info().encode();
        data.push(0xFF);
        assert_eq!(Info::decode(&data), Err(WireError::Utf8));
    }

    #[test]
    fn test_announce_roundtrip() {
        let msg = AnnounceMessage {
            session_id: SessionId::random(),
            ephemeral_public: [0x33; 32],
            info: sample_info(),
        };
        let data = msg.encode();
        assert_eq!(data.len(), msg.encoded_len());
        assert_eq!(&data[..32], msg.session_id.as_bytes());
        assert_eq!(&data[32..64], &[0x33; 32]);
        assert_eq!(AnnounceMessage::decode(&data).unwrap(), msg);
    }

    #[test]
    fn test_announce_too_short() {
        assert!(matches!(
            AnnounceMessage::decode(&[0u8; 63]),
            Err(WireError::Incomplete { need: 64, got: 63 })
        ));
        assert!(AnnounceMessage::decode(&[0u8; 64]).is_err());
    }
}
