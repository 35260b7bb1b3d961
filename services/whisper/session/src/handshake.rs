//! Announce handshake state transitions.
//!
//! A peer relationship goes `Unknown -> PendingOutbound -> Established` when
//! this endpoint initiates, or `Unknown -> Established` when the peer does.
//! These functions only mutate the [`SessionStore`]; building and sending
//! packets is left to the engine.

use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};
use whisper_wire::{
    precompute, verify_packet, AnnounceMessage, EphemeralKeypair, Info, PacketView, SessionId,
    WireError,
};

use crate::error::SessionError;
use crate::session::{PendingSession, Session, SessionStore};

/// Result of processing a received Announce
#[derive(Debug)]
pub enum AnnounceOutcome {
    /// The Announce answered one of our pending handshakes
    Completed {
        /// Established session
        session_id: SessionId,
    },
    /// The Announce was unsolicited; send `reply` back so the peer can finish
    Reply {
        /// Established session
        session_id: SessionId,
        /// Our half of the handshake
        reply: AnnounceMessage,
    },
}

impl AnnounceOutcome {
    /// Session established by this Announce
    pub fn session_id(&self) -> SessionId {
        match self {
            AnnounceOutcome::Completed { session_id } => *session_id,
            AnnounceOutcome::Reply { session_id, .. } => *session_id,
        }
    }
}

/// Start a handshake toward `peer_addr`.
///
/// Records a [`PendingSession`] with a fresh identifier and ephemeral keypair
/// and returns the Announce to send.
pub fn initiate(
    store: &mut SessionStore,
    peer_addr: SocketAddr,
    local_info: &Info,
    now: Instant,
) -> AnnounceMessage {
    let session_id = SessionId::random();
    let ephemeral = EphemeralKeypair::generate();
    let announce = AnnounceMessage {
        session_id,
        ephemeral_public: ephemeral.public_bytes(),
        info: local_info.clone(),
    };

    let evicted = store.insert_pending(PendingSession {
        session_id,
        ephemeral,
        peer_addr,
        created: now,
    });
    if evicted > 0 {
        debug!("Dropped {} stale pending handshakes", evicted);
    }

    debug!("Initiating handshake {} with {}", session_id, peer_addr);
    announce
}

/// Process an Announce packet received from `from`.
///
/// The signature is checked against the key the sender claims in its
/// [`Info`] before anything in the store changes. An established session is
/// only replaced by an Announce from the same key and the same address.
pub fn accept_announce(
    store: &mut SessionStore,
    view: &PacketView<'_>,
    from: SocketAddr,
    local_info: &Info,
    now: Instant,
) -> Result<AnnounceOutcome, SessionError> {
    let msg = AnnounceMessage::decode(view.payload())?;
    if !verify_packet(view, &msg.info.public_key) {
        return Err(SessionError::InvalidSignature);
    }
    if msg.session_id.is_zero() {
        return Err(WireError::Malformed.into());
    }

    let session_id = msg.session_id;

    if let Some(pending) = store.take_pending(&session_id) {
        let shared_key = precompute(&msg.ephemeral_public, &pending.ephemeral);
        info!(
            "Session {} established with {} ({}) at {}",
            session_id, msg.info.name, hex::encode(&msg.info.public_key[..8]), from
        );
        store.insert_session(Session::new(session_id, shared_key, from, msg.info, now));
        return Ok(AnnounceOutcome::Completed { session_id });
    }

    if let Some(existing) = store.get(&session_id) {
        if existing.peer_public_key != msg.info.public_key {
            return Err(SessionError::SessionConflict(session_id));
        }
        // A captured Announce replayed from elsewhere must not redirect the session.
        if existing.peer_addr != from {
            warn!(
                "Re-announce of session {} from {} does not match peer at {}",
                session_id, from, existing.peer_addr
            );
            return Err(SessionError::SessionConflict(session_id));
        }
        debug!("Peer re-announced session {}, replacing it", session_id);
        store.remove_session(&session_id);
    }

    let ephemeral = EphemeralKeypair::generate();
    let shared_key = precompute(&msg.ephemeral_public, &ephemeral);
    let reply = AnnounceMessage {
        session_id,
        ephemeral_public: ephemeral.public_bytes(),
        info: local_info.clone(),
    };

    info!(
        "Session {} accepted from {} ({}) at {}",
        session_id, msg.info.name, hex::encode(&msg.info.public_key[..8]), from
    );
    store.insert_session(Session::new(session_id, shared_key, from, msg.info, now));
    Ok(AnnounceOutcome::Reply { session_id, reply })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use whisper_wire::{build_announce, Identity, PacketBuilder, PacketCode};

    struct Peer {
        identity: Identity,
        info: Info,
        addr: SocketAddr,
        store: SessionStore,
    }

    impl Peer {
        fn new(name: &str, port: u16) -> Self {
            let identity = Identity::generate();
            let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
            let info = Info {
                public_key: identity.public_key(),
                address: addr,
                name: name.to_string(),
            };
            Self {
                identity,
                info,
                addr,
                store: SessionStore::new(&SessionConfig::default()),
            }
        }

        fn announce_bytes(&self, msg: &AnnounceMessage) -> Vec<u8> {
            build_announce(msg, &self.identity)
                .unwrap()
                .as_datagram()
                .to_vec()
        }
    }

    #[test]
    fn test_full_handshake_derives_equal_keys() {
        let mut alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let now = Instant::now();

        let hello = initiate(&mut alice.store, bob.addr, &alice.info, now);
        assert_eq!(alice.store.stats().pending, 1);
        assert_eq!(alice.store.stats().sessions, 0);

        let raw = alice.announce_bytes(&hello);
        let view = PacketView::parse(&raw).unwrap();
        let outcome = accept_announce(&mut bob.store, &view, alice.addr, &bob.info, now).unwrap();
        let AnnounceOutcome::Reply { session_id, reply } = outcome else {
            panic!("bob should reply to an unsolicited announce");
        };
        assert_eq!(session_id, hello.session_id);
        assert_eq!(reply.session_id, hello.session_id);
        assert_eq!(reply.info, bob.info);
        assert_eq!(bob.store.stats().sessions, 1);
        assert_eq!(bob.store.stats().pending, 0);

        let raw = bob.announce_bytes(&reply);
        let view = PacketView::parse(&raw).unwrap();
        let outcome = accept_announce(&mut alice.store, &view, bob.addr, &alice.info, now).unwrap();
        assert!(matches!(outcome, AnnounceOutcome::Completed { .. }));
        assert_eq!(outcome.session_id(), hello.session_id);
        assert_eq!(alice.store.stats().pending, 0);
        assert_eq!(alice.store.stats().sessions, 1);

        let a = alice.store.get(&session_id).unwrap();
        let b = bob.store.get(&session_id).unwrap();
        assert_eq!(a.shared_key, b.shared_key);
        assert_eq!(a.peer_public_key, bob.identity.public_key());
        assert_eq!(b.peer_public_key, alice.identity.public_key());
        assert_eq!(a.peer_info.name, "bob");
        assert_eq!(b.peer_addr, alice.addr);
    }

    #[test]
    fn test_bad_signature_leaves_store_untouched() {
        let alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let mallory = Identity::generate();

        // Claims alice's key but is signed by someone else.
        let msg = AnnounceMessage {
            session_id: SessionId::random(),
            ephemeral_public: EphemeralKeypair::generate().public_bytes(),
            info: alice.info.clone(),
        };
        let raw = build_announce(&msg, &mallory).unwrap().as_datagram().to_vec();
        let view = PacketView::parse(&raw).unwrap();

        let err = accept_announce(&mut bob.store, &view, alice.addr, &bob.info, Instant::now())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidSignature));
        assert_eq!(bob.store.stats().sessions, 0);
    }

    #[test]
    fn test_truncated_announce_is_rejected() {
        let alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let raw = PacketBuilder::new(PacketCode::Announce)
            .payload(&[0u8; 40])
            .build(&alice.identity)
            .unwrap()
            .as_datagram()
            .to_vec();
        let view = PacketView::parse(&raw).unwrap();

        let err = accept_announce(&mut bob.store, &view, alice.addr, &bob.info, Instant::now())
            .unwrap_err();
        assert!(matches!(err, SessionError::Wire(WireError::Incomplete { .. })));
        assert_eq!(bob.store.stats().sessions, 0);
    }

    #[test]
    fn test_conflicting_peer_cannot_take_session() {
        let alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let mallory = Peer::new("mallory", 5003);
        let now = Instant::now();

        let msg = AnnounceMessage {
            session_id: SessionId::random(),
            ephemeral_public: EphemeralKeypair::generate().public_bytes(),
            info: alice.info.clone(),
        };
        let raw = alice.announce_bytes(&msg);
        accept_announce(&mut bob.store, &PacketView::parse(&raw).unwrap(), alice.addr, &bob.info, now)
            .unwrap();

        let hijack = AnnounceMessage {
            info: mallory.info.clone(),
            ..msg.clone()
        };
        let raw = mallory.announce_bytes(&hijack);
        let err = accept_announce(
            &mut bob.store,
            &PacketView::parse(&raw).unwrap(),
            mallory.addr,
            &bob.info,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::SessionConflict(id) if id == msg.session_id));

        let session = bob.store.get(&msg.session_id).unwrap();
        assert_eq!(session.peer_public_key, alice.identity.public_key());
        assert_eq!(session.peer_addr, alice.addr);
    }

    #[test]
    fn test_same_peer_reannounce_replaces_session() {
        let alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let now = Instant::now();
        let session_id = SessionId::random();

        let first = AnnounceMessage {
            session_id,
            ephemeral_public: EphemeralKeypair::generate().public_bytes(),
            info: alice.info.clone(),
        };
        let raw = alice.announce_bytes(&first);
        accept_announce(&mut bob.store, &PacketView::parse(&raw).unwrap(), alice.addr, &bob.info, now)
            .unwrap();
        let first_key = bob.store.get(&session_id).unwrap().shared_key.clone();

        let second = AnnounceMessage {
            ephemeral_public: EphemeralKeypair::generate().public_bytes(),
            ..first
        };
        let raw = alice.announce_bytes(&second);
        let outcome =
            accept_announce(&mut bob.store, &PacketView::parse(&raw).unwrap(), alice.addr, &bob.info, now)
                .unwrap();
        assert!(matches!(outcome, AnnounceOutcome::Reply { .. }));
        assert_eq!(bob.store.stats().sessions, 1);
        assert_ne!(bob.store.get(&session_id).unwrap().shared_key, first_key);
    }

    #[test]
    fn test_replayed_announce_from_other_address_is_rejected() {
        let alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let now = Instant::now();
        let elsewhere: SocketAddr = "127.0.0.1:5999".parse().unwrap();

        let msg = AnnounceMessage {
            session_id: SessionId::random(),
            ephemeral_public: EphemeralKeypair::generate().public_bytes(),
            info: alice.info.clone(),
        };
        let raw = alice.announce_bytes(&msg);
        accept_announce(&mut bob.store, &PacketView::parse(&raw).unwrap(), alice.addr, &bob.info, now)
            .unwrap();
        let key = bob.store.get(&msg.session_id).unwrap().shared_key.clone();

        // Byte-for-byte copy of alice's packet sent from another address.
        let err = accept_announce(
            &mut bob.store,
            &PacketView::parse(&raw).unwrap(),
            elsewhere,
            &bob.info,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::SessionConflict(id) if id == msg.session_id));

        let session = bob.store.get(&msg.session_id).unwrap();
        assert_eq!(session.peer_addr, alice.addr);
        assert_eq!(session.shared_key, key);
        assert_eq!(bob.store.stats().sessions, 1);
    }

    #[test]
    fn test_zero_session_id_is_rejected() {
        let alice = Peer::new("alice", 5001);
        let mut bob = Peer::new("bob", 5002);
        let msg = AnnounceMessage {
            session_id: SessionId::ZERO,
            ephemeral_public: EphemeralKeypair::generate().public_bytes(),
            info: alice.info.clone(),
        };
        let raw = alice.announce_bytes(&msg);
        let err = accept_announce(
            &mut bob.store,
            &PacketView::parse(&raw).unwrap(),
            alice.addr,
            &bob.info,
            Instant::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Wire(WireError::Malformed)));
        assert_eq!(bob.store.stats().sessions, 0);
    }
}
