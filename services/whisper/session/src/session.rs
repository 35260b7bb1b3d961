//! Session types and the in-memory session store.
//!
//! The store is a plain pair of maps with no interior locking. It is owned
//! by the engine task and only ever touched from there.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;
use whisper_wire::{EphemeralKeypair, Info, PublicKey, SessionId, SharedKey};

/// Configuration for the session engine
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Drop pending handshakes older than this. `None` keeps them until
    /// matched or until the endpoint closes.
    pub pending_ttl: Option<Duration>,
    /// Cap on pending handshakes; the oldest is evicted to make room.
    /// `None` means unbounded. Values below 1 behave as 1.
    pub max_pending: Option<usize>,
    /// Depth of the receive loop to engine queue
    pub inbound_queue: usize,
    /// Depth of the caller to engine command queue
    pub command_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_ttl: None,
            max_pending: None,
            inbound_queue: 1,
            command_queue: 32,
        }
    }
}

/// An established secure channel
#[derive(Debug)]
pub struct Session {
    /// Session identifier
    pub session_id: SessionId,
    /// Transport key shared with the peer
    pub shared_key: SharedKey,
    /// Where the peer's packets come from
    pub peer_addr: SocketAddr,
    /// Peer's long-term signing key
    pub peer_public_key: PublicKey,
    /// Peer's descriptor from its Announce
    pub peer_info: Info,
    /// When the session was established
    pub started: Instant,
    /// When the last authenticated packet arrived
    pub last_receive: Instant,
}

impl Session {
    /// Create a session from a verified Announce
    pub fn new(
        session_id: SessionId,
        shared_key: SharedKey,
        peer_addr: SocketAddr,
        peer_info: Info,
        now: Instant,
    ) -> Self {
        Self {
            session_id,
            shared_key,
            peer_addr,
            peer_public_key: peer_info.public_key,
            peer_info,
            started: now,
            last_receive: now,
        }
    }

    /// Snapshot without key material
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            peer_name: self.peer_info.name.clone(),
            peer_addr: self.peer_addr,
            peer_public_key: self.peer_public_key,
            started: self.started,
            last_receive: self.last_receive,
        }
    }
}

/// A handshake this endpoint started and has not seen answered
#[derive(Debug)]
pub struct PendingSession {
    /// Identifier sent in our Announce
    pub session_id: SessionId,
    /// Ephemeral keypair for this attempt
    pub ephemeral: EphemeralKeypair,
    /// Address the Announce was sent to
    pub peer_addr: SocketAddr,
    /// When the Announce was sent
    pub created: Instant,
}

/// Public view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session identifier
    pub session_id: SessionId,
    /// Peer display name
    pub peer_name: String,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// Peer signing key
    pub peer_public_key: PublicKey,
    /// When the session was established
    pub started: Instant,
    /// When the last authenticated packet arrived
    pub last_receive: Instant,
}

/// Counts of established and pending sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Established sessions
    pub sessions: usize,
    /// Pending handshakes
    pub pending: usize,
}

/// Established and pending sessions keyed by identifier
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    pending: HashMap<SessionId, PendingSession>,
    pending_ttl: Option<Duration>,
    max_pending: Option<usize>,
}

impl SessionStore {
    /// Create an empty store with the pending policy from `config`
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            pending: HashMap::new(),
            pending_ttl: config.pending_ttl,
            max_pending: config.max_pending,
        }
    }

    /// Look up an established session
    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Look up an established session for update
    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Whether an established session has this identifier
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Insert an established session, returning any session it replaced
    pub fn insert_session(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.session_id, session)
    }

    /// Remove an established session
    pub fn remove_session(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Whether a pending handshake has this identifier
    pub fn has_pending(&self, id: &SessionId) -> bool {
        self.pending.contains_key(id)
    }

    /// Remove and return a pending handshake
    pub fn take_pending(&mut self, id: &SessionId) -> Option<PendingSession> {
        self.pending.remove(id)
    }

    /// Record a pending handshake, applying the pending policy first.
    ///
    /// Returns how many older entries were dropped to make room.
    pub fn insert_pending(&mut self, pending: PendingSession) -> usize {
        let mut evicted = self.prune_expired_pending(pending.created);

        if let Some(max) = self.max_pending {
            while self.pending.len() >= max.max(1) {
                let oldest = self
                    .pending
                    .values()
                    .min_by_key(|p| p.created)
                    .map(|p| p.session_id);
                match oldest {
                    Some(id) => {
                        self.pending.remove(&id);
                        debug!("Evicted pending handshake {} (cap {})", id, max);
                        evicted += 1;
                    }
                    None => break,
                }
            }
        }

        self.pending.insert(pending.session_id, pending);
        evicted
    }

    /// Drop pending handshakes older than the configured TTL
    pub fn prune_expired_pending(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.pending_ttl else {
            return 0;
        };

        let before = self.pending.len();
        self.pending
            .retain(|_, p| now.saturating_duration_since(p.created) < ttl);
        before - self.pending.len()
    }

    /// Identifiers of established sessions, in no particular order
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Summaries of established sessions
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.values().map(Session::summary).collect()
    }

    /// Current counts
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            sessions: self.sessions.len(),
            pending: self.pending.len(),
        }
    }

    /// Configured pending TTL
    pub fn pending_ttl(&self) -> Option<Duration> {
        self.pending_ttl
    }

    /// Drop everything, returning what was held
    pub fn clear(&mut self) -> StoreStats {
        let stats = self.stats();
        self.sessions.clear();
        self.pending.clear();
        stats
    }
}
