//! Session engine.
//!
//! A single task owns the [`SessionStore`] and serializes every access to
//! it: commands from the endpoint API and datagrams from the receive loop are
//! handled one at a time in the order they are selected. Callers get answers
//! back over a oneshot channel carried in each [`Command`].

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use whisper_wire::{
    build_announce, build_not_announced, open_payload, verify_packet, Identity, Info,
    PacketBuilder, PacketCode, PacketView, SessionId,
};

use crate::error::SessionError;
use crate::handshake::{self, AnnounceOutcome};
use crate::session::{SessionStore, SessionSummary, StoreStats};
use crate::transport::{send_block, Inbound};

/// Current time on the runtime clock, so paused test time moves it too
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// Callback invoked with each decrypted payload and the session it arrived on
pub type PayloadHandler = Arc<dyn Fn(SessionId, Vec<u8>) + Send + Sync>;

/// Requests from the endpoint API to the engine
#[derive(Debug)]
pub enum Command {
    /// Encrypt and send a message on an established session
    SendToId {
        /// Target session
        session_id: SessionId,
        /// Plaintext message
        message: Vec<u8>,
        /// Send result
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Start a handshake with the endpoint at `addr`
    SendToAddr {
        /// Peer address
        addr: SocketAddr,
        /// Not delivered; the handshake carries no application data
        message: Vec<u8>,
        /// Identifier of the new pending session
        reply: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    /// Identifiers of established sessions
    ListSessions {
        /// Snapshot
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    /// Summaries of established sessions
    SessionDetails {
        /// Snapshot
        reply: oneshot::Sender<Vec<SessionSummary>>,
    },
    /// Established and pending counts
    Stats {
        /// Snapshot
        reply: oneshot::Sender<StoreStats>,
    },
}

/// The session actor
pub struct Engine {
    identity: Arc<Identity>,
    local_info: Info,
    socket: Arc<UdpSocket>,
    store: SessionStore,
    on_payload: PayloadHandler,
}

impl Engine {
    /// Create an engine over an empty store
    pub fn new(
        identity: Arc<Identity>,
        local_info: Info,
        socket: Arc<UdpSocket>,
        store: SessionStore,
        on_payload: PayloadHandler,
    ) -> Self {
        Self {
            identity,
            local_info,
            socket,
            store,
            on_payload,
        }
    }

    /// Run until shutdown is signalled or either input channel closes.
    ///
    /// The store is cleared on exit.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::Receiver<Inbound>,
        shutdown: Arc<watch::Sender<bool>>,
    ) {
        info!(
            "Starting session engine on {} as {}",
            self.local_info.address, self.local_info.name
        );

        let mut shutdown_rx = shutdown.subscribe();
        let mut sweep = self
            .store
            .pending_ttl()
            .filter(|ttl| !ttl.is_zero())
            .map(tokio::time::interval);

        if !*shutdown_rx.borrow() {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => break,

                    item = inbound.recv() => match item {
                        Some(item) => self.handle_inbound(item).await,
                        None => break,
                    },

                    command = commands.recv() => match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    },

                    _ = async {
                        match &mut sweep {
                            Some(interval) => {
                                interval.tick().await;
                            }
                            None => std::future::pending().await,
                        }
                    } => {
                        let pruned = self.store.prune_expired_pending(now());
                        if pruned > 0 {
                            debug!("Pruned {} expired pending handshakes", pruned);
                        }
                    }
                }
            }
        }

        shutdown.send_replace(true);
        let dropped = self.store.clear();
        info!(
            "Session engine stopped ({} sessions, {} pending dropped)",
            dropped.sessions, dropped.pending
        );
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendToId {
                session_id,
                message,
                reply,
            } => {
                let result = self.send_to_id(session_id, &message).await;
                let _ = reply.send(result);
            }
            Command::SendToAddr { addr, reply, .. } => {
                let result = self.connect(addr).await;
                let _ = reply.send(result);
            }
            Command::ListSessions { reply } => {
                let _ = reply.send(self.store.ids());
            }
            Command::SessionDetails { reply } => {
                let _ = reply.send(self.store.summaries());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.store.stats());
            }
        }
    }

    async fn send_to_id(&mut self, session_id: SessionId, message: &[u8]) -> Result<(), SessionError> {
        let session = self
            .store
            .get(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;

        let block = PacketBuilder::new(PacketCode::Payload)
            .session(session_id, &session.shared_key)
            .payload(message)
            .build(&self.identity)?;
        send_block(&self.socket, session.peer_addr, &block).await?;

        debug!("Sent {} bytes on session {}", message.len(), session_id);
        Ok(())
    }

    async fn connect(&mut self, addr: SocketAddr) -> Result<SessionId, SessionError> {
        let announce = handshake::initiate(&mut self.store, addr, &self.local_info, now());
        let session_id = announce.session_id;

        let sent = match build_announce(&announce, &self.identity) {
            Ok(block) => send_block(&self.socket, addr, &block)
                .await
                .map(|_| ())
                .map_err(SessionError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            self.store.take_pending(&session_id);
            return Err(e);
        }

        Ok(session_id)
    }

    async fn handle_inbound(&mut self, item: Inbound) {
        if let Err(e) = self.process_packet(&item).await {
            warn!("Dropped packet from {}: {}", item.from, e);
        }
    }

    async fn process_packet(&mut self, item: &Inbound) -> Result<(), SessionError> {
        let view = PacketView::parse(&item.data)?;
        let code = view.code_byte();

        if code == PacketCode::Announce as u8 {
            let outcome = handshake::accept_announce(
                &mut self.store,
                &view,
                item.from,
                &self.local_info,
                now(),
            )?;
            if let AnnounceOutcome::Reply { reply, .. } = outcome {
                let block = build_announce(&reply, &self.identity)?;
                send_block(&self.socket, item.from, &block).await?;
            }
            return Ok(());
        }

        if code == PacketCode::NotAnnounced as u8 {
            debug!("{} does not know us, announcing", item.from);
            self.connect(item.from).await?;
            return Ok(());
        }

        let session_id = view.session_id();
        let Some(session) = self.store.get_mut(&session_id) else {
            debug!(
                "Packet for unknown session {:?} from {}, replying NotAnnounced",
                session_id, item.from
            );
            let block = build_not_announced(&self.identity)?;
            send_block(&self.socket, item.from, &block).await?;
            return Ok(());
        };

        if !verify_packet(&view, &session.peer_public_key) {
            return Err(SessionError::InvalidSignature);
        }

        match PacketCode::try_from(code) {
            Ok(PacketCode::Payload) => {
                let plaintext = open_payload(&view, &session.shared_key);
                session.last_receive = now();
                debug!("Received {} bytes on session {}", plaintext.len(), session_id);
                (self.on_payload)(session_id, plaintext);
                Ok(())
            }
            Ok(PacketCode::CloseSession) => {
                debug!("Ignoring CloseSession for {}", session_id);
                Ok(())
            }
            _ => Err(SessionError::UnknownCode(code)),
        }
    }
}
