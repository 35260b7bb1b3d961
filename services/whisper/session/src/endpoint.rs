//! Public endpoint API.
//!
//! [`Endpoint`] binds the socket, spawns the receive loop and the engine, and
//! turns each call into a [`Command`] with a oneshot reply.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use whisper_wire::{
    AnnounceMessage, Identity, Info, PublicKey, SessionId, WireError,
    MAX_PAYLOAD,
};

use crate::engine::{Command, Engine, PayloadHandler};
use crate::error::SessionError;
use crate::session::{SessionConfig, SessionStore, SessionSummary, StoreStats};
use crate::transport::{bind_udp, recv_loop};

/// Endpoint configuration
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Display name sent to peers
    pub name: String,
    /// Address to bind, e.g. `0.0.0.0:3030`
    pub listen: String,
    /// Address peers are told to use; defaults to the bound address
    pub advertise: Option<SocketAddr>,
    /// Fixed identity seed; a random identity is generated when absent
    pub identity_seed: Option<[u8; 32]>,
    /// Engine and pending-handshake settings
    pub session: SessionConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "whisper".to_string(),
            listen: "0.0.0.0:3030".to_string(),
            advertise: None,
            identity_seed: None,
            session: SessionConfig::default(),
        }
    }
}

/// A bound whisper endpoint
pub struct Endpoint {
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    public_key: PublicKey,
    local_addr: SocketAddr,
}

impl Endpoint {
    /// Bind the socket and start the engine.
    ///
    /// `on_payload` runs on the engine task for every decrypted payload, so
    /// it should hand work off rather than block.
    pub async fn bind<F>(config: EndpointConfig, on_payload: F) -> Result<Self, SessionError>
    where
        F: Fn(SessionId, Vec<u8>) + Send + Sync + 'static,
    {
        let identity = match &config.identity_seed {
            Some(seed) => Identity::from_seed(seed),
            None => Identity::generate(),
        };
        let public_key = identity.public_key();

        let socket = Arc::new(bind_udp(&config.listen).await?);
        let local_addr = socket.local_addr()?;
        let advertised = config.advertise.unwrap_or(local_addr);
        if advertised.ip().is_unspecified() {
            warn!(
                "Advertising unspecified address {}; peers will see our source address instead",
                advertised
            );
        }

        let local_info = Info {
            public_key,
            address: advertised,
            name: config.name.clone(),
        };
        check_announce_fits(&local_info)?;

        let (command_tx, command_rx) = mpsc::channel(config.session.command_queue.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.session.inbound_queue.max(1));
        let (shutdown, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown);

        let engine = Engine::new(
            Arc::new(identity),
            local_info,
            socket.clone(),
            SessionStore::new(&config.session),
            Arc::new(on_payload) as PayloadHandler,
        );

        let recv_handle = tokio::spawn(recv_loop(socket, inbound_tx, shutdown.clone()));
        let engine_handle = tokio::spawn(engine.run(command_rx, inbound_rx, shutdown.clone()));

        info!(
            "Endpoint {} listening on {} (key {})",
            config.name,
            local_addr,
            hex::encode(&public_key[..8])
        );

        Ok(Self {
            commands: command_tx,
            shutdown,
            tasks: Mutex::new(vec![recv_handle, engine_handle]),
            public_key,
            local_addr,
        })
    }

    /// Send a message on an established session
    pub async fn send_message_to(&self, session_id: &SessionId, message: &str) -> Result<(), SessionError> {
        let session_id = *session_id;
        let message = message.as_bytes().to_vec();
        self.request(|reply| Command::SendToId {
            session_id,
            message,
            reply,
        })
        .await?
    }

    /// Start a handshake with the endpoint at `addr`.
    ///
    /// The message is not delivered; returns the pending session identifier.
    pub async fn send_message_to_addr(&self, addr: &str, message: &str) -> Result<SessionId, SessionError> {
        let addr = resolve(addr).await?;
        let message = message.as_bytes().to_vec();
        self.request(|reply| Command::SendToAddr {
            addr,
            message,
            reply,
        })
        .await?
    }

    /// Identifiers of established sessions, in no particular order
    pub async fn sessions(&self) -> Result<Vec<SessionId>, SessionError> {
        self.request(|reply| Command::ListSessions { reply }).await
    }

    /// Summaries of established sessions
    pub async fn session_details(&self) -> Result<Vec<SessionSummary>, SessionError> {
        self.request(|reply| Command::SessionDetails { reply }).await
    }

    /// Established and pending counts
    pub async fn stats(&self) -> Result<StoreStats, SessionError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Long-term public key of this endpoint
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Bound socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the engine and receive loop and release the socket.
    ///
    /// Safe to call more than once and from several tasks; every call returns
    /// only after both tasks have exited. A task that panicked is reported as
    /// [`SessionError::Task`] by the call that joins it.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.shutdown.send_replace(true);

        let mut tasks = self.tasks.lock().await;
        let mut result = Ok(());
        for handle in tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!("Endpoint task ended abnormally: {}", e);
                if result.is_ok() {
                    result = Err(SessionError::Task(e.to_string()));
                }
            }
        }
        result
    }

    /// Resolves once the endpoint has stopped.
    ///
    /// This covers [`close`](Self::close) as well as a fatal socket error in
    /// the receive loop or the engine exiting on its own.
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        if *self.shutdown.borrow() {
            return Err(SessionError::Closed);
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr, SessionError> {
    lookup_host(addr)
        .await
        .map_err(|e| SessionError::Resolve(format!("{}: {}", addr, e)))?
        .next()
        .ok_or_else(|| SessionError::Resolve(format!("{}: no addresses", addr)))
}

fn check_announce_fits(info: &Info) -> Result<(), SessionError> {
    let largest = AnnounceMessage {
        session_id: SessionId::ZERO,
        ephemeral_public: [0u8; 32],
        info: info.clone(),
    };
    let len = largest.encoded_len();
    if len > MAX_PAYLOAD {
        return Err(WireError::Size(len).into());
    }
    Ok(())
}
