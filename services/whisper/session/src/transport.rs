//! UDP transport for whisper endpoints.
//!
//! One socket per endpoint, shared between the receive loop (reads) and the
//! engine (writes).

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};
use whisper_wire::{Block, BLOCK_SIZE};

/// A datagram read off the socket
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Sender address
    pub from: SocketAddr,
    /// Raw datagram bytes
    pub data: Vec<u8>,
}

/// Bind a UDP socket to the given address
pub async fn bind_udp(addr: &str) -> tokio::io::Result<UdpSocket> {
    UdpSocket::bind(addr).await
}

/// Read datagrams and hand them to the engine until shutdown.
///
/// A read error is fatal: it raises the shutdown signal so the engine stops
/// too. The handoff to the engine is bounded, so a busy engine stalls reads.
pub async fn recv_loop(
    socket: Arc<UdpSocket>,
    inbound_tx: mpsc::Sender<Inbound>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut shutdown_rx = shutdown.subscribe();
    if *shutdown_rx.borrow() {
        return;
    }

    let mut buf = [0u8; BLOCK_SIZE];
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,

            result = socket.recv_from(&mut buf) => {
                let (len, from) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        error!("UDP read failed, shutting down: {}", e);
                        shutdown.send_replace(true);
                        break;
                    }
                };

                let item = Inbound {
                    from,
                    data: buf[..len].to_vec(),
                };
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    sent = inbound_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!("Receive loop stopped");
}

/// Write a packet to `addr`
pub async fn send_block(
    socket: &UdpSocket,
    addr: SocketAddr,
    block: &Block,
) -> tokio::io::Result<usize> {
    socket.send_to(block.as_datagram(), addr).await
}
