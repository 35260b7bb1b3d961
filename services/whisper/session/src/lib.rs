//! UDP socket, handshake state machine, and session engine for whisper.
//!
//! This crate turns the pure packet format from `whisper-wire` into a running
//! endpoint: one UDP socket, a receive loop feeding a single engine task that
//! owns all session state, and an [`Endpoint`] handle that talks to the
//! engine over channels.
//!
//! ## Features
//!
//! - **Announce handshake**: signed, ephemeral key exchange per session
//! - **Encrypted transport**: XChaCha20 payloads signed over the ciphertext
//! - **Recovery**: peers that lost a session are told so with `NotAnnounced`
//!   and re-announce on their own
//! - **Pending policy**: optional TTL and cap on unanswered handshakes
//!
//! ## Example
//!
//! ```rust,no_run
//! use whisper_session::{Endpoint, EndpointConfig};
//!
//! # async fn example() -> Result<(), whisper_session::SessionError> {
//! let config = EndpointConfig {
//!     name: "alice".to_string(),
//!     listen: "0.0.0.0:3030".to_string(),
//!     ..EndpointConfig::default()
//! };
//!
//! let endpoint = Endpoint::bind(config, |session, data| {
//!     println!("{}: {}", session, String::from_utf8_lossy(&data));
//! })
//! .await?;
//!
//! endpoint.send_message_to_addr("10.0.0.2:3030", "").await?;
//! for id in endpoint.sessions().await? {
//!     endpoint.send_message_to(&id, "hello").await?;
//! }
//!
//! endpoint.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod endpoint;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod session;
pub mod transport;

// Re-export main types
pub use endpoint::{Endpoint, EndpointConfig};
pub use engine::{Command, Engine, PayloadHandler};
pub use error::SessionError;
pub use handshake::AnnounceOutcome;
pub use session::{PendingSession, Session, SessionConfig, SessionStore, SessionSummary, StoreStats};
pub use transport::Inbound;
pub use whisper_wire::SessionId;
