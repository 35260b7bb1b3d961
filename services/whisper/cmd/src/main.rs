//! Whisper endpoint binary.
//!
//! Binds a UDP endpoint, prints received messages, and takes commands from
//! stdin to connect to peers and send messages.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use whisper_session::{Endpoint, SessionId};

mod config;
mod console;
mod logging;

use config::WhisperConfig;
use console::Input;
use logging::WhisperLogFormatter;

/// Peer-to-peer signed and encrypted messaging over UDP
#[derive(Parser, Debug)]
#[command(name = "whisper", version, about = "Peer-to-peer signed and encrypted messaging over UDP")]
struct Args {
    /// Display name sent to peers
    #[arg(long)]
    name: Option<String>,

    /// Listen address, e.g. 0.0.0.0:3030
    #[arg(long)]
    listen: Option<String>,

    /// Address to advertise to peers, e.g. 203.0.113.5:3030
    #[arg(long)]
    advertise: Option<SocketAddr>,

    /// Configuration file path
    #[arg(long, default_value = "whisper.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Drop unanswered handshakes after this long, e.g. 30s
    #[arg(long)]
    pending_ttl: Option<humantime::Duration>,

    /// Maximum number of unanswered handshakes
    #[arg(long)]
    max_pending: Option<usize>,

    /// Hex-encoded 32-byte identity seed for a stable public key
    #[arg(long)]
    identity_seed: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let early_level = args.log_level.clone().unwrap_or_else(|| "info".to_string());
    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(log_filter(&early_level)?);
    let service_name = args.name.clone().unwrap_or_else(|| "whisper".to_string());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .event_format(WhisperLogFormatter::new(service_name)),
        )
        .init();

    info!("Starting whisper v{}", env!("CARGO_PKG_VERSION"));

    let mut config = WhisperConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load {:?}", args.config))?;
    apply_args(&mut config, &args);

    // The file may raise or lower the level chosen before it was read.
    if config.log_level != early_level {
        let filter = log_filter(&config.log_level)?;
        reload_handle.modify(|current| *current = filter)?;
    }

    let mut endpoint_config = config.to_endpoint_config()?;
    if let Some(ttl) = args.pending_ttl {
        endpoint_config.session.pending_ttl = Some(ttl.into());
    }

    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<(SessionId, Vec<u8>)>();
    let endpoint = Endpoint::bind(endpoint_config, move |session_id, data| {
        let _ = received_tx.send((session_id, data));
    })
    .await
    .context("Failed to bind endpoint")?;

    println!(
        "{} listening on {} with key {}",
        config.name,
        endpoint.local_addr(),
        hex::encode(endpoint.public_key())
    );
    println!("Type `help` for commands.");

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stopped = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }

            _ = endpoint.closed() => {
                error!("Endpoint stopped unexpectedly, shutting down");
                stopped = true;
                break;
            }

            Some((session_id, data)) = received_rx.recv() => {
                println!("[{}] {}", session_id, String::from_utf8_lossy(&data));
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };

                match line.parse::<Input>() {
                    Ok(Input::Quit) => break,
                    Ok(input) => run_command(&endpoint, input).await,
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    endpoint.close().await.context("Endpoint did not shut down cleanly")?;
    if stopped {
        anyhow::bail!("Endpoint stopped on its own");
    }
    info!("whisper stopped");
    Ok(())
}

fn log_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::new("warn")
        .add_directive(format!("whisper={}", level).parse()?)
        .add_directive(format!("whisper_session={}", level).parse()?)
        .add_directive(format!("whisper_wire={}", level).parse()?))
}

fn apply_args(config: &mut WhisperConfig, args: &Args) {
    if let Some(name) = &args.name {
        config.name = name.clone();
    }
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(advertise) = args.advertise {
        config.advertise = Some(advertise);
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(max) = args.max_pending {
        config.max_pending = Some(max);
    }
    if let Some(seed) = &args.identity_seed {
        config.identity_seed = Some(seed.clone());
    }
}

async fn run_command(endpoint: &Endpoint, input: Input) {
    match input {
        Input::Empty | Input::Quit => {}
        Input::Help => println!("{}", console::HELP),
        Input::Sessions => match endpoint.session_details().await {
            Ok(mut sessions) => {
                if sessions.is_empty() {
                    println!("No sessions");
                    return;
                }
                sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
                let now = Instant::now();
                for s in sessions {
                    println!(
                        "{}  {:<16} {:<22} last seen {}s ago",
                        s.session_id,
                        s.peer_name,
                        s.peer_addr,
                        now.saturating_duration_since(s.last_receive).as_secs()
                    );
                }
            }
            Err(e) => println!("error: {}", e),
        },
        Input::Send {
            session_id,
            message,
        } => {
            if let Err(e) = endpoint.send_message_to(&session_id, &message).await {
                println!("error: {}", e);
            }
        }
        Input::Connect(addr) => match endpoint.send_message_to_addr(&addr, "").await {
            Ok(session_id) => println!("Announced session {} to {}", session_id, addr),
            Err(e) => println!("error: {}", e),
        },
    }
}
