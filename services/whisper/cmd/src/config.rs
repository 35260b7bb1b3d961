//! Configuration handling for the whisper binary.
//!
//! Settings come from an optional YAML file, then environment variables,
//! then command-line flags, each layer overriding the one before.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use whisper_session::{EndpointConfig, SessionConfig};

/// Whisper endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    /// Display name sent to peers
    pub name: String,
    /// UDP listen address
    pub listen: String,
    /// Address advertised to peers, when it differs from the listen address
    pub advertise: Option<SocketAddr>,
    /// Drop unanswered handshakes after this many seconds
    pub pending_ttl_secs: Option<u64>,
    /// Cap on unanswered handshakes
    pub max_pending: Option<usize>,
    /// Hex-encoded 32-byte identity seed
    pub identity_seed: Option<String>,
    /// Log filter directive
    pub log_level: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            name: "whisper".to_string(),
            listen: "0.0.0.0:3030".to_string(),
            advertise: None,
            pending_ttl_secs: None,
            max_pending: None,
            identity_seed: None,
            log_level: "info".to_string(),
        }
    }
}

impl WhisperConfig {
    /// Load configuration from file and environment variables.
    ///
    /// A missing file yields defaults; a file that cannot be read or parsed
    /// is an error.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = serde_yaml::from_str::<Self>(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config file {:?}", path));
            }
        };

        config.apply_environment_overrides();
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("WHISPER_NAME") {
            info!("Name overridden by environment: {}", name);
            self.name = name;
        }

        if let Some(listen) = lookup("WHISPER_LISTEN") {
            info!("Listen address overridden by environment: {}", listen);
            self.listen = listen;
        }

        if let Some(advertise) = lookup("WHISPER_ADVERTISE") {
            match advertise.parse::<SocketAddr>() {
                Ok(addr) => {
                    self.advertise = Some(addr);
                    info!("Advertise address overridden by environment: {}", addr);
                }
                Err(_) => warn!("Ignoring invalid WHISPER_ADVERTISE: {}", advertise),
            }
        }

        if let Some(ttl) = lookup("WHISPER_PENDING_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(secs) => {
                    self.pending_ttl_secs = Some(secs);
                    info!("Pending TTL overridden by environment: {}s", secs);
                }
                Err(_) => warn!("Ignoring invalid WHISPER_PENDING_TTL_SECS: {}", ttl),
            }
        }

        if let Some(max) = lookup("WHISPER_MAX_PENDING") {
            match max.parse::<usize>() {
                Ok(max) => {
                    self.max_pending = Some(max);
                    info!("Pending cap overridden by environment: {}", max);
                }
                Err(_) => warn!("Ignoring invalid WHISPER_MAX_PENDING: {}", max),
            }
        }
    }

    /// Build the endpoint configuration
    pub fn to_endpoint_config(&self) -> Result<EndpointConfig> {
        let identity_seed = match &self.identity_seed {
            Some(text) => Some(parse_seed(text)?),
            None => None,
        };

        Ok(EndpointConfig {
            name: self.name.clone(),
            listen: self.listen.clone(),
            advertise: self.advertise,
            identity_seed,
            session: SessionConfig {
                pending_ttl: self.pending_ttl_secs.map(Duration::from_secs),
                max_pending: self.max_pending,
                ..SessionConfig::default()
            },
        })
    }
}

fn parse_seed(text: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(text.trim()).context("Identity seed is not valid hex")?;
    if bytes.len() != 32 {
        bail!("Identity seed must be 32 bytes, got {}", bytes.len());
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}
