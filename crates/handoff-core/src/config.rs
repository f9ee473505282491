//! Configuration types for Handoff

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of a pairing or QR session in seconds
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 300;

/// Identity providers accepted by `beginAuthenticating` unless overridden
pub const DEFAULT_PROVIDERS: &[&str] = &["google", "discord", "github"];

/// Main configuration for Handoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub bind: IpAddr,
    /// Server port
    pub port: u16,
    /// Lifetime of a pairing session in seconds
    pub pairing_ttl_secs: u64,
    /// Lifetime of a QR session in seconds
    pub qr_ttl_secs: u64,
    /// Identity providers a QR session may be routed through
    pub providers: Vec<String>,
    /// Externally reachable base URL, used for provider redirect targets
    pub public_url: String,
    /// Directory holding `sessions.json` and `users.json`
    pub data_dir: Option<PathBuf>,
    /// Keep all state in memory (nothing written to disk)
    pub in_memory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8787,
            pairing_ttl_secs: DEFAULT_SESSION_TTL_SECONDS,
            qr_ttl_secs: DEFAULT_SESSION_TTL_SECONDS,
            providers: DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            public_url: "http://localhost:8787".to_string(),
            data_dir: None,
            in_memory: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set bind address
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set pairing session lifetime
    pub fn with_pairing_ttl_secs(mut self, secs: u64) -> Self {
        self.pairing_ttl_secs = secs;
        self
    }

    /// Builder pattern: set QR session lifetime
    pub fn with_qr_ttl_secs(mut self, secs: u64) -> Self {
        self.qr_ttl_secs = secs;
        self
    }

    /// Builder pattern: replace the provider allow-list
    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers
            .into_iter()
            .map(|p| p.into().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Builder pattern: set public base URL
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builder pattern: set data directory
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }

    /// Builder pattern: keep state in memory only
    pub fn with_in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    pub fn pairing_ttl(&self) -> Duration {
        Duration::from_secs(self.pairing_ttl_secs)
    }

    pub fn qr_ttl(&self) -> Duration {
        Duration::from_secs(self.qr_ttl_secs)
    }

    /// Resolve the data directory, falling back to the platform data dir
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("handoff"))
                .ok_or_else(|| Error::validation("no data directory available; pass --data-dir")),
        }
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pairing_ttl_secs == 0 || self.qr_ttl_secs == 0 {
            return Err(Error::validation("session TTL must be greater than zero"));
        }
        if self.providers.is_empty() {
            return Err(Error::validation("at least one identity provider is required"));
        }
        if self.public_url.is_empty() {
            return Err(Error::validation("public URL must not be empty"));
        }
        Ok(())
    }
}
