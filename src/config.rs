use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::Arc,
    time::Duration,
};

use crate::allowlist::{AllowEntry, parse_entries};
use crate::engine::{AccessDecisionEngine, AccessGate, DEFAULT_STORE_TIMEOUT_MS};
use crate::headers::{CandidateExtractor, DEFAULT_PLATFORM_HEADER};
use crate::store::{AuthorizationStore, FileStore, FirestoreSettings, FirestoreStore, MemoryStore};

pub const CONFIG_ENV_VAR: &str = "IP_GATE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub listen: ListenConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
pub struct ListenConfig {
    pub ip: String,
    pub port: u16,
}

impl ListenConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .trim()
            .parse()
            .with_context(|| format!("Invalid listen.ip {}", self.ip))?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Every decision is HTTP 200; the outcome is in `allowed`.
    #[default]
    AlwaysOk,
    /// Allow 200, deny 403.
    HttpStatus,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub hardcoded_ips: Vec<String>,
    pub response_mode: ResponseMode,
    pub platform_header: String,
    pub store_timeout_ms: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            hardcoded_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
            response_mode: ResponseMode::default(),
            platform_header: DEFAULT_PLATFORM_HEADER.to_string(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl AccessConfig {
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Parses the hardcoded list; an unusable entry is an error, never dropped.
    pub fn hardcoded_entries(&self) -> Result<Vec<AllowEntry>> {
        parse_entries(&self.hardcoded_ips).context("Invalid entry in access.hardcoded_ips")
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// No dynamic source: empty dynamic list, public access off.
    #[default]
    #[serde(rename = "none")]
    Disabled,
    File {
        path: String,
    },
    Firestore(FirestoreSettings),
}

impl StoreConfig {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Disabled => "none",
            Self::File { .. } => "file",
            Self::Firestore(_) => "firestore",
        }
    }

    /// Instantiates the configured store. `timeout` bounds each HTTP request
    /// of remote stores.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn AuthorizationStore>> {
        let store: Arc<dyn AuthorizationStore> = match self {
            Self::Disabled => Arc::new(MemoryStore::new()),
            Self::File { path } => Arc::new(FileStore::new(path)),
            Self::Firestore(settings) => Arc::new(
                FirestoreStore::new(settings, timeout).context("Failed to create Firestore client")?,
            ),
        };
        Ok(store)
    }
}

impl Config {
    pub fn build_gate(&self) -> Result<AccessGate> {
        let engine = AccessDecisionEngine::new(
            CandidateExtractor::new(&self.access.platform_header),
            self.access.hardcoded_entries()?,
        );
        let timeout = self.access.store_timeout();
        Ok(AccessGate::new(engine, self.store.build(timeout)?, timeout))
    }

    pub fn validate(&self) -> Result<()> {
        self.listen.socket_addr()?;
        self.access.hardcoded_entries()?;
        anyhow::ensure!(
            self.access.store_timeout_ms > 0,
            "access.store_timeout_ms must be greater than zero"
        );
        anyhow::ensure!(
            !self.access.platform_header.trim().is_empty(),
            "access.platform_header must not be empty"
        );
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config as valid TOML")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Loads `$IP_GATE_CONFIG`, or `config.toml` in the working directory.
pub fn load_config() -> Result<Config> {
    let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(path)
}
