//! Sources of dynamic authorization data.
//!
//! The gate only ever reads two things: the active allow-list records and the
//! public-access override. Failures are reported, never hidden; the caller
//! decides how to fall back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod file;
pub mod firestore;
mod memory;

pub use file::FileStore;
pub use firestore::{FirestoreSettings, FirestoreStore};
pub use memory::MemoryStore;

/// One allow-listed address as stored by administrators.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub ip: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        alias = "addedBy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub added_by: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Process-wide override that disables allow-list checks when enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccessConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(alias = "enabledBy", default)]
    pub enabled_by: Option<String>,
    #[serde(alias = "enabledAt", default)]
    pub enabled_at: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse store document: {0}")]
    Parse(String),
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Allow-list records with `active == true`.
    async fn active_records(&self) -> Result<Vec<AuthorizationRecord>, StoreError>;

    async fn public_access(&self) -> Result<PublicAccessConfig, StoreError>;
}
