use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use super::{AuthorizationRecord, AuthorizationStore, PublicAccessConfig, StoreError};

#[derive(Debug, Default, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    public_access: PublicAccessConfig,
    #[serde(default)]
    authorized_ips: Vec<AuthorizationRecord>,
}

/// TOML document on disk, re-read on every access so edits apply without a
/// restart.
///
/// ```toml
/// [public_access]
/// enabled = false
///
/// [[authorized_ips]]
/// ip = "203.0.113.7"
/// type = "ipv4"
/// description = "Office"
/// added_by = "admin@example.com"
/// active = true
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| StoreError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
        toml::from_str(&content).map_err(|e| StoreError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AuthorizationStore for FileStore {
    async fn active_records(&self) -> Result<Vec<AuthorizationRecord>, StoreError> {
        let document = self.load().await?;
        Ok(document
            .authorized_ips
            .into_iter()
            .filter(|r| r.active)
            .collect())
    }

    async fn public_access(&self) -> Result<PublicAccessConfig, StoreError> {
        Ok(self.load().await?.public_access)
    }
}
