use async_trait::async_trait;
use std::sync::RwLock;

use super::{AuthorizationRecord, AuthorizationStore, PublicAccessConfig, StoreError};

/// In-process store, mutable at runtime. An empty one is what the gate uses
/// when no dynamic source is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<AuthorizationRecord>>,
    public_access: RwLock<PublicAccessConfig>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_records(records: Vec<AuthorizationRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            public_access: RwLock::default(),
        }
    }

    pub fn add_record(&self, record: AuthorizationRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .push(record);
        Ok(())
    }

    pub fn set_public_access(&self, config: PublicAccessConfig) -> Result<(), StoreError> {
        *self
            .public_access
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))? = config;
        Ok(())
    }
}

#[async_trait]
impl AuthorizationStore for MemoryStore {
    async fn active_records(&self) -> Result<Vec<AuthorizationRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(records.iter().filter(|r| r.active).cloned().collect())
    }

    async fn public_access(&self) -> Result<PublicAccessConfig, StoreError> {
        self.public_access
            .read()
            .map(|config| config.clone())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
