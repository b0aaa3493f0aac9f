//! Firestore REST implementation of [`AuthorizationStore`].
//!
//! Reads the allow-list collection through `documents:runQuery` with an
//! `active == true` field filter, and the public-access override as a single
//! document. A missing override document means public access is disabled.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, time::Duration};
use tracing::{debug, warn};

use super::{AuthorizationRecord, AuthorizationStore, PublicAccessConfig, StoreError};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_collection() -> String {
    "authorizedIPs".to_string()
}

fn default_config_document() -> String {
    "config/publicAccess".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FirestoreSettings {
    pub project_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_config_document")]
    pub config_document: String,
}

pub struct FirestoreStore {
    client: Client,
    documents_url: String,
    collection: String,
    config_document: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl FirestoreStore {
    /// Builds an HTTP client bounded by `timeout` per request.
    pub fn new(settings: &FirestoreSettings, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                settings.base_url.trim_end_matches('/'),
                settings.project_id
            ),
            collection: settings.collection.clone(),
            config_document: settings.config_document.trim_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            bearer_token: settings.bearer_token.clone(),
        })
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }
}

async fn status_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Status { status, body }
}

#[async_trait]
impl AuthorizationStore for FirestoreStore {
    async fn active_records(&self) -> Result<Vec<AuthorizationRecord>, StoreError> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "active" },
                        "op": "EQUAL",
                        "value": { "booleanValue": true }
                    }
                }
            }
        });

        let url = format!("{}:runQuery", self.documents_url);
        let response = self
            .authorize(self.client.post(&url).json(&query))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        let records = decode_query_results(items);
        debug!(collection = %self.collection, count = records.len(), "Fetched active allow-list records");
        Ok(records)
    }

    async fn public_access(&self) -> Result<PublicAccessConfig, StoreError> {
        let url = format!("{}/{}", self.documents_url, self.config_document);
        let response = self.authorize(self.client.get(&url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(document = %self.config_document, "Public access document not found");
            return Ok(PublicAccessConfig::default());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let document: Document = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(decode_public_access(&document))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    string_value: Option<String>,
    boolean_value: Option<bool>,
    timestamp_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl Document {
    fn string(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(|v| v.string_value.clone())
    }

    fn timestamp(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .and_then(|v| v.timestamp_value.clone().or_else(|| v.string_value.clone()))
    }

    fn boolean(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(|v| v.boolean_value)
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

fn decode_record(document: &Document) -> Option<AuthorizationRecord> {
    let Some(ip) = document.string("ip") else {
        warn!(document = %document.name, "Skipping allow-list document without an ip field");
        return None;
    };
    Some(AuthorizationRecord {
        ip,
        kind: document.string("type"),
        description: document.string("description"),
        added_by: document.string("addedBy"),
        active: document.boolean("active").unwrap_or(false),
    })
}

fn decode_query_results(items: Vec<RunQueryItem>) -> Vec<AuthorizationRecord> {
    items
        .into_iter()
        .filter_map(|item| item.document)
        .filter_map(|document| decode_record(&document))
        .filter(|record| record.active)
        .collect()
}

fn decode_public_access(document: &Document) -> PublicAccessConfig {
    PublicAccessConfig {
        enabled: document.boolean("enabled").unwrap_or(false),
        enabled_by: document.string("enabledBy"),
        enabled_at: document.timestamp("enabledAt"),
        reason: document.string("reason"),
    }
}
