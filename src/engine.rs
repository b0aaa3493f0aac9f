//! Access decisions over extracted candidates and allow-lists.
//!
//! Precedence: public access, then the hardcoded list, then the dynamic list.
//! Within a list the candidate order is the outer loop, so the first
//! discovered candidate that matches anything wins.

use axum::http::HeaderMap;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::address::{self, CanonicalAddress};
use crate::allowlist::AllowEntry;
use crate::headers::{Candidate, CandidateExtractor};
use crate::store::{AuthorizationRecord, AuthorizationStore, PublicAccessConfig};

pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    IpNotDetected,
    IpNotAuthorized,
    PublicAccessEnabled,
    HardcodedIp,
    #[serde(rename = "FIREBASE_IP")]
    DynamicIp,
}

impl ReasonCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IpNotDetected => "IP_NOT_DETECTED",
            Self::IpNotAuthorized => "IP_NOT_AUTHORIZED",
            Self::PublicAccessEnabled => "PUBLIC_ACCESS_ENABLED",
            Self::HardcodedIp => "HARDCODED_IP",
            Self::DynamicIp => "FIREBASE_IP",
        }
    }

    /// User-facing message (pt-BR).
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::IpNotDetected => "Não foi possível detectar o seu endereço IP.",
            Self::IpNotAuthorized => {
                "Seu endereço IP não está autorizado. Entre em contato com o suporte."
            }
            Self::PublicAccessEnabled => "Acesso público habilitado.",
            Self::HardcodedIp | Self::DynamicIp => "Endereço IP autorizado.",
        }
    }
}

/// The allow-list entry that granted access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchedRecord {
    Hardcoded(AllowEntry),
    Dynamic {
        entry: AllowEntry,
        record: AuthorizationRecord,
    },
}

impl MatchedRecord {
    #[must_use]
    pub const fn entry(&self) -> &AllowEntry {
        match self {
            Self::Hardcoded(entry) | Self::Dynamic { entry, .. } => entry,
        }
    }

    /// The allow-listed address (or network) as written.
    #[must_use]
    pub fn address(&self) -> &str {
        self.entry().raw()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: ReasonCode,
    /// First extracted candidate, kept for display and audit only.
    pub primary: Option<Candidate>,
    pub candidates: Vec<Candidate>,
    pub matched: Option<MatchedRecord>,
}

impl AccessDecision {
    fn new(candidates: Vec<Candidate>, allowed: bool, reason: ReasonCode) -> Self {
        Self {
            allowed,
            reason,
            primary: candidates.first().cloned(),
            candidates,
            matched: None,
        }
    }

    fn with_match(mut self, matched: MatchedRecord) -> Self {
        self.matched = Some(matched);
        self
    }
}

/// Candidate paired with its canonical form, computed once per decision.
struct Normalized<'a> {
    candidate: &'a Candidate,
    canonical: CanonicalAddress,
}

fn first_match<'a, T>(
    source: &str,
    candidates: &[Normalized<'_>],
    entries: &'a [T],
    entry_of: impl Fn(&T) -> &AllowEntry,
) -> Option<&'a T> {
    for normalized in candidates {
        for item in entries {
            let entry = entry_of(item);
            let matched = entry.matches(&normalized.canonical);
            debug!(
                source,
                candidate = %normalized.candidate.address,
                canonical = %normalized.canonical,
                header = %normalized.candidate.source,
                entry = %entry,
                matched,
                "Compared candidate with allow-list entry"
            );
            if matched {
                return Some(item);
            }
        }
    }
    None
}

fn find_match(
    candidates: &[Candidate],
    hardcoded: &[AllowEntry],
    dynamic: &[AuthorizationRecord],
) -> Option<(ReasonCode, MatchedRecord)> {
    let normalized: Vec<Normalized<'_>> = candidates
        .iter()
        .filter_map(|candidate| {
            address::canonicalize(&candidate.address, candidate.class)
                .map(|canonical| Normalized { candidate, canonical })
        })
        .collect();

    if let Some(entry) = first_match("hardcoded", &normalized, hardcoded, |e| e) {
        return Some((ReasonCode::HardcodedIp, MatchedRecord::Hardcoded(entry.clone())));
    }

    let active: Vec<(AllowEntry, &AuthorizationRecord)> = dynamic
        .iter()
        .filter(|record| record.active)
        .filter_map(|record| match AllowEntry::parse(&record.ip) {
            Ok(entry) => Some((entry, record)),
            Err(e) => {
                warn!(error = %e, "Skipping unusable dynamic allow-list record");
                None
            }
        })
        .collect();

    first_match("dynamic", &normalized, &active, |(e, _)| e).map(|(entry, record)| {
        (
            ReasonCode::DynamicIp,
            MatchedRecord::Dynamic {
                entry: entry.clone(),
                record: (*record).clone(),
            },
        )
    })
}

/// Applies the decision policy to already extracted candidates.
///
/// Dynamic records are filtered to `active == true` here regardless of what
/// the store returned; records whose address is unparseable never match.
#[must_use]
pub fn decide_candidates(
    candidates: Vec<Candidate>,
    public_access: &PublicAccessConfig,
    hardcoded: &[AllowEntry],
    dynamic: &[AuthorizationRecord],
) -> AccessDecision {
    if public_access.enabled {
        return AccessDecision::new(candidates, true, ReasonCode::PublicAccessEnabled);
    }
    if candidates.is_empty() {
        return AccessDecision::new(candidates, false, ReasonCode::IpNotDetected);
    }

    match find_match(&candidates, hardcoded, dynamic) {
        Some((reason, matched)) => {
            AccessDecision::new(candidates, true, reason).with_match(matched)
        }
        None => AccessDecision::new(candidates, false, ReasonCode::IpNotAuthorized),
    }
}

/// Extraction plus the static allow-list; the synchronous half of the gate.
#[derive(Clone, Debug, Default)]
pub struct AccessDecisionEngine {
    extractor: CandidateExtractor,
    hardcoded: Vec<AllowEntry>,
}

impl AccessDecisionEngine {
    #[must_use]
    pub fn new(extractor: CandidateExtractor, hardcoded: Vec<AllowEntry>) -> Self {
        Self {
            extractor,
            hardcoded,
        }
    }

    #[must_use]
    pub fn hardcoded(&self) -> &[AllowEntry] {
        &self.hardcoded
    }

    #[must_use]
    pub fn extract_candidates(&self, headers: &HeaderMap, fallback: Option<&str>) -> Vec<Candidate> {
        self.extractor.extract(headers, fallback)
    }

    #[must_use]
    pub fn decide(
        &self,
        headers: &HeaderMap,
        fallback: Option<&str>,
        public_access: &PublicAccessConfig,
        dynamic: &[AuthorizationRecord],
    ) -> AccessDecision {
        decide_candidates(
            self.extract_candidates(headers, fallback),
            public_access,
            &self.hardcoded,
            dynamic,
        )
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("access evaluation aborted: {0}")]
    Aborted(String),
}

/// Store-backed gate. Both external reads run concurrently, each bounded by
/// `store_timeout`; a failed or late read falls back to "public access off"
/// and "no dynamic records".
pub struct AccessGate {
    engine: AccessDecisionEngine,
    store: Arc<dyn AuthorizationStore>,
    store_timeout: Duration,
}

impl AccessGate {
    pub fn new(
        engine: AccessDecisionEngine,
        store: Arc<dyn AuthorizationStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            store_timeout,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &AccessDecisionEngine {
        &self.engine
    }

    async fn fetch_public_access(&self) -> PublicAccessConfig {
        match timeout(self.store_timeout, self.store.public_access()).await {
            Ok(Ok(config)) => config,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read public access config, assuming disabled");
                PublicAccessConfig::default()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Public access config read timed out, assuming disabled"
                );
                PublicAccessConfig::default()
            }
        }
    }

    async fn fetch_dynamic_records(&self) -> Vec<AuthorizationRecord> {
        match timeout(self.store_timeout, self.store.active_records()).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read dynamic allow-list, using hardcoded list only");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Dynamic allow-list read timed out, using hardcoded list only"
                );
                Vec::new()
            }
        }
    }

    /// Evaluates one request. Store failures never surface here.
    #[tracing::instrument(skip_all)]
    pub async fn evaluate(&self, headers: &HeaderMap, fallback: Option<&str>) -> AccessDecision {
        let (public_access, dynamic) =
            tokio::join!(self.fetch_public_access(), self.fetch_dynamic_records());

        let decision = self
            .engine
            .decide(headers, fallback, &public_access, &dynamic);

        info!(
            allowed = decision.allowed,
            reason = decision.reason.as_str(),
            client_ip = decision.primary.as_ref().map_or("-", |c| c.address.as_str()),
            candidates = decision.candidates.len(),
            matched = decision.matched.as_ref().map_or("-", MatchedRecord::address),
            matched_network = decision
                .matched
                .as_ref()
                .is_some_and(|m| matches!(m.entry(), AllowEntry::Network { .. })),
            "Access decision"
        );
        decision
    }

    /// Runs [`Self::evaluate`] on its own task so that a panic anywhere in
    /// evaluation becomes an explicit error instead of a decision.
    pub async fn check(
        self: Arc<Self>,
        headers: HeaderMap,
        fallback: Option<String>,
    ) -> Result<AccessDecision, GateError> {
        tokio::spawn(async move { self.evaluate(&headers, fallback.as_deref()).await })
            .await
            .map_err(|e| GateError::Aborted(e.to_string()))
    }
}
