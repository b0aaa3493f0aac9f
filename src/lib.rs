//! IP Access Gate
//!
//! Decides whether a request may proceed based on its client address. Candidate
//! addresses are collected from every known proxy header, normalized to a
//! canonical form and matched exactly against a hardcoded allow-list and a
//! dynamic allow-list read from an external store, with a public-access
//! override on top.

pub mod address;
pub mod allowlist;
pub mod config;
pub mod engine;
pub mod headers;
pub mod router;
pub mod store;

// Re-export commonly used types and functions
pub use address::{AddressClass, CanonicalAddress, canonicalize, classify, equals, normalize};
pub use allowlist::{AllowEntry, EntryError};
pub use config::{Config, ResponseMode, StoreConfig, load_config, load_config_from};
pub use engine::{
    AccessDecision, AccessDecisionEngine, AccessGate, GateError, MatchedRecord, ReasonCode,
    decide_candidates,
};
pub use headers::{Candidate, CandidateExtractor, CandidateSource, extract_candidates};
pub use router::{AppState, VerifyResponse, build_router};
pub use store::{
    AuthorizationRecord, AuthorizationStore, FileStore, FirestoreStore, MemoryStore,
    PublicAccessConfig, StoreError,
};
