//! Candidate client address extraction from proxy headers.
//!
//! Every known forwarding header is scanned and each contributes at most one
//! candidate. Matching later is exact, so extraction can afford to be
//! permissive.

use axum::http::HeaderMap;
use std::collections::HashSet;
use std::fmt;
use tracing::trace;

use crate::address::{self, AddressClass};

/// Client address header injected by Netlify's edge.
pub const DEFAULT_PLATFORM_HEADER: &str = "x-nf-client-connection-ip";

/// Headers scanned after the platform header, in priority order.
pub const FORWARDING_HEADERS: [&str; 9] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
    "true-client-ip",
    "x-cluster-client-ip",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
];

/// Where a candidate came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    Header(String),
    Connection,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(name) => f.write_str(name),
            Self::Connection => f.write_str("connection"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Trimmed value as found in the request.
    pub address: String,
    pub class: AddressClass,
    pub source: CandidateSource,
}

/// Returns the leftmost entry of a comma-separated forwarding list.
/// Format: "client, proxy1, proxy2, ..."
#[must_use]
pub fn parse_original_client_ip(header: &str) -> Option<String> {
    header
        .split(',')
        .next()
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty() && !ip.eq_ignore_ascii_case("unknown"))
}

/// Extracts the `for=` node of the first element of an RFC 7239 `Forwarded`
/// header, e.g. `for="[2001:db8::1]:4711";proto=https` gives `2001:db8::1`.
#[must_use]
pub fn parse_forwarded_for(header: &str) -> Option<String> {
    let first = header.split(',').next()?;
    let node = first.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("for")
            .then(|| value.trim().trim_matches('"'))
    })?;

    let host = if let Some(bracketed) = node.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or_default()
    } else if node.matches(':').count() == 1 {
        // ipv4:port
        node.split(':').next().unwrap_or_default()
    } else {
        node
    };

    let host = host.trim();
    (!host.is_empty() && !host.eq_ignore_ascii_case("unknown")).then(|| host.to_string())
}

/// Scans request headers in priority order.
#[derive(Clone, Debug)]
pub struct CandidateExtractor {
    platform_header: String,
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM_HEADER)
    }
}

impl CandidateExtractor {
    #[must_use]
    pub fn new(platform_header: &str) -> Self {
        Self {
            platform_header: platform_header.trim().to_ascii_lowercase(),
        }
    }

    fn header_order(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.platform_header.as_str())
            .chain(FORWARDING_HEADERS.iter().copied().filter(move |h| *h != self.platform_header))
    }

    /// Collects every valid, distinct candidate address in discovery order.
    /// The connection address comes last and only if no header already
    /// produced the same string.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap, fallback: Option<&str>) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for name in self.header_order() {
            let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
                continue;
            };

            let extracted = if name == "forwarded" {
                parse_forwarded_for(value)
            } else {
                parse_original_client_ip(value)
            };
            let Some(address) = extracted else {
                continue;
            };

            let class = address::classify(&address);
            if class == AddressClass::Invalid {
                trace!(header = name, value = %address, "Discarding invalid candidate");
                continue;
            }
            if seen.insert(address.clone()) {
                candidates.push(Candidate {
                    address,
                    class,
                    source: CandidateSource::Header(name.to_string()),
                });
            }
        }

        if let Some(fallback) = fallback.map(str::trim) {
            let class = address::classify(fallback);
            if class != AddressClass::Invalid && seen.insert(fallback.to_string()) {
                candidates.push(Candidate {
                    address: fallback.to_string(),
                    class,
                    source: CandidateSource::Connection,
                });
            }
        }

        candidates
    }
}

/// [`CandidateExtractor::extract`] with the default platform header.
#[must_use]
pub fn extract_candidates(headers: &HeaderMap, fallback: Option<&str>) -> Vec<Candidate> {
    CandidateExtractor::default().extract(headers, fallback)
}
