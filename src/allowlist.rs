use ipnet::IpNet;
use std::{fmt, net::IpAddr};
use thiserror::Error;

use crate::address::{self, CanonicalAddress};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid IP address or CIDR in allow-list: {0}")]
pub struct EntryError(pub String);

/// One parsed allow-list entry: a single address compared on its canonical
/// form, or a network matched by containment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowEntry {
    Exact {
        raw: String,
        canonical: CanonicalAddress,
    },
    Network {
        raw: String,
        net: IpNet,
    },
}

impl AllowEntry {
    pub fn parse(entry: &str) -> Result<Self, EntryError> {
        let raw = entry.trim();
        if let Some(canonical) = address::normalize(raw) {
            return Ok(Self::Exact {
                raw: raw.to_string(),
                canonical,
            });
        }
        if let Ok(net) = raw.parse::<IpNet>() {
            return Ok(Self::Network {
                raw: raw.to_string(),
                net,
            });
        }
        Err(EntryError(raw.to_string()))
    }

    /// The entry as it was written.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Exact { raw, .. } | Self::Network { raw, .. } => raw,
        }
    }

    /// Checks a canonicalized candidate against this entry.
    #[must_use]
    pub fn matches(&self, candidate: &CanonicalAddress) -> bool {
        match self {
            Self::Exact { canonical, .. } => {
                canonical.class() == candidate.class() && canonical == candidate
            }
            Self::Network { net, .. } => candidate
                .as_str()
                .parse::<IpAddr>()
                .is_ok_and(|ip| net.contains(&ip)),
        }
    }
}

impl fmt::Display for AllowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// Parses every entry, failing on the first one that is neither an address
/// nor a network.
pub fn parse_entries<S: AsRef<str>>(entries: &[S]) -> Result<Vec<AllowEntry>, EntryError> {
    entries
        .iter()
        .map(|entry| AllowEntry::parse(entry.as_ref()))
        .collect()
}
