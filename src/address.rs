//! Address classification and canonical forms.
//!
//! Two spellings of the same network address must compare equal: zero
//! padding, `::` compression, letter case and the IPv4-mapped IPv6 notation
//! (`::ffff:a.b.c.d`) all collapse to one [`CanonicalAddress`].

use std::fmt;

/// Family of a textual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressClass {
    Ipv4,
    Ipv6,
    Invalid,
}

impl AddressClass {
    /// Label used in responses (`"ipv4"` / `"ipv6"`), `None` for invalid input.
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self {
            Self::Ipv4 => Some("ipv4"),
            Self::Ipv6 => Some("ipv6"),
            Self::Invalid => None,
        }
    }
}

/// Normalized, comparable form of a valid address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Family of the canonical form. An IPv4-mapped IPv6 input reports `Ipv4`
    /// here since it canonicalizes to the embedded dotted quad.
    #[must_use]
    pub fn class(&self) -> AddressClass {
        classify(&self.0)
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classifies a raw address string. Surrounding whitespace is ignored.
#[must_use]
pub fn classify(raw: &str) -> AddressClass {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        AddressClass::Invalid
    } else if is_ipv4(trimmed) {
        AddressClass::Ipv4
    } else if is_ipv6(trimmed) {
        AddressClass::Ipv6
    } else {
        AddressClass::Invalid
    }
}

/// Classifies an optional input; absent input is `Invalid`.
#[must_use]
pub fn classify_opt(raw: Option<&str>) -> AddressClass {
    raw.map_or(AddressClass::Invalid, classify)
}

/// Produces the canonical form of `raw` given its class.
///
/// Returns `None` for `AddressClass::Invalid`.
#[must_use]
pub fn canonicalize(raw: &str, class: AddressClass) -> Option<CanonicalAddress> {
    let trimmed = raw.trim();
    match class {
        AddressClass::Ipv4 => Some(CanonicalAddress(trimmed.to_string())),
        AddressClass::Ipv6 => Some(CanonicalAddress(canonical_ipv6(trimmed))),
        AddressClass::Invalid => None,
    }
}

/// Classifies and canonicalizes in one step.
#[must_use]
pub fn normalize(raw: &str) -> Option<CanonicalAddress> {
    canonicalize(raw, classify(raw))
}

/// True when `a` and `b` denote the same address.
///
/// Classes are compared after canonicalization, so `::ffff:192.168.1.1`
/// equals `192.168.1.1`.
#[must_use]
pub fn equals(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a.class() == b.class() && a == b,
        _ => false,
    }
}

fn is_ipv4(s: &str) -> bool {
    let mut octets = 0;
    for part in s.split('.') {
        octets += 1;
        if octets > 4 || part.is_empty() || part.len() > 3 {
            return false;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match part.parse::<u16>() {
            Ok(value) if value <= 255 => {}
            _ => return false,
        }
    }
    octets == 4
}

fn is_hex_group(group: &str) -> bool {
    (1..=4).contains(&group.len()) && group.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_ipv6(s: &str) -> bool {
    if !s
        .bytes()
        .all(|b| b.is_ascii_hexdigit() || b == b':' || b == b'.')
    {
        return false;
    }

    if s == "::" || s.eq_ignore_ascii_case("::1") {
        return true;
    }

    if let Some(rest) = strip_prefix_ignore_case(s, "::ffff:") {
        if is_ipv4(rest) {
            return true;
        }
    }

    let groups: Vec<&str> = s.split(':').collect();
    if groups.len() == 8 && valid_groups(&groups) {
        return true;
    }

    // Anything else carrying a single `::` compression with at most seven
    // explicit groups is accepted, including forms a strict parser would
    // reject; matching stays exact on the canonical form. A dotted quad may
    // only close the right-hand side, where it stays the final group once
    // the compression is expanded.
    if s.matches("::").count() != 1 || s.contains(":::") {
        return false;
    }
    let Some((left, right)) = s.split_once("::") else {
        return false;
    };
    let left: Vec<&str> = left.split(':').filter(|g| !g.is_empty()).collect();
    let right: Vec<&str> = right.split(':').filter(|g| !g.is_empty()).collect();
    left.len() + right.len() <= 7
        && left.iter().all(|g| is_hex_group(g))
        && valid_groups(&right)
}

/// Hex groups, with an optional dotted quad in the last position.
fn valid_groups(groups: &[&str]) -> bool {
    let last = groups.len().saturating_sub(1);
    groups
        .iter()
        .enumerate()
        .all(|(i, g)| is_hex_group(g) || (i == last && is_ipv4(g)))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn pad_group(group: &str) -> String {
    format!("{group:0>4}")
}

fn canonical_ipv6(trimmed: &str) -> String {
    let lower = trimmed.to_ascii_lowercase();

    if let Some(embedded) = lower.strip_prefix("::ffff:") {
        if is_ipv4(embedded) {
            return embedded.to_string();
        }
    }

    if let Some((left, right)) = lower.split_once("::") {
        let left: Vec<&str> = left.split(':').filter(|g| !g.is_empty()).collect();
        let right: Vec<&str> = right.split(':').filter(|g| !g.is_empty()).collect();
        let missing = 8usize.saturating_sub(left.len() + right.len());

        return left
            .iter()
            .map(|g| pad_group(g))
            .chain(std::iter::repeat_n("0000".to_string(), missing))
            .chain(right.iter().map(|g| pad_group(g)))
            .collect::<Vec<_>>()
            .join(":");
    }

    let groups: Vec<&str> = lower.split(':').collect();
    if groups.len() == 8 {
        return groups
            .iter()
            .map(|g| pad_group(g))
            .collect::<Vec<_>>()
            .join(":");
    }

    lower
}
