//! Adapter error classification (§4.1).
//!
//! Venue clients surface plain `anyhow::Error`s; this module classifies them
//! by inspecting the error's rendered message for known substrings — the
//! same string-classification technique the original implementation uses
//! (`ccxt.NetworkError` / `'invalid symbol'`, `'symbol not found'`,
//! `'does not exist'`) generalized so it applies uniformly across venues
//! instead of special-casing each one.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    Transient,
    PermanentSymbol,
    Unexpected,
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::PermanentSymbol => write!(f, "permanent_symbol"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "timeout",
    "timed out",
    "nonce",
    "maintenance",
    "ddos",
    "connection reset",
    "connection refused",
    "network",
    "temporarily unavailable",
    "502",
    "503",
    "504",
];

const PERMANENT_SYMBOL_MARKERS: &[&str] = &[
    "invalid symbol",
    "unknown symbol",
    "symbol not found",
    "does not exist",
    "invalid symbol status",
    "unsupported channel",
    "not supported for this symbol",
];

/// Classifies an adapter-surfaced error by message content (§4.1).
pub fn classify(err: &anyhow::Error) -> AdapterErrorKind {
    let message = err
        .chain()
        .map(|e| e.to_string().to_lowercase())
        .collect::<Vec<_>>()
        .join(" | ");

    if PERMANENT_SYMBOL_MARKERS.iter().any(|m| message.contains(m)) {
        return AdapterErrorKind::PermanentSymbol;
    }
    if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        return AdapterErrorKind::Transient;
    }
    AdapterErrorKind::Unexpected
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn classifies_permanent_symbol_errors() {
        assert_eq!(
            classify(&anyhow!("Invalid symbol: LINAUSDT")),
            AdapterErrorKind::PermanentSymbol
        );
        assert_eq!(
            classify(&anyhow!("channel not supported for this symbol")),
            AdapterErrorKind::PermanentSymbol
        );
    }

    #[test]
    fn classifies_transient_errors() {
        assert_eq!(classify(&anyhow!("Request timed out")), AdapterErrorKind::Transient);
        assert_eq!(classify(&anyhow!("429 too many requests")), AdapterErrorKind::Transient);
    }

    #[test]
    fn classifies_unexpected_errors() {
        assert_eq!(classify(&anyhow!("something exploded")), AdapterErrorKind::Unexpected);
    }

    #[test]
    fn permanent_symbol_takes_priority_over_transient_wording() {
        // message that happens to contain both kinds of wording classifies as permanent
        assert_eq!(
            classify(&anyhow!("network error: unknown symbol XYZ")),
            AdapterErrorKind::PermanentSymbol
        );
    }
}
