//! Crate-level error kinds surfaced at the coordinator boundary (§7).
//!
//! Everything below the coordinator uses `anyhow::Result` with `.context(...)`,
//! matching the teacher's style throughout `scrapers/` and `signals/`; this
//! enum exists only where a caller needs to branch on *kind* rather than just
//! log and move on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("transient adapter error on {venue}/{symbol}: {source}")]
    TransientAdapter {
        venue: String,
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("permanent symbol error on {venue}/{symbol}: {source}")]
    PermanentSymbol {
        venue: String,
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("adapter init failed for venue {venue}: {source}")]
    AdapterInitFailure {
        venue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("snapshot integrity failure on {venue}/{symbol}: {reason}")]
    SnapshotIntegrity {
        venue: String,
        symbol: String,
        reason: String,
    },

    #[error("notifier failed to deliver a batch of {count} {kind} alert(s): {source}")]
    NotifierFailure {
        kind: String,
        count: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("store integrity violation on {venue}/{symbol}, window reset: {reason}")]
    StoreIntegrity {
        venue: String,
        symbol: String,
        reason: String,
    },
}
