// src/pipeline/summary.rs
use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::normalize::DiscardReason;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunOutcome {
    #[default]
    Completed,
    /// Readiness probe exhausted its budget; the output store was not touched.
    StoreUnreachable,
    /// Process interrupt arrived mid-run.
    Interrupted,
    /// Unexpected error ended the main loop early.
    Failed(String),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::StoreUnreachable => f.write_str("store unreachable"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Counters for one normalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Raw count taken before the run; `None` when the count failed.
    pub raw_count: Option<u64>,
    pub read: u64,
    pub accepted: u64,
    pub discarded: u64,
    pub discards: BTreeMap<DiscardReason, u64>,
    /// Accepted records the store confirmed.
    pub persisted: u64,
    pub failed_batches: u64,
    /// Output count taken after the run; `None` when the count failed.
    pub output_count: Option<u64>,
}

impl RunSummary {
    pub fn record_discard(&mut self, reason: DiscardReason) {
        self.discarded += 1;
        *self.discards.entry(reason).or_default() += 1;
    }

    /// Accepted records that never reached the output store.
    pub fn not_persisted(&self) -> u64 {
        self.accepted.saturating_sub(self.persisted)
    }

    pub fn log(&self, output_collection: &str) {
        info!("--- normalization summary ---");
        info!(outcome = %self.outcome, "run outcome");
        info!(read = self.read, "raw events read and processed");
        info!(accepted = self.accepted, "valid events transformed (attempted to store)");
        info!(discarded = self.discarded, "events discarded by validation");
        for (reason, n) in &self.discards {
            info!(reason = %reason, count = *n, "discard reason");
        }
        info!(
            persisted = self.persisted,
            not_persisted = self.not_persisted(),
            failed_batches = self.failed_batches,
            "write results"
        );
        match self.output_count {
            Some(n) => info!(collection = output_collection, count = n, "final output count"),
            None => info!(collection = output_collection, "final output count unknown"),
        }
    }
}
