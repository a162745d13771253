// src/lib.rs
// Public library surface for both binaries and the integration tests.

pub mod config;
pub mod feed;
pub mod normalize;
pub mod pipeline;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::normalize::{normalize_document, DiscardReason, HomogeneousEvent};
pub use crate::pipeline::{Pipeline, RunOutcome, RunSummary};
pub use crate::store::{Document, DocumentStore, MemoryStore, SqliteStore};

/// Resolves on Ctrl-C. If the signal handler cannot be installed it never
/// resolves, so a run is not cut short by the failure.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
