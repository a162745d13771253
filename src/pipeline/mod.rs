// src/pipeline/mod.rs
//! Normalization run: raw collection in, homogeneous collection out.
//!
//! The output collection is cleared and rebuilt on every run. Per-record
//! problems end at the validator and per-batch problems end at the flush;
//! anything else stops the loop, but the cursor is still released and the
//! summary is still produced.

pub mod summary;

use std::future::Future;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::normalize;
use crate::store::{
    best_effort_count, wait_for_store, Document, DocumentCursor, DocumentStore, StoreError,
};
pub use summary::{RunOutcome, RunSummary};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_records_read_total", "Raw records read from the cursor.");
        describe_counter!(
            "pipeline_records_accepted_total",
            "Raw records that passed validation."
        );
        describe_counter!(
            "pipeline_records_discarded_total",
            "Raw records discarded, labelled by reason."
        );
        describe_counter!(
            "pipeline_records_persisted_total",
            "Normalized records confirmed by the output store."
        );
        describe_counter!("pipeline_batches_failed_total", "Bulk inserts that errored.");
        describe_histogram!("pipeline_flush_ms", "Bulk insert duration in milliseconds.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when the normalization pipeline last finished."
        );
    });
}

pub struct Pipeline<'a, S: DocumentStore + ?Sized> {
    cfg: &'a PipelineConfig,
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> Pipeline<'a, S> {
    pub fn new(cfg: &'a PipelineConfig, store: &'a S) -> Self {
        Self { cfg, store }
    }

    /// Run to completion.
    pub async fn run(&self) -> RunSummary {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until the raw collection is exhausted or `shutdown` resolves.
    /// Never fails: the outcome is part of the returned summary.
    pub async fn run_until<F>(&self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        ensure_metrics_described();
        let mut summary = RunSummary::default();

        // Polled from here on so an interrupt during startup is not lost.
        tokio::pin!(shutdown);

        let ready = tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("interrupt received while waiting for the store; output untouched");
                summary.outcome = RunOutcome::Interrupted;
                summary.log(&self.cfg.output_collection);
                return summary;
            }
            ready = wait_for_store(
                self.store,
                self.cfg.startup_retry_count,
                self.cfg.retry_interval(),
            ) => ready,
        };
        if !ready {
            summary.outcome = RunOutcome::StoreUnreachable;
            summary.log(&self.cfg.output_collection);
            return summary;
        }

        let started = Instant::now();
        let mut cursor: Option<Box<dyn DocumentCursor>> = None;
        match self.drive(&mut cursor, &mut summary, &mut shutdown).await {
            Ok(outcome) => summary.outcome = outcome,
            Err(e) => {
                error!(error = ?e, read = summary.read, "normalization run aborted");
                summary.outcome = RunOutcome::Failed(e.to_string());
            }
        }

        if let Some(mut c) = cursor.take() {
            match c.close().await {
                Ok(()) => debug!("raw cursor closed"),
                Err(e) => error!(error = %e, "failed to close raw cursor"),
            }
        }

        summary.output_count = best_effort_count(self.store, &self.cfg.output_collection).await;
        gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "normalization run finished");
        summary.log(&self.cfg.output_collection);
        summary
    }

    async fn drive<F>(
        &self,
        cursor_slot: &mut Option<Box<dyn DocumentCursor>>,
        summary: &mut RunSummary,
        mut shutdown: F,
    ) -> Result<RunOutcome, StoreError>
    where
        F: Future<Output = ()> + Unpin,
    {
        let cfg = self.cfg;
        let batch_size = cfg.batch_size;

        summary.raw_count = best_effort_count(self.store, &cfg.raw_collection).await;
        match summary.raw_count {
            Some(n) => info!(collection = %cfg.raw_collection, raw = n, "raw events to process"),
            None => info!(collection = %cfg.raw_collection, "raw event count unknown"),
        }

        info!(collection = %cfg.output_collection, "clearing output collection");
        let removed = self.store.delete_all(&cfg.output_collection).await?;
        debug!(removed, "output collection cleared");

        let cursor = cursor_slot.insert(self.store.cursor(&cfg.raw_collection, batch_size).await?);
        let mut buffer: Vec<Document> = Vec::with_capacity(batch_size);

        loop {
            let batch = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!(
                        read = summary.read,
                        buffered = buffer.len(),
                        "interrupt received; stopping normalization run"
                    );
                    return Ok(RunOutcome::Interrupted);
                }
                next = cursor.next_batch() => next?,
            };
            let Some(batch) = batch else { break };

            for doc in batch {
                summary.read += 1;
                counter!("pipeline_records_read_total").increment(1);

                match normalize::transform_document(&doc) {
                    Ok(ev) => {
                        buffer.push(ev.to_document()?);
                        summary.accepted += 1;
                        counter!("pipeline_records_accepted_total").increment(1);
                    }
                    Err(reason) => {
                        summary.record_discard(reason);
                        counter!("pipeline_records_discarded_total", "reason" => reason.as_str())
                            .increment(1);
                    }
                }

                if buffer.len() >= batch_size {
                    self.flush(&mut buffer, summary, false).await;
                }

                if progress_due(summary.read, batch_size) {
                    info!(
                        read = summary.read,
                        accepted = summary.accepted,
                        discarded = summary.discarded,
                        "progress"
                    );
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer, summary, true).await;
        }
        Ok(RunOutcome::Completed)
    }

    /// Write the buffer as one unordered bulk insert. The buffer is always
    /// emptied; a failed batch is logged and not retried.
    async fn flush(&self, buffer: &mut Vec<Document>, summary: &mut RunSummary, last: bool) {
        let docs = std::mem::replace(buffer, Vec::with_capacity(self.cfg.batch_size));
        let attempted = docs.len() as u64;
        let t0 = Instant::now();
        let collection = self.cfg.output_collection.as_str();

        match self.store.bulk_insert_unordered(collection, docs).await {
            Ok(inserted) => {
                summary.persisted += inserted;
                counter!("pipeline_records_persisted_total").increment(inserted);
                info!(collection, inserted, final_batch = last, "batch inserted");
            }
            Err(StoreError::BulkWrite {
                inserted,
                failed,
                message,
            }) => {
                summary.persisted += inserted;
                summary.failed_batches += 1;
                counter!("pipeline_records_persisted_total").increment(inserted);
                counter!("pipeline_batches_failed_total").increment(1);
                error!(
                    collection,
                    attempted, inserted, failed, final_batch = last, %message,
                    "batch partially inserted"
                );
            }
            Err(e) => {
                summary.failed_batches += 1;
                counter!("pipeline_batches_failed_total").increment(1);
                error!(
                    collection,
                    attempted, final_batch = last, error = ?e,
                    "batch insert failed; batch dropped"
                );
            }
        }

        histogram!("pipeline_flush_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    }
}

/// Progress is logged every two batches' worth of records read.
fn progress_due(read: u64, batch_size: usize) -> bool {
    let every = (batch_size as u64).saturating_mul(2).max(1);
    read > 0 && read % every == 0
}

#[cfg(test)]
mod tests {
    use super::progress_due;

    #[test]
    fn progress_fires_every_two_batches() {
        let fired: Vec<u64> = (0..=25).filter(|&n| progress_due(n, 5)).collect();
        assert_eq!(fired, vec![10, 20]);
    }

    #[test]
    fn progress_with_degenerate_batch_size() {
        assert!(progress_due(1, 0));
        assert!(progress_due(2, 1));
        assert!(!progress_due(3, 1));
        assert!(!progress_due(0, 1000));
    }
}
