//! Normalization run — binary entrypoint.
//! Loads config, opens the document store, rebuilds the homogeneous
//! collection once and exits. Ctrl-C ends the run through the normal
//! cleanup-and-summary path.

use traffic_normalizer::config::PipelineConfig;
use traffic_normalizer::pipeline::{Pipeline, RunOutcome};
use traffic_normalizer::store::{DocumentStore, SqliteStore};
use traffic_normalizer::telemetry;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = PipelineConfig::load_default()?;
    if let Some(addr) = cfg.metrics_addr {
        if let Err(e) = telemetry::install_metrics_exporter(addr) {
            warn!(error = ?e, "metrics exporter not started");
        }
    }

    info!(
        store = %cfg.store_address,
        raw = %cfg.raw_collection,
        output = %cfg.output_collection,
        batch_size = cfg.batch_size,
        "starting normalization run"
    );

    let store = SqliteStore::connect_lazy(&cfg.store_address, &cfg.database_name)?;
    let summary = Pipeline::new(&cfg, &store)
        .run_until(traffic_normalizer::shutdown_signal())
        .await;
    store.close().await;

    match summary.outcome {
        RunOutcome::Completed => info!("normalization finished"),
        ref other => warn!(outcome = %other, "normalization ended early"),
    }
    Ok(())
}
