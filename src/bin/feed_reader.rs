//! Feed reader — polls the georss endpoint and appends raw events until the
//! configured limit is reached or the process is interrupted.

use traffic_normalizer::config::{FeedConfig, PipelineConfig};
use traffic_normalizer::feed::{run_feed_reader, GeoRssClient};
use traffic_normalizer::store::{wait_for_store, DocumentStore, SqliteStore};
use traffic_normalizer::telemetry;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let store_cfg = PipelineConfig::load_default()?;
    let feed_cfg = FeedConfig::load_default()?;
    if let Some(addr) = store_cfg.metrics_addr {
        if let Err(e) = telemetry::install_metrics_exporter(addr) {
            warn!(error = ?e, "metrics exporter not started");
        }
    }

    let store = SqliteStore::connect_lazy(&store_cfg.store_address, &store_cfg.database_name)?;
    if !wait_for_store(
        &store,
        store_cfg.startup_retry_count,
        store_cfg.retry_interval(),
    )
    .await
    {
        error!("document store unreachable; feed reader not started");
        store.close().await;
        std::process::exit(1);
    }

    let client = GeoRssClient::new(&feed_cfg)?;
    info!(url = client.url(), "feed reader configured");

    let appended = run_feed_reader(
        &feed_cfg,
        &client,
        &store,
        &store_cfg.raw_collection,
        traffic_normalizer::shutdown_signal(),
    )
    .await;
    store.close().await;

    info!(appended, "feed reader done");
    Ok(())
}
