// src/store/readiness.rs
use std::time::Duration;

use tracing::{error, info, warn};

use super::DocumentStore;

/// Probe the store until it answers or `attempts` probes have failed.
/// Sleeps `interval` between failed probes. Returns whether the store is usable.
pub async fn wait_for_store<S: DocumentStore + ?Sized>(
    store: &S,
    attempts: u32,
    interval: Duration,
) -> bool {
    info!("checking document store reachability");
    for attempt in 1..=attempts {
        match store.health_check().await {
            Ok(()) => {
                info!(attempt, "document store reachable");
                return true;
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "waiting for document store");
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    error!(attempts, "document store did not respond in time");
    false
}
