use std::time::Duration;

use tracing_subscriber::EnvFilter;

use traceroot_core::clickhouse_store::ClickhouseStore;
use traceroot_core::config::Config;
use traceroot_core::object_store::ObjectStore;
use traceroot_core::queue::TaskQueue;
use traceroot_core::worker;

/// Tasks pulled and processed concurrently per worker process, matching the
/// "prefetch ~4" guidance in the queue contract.
const PREFETCH: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("traceroot_core=debug")))
        .init();

    let config = Config::from_env();
    let worker_id = format!("worker-{}", uuid::Uuid::new_v4());

    let queue = TaskQueue::new(&config.redis_url).await?;
    let object_store = ObjectStore::new(
        config.s3_endpoint_url.as_deref(),
        &config.s3_region,
        &config.s3_bucket,
        config.s3_access_key_id.as_deref(),
        config.s3_secret_access_key.as_deref(),
    )
    .await;
    let ch = ClickhouseStore::new(&config.clickhouse_url, &config.clickhouse_database, &config.clickhouse_user, &config.clickhouse_password);

    tracing::info!(worker_id = %worker_id, "traceroot-worker starting");

    loop {
        match queue.requeue_expired_leases().await {
            Ok(n) if n > 0 => tracing::info!(requeued = n, "requeued tasks with expired leases"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "failed to sweep expired leases"),
        }

        let mut did_work = false;
        for _ in 0..PREFETCH {
            match worker::run_once(&worker_id, &queue, &object_store, &ch).await {
                Ok(true) => did_work = true,
                Ok(false) => break,
                Err(e) => tracing::error!(error = %e, "worker loop iteration failed"),
            }
        }
        if !did_work {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}
