use clickhouse::Client;

/// Ordered list of DDL statements for the traces/spans columnar schema.
/// Every statement is idempotent (`IF NOT EXISTS`), safe to run on every
/// startup. `traces` and `spans` are `ReplacingMergeTree`s versioned by
/// `ch_update_time`, keyed so repeated delivery of the same logical record
/// converges to one row once `FINAL` is applied on read.
const MIGRATIONS: &[&str] = &[
    "CREATE DATABASE IF NOT EXISTS traceroot",
    r"CREATE TABLE IF NOT EXISTS traceroot.traces
(
    trace_id          String,
    project_id        String,
    trace_start_time  DateTime64(9, 'UTC'),
    name              String,
    user_id           Nullable(String),
    session_id        Nullable(String),
    environment       LowCardinality(String),
    input             Nullable(String),
    output            Nullable(String),
    release           Nullable(String),
    ch_create_time    DateTime64(9, 'UTC') DEFAULT now64(9),
    ch_update_time    DateTime64(9, 'UTC') DEFAULT now64(9),
    INDEX idx_trace_id trace_id TYPE bloom_filter(0.001) GRANULARITY 1
)
ENGINE = ReplacingMergeTree(ch_update_time)
PARTITION BY toDate(trace_start_time)
ORDER BY (project_id, trace_id)
SETTINGS index_granularity = 8192",

    r"CREATE TABLE IF NOT EXISTS traceroot.spans
(
    span_id           String,
    trace_id          String,
    parent_span_id    Nullable(String),
    project_id        String,
    span_start_time   DateTime64(9, 'UTC'),
    span_end_time     Nullable(DateTime64(9, 'UTC')),
    name              String,
    span_kind         LowCardinality(String),
    status            LowCardinality(String),
    status_message    Nullable(String),
    model_name        Nullable(String),
    environment       LowCardinality(String),
    input             Nullable(String),
    output            Nullable(String),
    cost              Nullable(Float64),
    ch_create_time    DateTime64(9, 'UTC') DEFAULT now64(9),
    ch_update_time    DateTime64(9, 'UTC') DEFAULT now64(9),
    INDEX idx_trace_id trace_id TYPE bloom_filter(0.001) GRANULARITY 1
)
ENGINE = ReplacingMergeTree(ch_update_time)
PARTITION BY toDate(span_start_time)
ORDER BY (project_id, trace_id, span_id)
SETTINGS index_granularity = 8192",
];

/// Runs all migrations against ClickHouse. Connects without a default
/// database so `CREATE DATABASE` succeeds against a fresh instance.
pub async fn run(url: &str, user: &str, password: &str) -> anyhow::Result<()> {
    let client = Client::default().with_url(url).with_user(user).with_password(password);

    tracing::info!("running clickhouse migrations ({} statements)", MIGRATIONS.len());

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let preview: String = sql.chars().take(80).collect();
        tracing::debug!("migration {}/{}: {}...", i + 1, MIGRATIONS.len(), preview);
        client.query(sql).execute().await.map_err(|e| {
            tracing::error!("migration {}/{} failed: {e}", i + 1, MIGRATIONS.len());
            e
        })?;
    }

    tracing::info!("clickhouse migrations complete");
    Ok(())
}
