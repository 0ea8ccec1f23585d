use chrono::{DateTime, Utc};
use clickhouse::Client;
use serde::{Deserialize, Serialize};

use crate::otlp::{SpanRecord, TraceRecord};

fn to_ch_nanos(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or(0)
}

fn to_offset(dt: DateTime<Utc>) -> time::OffsetDateTime {
    time::OffsetDateTime::from_unix_timestamp_nanos(to_ch_nanos(dt) as i128).unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
}

fn from_offset(dt: time::OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()).unwrap_or_default()
}

#[derive(Debug, Serialize, Deserialize, clickhouse::Row)]
struct TraceRow {
    trace_id: String,
    project_id: String,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    trace_start_time: time::OffsetDateTime,
    name: String,
    user_id: Option<String>,
    session_id: Option<String>,
    environment: String,
    input: Option<String>,
    output: Option<String>,
    release: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, clickhouse::Row)]
struct SpanRow {
    span_id: String,
    trace_id: String,
    parent_span_id: Option<String>,
    project_id: String,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    span_start_time: time::OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos::option")]
    span_end_time: Option<time::OffsetDateTime>,
    name: String,
    span_kind: String,
    status: String,
    status_message: Option<String>,
    model_name: Option<String>,
    environment: String,
    input: Option<String>,
    output: Option<String>,
    cost: Option<f64>,
}

/// One row of `list_traces`: a trace joined with span-derived aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, clickhouse::Row)]
pub struct TraceSummaryRow {
    pub trace_id: String,
    pub project_id: String,
    pub name: String,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub trace_start_time: time::OffsetDateTime,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub span_count: u64,
    pub duration_ms: Option<f64>,
    pub status: String,
    pub release: Option<String>,
}

/// A single trace with its full environment/input/output fields.
#[derive(Debug, Clone, Serialize, Deserialize, clickhouse::Row)]
pub struct TraceDetailRow {
    pub trace_id: String,
    pub project_id: String,
    pub name: String,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub trace_start_time: time::OffsetDateTime,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub environment: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub release: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, clickhouse::Row)]
pub struct SpanDetailRow {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub span_kind: String,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos")]
    pub span_start_time: time::OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::nanos::option")]
    pub span_end_time: Option<time::OffsetDateTime>,
    pub status: String,
    pub status_message: Option<String>,
    pub model_name: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub cost: Option<f64>,
}

/// Columnar store adapter: batched writes from the worker, parameterized
/// aggregate reads for the trace query API. Reads always add `FINAL` so a
/// re-delivered, re-processed blob converges to one logical row.
#[derive(Clone)]
pub struct ClickhouseStore {
    client: Client,
}

impl ClickhouseStore {
    pub fn new(url: &str, database: &str, user: &str, password: &str) -> Self {
        let client = Client::default().with_url(url).with_database(database).with_user(user).with_password(password);
        Self { client }
    }

    pub async fn insert_traces_batch(&self, traces: &[TraceRecord]) -> anyhow::Result<()> {
        if traces.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert("traces")?;
        for t in traces {
            insert
                .write(&TraceRow {
                    trace_id: t.trace_id.clone(),
                    project_id: t.project_id.clone(),
                    trace_start_time: to_offset(t.trace_start_time),
                    name: t.name.clone(),
                    user_id: t.user_id.clone(),
                    session_id: t.session_id.clone(),
                    environment: t.environment.clone(),
                    input: t.input.clone(),
                    output: t.output.clone(),
                    release: t.release.clone(),
                })
                .await?;
        }
        insert.end().await?;
        Ok(())
    }

    pub async fn insert_spans_batch(&self, spans: &[SpanRecord]) -> anyhow::Result<()> {
        if spans.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert("spans")?;
        for s in spans {
            insert
                .write(&SpanRow {
                    span_id: s.span_id.clone(),
                    trace_id: s.trace_id.clone(),
                    parent_span_id: s.parent_span_id.clone(),
                    project_id: s.project_id.clone(),
                    span_start_time: to_offset(s.span_start_time),
                    span_end_time: s.span_end_time.map(to_offset),
                    name: s.name.clone(),
                    span_kind: s.span_kind.clone(),
                    status: s.status.clone(),
                    status_message: s.status_message.clone(),
                    model_name: s.model_name.clone(),
                    environment: s.environment.clone(),
                    input: s.input.clone(),
                    output: s.output.clone(),
                    cost: s.cost,
                })
                .await?;
        }
        insert.end().await?;
        Ok(())
    }

    /// Lists traces for a project, newest first, with span-count/duration/
    /// status aggregates computed via a `FINAL`-deduplicated join against
    /// spans. `name_filter` is always passed through `.bind()`, never
    /// interpolated into the query text.
    pub async fn list_traces(&self, project_id: &str, name_filter: Option<&str>, limit: u32, offset: u32) -> anyhow::Result<(Vec<TraceSummaryRow>, u64)> {
        let like = name_filter.map(|n| format!("%{n}%"));

        let base = "FROM traces FINAL t
             LEFT JOIN spans FINAL s ON t.trace_id = s.trace_id AND t.project_id = s.project_id
             WHERE t.project_id = ? AND (? = 0 OR t.name ILIKE ?)";

        let rows = self
            .client
            .query(&format!(
                "SELECT t.trace_id, t.project_id, t.name, t.trace_start_time, t.user_id, t.session_id,
                        count(s.span_id) as span_count,
                        if(min(s.span_start_time) IS NOT NULL AND max(s.span_end_time) IS NOT NULL,
                           dateDiff('millisecond', min(s.span_start_time), max(s.span_end_time)), NULL) as duration_ms,
                        if(countIf(s.status = 'ERROR') > 0, 'error', 'ok') as status,
                        t.release
                 {base}
                 GROUP BY t.trace_id, t.project_id, t.name, t.trace_start_time, t.user_id, t.session_id, t.release
                 ORDER BY t.trace_start_time DESC
                 LIMIT ? OFFSET ?"
            ))
            .bind(project_id)
            .bind(like.is_some() as u8)
            .bind(like.clone().unwrap_or_default())
            .bind(limit)
            .bind(offset)
            .fetch_all::<TraceSummaryRow>()
            .await?;

        let total: u64 = self
            .client
            .query(&format!("SELECT count(DISTINCT t.trace_id) {base}"))
            .bind(project_id)
            .bind(like.is_some() as u8)
            .bind(like.unwrap_or_default())
            .fetch_one()
            .await?;

        Ok((rows, total))
    }

    pub async fn get_trace(&self, project_id: &str, trace_id: &str) -> anyhow::Result<Option<TraceDetailRow>> {
        let mut rows = self
            .client
            .query(
                "SELECT trace_id, project_id, name, trace_start_time, user_id, session_id, environment, input, output, release
                 FROM traces FINAL
                 WHERE project_id = ? AND trace_id = ?
                 LIMIT 1",
            )
            .bind(project_id)
            .bind(trace_id)
            .fetch_all::<TraceDetailRow>()
            .await?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    pub async fn get_spans_for_trace(&self, project_id: &str, trace_id: &str) -> anyhow::Result<Vec<SpanDetailRow>> {
        let rows = self
            .client
            .query(
                "SELECT span_id, trace_id, parent_span_id, name, span_kind, span_start_time, span_end_time,
                        status, status_message, model_name, input, output, cost
                 FROM spans FINAL
                 WHERE project_id = ? AND trace_id = ?
                 ORDER BY span_start_time ASC",
            )
            .bind(project_id)
            .bind(trace_id)
            .fetch_all::<SpanDetailRow>()
            .await?;
        Ok(rows)
    }
}

pub fn offset_to_utc(dt: time::OffsetDateTime) -> DateTime<Utc> {
    from_offset(dt)
}
