use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::access::ProjectAccess;
use crate::clickhouse_store::offset_to_utc;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListTracesQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub name: Option<String>,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub project_id: String,
    pub name: String,
    pub trace_start_time: chrono::DateTime<chrono::Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub span_count: u64,
    pub duration_ms: Option<f64>,
    pub status: String,
    pub release: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListTracesMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct ListTracesResponse {
    pub data: Vec<TraceSummary>,
    pub meta: ListTracesMeta,
}

/// GET /projects/{project_id}/traces
pub async fn list_traces(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    access: ProjectAccess,
    Query(q): Query<ListTracesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let _ = access;
    let limit = q.limit.clamp(1, 100);
    let offset = q.page.saturating_mul(limit);

    let (rows, total) = state.ch.list_traces(&project_id, q.name.as_deref(), limit, offset).await?;

    let data = rows
        .into_iter()
        .map(|r| TraceSummary {
            trace_id: r.trace_id,
            project_id: r.project_id,
            name: r.name,
            trace_start_time: offset_to_utc(r.trace_start_time),
            user_id: r.user_id,
            session_id: r.session_id,
            span_count: r.span_count,
            duration_ms: r.duration_ms,
            status: r.status,
            release: r.release,
        })
        .collect();

    Ok(Json(ListTracesResponse {
        data,
        meta: ListTracesMeta { page: q.page, limit, total },
    }))
}

#[derive(Debug, Serialize)]
pub struct SpanDetail {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub span_kind: String,
    pub span_start_time: chrono::DateTime<chrono::Utc>,
    pub span_end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub status: String,
    pub status_message: Option<String>,
    pub model_name: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub cost: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct TraceDetail {
    pub trace_id: String,
    pub project_id: String,
    pub name: String,
    pub trace_start_time: chrono::DateTime<chrono::Utc>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub environment: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub release: Option<String>,
    pub spans: Vec<SpanDetail>,
}

/// GET /projects/{project_id}/traces/{trace_id}
pub async fn get_trace(
    State(state): State<AppState>,
    Path((project_id, trace_id)): Path<(String, String)>,
    access: ProjectAccess,
) -> Result<impl IntoResponse, ApiError> {
    let _ = access;

    let Some(trace) = state.ch.get_trace(&project_id, &trace_id).await? else {
        return Err(ApiError::NotFound("trace not found".to_string()));
    };
    let spans = state.ch.get_spans_for_trace(&project_id, &trace_id).await?;

    Ok(Json(TraceDetail {
        trace_id: trace.trace_id,
        project_id: trace.project_id,
        name: trace.name,
        trace_start_time: offset_to_utc(trace.trace_start_time),
        user_id: trace.user_id,
        session_id: trace.session_id,
        environment: trace.environment,
        input: trace.input,
        output: trace.output,
        release: trace.release,
        spans: spans
            .into_iter()
            .map(|s| SpanDetail {
                span_id: s.span_id,
                trace_id: s.trace_id,
                parent_span_id: s.parent_span_id,
                name: s.name,
                span_kind: s.span_kind,
                span_start_time: offset_to_utc(s.span_start_time),
                span_end_time: s.span_end_time.map(offset_to_utc),
                status: s.status,
                status_message: s.status_message,
                model_name: s.model_name,
                input: s.input,
                output: s.output,
                cost: s.cost,
            })
            .collect(),
    }))
}
