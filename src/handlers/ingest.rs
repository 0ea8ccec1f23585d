use std::io::Read;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use flate2::read::GzDecoder;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::object_store::build_ingest_key;
use crate::otlp::decode_to_json;
use crate::queue::IngestTask;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub file_key: String,
}

/// Authenticates the API key, decodes the OTLP body, persists it to the
/// object store and enqueues a reference. The blob is the durability
/// boundary: once it is written, enqueue failure is logged and swallowed
/// rather than surfaced as an error, per the ingestion contract.
pub async fn ingest_traces(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let project_id = authenticate(&state, &headers)?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("empty request body".to_string()));
    }

    let is_gzip = headers.get(axum::http::header::CONTENT_ENCODING).and_then(|v| v.to_str().ok()).map(|v| v.to_lowercase().contains("gzip")).unwrap_or(false);

    let raw = if is_gzip { inflate(&body, state.config.max_gzip_ratio, state.config.max_ingest_body_bytes)? } else { body.to_vec() };

    if raw.is_empty() {
        return Err(ApiError::BadRequest("decompressed body is empty".to_string()));
    }

    let otel_json = decode_to_json(&raw).map_err(|e| ApiError::BadRequest(format!("invalid OTLP payload: {e}")))?;

    let key = build_ingest_key(&project_id);

    state.object_store.ensure_container().await.map_err(|e| ApiError::Internal(e.to_string()))?;
    state.object_store.put_json(&key, &otel_json).await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let task = IngestTask::new(project_id, key.clone());
    if let Err(e) = state.queue.enqueue(&task).await {
        tracing::error!(file_key = %key, error = %e, "failed to enqueue ingest task after successful blob write");
    }

    Ok(Json(IngestResponse { status: "ok", file_key: key }))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let auth = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

    let api_key = auth
        .split_once(' ')
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .ok_or_else(|| ApiError::Unauthorized("Authorization header must be 'Bearer <apiKey>'".to_string()))?;

    if api_key.is_empty() {
        return Err(ApiError::Unauthorized("empty api key".to_string()));
    }

    let hash = hex::encode(Sha256::digest(api_key.as_bytes()));
    let key = state.relational.get_api_key_by_hash(&hash).map_err(ApiError::from)?.ok_or_else(|| ApiError::Unauthorized("unknown api key".to_string()))?;

    if let Some(expires_at) = key.expires_at {
        if expires_at < Utc::now() {
            return Err(ApiError::Unauthorized("api key expired".to_string()));
        }
    }

    let id = key.id.clone();
    let relational = state.relational.clone();
    tokio::spawn(async move {
        if let Err(e) = relational.update_api_key_last_used(&id) {
            tracing::warn!(key_id = %id, error = %e, "failed to record api key last_used_at");
        }
    });

    Ok(key.project_id)
}

/// Inflates a gzip body, aborting once the output would exceed
/// `max_ratio * compressed_len` or `max_bytes`, whichever is smaller — the
/// gzip-bomb defense required by §8.2.
fn inflate(body: &[u8], max_ratio: u64, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    let cap = (body.len() as u64).saturating_mul(max_ratio).min(max_bytes as u64) as usize;
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = decoder.read(&mut chunk).map_err(|e| ApiError::BadRequest(format!("invalid gzip body: {e}")))?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
        if out.len() > cap {
            return Err(ApiError::BadRequest("decompressed body exceeds the allowed gzip ratio".to_string()));
        }
    }
    Ok(out)
}
