use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::ProjectAccess;
use crate::error::ApiError;
use crate::relational::models::Role;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub id: String,
    pub name: String,
    pub key: String,
    pub key_prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub key_prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// POST /projects/{projectId}/api-keys — requires ADMIN. The plaintext key
/// is returned exactly once, here; nothing else ever re-derives it.
pub async fn create_api_key(State(state): State<AppState>, access: ProjectAccess, Json(req): Json<CreateApiKeyRequest>) -> Result<impl IntoResponse, ApiError> {
    if access.role.level() < Role::Admin.level() {
        return Err(ApiError::Forbidden("requires at least role admin".to_string()));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let created = state.relational.create_api_key(&access.project_id, req.name.trim(), req.expires_at)?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(ApiKeyCreatedResponse {
            id: created.key.id,
            name: created.key.name,
            key: created.secret,
            key_prefix: created.key.key_prefix,
            expires_at: created.key.expires_at,
            created_at: created.key.created_at,
        }),
    ))
}

/// GET /projects/{projectId}/api-keys — only the prefix is ever returned
/// after creation.
pub async fn list_api_keys(State(state): State<AppState>, access: ProjectAccess) -> Result<impl IntoResponse, ApiError> {
    let keys = state.relational.list_api_keys_by_project(&access.project_id)?;
    let data: Vec<ApiKeyResponse> = keys
        .into_iter()
        .map(|k| ApiKeyResponse { id: k.id, name: k.name, key_prefix: k.key_prefix, expires_at: k.expires_at, last_used_at: k.last_used_at, created_at: k.created_at })
        .collect();
    Ok(Json(data))
}

/// DELETE /projects/{projectId}/api-keys/{keyId} — requires ADMIN.
pub async fn delete_api_key(State(state): State<AppState>, access: ProjectAccess, axum::extract::Path((_project_id, key_id)): axum::extract::Path<(String, String)>) -> Result<impl IntoResponse, ApiError> {
    if access.role.level() < Role::Admin.level() {
        return Err(ApiError::Forbidden("requires at least role admin".to_string()));
    }

    let key = state.relational.get_api_key_by_id(&key_id)?.ok_or_else(|| ApiError::NotFound("api key not found".to_string()))?;
    if key.project_id != access.project_id {
        return Err(ApiError::NotFound("api key not found".to_string()));
    }

    state.relational.delete_api_key(&key_id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
