use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::access::ProjectAccess;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub retention_days: u32,
}

/// GET /projects/{projectId}
pub async fn get_project(State(state): State<AppState>, access: ProjectAccess) -> Result<impl IntoResponse, ApiError> {
    let project = state.relational.get_active_project_by_id(&access.project_id)?.ok_or_else(|| ApiError::NotFound("project not found".to_string()))?;
    Ok(Json(ProjectResponse { id: project.id, org_id: project.org_id, name: project.name, retention_days: project.retention_days }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub retention_days: Option<u32>,
}

/// PATCH /projects/{projectId}
pub async fn update_project(State(state): State<AppState>, access: ProjectAccess, Json(req): Json<UpdateProjectRequest>) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .relational
        .update_project(&access.project_id, req.name.as_deref(), req.retention_days)?
        .ok_or_else(|| ApiError::NotFound("project not found".to_string()))?;
    Ok(Json(ProjectResponse { id: project.id, org_id: project.org_id, name: project.name, retention_days: project.retention_days }))
}

/// DELETE /projects/{projectId}
pub async fn delete_project(State(state): State<AppState>, access: ProjectAccess) -> Result<impl IntoResponse, ApiError> {
    state.relational.soft_delete_project(&access.project_id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
