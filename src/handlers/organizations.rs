use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::access::{CurrentUser, OrgMembership, RequireOrgRole};
use crate::error::ApiError;
use crate::relational::models::Role;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    pub id: String,
    pub name: String,
    pub role: String,
}

/// POST /organizations — any authenticated user may create one; they become
/// its sole `OWNER`.
pub async fn create_organization(State(state): State<AppState>, CurrentUser(user): CurrentUser, Json(req): Json<CreateOrganizationRequest>) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let org = state.relational.create_organization(req.name.trim())?;
    state.relational.add_member(&org.id, &user.id, Role::Owner)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrganizationResponse { id: org.id, name: org.name, role: Role::Owner.as_str().to_string() }),
    ))
}

/// GET /organizations — organizations the caller belongs to, with role.
pub async fn list_organizations(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<impl IntoResponse, ApiError> {
    let orgs = state.relational.list_organizations_by_user(&user.id)?;
    let data: Vec<OrganizationResponse> = orgs.into_iter().map(|(org, role)| OrganizationResponse { id: org.id, name: org.name, role }).collect();
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrganizationRequest {
    pub name: String,
}

/// PATCH /organizations/{orgId} — requires ADMIN.
pub async fn update_organization(State(state): State<AppState>, access: RequireOrgRole<3>, Json(req): Json<UpdateOrganizationRequest>) -> Result<impl IntoResponse, ApiError> {
    let org_id = access.0.org_id.clone();
    let org = state.relational.update_organization(&org_id, req.name.trim())?.ok_or_else(|| ApiError::NotFound("organization not found".to_string()))?;
    Ok(Json(OrganizationResponse { id: org.id, name: org.name, role: access.0.role.as_str().to_string() }))
}

/// DELETE /organizations/{orgId} — requires OWNER.
pub async fn delete_organization(State(state): State<AppState>, access: RequireOrgRole<4>) -> Result<impl IntoResponse, ApiError> {
    state.relational.delete_organization(&access.0.org_id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

/// GET /organizations/{orgId}/members
pub async fn list_members(State(state): State<AppState>, access: OrgMembership) -> Result<impl IntoResponse, ApiError> {
    let members = state.relational.list_members_by_org(&access.org_id)?;
    let data: Vec<MemberResponse> = members.into_iter().map(|m| MemberResponse { user_id: m.user_id, email: m.email, name: m.name, role: m.role }).collect();
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    pub role: String,
}

/// POST /organizations/{orgId}/members — requires ADMIN. Owners can only be
/// created at org creation or via a role promotion, never directly here.
pub async fn add_member(State(state): State<AppState>, access: RequireOrgRole<3>, Json(req): Json<AddMemberRequest>) -> Result<impl IntoResponse, ApiError> {
    let role = Role::parse(&req.role).ok_or_else(|| ApiError::BadRequest(format!("invalid role: {}", req.role)))?;
    if role == Role::Owner {
        return Err(ApiError::BadRequest("cannot add a member directly as owner".to_string()));
    }
    state.relational.add_member(&access.0.org_id, &req.user_id, role)?;
    Ok(axum::http::StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: String,
}

/// PATCH /organizations/{orgId}/members/{userId} — requires ADMIN.
pub async fn update_member_role(
    State(state): State<AppState>,
    access: RequireOrgRole<3>,
    axum::extract::Path((_org_id, user_id)): axum::extract::Path<(String, String)>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = Role::parse(&req.role).ok_or_else(|| ApiError::BadRequest(format!("invalid role: {}", req.role)))?;
    state.relational.update_member_role(&access.0.org_id, &user_id, role)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// DELETE /organizations/{orgId}/members/{userId} — requires ADMIN.
pub async fn remove_member(
    State(state): State<AppState>,
    access: RequireOrgRole<3>,
    axum::extract::Path((_org_id, user_id)): axum::extract::Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.relational.remove_member(&access.0.org_id, &user_id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// POST /organizations/{orgId}/invitations — requires ADMIN. No email is
/// sent; the row is polled by an external notifier.
pub async fn create_invitation(State(state): State<AppState>, access: RequireOrgRole<3>, Json(req): Json<CreateInvitationRequest>) -> Result<impl IntoResponse, ApiError> {
    let role = Role::parse(&req.role).ok_or_else(|| ApiError::BadRequest(format!("invalid role: {}", req.role)))?;
    let invitation = state.relational.create_invitation(&access.0.org_id, req.email.trim(), role)?;
    Ok((axum::http::StatusCode::CREATED, Json(InvitationResponse { id: invitation.id, email: invitation.email, role: invitation.role })))
}

/// GET /organizations/{orgId}/invitations
pub async fn list_invitations(State(state): State<AppState>, access: OrgMembership) -> Result<impl IntoResponse, ApiError> {
    let invitations = state.relational.list_invitations_by_org(&access.org_id)?;
    let data: Vec<InvitationResponse> = invitations.into_iter().map(|i| InvitationResponse { id: i.id, email: i.email, role: i.role }).collect();
    Ok(Json(data))
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub retention_days: u32,
}

/// GET /organizations/{orgId}/projects
pub async fn list_org_projects(State(state): State<AppState>, access: OrgMembership) -> Result<impl IntoResponse, ApiError> {
    let projects = state.relational.list_projects_by_org(&access.org_id)?;
    let data: Vec<ProjectSummary> = projects.into_iter().map(|p| ProjectSummary { id: p.id, name: p.name, retention_days: p.retention_days }).collect();
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub retention_days: u32,
}

/// POST /organizations/{orgId}/projects — requires ADMIN; name unique per org.
pub async fn create_project(State(state): State<AppState>, access: RequireOrgRole<3>, Json(req): Json<CreateProjectRequest>) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let project = state.relational.create_project(&access.0.org_id, req.name.trim(), req.retention_days)?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(ProjectResponse { id: project.id, org_id: project.org_id, name: project.name, retention_days: project.retention_days }),
    ))
}
