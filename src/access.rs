use std::collections::HashMap;

use axum::extract::{FromRef, FromRequestParts, Path};
use axum::http::request::Parts;

use crate::AppState;
use crate::error::ApiError;
use crate::relational::models::{Role, User};

/// Header-based authentication, matching the original's MVP auth contract:
/// the frontend/gateway is trusted to have already verified the caller and
/// passes their identity through `x-user-*` headers. Upserts the user row
/// on every request so a display-name change on the identity side shows up
/// here without a separate sync step.
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let user_id = header_str(parts, "x-user-id").ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".to_string()))?;
        let email = header_str(parts, "x-user-email").ok_or_else(|| ApiError::Unauthorized("missing x-user-email header".to_string()))?;
        let name = header_str(parts, "x-user-name");

        let user = state.relational.upsert_user(&user_id, &email, name.as_deref())?;
        Ok(CurrentUser(user))
    }
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// The caller's membership in the organization named by the `org_id` path
/// parameter. Rejects with 403 if they aren't a member.
pub struct OrgMembership {
    pub user: User,
    pub org_id: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for OrgMembership
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        let org_id = path_param(parts, state, "org_id").await?;

        let app_state = AppState::from_ref(state);
        let membership = app_state.relational.get_membership(&org_id, &user.id)?.ok_or_else(|| ApiError::Forbidden("not a member of this organization".to_string()))?;
        let role = Role::parse(&membership.role).ok_or_else(|| ApiError::Internal("invalid stored role".to_string()))?;

        Ok(OrgMembership { user, org_id, role })
    }
}

/// Minimum-role gate built on top of [`OrgMembership`]. Callers that need a
/// stronger guarantee than "is a member" construct one of these instead.
pub struct RequireOrgRole<const MIN: i32>(pub OrgMembership);

impl<S, const MIN: i32> FromRequestParts<S> for RequireOrgRole<MIN>
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let membership = OrgMembership::from_request_parts(parts, state).await?;
        if membership.role.level() < MIN {
            return Err(ApiError::Forbidden(format!("requires at least role level {MIN}")));
        }
        Ok(RequireOrgRole(membership))
    }
}

/// The caller's access to the project named by the `project_id` path
/// parameter, resolved transitively via organization membership. 404s if
/// the project doesn't exist (or is soft-deleted), 403 if it exists but the
/// caller has no membership in its organization.
pub struct ProjectAccess {
    pub user: User,
    pub project_id: String,
    pub org_id: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for ProjectAccess
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        let project_id = path_param(parts, state, "project_id").await?;

        let app_state = AppState::from_ref(state);
        let project = app_state.relational.get_active_project_by_id(&project_id)?.ok_or_else(|| ApiError::NotFound("project not found".to_string()))?;
        let membership = app_state.relational.get_membership(&project.org_id, &user.id)?.ok_or_else(|| ApiError::Forbidden("no access to this project".to_string()))?;
        let role = Role::parse(&membership.role).ok_or_else(|| ApiError::Internal("invalid stored role".to_string()))?;

        Ok(ProjectAccess { user, project_id, org_id: project.org_id, role })
    }
}

async fn path_param<S: Send + Sync>(parts: &mut Parts, state: &S, key: &str) -> Result<String, ApiError> {
    let Path(path_params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map_err(|_| ApiError::BadRequest(format!("missing {key} path parameter")))?;
    path_params.get(key).cloned().ok_or_else(|| ApiError::BadRequest(format!("missing {key} path parameter")))
}
