//! HTTP handlers for the administration screen, the session boundary and the
//! navigation/guard consumers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::access::roles::{RoleUpdate, UpdatedRole};
use crate::access::session::GuardDecision;
use crate::access::{
    AccessControl, Page, PermissionLevel, PermissionRecord, ReconcileReport, Role, SessionState,
    UserPermissionSnapshot,
};
use crate::error::AppError;
use crate::observability::MetricsManager;

#[derive(Clone)]
pub struct AppState {
    pub access: AccessControl,
    pub metrics: Option<Arc<MetricsManager>>,
}

impl AppState {
    pub fn new(access: AccessControl) -> Self {
        Self {
            access,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsManager>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

fn not_blank(value: &str, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

fn validate_level(value: &str, _: &()) -> garde::Result {
    value
        .parse::<PermissionLevel>()
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[garde(length(min = 1, max = 64))]
    pub name: String,
    #[garde(length(max = 256))]
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[garde(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[garde(length(max = 256))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetEnabledRequest {
    #[garde(skip)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetLevelRequest {
    #[garde(custom(validate_level))]
    pub level: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    #[garde(length(min = 1, max = 128), custom(not_blank))]
    pub user_id: String,
    #[garde(length(min = 1, max = 64), custom(not_blank))]
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
}

impl From<UpdatedRole> for RoleResponse {
    fn from(updated: UpdatedRole) -> Self {
        let previous_name = updated.renamed().then(|| updated.previous_name.clone());
        Self {
            role: updated.role,
            previous_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<UserPermissionSnapshot>,
}

impl From<SessionState> for SessionView {
    fn from(state: SessionState) -> Self {
        let label = state.label();
        match state {
            SessionState::Active { user_id, snapshot } => Self {
                state: label,
                user_id: Some(user_id),
                snapshot: Some(snapshot.as_ref().clone()),
            },
            _ => Self {
                state: label,
                user_id: None,
                snapshot: None,
            },
        }
    }
}

/// Liveness probe
pub async fn health_handler() -> &'static str {
    "OK"
}

pub async fn list_pages(State(state): State<AppState>) -> Json<Vec<Page>> {
    Json(state.access.list_pages().await)
}

pub async fn set_page_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> Result<Json<Page>, AppError> {
    request.validate()?;
    let page = state.access.set_enabled(&name, request.enabled).await?;
    Ok(Json(page))
}

pub async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>, AppError> {
    Ok(Json(state.access.list_roles().await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    Json(request): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), AppError> {
    request.validate()?;
    let role = state
        .access
        .create_role(&request.name, &request.description)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Role>, AppError> {
    Ok(Json(state.access.get_role(&id).await?))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<RoleResponse>, AppError> {
    request.validate()?;
    let updated = state
        .access
        .update_role(
            &id,
            RoleUpdate {
                name: request.name,
                description: request.description,
            },
        )
        .await?;
    Ok(Json(updated.into()))
}

pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.access.delete_role(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PermissionRecord>>, AppError> {
    Ok(Json(state.access.list_records().await?))
}

pub async fn get_permissions(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<PermissionRecord>, AppError> {
    Ok(Json(state.access.get_record(&role).await?))
}

pub async fn set_permission(
    State(state): State<AppState>,
    Path((role, page)): Path<(String, String)>,
    Json(request): Json<SetLevelRequest>,
) -> Result<Json<PermissionRecord>, AppError> {
    request.validate()?;
    let level = request
        .level
        .parse::<PermissionLevel>()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let record = state.access.set_level(&role, &page, level).await?;
    Ok(Json(record))
}

pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, AppError> {
    Ok(Json(state.access.reconcile().await?))
}

/// Identity collaborator reports a resolved `(userId, role)` pair
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SessionView>, AppError> {
    request.validate()?;
    state
        .access
        .session
        .sign_in(request.user_id.trim(), request.role.trim())
        .await;
    Ok(Json(state.access.session.state().await.into()))
}

pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    state.access.session.sign_out().await;
    StatusCode::NO_CONTENT
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.access.session.state().await.into())
}

pub async fn refresh_session(State(state): State<AppState>) -> Json<SessionView> {
    state.access.session.refresh().await;
    Json(state.access.session.state().await.into())
}

/// Pages for the sidebar and the bottom navigation
pub async fn navigation(State(state): State<AppState>) -> Json<Vec<Page>> {
    Json(state.access.session.navigation().await)
}

pub async fn guard(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> Result<Response, AppError> {
    if !state.access.pages.contains(&page) {
        return Err(AppError::NotFound(format!("Unknown page: {}", page)));
    }

    let decision = state.access.session.guard(&page).await;
    let status = match decision {
        GuardDecision::Allow { .. } => StatusCode::OK,
        GuardDecision::Deny { .. } => StatusCode::FORBIDDEN,
    };
    Ok((status, Json(decision)).into_response())
}
