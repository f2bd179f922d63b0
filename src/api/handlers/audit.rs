use crate::api::AppState;
use crate::audit::{AuditFilters, AuditLogRow, EntityType};
use crate::authz::{self, AuthenticatedUser, Permission, ACCESS_DENIED};
use crate::tenant::TenantContext;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::Deserialize;
use tracing::error;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditListQuery {
    action: Option<String>,
    /// One of the closed entity-type tags, e.g. `ATTENDANCE`.
    entity_type: Option<String>,
    actor_id: Option<Uuid>,
    limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditListQuery),
    responses(
        (status = 200, description = "Tenant audit entries, newest first", body = [AuditLogRow]),
        (status = 400, description = "Unknown entity type"),
        (status = 403, description = "Access denied"),
    ),
    tag = "audit"
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(context): Extension<TenantContext>,
    Query(query): Query<AuditListQuery>,
) -> Response {
    if authz::require(&user, Permission::AuditView).is_err() {
        return (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response();
    }

    let entity_type = match query.entity_type.as_deref() {
        Some(tag) => match EntityType::parse(tag) {
            Some(entity_type) => Some(entity_type),
            None => return (StatusCode::BAD_REQUEST, "Unknown entity type.").into_response(),
        },
        None => None,
    };

    let filters = AuditFilters {
        action: query.action,
        entity_type,
        actor_id: query.actor_id,
        limit: query.limit,
    };

    match state.trail.list(&context.schema, &filters).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            error!("Audit listing failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
