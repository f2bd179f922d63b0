//! Manual-override administration. Platform operators only; every denial of
//! a mutating call is auditable and every create/revoke writes a shared
//! audit entry (done inside the service).

use crate::api::AppState;
use crate::audit;
use crate::authz::{self, AuthenticatedUser, Permission, ACCESS_DENIED};
use crate::overrides::{self, Override, OverrideFilters, OverrideInput};
use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::Deserialize;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

fn gate(
    state: &AppState,
    user: &AuthenticatedUser,
    method: &Method,
    uri: &Uri,
    mutating: bool,
) -> Result<(), Response> {
    let allowed =
        user.is_platform_operator() && authz::require(user, Permission::OverridesManage).is_ok();
    if allowed {
        return Ok(());
    }

    if mutating {
        audit::record_unauthorized_attempt(
            &state.trail,
            None,
            user,
            method.as_str(),
            uri.path(),
            "not a platform operator",
        );
    }
    Err((StatusCode::FORBIDDEN, ACCESS_DENIED).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/overrides",
    request_body = OverrideInput,
    responses(
        (status = 201, description = "Override created", body = [Override]),
        (status = 400, description = "Missing reason"),
        (status = 403, description = "Access denied"),
        (status = 409, description = "An active override already exists for this target"),
    ),
    tag = "overrides"
)]
pub async fn create(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Extension(user): Extension<AuthenticatedUser>,
    Json(input): Json<OverrideInput>,
) -> Response {
    if let Err(denied) = gate(&state, &user, &method, &uri, true) {
        return denied;
    }

    match overrides::create(&state.pool, &state.trail, input, user.id).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeInput {
    reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/overrides/{id}/revoke",
    request_body = RevokeInput,
    responses(
        (status = 200, description = "Override revoked", body = [Override]),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Override not found"),
        (status = 409, description = "Override is already revoked"),
    ),
    tag = "overrides"
)]
pub async fn revoke(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    input: Option<Json<RevokeInput>>,
) -> Response {
    if let Err(denied) = gate(&state, &user, &method, &uri, true) {
        return denied;
    }

    let reason = input.and_then(|Json(input)| input.reason);

    match overrides::revoke(&state.pool, &state.trail, id, reason.as_deref(), user.id).await {
        Ok(revoked) => Json(revoked).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/overrides",
    responses(
        (status = 200, description = "Overrides, newest first", body = [Override]),
        (status = 403, description = "Access denied"),
    ),
    tag = "overrides"
)]
pub async fn list(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Extension(user): Extension<AuthenticatedUser>,
    Query(filters): Query<OverrideFilters>,
) -> Response {
    if let Err(denied) = gate(&state, &user, &method, &uri, false) {
        return denied;
    }

    match overrides::list(&state.pool, &filters).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            error!("Override listing failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
