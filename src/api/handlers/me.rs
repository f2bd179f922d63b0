use crate::authz::{self, AuthenticatedUser, RoleGrant};
use axum::{response::Json, Extension};
use serde::Serialize;
use utoipa::ToSchema;

/// The caller's effective permission set, for UI-surface filtering. Computed
/// by the same engine that gates requests, so the two can never drift.
#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    role: &'static str,
    grants: Vec<&'static str>,
    permissions: Vec<&'static str>,
}

#[utoipa::path(
    get,
    path = "/v1/me/permissions",
    responses(
        (status = 200, description = "Effective permissions for the caller", body = [EffectivePermissions]),
        (status = 401, description = "Missing or invalid identity"),
    ),
    tag = "me"
)]
pub async fn permissions(
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<EffectivePermissions> {
    let mut permissions: Vec<&'static str> =
        authz::effective_permissions(user.role, &user.grants)
            .into_iter()
            .map(authz::Permission::as_str)
            .collect();
    permissions.sort_unstable();

    Json(EffectivePermissions {
        role: user.role.as_str(),
        grants: user.grants.iter().copied().map(RoleGrant::as_str).collect(),
        permissions,
    })
}
