//! Role/permission evaluation and resource-assignment verification.

pub mod assignment;
pub mod permission;
pub mod role;

pub use permission::Permission;
pub use role::{
    effective_permissions, grant_permissions, has_all, has_any, has_permission, role_permissions,
    Role, RoleGrant,
};

use axum::{http::StatusCode, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

/// The one user-visible denial message. Deliberately non-specific so callers
/// learn nothing about tenant existence, role structure, or data shape.
pub const ACCESS_DENIED: &str = "Access denied, contact your administrator.";

/// Identity attached by the authentication gateway (an external collaborator)
/// and materialized into request extensions by `api::pipeline`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    /// `None` for platform-level operators.
    pub tenant_id: Option<Uuid>,
    pub role: Role,
    pub grants: Vec<RoleGrant>,
    pub email: String,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn is_platform_operator(&self) -> bool {
        self.role == Role::PlatformOperator
    }
}

#[derive(Debug)]
pub enum AuthzError {
    /// Authorization denial. `reason` is for the audit trail and logs only;
    /// it is never sent to the caller.
    Forbidden { reason: &'static str },
    BadRequest(&'static str),
    Database(sqlx::Error),
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Forbidden { .. } => (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Route-level permission gate.
///
/// # Errors
/// `Forbidden` when the caller's effective permission set (primary role plus
/// grants) does not contain `permission`.
pub fn require(user: &AuthenticatedUser, permission: Permission) -> Result<(), AuthzError> {
    if has_permission(user.role, &user.grants, permission) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            reason: "missing permission",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, grants: Vec<RoleGrant>) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            role,
            grants,
            email: "user@example.test".to_string(),
        }
    }

    #[test]
    fn require_honors_grants() {
        let teacher = user(Role::Teacher, vec![]);
        assert!(require(&teacher, Permission::AttendanceMark).is_ok());
        assert!(require(&teacher, Permission::DepartmentsManage).is_err());

        let hod = user(Role::Teacher, vec![RoleGrant::HeadOfDepartment]);
        assert!(require(&hod, Permission::DepartmentsManage).is_ok());
    }

    #[test]
    fn denial_reason_stays_internal() {
        let err = AuthzError::Forbidden {
            reason: "missing permission",
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
