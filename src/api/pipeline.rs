//! Request pipeline: identity extraction and tenant context resolution.
//!
//! Authentication itself is an external collaborator; the gateway verifies
//! bearer tokens and injects identity headers, which this layer materializes
//! into an `AuthenticatedUser` extension. Tenant resolution then pins the
//! request to exactly one schema.

use crate::api::AppState;
use crate::authz::{AuthenticatedUser, Role, RoleGrant};
use crate::tenant::resolver;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use uuid::Uuid;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parses the gateway identity headers. Any missing or malformed required
/// field rejects the whole identity; unknown grant tags are skipped
/// (deny-by-default), not treated as errors.
pub(crate) fn parse_identity(headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let id = Uuid::parse_str(header(headers, "x-auth-user")?).ok()?;
    let role = Role::parse(header(headers, "x-auth-role")?)?;
    let email = header(headers, "x-auth-email")?.to_string();

    let tenant_id = match header(headers, "x-auth-tenant") {
        Some(raw) => Some(Uuid::parse_str(raw).ok()?),
        None => None,
    };

    let grants = header(headers, "x-auth-grants")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .filter_map(|tag| {
            let grant = RoleGrant::parse(tag);
            if grant.is_none() {
                warn!("Ignoring unknown role grant {tag:?}");
            }
            grant
        })
        .collect();

    Some(AuthenticatedUser {
        id,
        tenant_id,
        role,
        grants,
        email,
    })
}

/// Rejects requests without a usable identity and attaches
/// `AuthenticatedUser` for everything downstream.
pub async fn require_identity(mut request: Request, next: Next) -> Response {
    let Some(user) = parse_identity(request.headers()) else {
        debug!("Request without usable identity headers");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Resolves the tenant for the request and attaches a `TenantContext`.
/// Must run after `require_identity`.
pub async fn tenant_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(user) = request.extensions().get::<AuthenticatedUser>().cloned() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match resolver::resolve(&state.pool, request.headers(), &user).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn parses_a_full_identity() {
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let parsed = parse_identity(&headers(&[
            ("x-auth-user", &user_id.to_string()),
            ("x-auth-tenant", &tenant_id.to_string()),
            ("x-auth-role", "teacher"),
            ("x-auth-grants", "head_of_department"),
            ("x-auth-email", "t1@northridge.example"),
        ]))
        .unwrap();

        assert_eq!(parsed.id, user_id);
        assert_eq!(parsed.tenant_id, Some(tenant_id));
        assert_eq!(parsed.role, Role::Teacher);
        assert_eq!(parsed.grants, vec![RoleGrant::HeadOfDepartment]);
        assert_eq!(parsed.email, "t1@northridge.example");
    }

    #[test]
    fn platform_operator_needs_no_tenant() {
        let parsed = parse_identity(&headers(&[
            ("x-auth-user", &Uuid::new_v4().to_string()),
            ("x-auth-role", "platform_operator"),
            ("x-auth-email", "ops@scolaria.dev"),
        ]))
        .unwrap();

        assert_eq!(parsed.tenant_id, None);
        assert!(parsed.is_platform_operator());
    }

    #[test]
    fn missing_or_malformed_required_fields_reject() {
        assert!(parse_identity(&headers(&[])).is_none());
        assert!(parse_identity(&headers(&[
            ("x-auth-user", "not-a-uuid"),
            ("x-auth-role", "teacher"),
            ("x-auth-email", "t1@x.example"),
        ]))
        .is_none());
        assert!(parse_identity(&headers(&[
            ("x-auth-user", &Uuid::new_v4().to_string()),
            ("x-auth-role", "principal"),
            ("x-auth-email", "t1@x.example"),
        ]))
        .is_none());
        // A malformed tenant claim is rejected, not silently dropped.
        assert!(parse_identity(&headers(&[
            ("x-auth-user", &Uuid::new_v4().to_string()),
            ("x-auth-tenant", "nope"),
            ("x-auth-role", "teacher"),
            ("x-auth-email", "t1@x.example"),
        ]))
        .is_none());
    }

    #[test]
    fn unknown_grants_are_skipped() {
        let parsed = parse_identity(&headers(&[
            ("x-auth-user", &Uuid::new_v4().to_string()),
            ("x-auth-role", "teacher"),
            ("x-auth-grants", "head_of_department, vice_principal ,"),
            ("x-auth-email", "t1@x.example"),
        ]))
        .unwrap();

        assert_eq!(parsed.grants, vec![RoleGrant::HeadOfDepartment]);
    }
}
