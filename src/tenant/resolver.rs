//! Request-to-tenant resolution.
//!
//! A tenant hint is taken from the `x-school` header, the Host subdomain, or
//! the authenticated caller's own tenant claim, in that order. Lookup
//! failures are always surfaced as a generic "School not found" so callers
//! cannot probe which identifiers exist versus which are merely malformed.

use crate::authz::{AuthenticatedUser, Role, ACCESS_DENIED};
use crate::tenant::schema::SchemaName;
use axum::{
    http::{header::HOST, HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::{pool::PoolConnection, Executor, PgPool, Postgres, Row};
use tracing::{error, warn};
use uuid::Uuid;

const SCHOOL_NOT_FOUND: &str = "School not found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl TenantStatus {
    #[must_use]
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug)]
pub enum TenantError {
    /// No tenant matched the hint, or no hint was present at all. The two
    /// cases are indistinguishable to the caller on purpose.
    NotFound,
    /// The authenticated user belongs to a different tenant.
    Mismatch,
    /// Pool, schema, or configuration failure. Not an authorization outcome.
    Infra,
}

impl IntoResponse for TenantError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::NotFound => (StatusCode::NOT_FOUND, SCHOOL_NOT_FOUND).into_response(),
            Self::Mismatch => (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response(),
            Self::Infra => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// A pool handle pinned to one tenant schema.
///
/// Connections are checked out per use and returned to the pool on drop, so
/// release is guaranteed on every exit path. Shared-schema queries elsewhere
/// in the crate always address `shared.` tables explicitly, which keeps them
/// immune to whatever `search_path` a pooled connection last carried.
#[derive(Debug, Clone)]
pub struct TenantDb {
    pool: PgPool,
    schema: SchemaName,
}

impl TenantDb {
    #[must_use]
    pub fn new(pool: PgPool, schema: SchemaName) -> Self {
        Self { pool, schema }
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Checks a connection out of the pool with `search_path` pinned to this
    /// tenant's schema. The schema name went through `SchemaName::parse`, so
    /// the interpolation below is safe.
    ///
    /// # Errors
    /// Returns the underlying pool or execution error.
    pub async fn acquire(&self) -> sqlx::Result<PoolConnection<Postgres>> {
        let mut conn = self.pool.acquire().await?;
        let pin = format!("SET search_path TO \"{}\"", self.schema.as_str());
        conn.execute(pin.as_str()).await?;
        Ok(conn)
    }
}

/// Per-request tenant context attached by the resolver middleware.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub schema: SchemaName,
    pub status: TenantStatus,
    pub db: TenantDb,
}

#[derive(Debug, PartialEq, Eq)]
enum TenantHint {
    Subdomain(String),
    UserTenant(Uuid),
}

fn extract_hint(headers: &HeaderMap, user: &AuthenticatedUser) -> Option<TenantHint> {
    if let Some(school) = headers.get("x-school").and_then(|v| v.to_str().ok()) {
        if !school.is_empty() {
            return Some(TenantHint::Subdomain(school.to_string()));
        }
    }

    if let Some(host) = headers.get(HOST).and_then(|v| v.to_str().ok()) {
        let host = host.split(':').next().unwrap_or_default();
        let labels: Vec<&str> = host.split('.').collect();
        // Only hosts like <school>.<platform>.<tld> carry a subdomain hint.
        if labels.len() >= 3 && labels[0] != "www" && !labels[0].is_empty() {
            return Some(TenantHint::Subdomain(labels[0].to_string()));
        }
    }

    user.tenant_id.map(TenantHint::UserTenant)
}

/// A user must never act against a tenant other than their own; platform
/// operators bypass tenant scoping entirely.
fn check_tenant_access(tenant_id: Uuid, user: &AuthenticatedUser) -> Result<(), TenantError> {
    if user.role == Role::PlatformOperator {
        return Ok(());
    }

    match user.tenant_id {
        Some(own) if own == tenant_id => Ok(()),
        _ => Err(TenantError::Mismatch),
    }
}

/// Resolves the request to a tenant and produces a schema-pinned `TenantDb`.
///
/// # Errors
/// `NotFound` when no tenant matches (or no hint exists), `Mismatch` when the
/// caller belongs to another tenant, `Infra` for pool or schema-configuration
/// failures.
pub async fn resolve(
    pool: &PgPool,
    headers: &HeaderMap,
    user: &AuthenticatedUser,
) -> Result<TenantContext, TenantError> {
    let hint = extract_hint(headers, user).ok_or(TenantError::NotFound)?;

    let query = match hint {
        TenantHint::Subdomain(_) => {
            "SELECT id, schema_name, status FROM shared.tenants WHERE subdomain = $1"
        }
        TenantHint::UserTenant(_) => {
            "SELECT id, schema_name, status FROM shared.tenants WHERE id = $1::uuid"
        }
    };

    let lookup = match &hint {
        TenantHint::Subdomain(subdomain) => sqlx::query(query).bind(subdomain.clone()),
        TenantHint::UserTenant(id) => sqlx::query(query).bind(id.to_string()),
    };

    let row = match lookup.fetch_optional(pool).await {
        Ok(row) => row,
        Err(err) => {
            error!("Tenant lookup failed: {err}");
            return Err(TenantError::Infra);
        }
    };

    let Some(row) = row else {
        return Err(TenantError::NotFound);
    };

    let tenant_id: Uuid = row.get("id");
    check_tenant_access(tenant_id, user)?;

    let raw_schema: String = row.get("schema_name");
    let Ok(schema) = SchemaName::parse(&raw_schema) else {
        // A bad schema name in shared.tenants is a deployment defect, not a
        // caller problem.
        error!("Tenant {tenant_id} has an invalid schema name");
        return Err(TenantError::Infra);
    };

    let raw_status: String = row.get("status");
    let status = TenantStatus::parse(&raw_status).unwrap_or_else(|| {
        warn!("Tenant {tenant_id} has unknown status {raw_status:?}, treating as suspended");
        TenantStatus::Suspended
    });

    Ok(TenantContext {
        tenant_id,
        schema: schema.clone(),
        status,
        db: TenantDb::new(pool.clone(), schema),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::RoleGrant;
    use axum::http::HeaderValue;

    fn teacher(tenant: Option<Uuid>) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            role: Role::Teacher,
            grants: Vec::<RoleGrant>::new(),
            email: "t1@northridge.example".to_string(),
        }
    }

    fn operator() -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            tenant_id: None,
            role: Role::PlatformOperator,
            grants: Vec::new(),
            email: "ops@scolaria.dev".to_string(),
        }
    }

    #[test]
    fn hint_prefers_explicit_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-school", HeaderValue::from_static("northridge"));
        headers.insert(HOST, HeaderValue::from_static("other.scolaria.app"));

        let user = teacher(Some(Uuid::new_v4()));
        assert_eq!(
            extract_hint(&headers, &user),
            Some(TenantHint::Subdomain("northridge".to_string()))
        );
    }

    #[test]
    fn hint_falls_back_to_host_subdomain() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("northridge.scolaria.app:8443"));

        let user = teacher(Some(Uuid::new_v4()));
        assert_eq!(
            extract_hint(&headers, &user),
            Some(TenantHint::Subdomain("northridge".to_string()))
        );
    }

    #[test]
    fn bare_host_yields_user_claim() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("scolaria.app"));

        let tenant = Uuid::new_v4();
        let user = teacher(Some(tenant));
        assert_eq!(
            extract_hint(&headers, &user),
            Some(TenantHint::UserTenant(tenant))
        );

        let user = teacher(None);
        assert_eq!(extract_hint(&headers, &user), None);
    }

    #[test]
    fn www_is_not_a_subdomain_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("www.scolaria.app"));

        let user = teacher(None);
        assert_eq!(extract_hint(&headers, &user), None);
    }

    #[test]
    fn own_tenant_is_allowed() {
        let tenant = Uuid::new_v4();
        assert!(check_tenant_access(tenant, &teacher(Some(tenant))).is_ok());
    }

    #[test]
    fn foreign_tenant_is_a_mismatch() {
        let result = check_tenant_access(Uuid::new_v4(), &teacher(Some(Uuid::new_v4())));
        assert!(matches!(result, Err(TenantError::Mismatch)));

        let result = check_tenant_access(Uuid::new_v4(), &teacher(None));
        assert!(matches!(result, Err(TenantError::Mismatch)));
    }

    #[test]
    fn platform_operator_bypasses_tenant_scoping() {
        assert!(check_tenant_access(Uuid::new_v4(), &operator()).is_ok());
    }

    #[test]
    fn status_round_trip() {
        for status in [
            TenantStatus::Active,
            TenantStatus::Suspended,
            TenantStatus::Cancelled,
            TenantStatus::Expired,
        ] {
            assert_eq!(TenantStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TenantStatus::parse("deleted"), None);
    }
}
