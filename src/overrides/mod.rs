//! Manual overrides: time-bounded, reason-logged exceptions to normal
//! tenant/user state, granted by platform operators.
//!
//! At most one active override may exist per (type, target). The partial
//! unique index `manual_overrides_active_target_idx` is the authoritative
//! enforcement; under concurrent creation exactly one insert wins and the
//! loser observes `ActiveExists`. Rows are never hard-deleted.

use crate::audit::{AuditEntry, AuditTrail, EntityType};
use axum::{http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

const LIST_CAP: i64 = 200;

/// The closed set of override types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    UserStatus,
    TenantStatus,
    SubscriptionLimit,
    FeatureAccess,
    QuotaOverride,
    RateLimit,
    Other,
}

impl OverrideType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserStatus => "user_status",
            Self::TenantStatus => "tenant_status",
            Self::SubscriptionLimit => "subscription_limit",
            Self::FeatureAccess => "feature_access",
            Self::QuotaOverride => "quota_override",
            Self::RateLimit => "rate_limit",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "user_status" => Some(Self::UserStatus),
            "tenant_status" => Some(Self::TenantStatus),
            "subscription_limit" => Some(Self::SubscriptionLimit),
            "feature_access" => Some(Self::FeatureAccess),
            "quota_override" => Some(Self::QuotaOverride),
            "rate_limit" => Some(Self::RateLimit),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum OverrideError {
    /// An active, unexpired override already exists for the same (type,
    /// target). Callers must revoke it first; creation never silently
    /// replaces.
    ActiveExists,
    NotFound,
    /// Revoking an already-inactive override usually indicates a client-side
    /// race; it is surfaced, not treated as a no-op.
    AlreadyRevoked,
    BadRequest(&'static str),
    Database(sqlx::Error),
}

impl IntoResponse for OverrideError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::ActiveExists => (
                StatusCode::CONFLICT,
                "An active override already exists for this target.",
            )
                .into_response(),
            Self::NotFound => (StatusCode::NOT_FOUND, "Override not found.").into_response(),
            Self::AlreadyRevoked => {
                (StatusCode::CONFLICT, "Override is already revoked.").into_response()
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OverrideInput {
    pub override_type: OverrideType,
    pub target_id: String,
    pub action: String,
    pub reason: String,
    /// RFC 3339 timestamp; `None` means the override does not expire.
    pub expires_at: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Override {
    pub id: String,
    pub override_type: String,
    pub target_id: String,
    pub action: String,
    pub reason: String,
    pub created_by: String,
    pub expires_at: Option<String>,
    pub metadata: Value,
    pub active: bool,
    pub created_at: String,
    pub revoked_at: Option<String>,
    pub revoked_by: Option<String>,
}

/// Filters for `list`; combined with AND.
#[derive(Debug, Default, Deserialize)]
pub struct OverrideFilters {
    pub override_type: Option<OverrideType>,
    pub target_id: Option<String>,
    pub active: Option<bool>,
}

const OVERRIDE_COLUMNS: &str = r#"
    id::text AS id,
    override_type,
    target_id,
    action,
    reason,
    created_by::text AS created_by,
    to_char(expires_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS expires_at,
    metadata,
    active,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(revoked_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS revoked_at,
    revoked_by::text AS revoked_by
"#;

fn row_to_override(row: &sqlx::postgres::PgRow) -> Override {
    Override {
        id: row.get("id"),
        override_type: row.get("override_type"),
        target_id: row.get("target_id"),
        action: row.get("action"),
        reason: row.get("reason"),
        created_by: row.get("created_by"),
        expires_at: row.get("expires_at"),
        metadata: row.get("metadata"),
        active: row.get("active"),
        created_at: row.get("created_at"),
        revoked_at: row.get("revoked_at"),
        revoked_by: row.get("revoked_by"),
    }
}

fn is_active_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                && db_err
                    .constraint()
                    .is_some_and(|c| c == "manual_overrides_active_target_idx")
        }
        _ => false,
    }
}

/// Creates an override. Fails with `ActiveExists` only when an active,
/// unexpired one is already present for the same (type, target): an
/// active-but-expired predecessor is retired first, in the same transaction,
/// rather than blocking the target until the periodic sweep runs. The
/// database constraint is the arbiter of the conflict, not a read-then-write.
/// Writes a shared audit entry.
///
/// # Errors
/// `BadRequest` for an empty reason, `ActiveExists` on conflict, `Database`
/// otherwise.
pub async fn create(
    pool: &PgPool,
    trail: &AuditTrail,
    input: OverrideInput,
    actor_id: Uuid,
) -> Result<Override, OverrideError> {
    if input.reason.trim().is_empty() {
        return Err(OverrideError::BadRequest("A reason is required."));
    }

    let metadata = if input.metadata.is_null() {
        json!({})
    } else {
        input.metadata
    };

    let mut tx = pool.begin().await.map_err(OverrideError::Database)?;

    sqlx::query(
        "UPDATE shared.manual_overrides
         SET active = false, revoked_at = now()
         WHERE override_type = $1 AND target_id = $2
           AND active AND expires_at IS NOT NULL AND expires_at <= now()",
    )
    .bind(input.override_type.as_str())
    .bind(&input.target_id)
    .execute(&mut *tx)
    .await
    .map_err(OverrideError::Database)?;

    let query = format!(
        "INSERT INTO shared.manual_overrides
             (override_type, target_id, action, reason, created_by, expires_at, metadata)
         VALUES ($1, $2, $3, $4, $5, $6::timestamptz, $7)
         RETURNING {OVERRIDE_COLUMNS}"
    );

    let insert = sqlx::query(&query)
        .bind(input.override_type.as_str())
        .bind(&input.target_id)
        .bind(&input.action)
        .bind(input.reason.trim())
        .bind(actor_id)
        .bind(input.expires_at.as_deref())
        .bind(&metadata)
        .fetch_one(&mut *tx)
        .await;

    let row = match insert {
        Ok(row) => row,
        Err(err) if is_active_unique_violation(&err) => return Err(OverrideError::ActiveExists),
        Err(err) => return Err(OverrideError::Database(err)),
    };

    tx.commit().await.map_err(OverrideError::Database)?;

    let created = row_to_override(&row);

    trail
        .record_shared(
            AuditEntry::new("override_created", EntityType::Override)
                .actor_str(&actor_id.to_string())
                .entity_id(created.id.clone())
                .target(created.target_id.clone())
                .detail(json!({
                    "override_type": created.override_type,
                    "action": created.action,
                    "reason": created.reason,
                    "expires_at": created.expires_at,
                })),
        )
        .await;

    Ok(created)
}

/// Revokes an override exactly once. Writes a shared audit entry.
///
/// # Errors
/// `NotFound` when the id does not exist, `AlreadyRevoked` when it does but
/// is inactive, `Database` otherwise.
pub async fn revoke(
    pool: &PgPool,
    trail: &AuditTrail,
    override_id: Uuid,
    reason: Option<&str>,
    actor_id: Uuid,
) -> Result<Override, OverrideError> {
    let query = format!(
        "UPDATE shared.manual_overrides
         SET active = false, revoked_at = now(), revoked_by = $2
         WHERE id = $1 AND active
         RETURNING {OVERRIDE_COLUMNS}"
    );

    let row = sqlx::query(&query)
        .bind(override_id)
        .bind(actor_id)
        .fetch_optional(pool)
        .await
        .map_err(OverrideError::Database)?;

    let Some(row) = row else {
        let exists = sqlx::query("SELECT 1 FROM shared.manual_overrides WHERE id = $1")
            .bind(override_id)
            .fetch_optional(pool)
            .await
            .map_err(OverrideError::Database)?;
        return Err(if exists.is_some() {
            OverrideError::AlreadyRevoked
        } else {
            OverrideError::NotFound
        });
    };

    let revoked = row_to_override(&row);

    trail
        .record_shared(
            AuditEntry::new("override_revoked", EntityType::Override)
                .actor_str(&actor_id.to_string())
                .entity_id(revoked.id.clone())
                .target(revoked.target_id.clone())
                .detail(json!({
                    "override_type": revoked.override_type,
                    "revoke_reason": reason,
                })),
        )
        .await;

    Ok(revoked)
}

/// Lists overrides, newest first, capped.
///
/// # Errors
/// Returns the underlying query error.
pub async fn list(pool: &PgPool, filters: &OverrideFilters) -> sqlx::Result<Vec<Override>> {
    let query = format!(
        "SELECT {OVERRIDE_COLUMNS}
         FROM shared.manual_overrides
         WHERE ($1::text IS NULL OR override_type = $1)
           AND ($2::text IS NULL OR target_id = $2)
           AND ($3::boolean IS NULL OR active = $3)
         ORDER BY created_at DESC
         LIMIT {LIST_CAP}"
    );

    let rows = sqlx::query(&query)
        .bind(filters.override_type.map(OverrideType::as_str))
        .bind(filters.target_id.as_deref())
        .bind(filters.active)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(row_to_override).collect())
}

/// Returns the active, unexpired overrides for one (type, target).
///
/// # Errors
/// Returns the underlying query error.
pub async fn active_for(
    pool: &PgPool,
    override_type: OverrideType,
    target_id: &str,
) -> sqlx::Result<Vec<Override>> {
    let query = format!(
        "SELECT {OVERRIDE_COLUMNS}
         FROM shared.manual_overrides
         WHERE override_type = $1
           AND target_id = $2
           AND active
           AND (expires_at IS NULL OR expires_at > now())
         ORDER BY created_at DESC"
    );

    let rows = sqlx::query(&query)
        .bind(override_type.as_str())
        .bind(target_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(row_to_override).collect())
}

/// Flips expired-but-still-active overrides to inactive and returns how many
/// were flipped. Idempotent and safe to run concurrently with itself: each
/// invocation only touches rows that are still active and past expiry.
///
/// # Errors
/// Returns the underlying query error.
pub async fn cleanup_expired(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE shared.manual_overrides
         SET active = false, revoked_at = now()
         WHERE active AND expires_at IS NOT NULL AND expires_at <= now()",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_types_round_trip() {
        for override_type in [
            OverrideType::UserStatus,
            OverrideType::TenantStatus,
            OverrideType::SubscriptionLimit,
            OverrideType::FeatureAccess,
            OverrideType::QuotaOverride,
            OverrideType::RateLimit,
            OverrideType::Other,
        ] {
            assert_eq!(
                OverrideType::parse(override_type.as_str()),
                Some(override_type)
            );
        }
        assert_eq!(OverrideType::parse("grade_override"), None);
    }

    #[test]
    fn override_type_serde_matches_as_str() {
        let serialized = serde_json::to_string(&OverrideType::TenantStatus).unwrap();
        assert_eq!(serialized, "\"tenant_status\"");

        let parsed: OverrideType = serde_json::from_str("\"quota_override\"").unwrap();
        assert_eq!(parsed, OverrideType::QuotaOverride);
    }

    // connect_lazy opens no connection until a query runs, so reaching the
    // database here would fail the test instead of passing it.
    #[tokio::test]
    async fn empty_reason_is_rejected_before_any_io() {
        let pool = PgPool::connect_lazy("postgres://nobody@localhost:1/void").unwrap();
        let trail = AuditTrail::new(pool.clone());
        let input = OverrideInput {
            override_type: OverrideType::TenantStatus,
            target_id: "northridge".to_string(),
            action: "reactivate".to_string(),
            reason: "   ".to_string(),
            expires_at: None,
            metadata: Value::Null,
        };

        let result = create(&pool, &trail, input, Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(OverrideError::BadRequest("A reason is required."))
        ));
    }
}
