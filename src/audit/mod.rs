//! Dual-target audit trail.
//!
//! Writes go to the acting tenant's own `audit_log` and, for platform-level
//! activity, to the cross-tenant `shared.audit_log`. Every write is
//! best-effort by contract: the record functions return `()` and swallow
//! failures after logging them, so a transient audit-store outage can never
//! cascade into user-facing request failures.

mod redact;

pub use redact::redact;

use crate::authz::{AuthenticatedUser, Role};
use crate::tenant::SchemaName;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Action tag recorded for every permission or assignment denial that reaches
/// a mutating endpoint.
pub const UNAUTHORIZED_ATTEMPT: &str = "unauthorized_access_attempt";

/// Default and maximum number of rows returned by `list`.
pub const LIST_CAP: i64 = 200;

/// The closed set of auditable entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "&'static str")]
pub enum EntityType {
    Subject,
    Class,
    Student,
    TeacherAssignment,
    Attendance,
    Exam,
    Grade,
    Invoice,
    Access,
    Tenant,
    User,
    UserSession,
    Notification,
    Department,
    Report,
    Settings,
    Override,
    Subscription,
    PermissionOverride,
}

impl EntityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "SUBJECT",
            Self::Class => "CLASS",
            Self::Student => "STUDENT",
            Self::TeacherAssignment => "TEACHER_ASSIGNMENT",
            Self::Attendance => "ATTENDANCE",
            Self::Exam => "EXAM",
            Self::Grade => "GRADE",
            Self::Invoice => "INVOICE",
            Self::Access => "ACCESS",
            Self::Tenant => "TENANT",
            Self::User => "USER",
            Self::UserSession => "USER_SESSION",
            Self::Notification => "NOTIFICATION",
            Self::Department => "DEPARTMENT",
            Self::Report => "REPORT",
            Self::Settings => "SETTINGS",
            Self::Override => "OVERRIDE",
            Self::Subscription => "SUBSCRIPTION",
            Self::PermissionOverride => "PERMISSION_OVERRIDE",
        }
    }

    /// Looks a tag up in the closed enumeration. Unknown tags return `None`.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "SUBJECT" => Self::Subject,
            "CLASS" => Self::Class,
            "STUDENT" => Self::Student,
            "TEACHER_ASSIGNMENT" => Self::TeacherAssignment,
            "ATTENDANCE" => Self::Attendance,
            "EXAM" => Self::Exam,
            "GRADE" => Self::Grade,
            "INVOICE" => Self::Invoice,
            "ACCESS" => Self::Access,
            "TENANT" => Self::Tenant,
            "USER" => Self::User,
            "USER_SESSION" => Self::UserSession,
            "NOTIFICATION" => Self::Notification,
            "DEPARTMENT" => Self::Department,
            "REPORT" => Self::Report,
            "SETTINGS" => Self::Settings,
            "OVERRIDE" => Self::Override,
            "SUBSCRIPTION" => Self::Subscription,
            "PERMISSION_OVERRIDE" => Self::PermissionOverride,
            _ => return None,
        })
    }

    /// Maps the last non-empty segment of a request path to an entity type.
    /// Unmapped segments default to `Access` rather than failing the audit.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        let segment = path
            .split('/')
            .rev()
            .find(|segment| !segment.is_empty())
            .unwrap_or_default();

        match segment {
            "subjects" => Self::Subject,
            "classes" => Self::Class,
            "students" => Self::Student,
            "assignments" => Self::TeacherAssignment,
            "attendance" => Self::Attendance,
            "exams" => Self::Exam,
            "grades" => Self::Grade,
            "payments" | "invoices" => Self::Invoice,
            "tenants" | "schools" => Self::Tenant,
            "users" => Self::User,
            "sessions" => Self::UserSession,
            "notifications" => Self::Notification,
            "departments" => Self::Department,
            "reports" => Self::Report,
            "settings" => Self::Settings,
            "overrides" => Self::Override,
            "subscriptions" => Self::Subscription,
            _ => Self::Access,
        }
    }
}

impl From<EntityType> for &'static str {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str()
    }
}

/// One audit event, built by the caller and completed by the trail.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    action: String,
    entity_type: EntityType,
    entity_id: Option<String>,
    actor_id: Option<Uuid>,
    actor_role: Option<Role>,
    target: Option<String>,
    detail: Value,
}

impl AuditEntry {
    #[must_use]
    pub fn new(action: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            action: action.into(),
            entity_type,
            entity_id: None,
            actor_id: None,
            actor_role: None,
            target: None,
            detail: Value::Null,
        }
    }

    #[must_use]
    pub fn actor(mut self, user: &AuthenticatedUser) -> Self {
        self.actor_id = Some(user.id);
        self.actor_role = Some(user.role);
        self
    }

    /// Accepts an actor id from an untrusted source. A malformed id is
    /// dropped to `None` rather than rejecting the whole entry, preserving
    /// the rest of the audit signal.
    #[must_use]
    pub fn actor_str(mut self, raw: &str) -> Self {
        self.actor_id = Uuid::parse_str(raw).ok();
        self
    }

    #[must_use]
    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A listed audit row.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogRow {
    pub id: String,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub actor_role: Option<String>,
    pub target: Option<String>,
    pub detail: Value,
    pub created_at: String,
}

/// Filters for `list`. All fields are optional and combined with AND.
#[derive(Debug, Default)]
pub struct AuditFilters {
    pub action: Option<String>,
    pub entity_type: Option<EntityType>,
    pub actor_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuditTrail {
    pool: PgPool,
}

impl AuditTrail {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records an entry in the tenant's own audit log. Never fails the
    /// caller: errors are logged and swallowed.
    pub async fn record_tenant(&self, schema: &SchemaName, entry: AuditEntry) {
        let query = format!(
            "INSERT INTO {} (actor_id, action, entity_type, entity_id, actor_role, target, detail)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            schema.qualify("audit_log")
        );
        if let Err(err) = self.insert(&query, entry).await {
            error!("Tenant audit write failed: {err}");
        }
    }

    /// Records an entry in the platform-wide shared audit log. Never fails
    /// the caller: errors are logged and swallowed.
    pub async fn record_shared(&self, entry: AuditEntry) {
        let query = "INSERT INTO shared.audit_log \
             (actor_id, action, entity_type, entity_id, actor_role, target, detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)";
        if let Err(err) = self.insert(query, entry).await {
            error!("Shared audit write failed: {err}");
        }
    }

    /// Dual-write for administrative actions: the tenant log always gets the
    /// entry; platform-operator activity is additionally written to the
    /// shared log. The two targets are independent storage writes, so one
    /// failing never prevents the other attempt.
    pub async fn record_admin_action(
        &self,
        schema: Option<&SchemaName>,
        platform_level: bool,
        entry: AuditEntry,
    ) {
        let (tenant, shared) = admin_targets(schema.is_some(), platform_level);
        if shared {
            self.record_shared(entry.clone()).await;
        }
        if tenant {
            if let Some(schema) = schema {
                self.record_tenant(schema, entry).await;
            }
        }
    }

    async fn insert(&self, query: &str, entry: AuditEntry) -> sqlx::Result<()> {
        let mut detail = entry.detail;
        redact(&mut detail);

        sqlx::query(query)
            .bind(entry.actor_id)
            .bind(&entry.action)
            .bind(entry.entity_type.as_str())
            .bind(entry.entity_id.as_deref())
            .bind(entry.actor_role.map(Role::as_str))
            .bind(entry.target.as_deref())
            .bind(&detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lists a tenant's audit entries, newest first, capped at `LIST_CAP`.
    ///
    /// # Errors
    /// Returns the underlying query error; listing is a read surface and is
    /// not covered by the swallow contract.
    pub async fn list(
        &self,
        schema: &SchemaName,
        filters: &AuditFilters,
    ) -> sqlx::Result<Vec<AuditLogRow>> {
        let limit = filters.limit.unwrap_or(LIST_CAP).clamp(1, LIST_CAP);
        let query = format!(
            r#"
            SELECT
                id::text AS id,
                actor_id::text AS actor_id,
                action,
                entity_type,
                entity_id,
                actor_role,
                target,
                detail,
                to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
            FROM {}
            WHERE ($1::text IS NULL OR action = $1)
              AND ($2::text IS NULL OR entity_type = $2)
              AND ($3::uuid IS NULL OR actor_id = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
            schema.qualify("audit_log")
        );

        let rows = sqlx::query(&query)
            .bind(filters.action.as_deref())
            .bind(filters.entity_type.map(EntityType::as_str))
            .bind(filters.actor_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| AuditLogRow {
                id: row.get("id"),
                actor_id: row.get("actor_id"),
                action: row.get("action"),
                entity_type: row.get("entity_type"),
                entity_id: row.get("entity_id"),
                actor_role: row.get("actor_role"),
                target: row.get("target"),
                detail: row.get("detail"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

/// Which logs an administrative action lands in, as (tenant, shared).
/// Platform-operator activity is mirrored to the shared log so operators can
/// be reviewed without per-tenant context switching; with no tenant context
/// the shared log is the only target.
fn admin_targets(has_tenant: bool, platform_level: bool) -> (bool, bool) {
    match (has_tenant, platform_level) {
        (true, true) => (true, true),
        (true, false) => (true, false),
        (false, _) => (false, true),
    }
}

/// Fire-and-forget administrative audit write routed through
/// `record_admin_action`. Spawned so it can neither block nor fail the
/// triggering request, and so it still completes after the response has been
/// sent.
pub fn spawn_admin_record(
    trail: &AuditTrail,
    schema: Option<&SchemaName>,
    platform_level: bool,
    entry: AuditEntry,
) {
    let trail = trail.clone();
    let schema = schema.cloned();
    tokio::spawn(async move {
        trail
            .record_admin_action(schema.as_ref(), platform_level, entry)
            .await;
    });
}

fn unauthorized_entry(
    user: &AuthenticatedUser,
    method: &str,
    path: &str,
    reason: &'static str,
) -> AuditEntry {
    AuditEntry::new(UNAUTHORIZED_ATTEMPT, EntityType::for_path(path))
        .actor(user)
        .target(path)
        .detail(serde_json::json!({
            "path": path,
            "method": method,
            "reason": reason,
        }))
}

/// Fire-and-forget unauthorized-attempt record for a denied mutating request:
/// exactly one entry per denial, routed like any other administrative action
/// (tenant log when a tenant context exists, shared log for platform-operator
/// denials and tenant-less requests).
pub fn record_unauthorized_attempt(
    trail: &AuditTrail,
    schema: Option<&SchemaName>,
    user: &AuthenticatedUser,
    method: &str,
    path: &str,
    reason: &'static str,
) {
    spawn_admin_record(
        trail,
        schema,
        user.is_platform_operator(),
        unauthorized_entry(user, method, path, reason),
    );
}
