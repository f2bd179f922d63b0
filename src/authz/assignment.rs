//! Teacher-assignment verification.
//!
//! A second authorization layer beyond role permissions: even a caller with
//! `attendance:mark` may only act on a class/subject an assignment row links
//! them to. Administrators (and platform operators) may bypass the check.

use crate::authz::{AuthenticatedUser, AuthzError, Role};
use serde_json::Value;
use sqlx::{PgConnection, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Options for `verify`. The admin bypass is enabled by default.
#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    pub require_subject: bool,
    pub admin_bypass: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            require_subject: false,
            admin_bypass: true,
        }
    }
}

/// Target identifiers extracted from the request.
///
/// `class_ref` stays a string: legacy data means a class may be addressed by
/// its surrogate key or by its natural code, and the assignment query
/// compares type-tolerantly.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TargetRefs {
    pub class_ref: Option<String>,
    pub subject_id: Option<String>,
}

/// Outcome of a successful verification.
#[derive(Debug, PartialEq, Eq)]
pub enum Verified {
    /// Admin or platform-operator bypass.
    Bypassed,
    /// A matching assignment row exists for this teacher.
    Assigned { teacher_id: Uuid },
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pick(
    key: &str,
    path: &HashMap<String, String>,
    body: &Value,
    query: &HashMap<String, String>,
) -> Option<String> {
    if let Some(found) = path.get(key).filter(|v| !v.is_empty()) {
        return Some(found.clone());
    }
    if let Some(found) = body.get(key).and_then(value_to_id) {
        return Some(found);
    }
    query.get(key).filter(|v| !v.is_empty()).cloned()
}

/// Extracts the target class/subject from path, body, and query parameters,
/// in that precedence order (per key).
#[must_use]
pub fn extract_target(
    path: &HashMap<String, String>,
    body: &Value,
    query: &HashMap<String, String>,
) -> TargetRefs {
    TargetRefs {
        class_ref: pick("class_id", path, body, query),
        subject_id: pick("subject_id", path, body, query),
    }
}

/// Resolves the caller's domain-level teacher identity from the tenant's
/// roster. Fallback for requests that carry no cached teacher record; kept as
/// its own function so it can go away once request-context propagation
/// improves.
async fn find_teacher_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> sqlx::Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM teachers WHERE lower(email) = lower($1) LIMIT 1")
        .bind(email)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

/// Returns whether an assignment row links `teacher_id` to the given class
/// (surrogate id or natural code) and, when supplied, subject.
///
/// # Errors
/// Returns the underlying query error.
pub async fn is_assigned(
    conn: &mut PgConnection,
    teacher_id: Uuid,
    class_ref: Option<&str>,
    subject_id: Option<&str>,
) -> sqlx::Result<bool> {
    let row = sqlx::query(
        r"
        SELECT EXISTS(
            SELECT 1
            FROM teacher_assignments ta
            JOIN classes c ON c.id = ta.class_id
            WHERE ta.teacher_id = $1
              AND ($2::text IS NULL OR ta.class_id::text = $2 OR c.code = $2)
              AND ($3::text IS NULL OR ta.subject_id::text = $3)
        ) AS assigned
        ",
    )
    .bind(teacher_id)
    .bind(class_ref)
    .bind(subject_id)
    .fetch_one(conn)
    .await?;
    Ok(row.get("assigned"))
}

/// Verifies that the caller may act on the targeted class/subject.
///
/// `cached_teacher_id` short-circuits the roster lookup when a teacher record
/// is already attached to the request.
///
/// # Errors
/// `BadRequest` when no target id was supplied (or a subject id is required
/// but missing); `Forbidden` for non-teacher roles, unresolvable teacher
/// profiles, and missing assignment rows. An unresolvable profile is an
/// authorization outcome, not a system fault.
pub async fn verify(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    cached_teacher_id: Option<Uuid>,
    target: &TargetRefs,
    options: VerifyOptions,
) -> Result<Verified, AuthzError> {
    if options.admin_bypass && matches!(user.role, Role::Admin | Role::PlatformOperator) {
        return Ok(Verified::Bypassed);
    }

    if user.role != Role::Teacher {
        return Err(AuthzError::Forbidden {
            reason: "role is not assignment-eligible",
        });
    }

    if target.class_ref.is_none() && target.subject_id.is_none() {
        return Err(AuthzError::BadRequest("Missing class or subject identifier."));
    }

    if options.require_subject && target.subject_id.is_none() {
        return Err(AuthzError::BadRequest("Missing subject identifier."));
    }

    let teacher_id = match cached_teacher_id {
        Some(id) => id,
        None => find_teacher_by_email(conn, &user.email)
            .await
            .map_err(AuthzError::Database)?
            .ok_or(AuthzError::Forbidden {
                reason: "teacher profile not found",
            })?,
    };

    let assigned = is_assigned(
        conn,
        teacher_id,
        target.class_ref.as_deref(),
        target.subject_id.as_deref(),
    )
    .await
    .map_err(AuthzError::Database)?;

    if assigned {
        Ok(Verified::Assigned { teacher_id })
    } else {
        Err(AuthzError::Forbidden {
            reason: "no matching teacher assignment",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn path_wins_over_body_and_query() {
        let target = extract_target(
            &map(&[("class_id", "C-path")]),
            &json!({"class_id": "C-body"}),
            &map(&[("class_id", "C-query")]),
        );
        assert_eq!(target.class_ref.as_deref(), Some("C-path"));
    }

    #[test]
    fn body_wins_over_query() {
        let target = extract_target(
            &HashMap::new(),
            &json!({"class_id": "C-body", "subject_id": "S-body"}),
            &map(&[("class_id", "C-query"), ("subject_id", "S-query")]),
        );
        assert_eq!(target.class_ref.as_deref(), Some("C-body"));
        assert_eq!(target.subject_id.as_deref(), Some("S-body"));
    }

    #[test]
    fn query_is_the_last_resort() {
        let target = extract_target(
            &HashMap::new(),
            &json!({}),
            &map(&[("subject_id", "S-query")]),
        );
        assert_eq!(target.class_ref, None);
        assert_eq!(target.subject_id.as_deref(), Some("S-query"));
    }

    #[test]
    fn numeric_body_ids_are_tolerated() {
        let target = extract_target(&HashMap::new(), &json!({"class_id": 42}), &HashMap::new());
        assert_eq!(target.class_ref.as_deref(), Some("42"));
    }

    #[test]
    fn empty_and_non_scalar_values_are_ignored() {
        let target = extract_target(
            &map(&[("class_id", "")]),
            &json!({"class_id": null, "subject_id": ["S1"]}),
            &HashMap::new(),
        );
        assert_eq!(target, TargetRefs::default());
    }
}
