//! Attendance marking: the representative assignment-gated mutating
//! endpoint. Role permission is checked first, then the teacher-assignment
//! layer; every denial leaves an `unauthorized_access_attempt` audit row.

use crate::api::AppState;
use crate::audit::{self, AuditEntry, EntityType};
use crate::authz::{
    self,
    assignment::{self, Verified, VerifyOptions},
    AuthenticatedUser, AuthzError, Permission, ACCESS_DENIED,
};
use crate::tenant::{TenantContext, TenantStatus};
use axum::{
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::{json, Value};
use sqlx::{Connection, Row};
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

const VALID_STATUSES: [&str; 4] = ["present", "absent", "late", "excused"];

#[derive(Debug, PartialEq, Eq)]
struct AttendanceEntry {
    student_id: Uuid,
    status: String,
}

fn parse_entries(body: &Value) -> Result<Vec<AttendanceEntry>, &'static str> {
    let Some(raw) = body.get("entries").and_then(Value::as_array) else {
        return Err("Missing attendance entries.");
    };
    if raw.is_empty() {
        return Err("Missing attendance entries.");
    }

    let mut entries = Vec::with_capacity(raw.len());
    for item in raw {
        let student_id = item
            .get("student_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or("Invalid student identifier.")?;
        let status = item
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| VALID_STATUSES.contains(s))
            .ok_or("Invalid attendance status.")?;
        entries.push(AttendanceEntry {
            student_id,
            status: status.to_string(),
        });
    }
    Ok(entries)
}

#[utoipa::path(
    post,
    path = "/v1/attendance",
    responses(
        (status = 201, description = "Attendance recorded"),
        (status = 400, description = "Missing or invalid class/subject/entries"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Class not found"),
    ),
    tag = "attendance"
)]
pub async fn mark(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(context): Extension<TenantContext>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let path = uri.path();

    if authz::require(&user, Permission::AttendanceMark).is_err() {
        audit::record_unauthorized_attempt(
            &state.trail,
            Some(&context.schema),
            &user,
            method.as_str(),
            path,
            "missing permission",
        );
        return (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response();
    }

    if context.status != TenantStatus::Active {
        audit::record_unauthorized_attempt(
            &state.trail,
            Some(&context.schema),
            &user,
            method.as_str(),
            path,
            "tenant is not active",
        );
        return (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response();
    }

    // No path parameters on this route; precedence is body, then query.
    let target = assignment::extract_target(&HashMap::new(), &body, &query);
    let Some(class_ref) = target.class_ref.clone() else {
        return (StatusCode::BAD_REQUEST, "Missing class identifier.").into_response();
    };

    let entries = match parse_entries(&body) {
        Ok(entries) => entries,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let subject_id = match target.subject_id.as_deref() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "Invalid subject identifier.").into_response()
            }
        },
        None => None,
    };

    let mut conn = match context.db.acquire().await {
        Ok(conn) => conn,
        Err(err) => {
            error!("Failed to acquire tenant connection: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let verified = match assignment::verify(&mut conn, &user, None, &target, VerifyOptions::default())
        .await
    {
        Ok(verified) => verified,
        Err(AuthzError::Forbidden { reason }) => {
            audit::record_unauthorized_attempt(
                &state.trail,
                Some(&context.schema),
                &user,
                method.as_str(),
                path,
                reason,
            );
            return (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response();
        }
        Err(err) => return err.into_response(),
    };

    // Tolerant class addressing: surrogate key or natural code.
    let class_row = sqlx::query("SELECT id FROM classes WHERE id::text = $1 OR code = $1 LIMIT 1")
        .bind(&class_ref)
        .fetch_optional(&mut *conn)
        .await;

    let class_id: Uuid = match class_row {
        Ok(Some(row)) => row.get("id"),
        Ok(None) => return (StatusCode::NOT_FOUND, "Class not found.").into_response(),
        Err(err) => {
            error!("Class lookup failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let marked_by = match verified {
        Verified::Assigned { teacher_id } => teacher_id,
        Verified::Bypassed => user.id,
    };

    let insert = async {
        let mut tx = conn.begin().await?;
        for entry in &entries {
            sqlx::query(
                "INSERT INTO attendance (class_id, subject_id, student_id, status, marked_by)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(class_id)
            .bind(subject_id)
            .bind(entry.student_id)
            .bind(&entry.status)
            .bind(marked_by)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    };

    if let Err(err) = insert.await {
        error!("Attendance insert failed: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    audit::spawn_admin_record(
        &state.trail,
        Some(&context.schema),
        user.is_platform_operator(),
        AuditEntry::new("attendance_marked", EntityType::Attendance)
            .actor(&user)
            .entity_id(class_id.to_string())
            .target(format!("class {class_ref}"))
            .detail(json!({
                "entries": entries.len(),
                "subject_id": subject_id.map(|id| id.to_string()),
            })),
    );

    (StatusCode::CREATED, Json(json!({ "marked": entries.len() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_entries() {
        let student = Uuid::new_v4();
        let body = json!({
            "entries": [{"student_id": student.to_string(), "status": "present"}],
        });

        let entries = parse_entries(&body).unwrap();
        assert_eq!(
            entries,
            vec![AttendanceEntry {
                student_id: student,
                status: "present".to_string(),
            }]
        );
    }

    #[test]
    fn rejects_missing_or_empty_entries() {
        assert!(parse_entries(&json!({})).is_err());
        assert!(parse_entries(&json!({"entries": []})).is_err());
        assert!(parse_entries(&json!({"entries": "present"})).is_err());
    }

    #[test]
    fn rejects_bad_student_ids_and_statuses() {
        let body = json!({"entries": [{"student_id": "42", "status": "present"}]});
        assert_eq!(parse_entries(&body), Err("Invalid student identifier."));

        let body = json!({
            "entries": [{"student_id": Uuid::new_v4().to_string(), "status": "vanished"}],
        });
        assert_eq!(parse_entries(&body), Err("Invalid attendance status."));
    }
}
