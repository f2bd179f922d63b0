//! Payment-provider webhook entry point.
//!
//! Order is contractual: verify the signature (hard 400 on failure), check
//! the idempotency guard, claim the event, dispatch the financial mutation,
//! mark processed. Claim, mutation, and mark run on a single checked-out
//! connection inside one transaction; a delivery that loses the claim race
//! rolls back and acknowledges, so the mutation executes exactly once even
//! when concurrent deliveries race past the check.

use crate::api::AppState;
use crate::audit::{AuditEntry, EntityType};
use crate::tenant::SchemaName;
use crate::webhooks;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use sqlx::{Connection, PgConnection, Row};
use tracing::{error, warn};

const PROVIDER: &str = "paystream";
const SIGNATURE_HEADER: &str = "x-webhook-signature";

fn school_of(payload: &Value) -> Option<&str> {
    payload
        .pointer("/data/metadata/school")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/data/school").and_then(Value::as_str))
}

async fn apply_invoice_status(
    conn: &mut PgConnection,
    payload: &Value,
    status: &str,
) -> sqlx::Result<()> {
    let Some(school) = school_of(payload) else {
        warn!("Invoice event without a school reference, ignoring");
        return Ok(());
    };
    let Some(reference) = payload.pointer("/data/invoice").and_then(Value::as_str) else {
        warn!("Invoice event without an invoice reference, ignoring");
        return Ok(());
    };

    let row = sqlx::query("SELECT schema_name FROM shared.tenants WHERE subdomain = $1")
        .bind(school)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        warn!("Invoice event for unknown school {school:?}, ignoring");
        return Ok(());
    };

    let raw_schema: String = row.get("schema_name");
    let Ok(schema) = SchemaName::parse(&raw_schema) else {
        error!("Tenant {school:?} has an invalid schema name");
        return Ok(());
    };

    let query = format!(
        "UPDATE {} SET status = $2, updated_at = now() WHERE reference = $1",
        schema.qualify("invoices")
    );
    let result = sqlx::query(&query)
        .bind(reference)
        .bind(status)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        warn!("No invoice {reference:?} for school {school:?}");
    }

    Ok(())
}

async fn renew_subscription(conn: &mut PgConnection, payload: &Value) -> sqlx::Result<()> {
    let Some(school) = school_of(payload) else {
        warn!("Subscription event without a school reference, ignoring");
        return Ok(());
    };

    sqlx::query(
        "UPDATE shared.tenants SET status = 'active'
         WHERE subdomain = $1 AND status = 'expired'",
    )
    .bind(school)
    .execute(conn)
    .await?;

    Ok(())
}

async fn dispatch(conn: &mut PgConnection, event_type: &str, payload: &Value) -> sqlx::Result<()> {
    match event_type {
        "invoice.paid" => apply_invoice_status(conn, payload, "paid").await,
        "invoice.payment_failed" => apply_invoice_status(conn, payload, "failed").await,
        "subscription.renewed" => renew_subscription(conn, payload).await,
        other => {
            warn!("Ignoring unrecognized webhook event type {other:?}");
            Ok(())
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/webhooks/payments",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged (duplicates included)"),
        (status = 400, description = "Missing/invalid signature or malformed payload"),
    ),
    tag = "webhooks"
)]
pub async fn payments(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "Missing signature.").into_response();
    };
    if !webhooks::verify_signature(&state.webhook_secret, &body, signature) {
        return (StatusCode::BAD_REQUEST, "Invalid signature.").into_response();
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return (StatusCode::BAD_REQUEST, "Malformed payload.").into_response();
    };
    let (Some(event_id), Some(event_type)) = (
        payload.get("id").and_then(Value::as_str),
        payload.get("type").and_then(Value::as_str),
    ) else {
        return (StatusCode::BAD_REQUEST, "Malformed payload.").into_response();
    };

    let mut conn = match state.pool.acquire().await {
        Ok(conn) => conn,
        Err(err) => {
            error!("Failed to acquire connection: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // true means this delivery was a duplicate and nothing was mutated.
    let outcome: sqlx::Result<bool> = async {
        let mut tx = conn.begin().await?;
        if webhooks::is_processed(&mut tx, PROVIDER, event_id).await? {
            tx.rollback().await?;
            return Ok(true);
        }
        if !webhooks::claim(&mut tx, PROVIDER, event_id, event_type, &payload).await? {
            // Lost a concurrent-delivery race; the winner owns the event.
            tx.rollback().await?;
            return Ok(true);
        }
        dispatch(&mut tx, event_type, &payload).await?;
        webhooks::mark_processed(&mut tx, PROVIDER, event_id).await?;
        tx.commit().await?;
        Ok(false)
    }
    .await;

    match outcome {
        Ok(duplicate) => {
            if !duplicate {
                let trail = state.trail.clone();
                let entry = AuditEntry::new("webhook_processed", EntityType::Invoice)
                    .entity_id(event_id)
                    .target(PROVIDER)
                    .detail(json!({ "event_type": event_type, "payload": payload.clone() }));
                tokio::spawn(async move {
                    trail.record_shared(entry).await;
                });
            }
            // The provider's retry of an acknowledged event is not an error.
            Json(json!({ "received": true })).into_response()
        }
        Err(err) => {
            error!("Webhook processing failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_is_read_from_metadata_first() {
        let payload = json!({
            "data": {"school": "fallback", "metadata": {"school": "northridge"}},
        });
        assert_eq!(school_of(&payload), Some("northridge"));

        let payload = json!({"data": {"school": "fallback"}});
        assert_eq!(school_of(&payload), Some("fallback"));

        assert_eq!(school_of(&json!({"data": {}})), None);
    }
}
