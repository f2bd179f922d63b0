//! Idempotent intake of externally delivered financial events.
//!
//! The (provider, event id) pair is the idempotency key. The unique
//! constraint on `shared.external_events (provider, event_id)` is the
//! authoritative de-duplication mechanism: `claim` inserts the key with
//! `ON CONFLICT DO NOTHING` inside the caller's transaction, so under
//! concurrent delivery of the same event the losing insert waits for the
//! winner to commit and then resolves to zero rows instead of a second
//! claim. `is_processed` is an optimization in front of the constraint,
//! not the source of truth.

mod signature;

pub use signature::verify_signature;

use serde_json::Value;
use sqlx::{PgConnection, Row};

/// Returns whether this event was already processed.
///
/// # Errors
/// Returns the underlying query error.
pub async fn is_processed(
    conn: &mut PgConnection,
    provider: &str,
    event_id: &str,
) -> sqlx::Result<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(
            SELECT 1 FROM shared.external_events
            WHERE provider = $1 AND event_id = $2 AND processed_at IS NOT NULL
        ) AS processed",
    )
    .bind(provider)
    .bind(event_id)
    .fetch_one(conn)
    .await?;
    Ok(row.get("processed"))
}

/// Claims the event for processing. Returns `false` when the key already
/// exists; the caller must treat that as a duplicate delivery and roll back.
///
/// Must run in the same transaction as the dispatched mutation: the claim
/// row and the mutation then commit or vanish together, and exactly one of
/// any set of concurrent deliveries gets to dispatch.
///
/// # Errors
/// Returns the underlying execution error.
pub async fn claim(
    conn: &mut PgConnection,
    provider: &str,
    event_id: &str,
    event_type: &str,
    payload: &Value,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO shared.external_events (provider, event_id, event_type, payload)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (provider, event_id) DO NOTHING",
    )
    .bind(provider)
    .bind(event_id)
    .bind(event_type)
    .bind(payload)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Marks a claimed event processed. Only `processed_at` is touched, so the
/// mark operation is itself idempotent.
///
/// # Errors
/// Returns the underlying execution error.
pub async fn mark_processed(
    conn: &mut PgConnection,
    provider: &str,
    event_id: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE shared.external_events SET processed_at = now()
         WHERE provider = $1 AND event_id = $2",
    )
    .bind(provider)
    .bind(event_id)
    .execute(conn)
    .await?;
    Ok(())
}
