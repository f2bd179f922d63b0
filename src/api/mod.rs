use crate::{audit::AuditTrail, cli::globals::GlobalArgs, overrides};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod openapi;
pub(crate) mod pipeline;

pub use openapi::ApiDoc;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// How often the override-expiry sweep runs.
const OVERRIDE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state, passed explicitly to every component so tests
/// can substitute an isolated pool per case.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub trail: AuditTrail,
    pub webhook_secret: Arc<SecretString>,
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: &str, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run shared-schema migrations")?;

    let state = AppState {
        pool: pool.clone(),
        trail: AuditTrail::new(pool.clone()),
        webhook_secret: Arc::new(globals.webhook_secret.clone()),
    };

    // Background sweep flips expired-but-still-active overrides to inactive.
    // Idempotent, so overlapping runs across instances are harmless.
    spawn_override_sweep(pool);

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on port {port}");

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn spawn_override_sweep(pool: PgPool) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(OVERRIDE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match overrides::cleanup_expired(&pool).await {
                Ok(0) => {}
                Ok(flipped) => info!("Override sweep deactivated {flipped} expired override(s)"),
                Err(err) => error!("Override sweep failed: {err}"),
            }
        }
    });
}

/// Builds the full application router with the middleware pipeline attached.
#[must_use]
pub fn router(state: AppState) -> Router {
    // Layers apply bottom-up: identity runs before tenant resolution.
    let tenant_routes = Router::new()
        .route("/v1/me/permissions", get(handlers::me::permissions))
        .route("/v1/attendance", post(handlers::attendance::mark))
        .route("/v1/audit", get(handlers::audit::list))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            pipeline::tenant_context,
        ))
        .layer(middleware::from_fn(pipeline::require_identity));

    let platform_routes = Router::new()
        .route(
            "/v1/overrides",
            post(handlers::overrides::create).get(handlers::overrides::list),
        )
        .route(
            "/v1/overrides/:id/revoke",
            post(handlers::overrides::revoke),
        )
        .layer(middleware::from_fn(pipeline::require_identity));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/v1/webhooks/payments", post(handlers::webhooks::payments))
        .merge(tenant_routes)
        .merge(platform_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_: &Request<Body>| HeaderValue::from_str(&Ulid::new().to_string()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(cors),
        )
        .with_state(state)
}
