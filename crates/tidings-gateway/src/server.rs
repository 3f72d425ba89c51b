//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use chrono_tz::Tz;
use tidings_core::config::PaymentConfig;
use tidings_payment::PaymentVerifier;
use tidings_scheduler::{FireHandler, JobRegistry};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// Scheduler registry — every job-set mutation goes through this mutex.
    pub registry: Arc<tokio::sync::Mutex<JobRegistry>>,
    /// Executor for manual (scheduleless) thread runs.
    pub handler: Arc<dyn FireHandler>,
    /// Paywall terms for the gated resource.
    pub payment: PaymentConfig,
    /// On-chain verifier for bearer credentials — verdicts are never cached.
    pub verifier: Arc<PaymentVerifier>,
    /// Timezone applied to schedules that name none.
    pub default_timezone: Tz,
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(super::routes::health_check))
        .route(
            "/api/v1/threads/handle",
            post(super::routes::handle_thread),
        )
        .route(
            "/api/v1/threads/{thread_id}/stop",
            post(super::routes::stop_thread),
        )
        .route(
            "/api/v1/scheduler/status",
            get(super::routes::scheduler_status),
        )
        .route("/premium-content", get(super::paywall::premium_content))
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Restrict CORS origins in production via env var
            // Example: TIDINGS_CORS_ORIGINS=https://app.tidings.ai
            if let Ok(origins_str) = std::env::var("TIDINGS_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway listening on http://{addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
