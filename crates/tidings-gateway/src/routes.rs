//! API route handlers for the gateway.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tidings_core::thread::Thread;
use tidings_scheduler::run_once;

use super::server::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tidings-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "paywall_receiver": state.payment.receiver_address,
    }))
}

/// Register (or re-register) a thread.
///
/// The thread's job set is always replaced wholesale — cleared, then
/// re-added from the posted definition. A scheduleless thread therefore
/// ends the request with zero jobs, and runs once, inline, before the
/// response goes out.
pub async fn handle_thread(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let thread = match Thread::from_request(&body, state.default_timezone) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("⚠️ Rejected thread request: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": e.to_string()})),
            );
        }
    };

    // Clear-then-readd happens for every thread, scheduled or not, so a
    // definition that dropped its schedule also drops its old jobs.
    let jobs = {
        let mut registry = state.registry.lock().await;
        match registry.start(&thread) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("❌ Failed to schedule thread {}: {e}", thread.thread_id);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"ok": false, "error": e.to_string()})),
                );
            }
        }
    };

    if thread.schedule.is_none() {
        // Registry lock released above; the run itself happens with the
        // request, not on a detached task.
        if let Err(e) = run_once(state.handler.as_ref(), &thread).await {
            tracing::error!("❌ Manual run failed for {}: {e}", thread.thread_id);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": e.to_string()})),
            );
        }
        return (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "thread_id": thread.thread_id,
                "mode": "manual_run",
                "jobs": [],
            })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "thread_id": thread.thread_id,
            "mode": "scheduled",
            "jobs": jobs,
        })),
    )
}

/// Cancel every job belonging to a thread. Idempotent — stopping a thread
/// that was never started reports zero removals.
pub async fn stop_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut registry = state.registry.lock().await;
    match registry.stop(&thread_id) {
        Ok(removed) => (
            StatusCode::OK,
            Json(json!({"ok": true, "thread_id": thread_id, "removed": removed})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": e.to_string()})),
        ),
    }
}

/// Snapshot of every registered job.
pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let registry = state.registry.lock().await;
    let jobs = registry.status();
    Json(json!({"ok": true, "count": jobs.len(), "jobs": jobs}))
}
