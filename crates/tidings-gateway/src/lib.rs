//! # Tidings Gateway
//!
//! The HTTP surface: thread registration, scheduler status, and the
//! x402-gated premium content endpoint.
//!
//! ## Routes
//! ```text
//! GET  /                               health check
//! POST /api/v1/threads/handle          register/replace a thread's jobs
//! POST /api/v1/threads/{id}/stop       cancel a thread's jobs
//! GET  /api/v1/scheduler/status        every registered job, next fire times
//! GET  /premium-content                402 without credential, content with one
//! ```

pub mod paywall;
pub mod routes;
pub mod server;

pub use server::{AppState, build_router, serve};
