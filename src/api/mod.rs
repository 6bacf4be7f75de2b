//! Clinician dashboard and chat-transport HTTP API.
//!
//! The module provides:
//! - `dashboard_router()`: composable axum Router under `/api/`
//! - `start_dashboard_server()`: bind, serve, and return a shutdown handle
//! - `ApiError`: `{ "error": { "code", "message" } }` responses

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::dashboard_router;
pub use server::{start_dashboard_server, DashboardServer, DashboardSession};
