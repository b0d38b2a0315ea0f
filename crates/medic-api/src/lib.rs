//! Medic API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Exposes the coordination engine over REST: action submission and
//! lifecycle, incidents, remediation, anomaly analysis, observer views,
//! Prometheus metrics and a live event stream.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
