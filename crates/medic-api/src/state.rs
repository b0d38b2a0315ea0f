//! Application state shared across all route handlers.

use std::sync::Arc;

use medic_action::Coordinator;

/// Shared application state, passed to handlers via axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The coordination engine. Owns the store, scheduler and detectors.
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}
