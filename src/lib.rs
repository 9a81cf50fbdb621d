//! Foreman - capability-routed coordination engine for autonomous worker pools

pub mod api;
pub mod coordination;
pub mod error;
pub mod models;
pub mod remote;
pub mod websocket;

use std::sync::Arc;

use coordination::Coordinator;

/// Application state shared across handlers
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Arc<Self> {
        Arc::new(Self { coordinator })
    }
}
