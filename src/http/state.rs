use crate::gateway::TriggerGateway;
use crate::registry::ResultBoard;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Trigger entry point (also owns the session registry)
    pub gateway: TriggerGateway,

    /// Per-device latest results
    pub board: Arc<ResultBoard>,
}

impl AppState {
    pub fn new(gateway: TriggerGateway, board: Arc<ResultBoard>) -> Self {
        Self { gateway, board }
    }
}
