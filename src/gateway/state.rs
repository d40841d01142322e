use std::sync::Arc;

use crate::auth::AuthGate;
use crate::transfer::TransferOrchestrator;

/// Gateway application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransferOrchestrator>,
    pub auth: Arc<dyn AuthGate>,
    /// Build identifier reported by `/health`
    pub version: &'static str,
}

impl AppState {
    pub fn new(orchestrator: Arc<TransferOrchestrator>, auth: Arc<dyn AuthGate>) -> Self {
        Self {
            orchestrator,
            auth,
            version: env!("GIT_HASH"),
        }
    }
}
