//! Initialization Commands
//!
//! Loads configuration and starts the audit service.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use webaudit_core::AutomationEngine;

use crate::models::response::CommandResponse;
use crate::state::AppState;

/// Result of application initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResult {
    pub message: String,
    pub engine: String,
    pub phases: Vec<String>,
}

/// Initialize the application
pub async fn init_app(
    state: &AppState,
    config_path: Option<PathBuf>,
    engine: Arc<dyn AutomationEngine>,
) -> CommandResponse<InitResult> {
    let engine_name = engine.name().to_string();
    if let Err(e) = state.initialize(config_path, engine).await {
        return CommandResponse::err(e.to_string());
    }

    match state.audit().await {
        Ok(audit) => {
            let health = audit.health();
            let message = if health.ready {
                "WebAudit initialized".to_string()
            } else {
                "WebAudit initialized without a ready browser; browser phases will degrade".to_string()
            };
            CommandResponse::ok(InitResult {
                message,
                engine: engine_name,
                phases: health.phases,
            })
        }
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Get the application version
pub fn get_version() -> CommandResponse<String> {
    CommandResponse::ok(env!("CARGO_PKG_VERSION").to_string())
}
