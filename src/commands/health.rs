//! Health Check Commands

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::AppState;

/// Get the health status of the config layer and the audit service
pub async fn get_health(state: &AppState) -> CommandResponse<HealthResponse> {
    let mut health = HealthResponse {
        config: state.is_config_healthy(),
        ..Default::default()
    };
    health.audit = state.audit().await.ok().map(|audit| audit.health());

    let ready = health.audit.as_ref().is_some_and(|audit| audit.ready);
    health.status = if health.config && ready {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    CommandResponse::ok(health)
}
