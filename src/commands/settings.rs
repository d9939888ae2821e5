//! Settings Commands
//!
//! Reading and resetting the configuration file.

use serde::Serialize;

use crate::models::response::CommandResponse;
use crate::models::settings::AppConfig;
use crate::state::AppState;

/// Configuration together with where it was loaded from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub path: String,
    pub config: AppConfig,
}

async fn view(state: &AppState) -> crate::utils::error::AppResult<SettingsView> {
    Ok(SettingsView {
        path: state.config_path().await?.display().to_string(),
        config: state.get_config().await?,
    })
}

/// Get current application settings
pub async fn get_settings(state: &AppState) -> CommandResponse<SettingsView> {
    view(state).await.into()
}

/// Restore default settings and persist them
pub async fn reset_settings(state: &AppState) -> CommandResponse<SettingsView> {
    if let Err(e) = state.with_config_mut(|config| config.reset()).await {
        return CommandResponse::err(e.to_string());
    }
    view(state).await.into()
}
