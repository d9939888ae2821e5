//! Application State
//!
//! Process-wide state shared by the CLI commands: the configuration service
//! and the running audit service.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use webaudit_core::AutomationEngine;

use crate::models::settings::AppConfig;
use crate::services::audit::AuditService;
use crate::storage::ConfigService;
use crate::utils::error::{AppError, AppResult};

/// Application state
pub struct AppState {
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Audit service (browser pool + pipeline), started on initialize
    audit: Arc<RwLock<Option<Arc<AuditService>>>>,
    /// Whether the state has been initialized
    initialized: Arc<RwLock<bool>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(None)),
            audit: Arc::new(RwLock::new(None)),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    /// Load configuration only; enough for the config command.
    pub async fn load_config(&self, config_path: Option<PathBuf>) -> AppResult<()> {
        let service = match config_path {
            Some(path) => ConfigService::open(path)?,
            None => ConfigService::new()?,
        };
        *self.config.write().await = Some(service);
        Ok(())
    }

    /// Load configuration and start the audit service
    pub async fn initialize(
        &self,
        config_path: Option<PathBuf>,
        engine: Arc<dyn AutomationEngine>,
    ) -> AppResult<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Ok(());
        }

        if self.config.read().await.is_none() {
            self.load_config(config_path).await?;
        }
        let config = self.get_config().await?;

        let audit = AuditService::start(config, engine).await?;
        *self.audit.write().await = Some(Arc::new(audit));

        *initialized = true;
        Ok(())
    }

    /// Check if config is loaded
    pub fn is_config_healthy(&self) -> bool {
        self.config
            .try_read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config().clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Path of the loaded config file
    pub async fn config_path(&self) -> AppResult<PathBuf> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.path().to_path_buf()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Get mutable config service access
    pub async fn with_config_mut<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut ConfigService) -> AppResult<T>,
    {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => f(config),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Get the running audit service
    pub async fn audit(&self) -> AppResult<Arc<AuditService>> {
        self.audit
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::internal("Audit service not started"))
    }

    /// Stop the audit service, if running
    pub async fn shutdown(&self) -> AppResult<()> {
        let audit = self.audit.write().await.take();
        if let Some(audit) = audit {
            audit.shutdown().await?;
        }
        *self.initialized.write().await = false;
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("initialized", &self.initialized)
            .finish()
    }
}
