//! WebAudit - Rust Backend Library
//!
//! Website audit engine: a pooled browser resource manager, concurrent
//! probe fan-out with failure correlation, and a phase orchestrator that
//! folds phase scores into one weighted report.
//!
//! - CLI command handlers (`commands`)
//! - Runtime services: browser pool, phases, HTTP, report cache (`services`)
//! - Storage layer (JSON config)
//! - Data models and utilities

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export commonly used items from commands
pub use commands::{
    // Init commands
    init_app, get_version,
    // Health commands
    get_health,
    // Settings commands
    get_settings, reset_settings,
    // Analysis commands
    analyze_url,
};
pub use models::response::{CommandResponse, HealthResponse};
pub use models::settings::AppConfig;
pub use services::{AnalyzeOptions, AuditService, BrowserPool, PoolConfig};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
