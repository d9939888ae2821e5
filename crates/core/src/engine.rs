//! Automation Engine Abstraction
//!
//! The browser engine is an external collaborator. The pool only needs to
//! open heavyweight instances, carve short-lived sessions out of them, and
//! close both. Concrete engines (headless Chromium, test fakes) implement
//! these traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// User agent presented by analysis sessions unless overridden.
pub const DEFAULT_USER_AGENT: &str = "WebAudit/1.0 (Website Analysis Bot)";

/// User agent presented by the mobile profile.
pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_7_1 like Mac OS X) AppleWebKit/605.1.15";

/// Default per-operation timeout for sessions (30s).
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;

/// Navigation milestone to wait for before `navigate` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    /// The `load` event fired
    Load,
    /// The `DOMContentLoaded` event fired
    #[default]
    DomContentLoaded,
    /// No network activity for a short quiet period
    NetworkIdle,
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Configuration for a new session carved out of an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub user_agent: String,
    /// Keep going on certificate errors so broken sites can still be audited
    pub ignore_https_errors: bool,
    pub default_timeout_ms: u64,
}

impl SessionConfig {
    /// Standard desktop profile (1920x1080).
    pub fn desktop() -> Self {
        Self {
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            device_scale_factor: 1.0,
            is_mobile: false,
            has_touch: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ignore_https_errors: true,
            default_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }

    /// Phone profile (375x667 at 2x, touch enabled).
    pub fn mobile() -> Self {
        Self {
            viewport: Viewport {
                width: 375,
                height: 667,
            },
            device_scale_factor: 2.0,
            is_mobile: true,
            has_touch: true,
            user_agent: MOBILE_USER_AGENT.to_string(),
            ignore_https_errors: true,
            default_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::desktop()
    }
}

/// Factory for heavyweight engine instances (one browser process each).
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Engine name for logs and health output.
    fn name(&self) -> &str;

    /// Launch a new instance.
    async fn open(&self) -> CoreResult<Arc<dyn EngineInstance>>;

    /// Release the engine driver itself. Called once, after every
    /// instance has been closed.
    async fn shutdown(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// One running engine instance.
#[async_trait]
pub trait EngineInstance: Send + Sync {
    /// Create an isolated session (context + page) on this instance.
    async fn new_session(&self, config: &SessionConfig) -> CoreResult<Box<dyn EngineSession>>;

    /// Terminate the instance and every session it still owns.
    async fn close(&self) -> CoreResult<()>;
}

/// An isolated browsing session.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Navigate to `url`, waiting for `wait_until` within `timeout_ms`.
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout_ms: u64) -> CoreResult<()>;

    /// Evaluate a script in the page and return its JSON value.
    async fn evaluate(&self, script: &str) -> CoreResult<serde_json::Value>;

    /// Capture a PNG screenshot of the full page.
    async fn capture(&self) -> CoreResult<Vec<u8>>;

    /// Close the session. Closing twice is a no-op.
    async fn close(&self) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_profile() {
        let config = SessionConfig::desktop();
        assert_eq!(config.viewport.width, 1920);
        assert!(!config.is_mobile);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(SessionConfig::default(), config);
    }

    #[test]
    fn test_mobile_profile() {
        let config = SessionConfig::mobile().with_timeout_ms(5_000);
        assert_eq!(config.viewport.width, 375);
        assert!(config.is_mobile);
        assert!(config.has_touch);
        assert_eq!(config.default_timeout_ms, 5_000);
    }

    #[test]
    fn test_wait_until_default() {
        assert_eq!(WaitUntil::default(), WaitUntil::DomContentLoaded);
    }
}
