//! Progress Events and Sink Capability
//!
//! A run reports staged progress to a single abstract sink. Concrete
//! transports (channels, sockets, logs) adapt behind `ProgressSink`; the
//! orchestrator treats every notification as fire-and-forget.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// One progress notification emitted during an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Stage label (e.g. "init", "speed", "aggregate", "done")
    pub stage: String,
    /// Percent complete, 0-100, non-decreasing within a run
    pub percent: u8,
    /// Human-readable status message
    pub message: String,
    /// Whether this event reports a degraded stage
    pub is_error: bool,
}

impl ProgressEvent {
    /// Create a regular progress event.
    pub fn new(stage: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: percent.min(100),
            message: message.into(),
            is_error: false,
        }
    }

    /// Create an event flagged as an error.
    pub fn error(stage: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(stage, percent, message)
        }
    }
}

/// External observer of run progress.
///
/// Implementations may complete immediately or await a transport. Errors
/// are reported back but never abort the run that emitted the event.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Deliver one event.
    async fn notify(&self, event: &ProgressEvent) -> CoreResult<()>;
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn notify(&self, _event: &ProgressEvent) -> CoreResult<()> {
        Ok(())
    }
}
