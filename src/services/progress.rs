//! Progress sink adapters
//!
//! Concrete transports behind `ProgressSink`: a tracing logger for the CLI
//! and an mpsc channel for embedding callers.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};
use webaudit_core::{CoreError, CoreResult, ProgressEvent, ProgressSink};

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn notify(&self, event: &ProgressEvent) -> CoreResult<()> {
        if event.is_error {
            warn!(stage = %event.stage, percent = event.percent, "{}", event.message);
        } else {
            info!(stage = %event.stage, percent = event.percent, "{}", event.message);
        }
        Ok(())
    }
}

/// Forwards events into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn notify(&self, event: &ProgressEvent) -> CoreResult<()> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| CoreError::internal("progress receiver dropped"))
    }
}
