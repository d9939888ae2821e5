//! Report Store Trait
//!
//! Persistence is owned by the main crate. This trait lets the service look
//! up and save finished reports without depending on a storage backend.

use std::time::Duration;

use async_trait::async_trait;
use webaudit_core::CoreResult;

use crate::models::AggregateResult;

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Store a finished report.
    async fn save(&self, report: &AggregateResult) -> CoreResult<()>;

    /// Most recent report for `target` no older than `max_age`.
    async fn find_recent(
        &self,
        target: &str,
        max_age: Duration,
    ) -> CoreResult<Option<AggregateResult>>;
}
