//! In-memory report store
//!
//! Bounded, TTL-expiring cache of finished reports keyed by normalized
//! target URL. Backs `ReportStore` for the CLI and tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mini_moka::sync::Cache;
use webaudit_core::CoreResult;
use webaudit_pipeline::{AggregateResult, ReportStore};

use crate::models::settings::CacheSettings;

pub struct MemoryReportStore {
    cache: Cache<String, AggregateResult>,
}

impl MemoryReportStore {
    pub fn new(settings: &CacheSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.max_entries)
            .time_to_live(Duration::from_secs(settings.ttl_secs))
            .build();
        Self { cache }
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn save(&self, report: &AggregateResult) -> CoreResult<()> {
        self.cache.insert(report.target.clone(), report.clone());
        Ok(())
    }

    async fn find_recent(
        &self,
        target: &str,
        max_age: Duration,
    ) -> CoreResult<Option<AggregateResult>> {
        let Some(report) = self.cache.get(&target.to_string()) else {
            return Ok(None);
        };
        let age = Utc::now()
            .signed_duration_since(report.finished_at)
            .to_std()
            .unwrap_or_default();
        Ok((age <= max_age).then_some(report))
    }
}
