//! Audit Service
//!
//! Facade over the browser pool, the phase pipeline, and the report cache.
//! One service instance serves any number of concurrent analyses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use webaudit_core::{AutomationEngine, HttpClient, ProgressEvent, ProgressSink};
use webaudit_pipeline::{validate_target, AggregateResult, Pipeline, ReportStore, RunOptions};

use crate::models::settings::AppConfig;
use crate::services::analyzers::default_phases;
use crate::services::browser::{BrowserPool, PoolHealth, PoolStats};
use crate::services::http::ReqwestHttpClient;
use crate::services::report_cache::MemoryReportStore;
use crate::utils::error::{AppError, AppResult};

/// Per-request knobs for `AuditService::analyze`.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub include_screenshots: bool,
    /// Serve a recent cached report when one exists
    pub use_cache: bool,
    pub cancellation: CancellationToken,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            include_screenshots: true,
            use_cache: true,
            cancellation: CancellationToken::new(),
        }
    }
}

impl AnalyzeOptions {
    pub fn with_screenshots(mut self, include: bool) -> Self {
        self.include_screenshots = include;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Service-level health snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub ready: bool,
    pub pool: PoolHealth,
    pub stats: PoolStats,
    pub phases: Vec<String>,
    pub runs: u64,
    pub cache_enabled: bool,
}

pub struct AuditService {
    config: AppConfig,
    pool: BrowserPool,
    pipeline: Pipeline,
    store: Option<Arc<dyn ReportStore>>,
    runs: AtomicU64,
}

impl AuditService {
    /// Start the service with the reqwest-backed HTTP client.
    pub async fn start(config: AppConfig, engine: Arc<dyn AutomationEngine>) -> AppResult<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(&config.http)?);
        Self::start_with(config, engine, http).await
    }

    /// Start the service with an explicit HTTP client.
    pub async fn start_with(
        config: AppConfig,
        engine: Arc<dyn AutomationEngine>,
        http: Arc<dyn HttpClient>,
    ) -> AppResult<Self> {
        config.validate().map_err(AppError::validation)?;

        let pool = BrowserPool::start(engine, config.pool.to_pool_config()).await?;

        let mut pipeline = Pipeline::new();
        for (phase, phase_config) in default_phases(&config, &pool, &http) {
            pipeline.register_phase(phase, phase_config);
        }
        if let Err(e) = pipeline.validate_weights() {
            // Do not leak the pool's instances on a rejected configuration
            if let Err(close) = pool.shutdown().await {
                warn!(error = %close, "Pool shutdown after failed start reported an error");
            }
            return Err(e.into());
        }

        let store: Option<Arc<dyn ReportStore>> = if config.cache.enabled {
            Some(Arc::new(MemoryReportStore::new(&config.cache)))
        } else {
            None
        };

        info!(
            phases = ?pipeline.phase_ids(),
            cache = store.is_some(),
            "Audit service started"
        );
        Ok(Self {
            config,
            pool,
            pipeline,
            store,
            runs: AtomicU64::new(0),
        })
    }

    /// Replace the report store (e.g. with a persistent one).
    pub fn with_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    /// Analyze `url`, serving a cached report when one is fresh enough.
    pub async fn analyze(
        &self,
        url: &str,
        options: AnalyzeOptions,
        sink: &dyn ProgressSink,
    ) -> AppResult<AggregateResult> {
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let analysis_id = format!("{}-{}", run, Uuid::new_v4().simple());

        let target = validate_target(url, self.config.allow_private_targets)?;
        let cache_key = target.to_string();

        if options.use_cache {
            if let Some(report) = self.cached(&cache_key).await {
                info!(%analysis_id, target = %cache_key, "Serving cached report");
                self.pipeline
                    .emit(sink, ProgressEvent::new("done", 100, "Served from cache"))
                    .await;
                return Ok(report);
            }
        }

        let run_options = RunOptions::default()
            .with_analysis_id(analysis_id)
            .with_screenshots(options.include_screenshots)
            .allow_private_targets(self.config.allow_private_targets)
            .with_cancellation(options.cancellation);

        let report = self.pipeline.run(&cache_key, run_options, sink).await?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&report).await {
                warn!(analysis_id = %report.analysis_id, error = %e, "Failed to cache report");
            }
        }
        Ok(report)
    }

    async fn cached(&self, key: &str) -> Option<AggregateResult> {
        let store = self.store.as_ref()?;
        let max_age = Duration::from_secs(self.config.cache.ttl_secs);
        match store.find_recent(key, max_age).await {
            Ok(Some(mut report)) => {
                report.cached = true;
                Some(report)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Report cache lookup failed");
                None
            }
        }
    }

    pub fn health(&self) -> ServiceHealth {
        let pool = self.pool.health();
        ServiceHealth {
            ready: pool.ready,
            stats: self.pool.stats(),
            pool,
            phases: self
                .pipeline
                .phase_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
            runs: self.runs.load(Ordering::Relaxed),
            cache_enabled: self.store.is_some(),
        }
    }

    /// Shut the pool down. Idempotent.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.pool.shutdown().await?;
        info!(runs = self.runs.load(Ordering::Relaxed), "Audit service stopped");
        Ok(())
    }
}
