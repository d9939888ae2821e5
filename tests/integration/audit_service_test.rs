//! Audit Service Integration Tests
//!
//! The full default phase set behind `AuditService`, with a counting
//! engine and a table-driven HTTP client.

use std::sync::Arc;
use std::time::Duration;

use webaudit::commands::{get_health, init_app};
use webaudit::services::{AnalyzeOptions, AuditService};
use webaudit::{AppConfig, AppError, AppState};
use webaudit_core::{CoreError, HttpClient, NoopSink};

use crate::support::{healthy_site, CountingEngine, MisbehavingSink, RecordingSink, TableHttp};

async fn service(engine: Arc<CountingEngine>, http: Arc<TableHttp>) -> AuditService {
    let http: Arc<dyn HttpClient> = http;
    AuditService::start_with(AppConfig::default(), engine, http)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_second_analysis_is_served_from_cache() {
    let engine = CountingEngine::new();
    let http = Arc::new(healthy_site());
    let audit = service(engine.clone(), http.clone()).await;

    let first = audit
        .analyze("example.com", AnalyzeOptions::default(), &NoopSink)
        .await
        .unwrap();
    assert!(!first.cached);
    assert_eq!(first.phases.len(), 4);
    let hits = http.hits();

    let sink = RecordingSink::default();
    let second = audit
        .analyze("https://example.com/", AnalyzeOptions::default(), &sink)
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(second.analysis_id, first.analysis_id);
    assert_eq!(second.overall_score, first.overall_score);
    assert_eq!(http.hits(), hits);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, "done");
    assert_eq!(events[0].percent, 100);

    assert_eq!(audit.health().runs, 2);
    audit.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_survives_misbehaving_sink() {
    let audit = service(CountingEngine::new(), Arc::new(healthy_site())).await;
    audit
        .analyze("https://example.com", AnalyzeOptions::default(), &NoopSink)
        .await
        .unwrap();

    for sink in [MisbehavingSink::Hang, MisbehavingSink::Panic] {
        let served = tokio::time::timeout(
            Duration::from_secs(30),
            audit.analyze("https://example.com", AnalyzeOptions::default(), &sink),
        )
        .await
        .expect("cache hit waited on the sink")
        .unwrap();
        assert!(served.cached);
    }

    audit.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cache_bypass_runs_fresh_analysis() {
    let audit = service(CountingEngine::new(), Arc::new(healthy_site())).await;

    let first = audit
        .analyze("https://example.com", AnalyzeOptions::default(), &NoopSink)
        .await
        .unwrap();
    let second = audit
        .analyze(
            "https://example.com",
            AnalyzeOptions::default().with_cache(false),
            &NoopSink,
        )
        .await
        .unwrap();

    assert!(!second.cached);
    assert_ne!(first.analysis_id, second.analysis_id);
    assert!(first.analysis_id.starts_with("1-"));
    assert!(second.analysis_id.starts_with("2-"));

    let stats = audit.pool().stats();
    assert_eq!(stats.leased, 0);
    // speed and mobile lease once per fresh run
    assert_eq!(stats.total_leases, 4);
    audit.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_browser_degrades_browser_phases_only() {
    let audit = service(CountingEngine::refusing(), Arc::new(healthy_site())).await;
    assert!(!audit.health().ready);

    let report = audit
        .analyze("https://example.com", AnalyzeOptions::default(), &NoopSink)
        .await
        .unwrap();

    assert_eq!(report.degraded_phases(), vec!["speed", "mobile"]);
    let seo = report.phase("seo").unwrap();
    let security = report.phase("security").unwrap();
    assert!(seo.outcome.is_completed());
    assert_eq!(security.score(), 100);

    let expected = (f64::from(seo.score()) * 0.25 + 100.0 * 0.25).round() as u8;
    assert_eq!(report.overall_score, expected);
    audit.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_target_is_rejected_before_any_work() {
    let http = Arc::new(TableHttp::new());
    let audit = service(CountingEngine::new(), http.clone()).await;

    let err = audit
        .analyze("javascript:alert(1)", AnalyzeOptions::default(), &NoopSink)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Core(CoreError::InvalidTarget(_))));
    assert_eq!(http.hits(), 0);
    audit.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_weights_do_not_start_service() {
    let mut config = AppConfig::default();
    config.phases.speed.weight = 0.9;
    let http: Arc<dyn HttpClient> = Arc::new(TableHttp::new());

    let result = AuditService::start_with(config, CountingEngine::new(), http).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_init_then_health_through_commands() {
    let temp = tempfile::tempdir().unwrap();
    let state = AppState::new();

    let init = init_app(&state, Some(temp.path().join("config.json")), CountingEngine::new()).await;
    assert!(init.success, "{:?}", init.error);
    let init = init.data.unwrap();
    assert_eq!(init.engine, "counting");
    assert_eq!(init.phases, vec!["speed", "seo", "security", "mobile"]);

    let health = get_health(&state).await.data.unwrap();
    assert_eq!(health.status, "healthy");
    assert!(health.config);
    assert!(health.audit.unwrap().ready);

    state.shutdown().await.unwrap();
    let health = get_health(&state).await.data.unwrap();
    assert_eq!(health.status, "degraded");
}
