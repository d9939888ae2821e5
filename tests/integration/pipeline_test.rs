//! Pipeline Integration Tests
//!
//! Real security fan-out and pool-backed phases running under the
//! orchestrator: weighted scoring, cascade degradation, progress, and
//! lease release when a phase fails, panics, times out or is cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use webaudit::services::analyzers::security::SecurityPhase;
use webaudit::services::browser::{BrowserPool, PoolConfig};
use webaudit_core::{CoreError, CoreResult, HttpClient, HttpErrorKind, Outcome};
use webaudit_pipeline::{
    DegradationKind, FanOut, Grade, Phase, PhaseConfig, PhaseContext, PhaseOutput, Pipeline,
    Reachability, RunOptions,
};

use crate::support::{healthy_site, CountingEngine, RecordingSink, TableHttp};

// ============================================================================
// Test phases
// ============================================================================

enum Behaviour {
    Score(u8),
    Fail,
    Panic,
    Hang,
}

/// Holds a pool lease for the whole run, then behaves as told.
struct LeasingPhase {
    id: &'static str,
    pool: BrowserPool,
    behaviour: Behaviour,
}

#[async_trait]
impl Phase for LeasingPhase {
    fn id(&self) -> &str {
        self.id
    }

    fn label(&self) -> &str {
        self.id
    }

    async fn run(&self, _ctx: &PhaseContext) -> CoreResult<PhaseOutput> {
        let lease = self.pool.checkout_default().await?;
        let outcome = match self.behaviour {
            Behaviour::Score(score) => Ok(PhaseOutput::new(score, json!({ "entry": lease.entry_id() }))),
            Behaviour::Fail => Err(CoreError::engine("navigation crashed")),
            Behaviour::Panic => panic!("renderer died"),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(PhaseOutput::new(100, json!({})))
            }
        };
        self.pool.release(lease).await?;
        outcome
    }
}

fn pool_config() -> PoolConfig {
    PoolConfig {
        initial_size: 2,
        min_size: 1,
        max_size: 2,
        max_uses: 100,
        max_idle: Duration::from_secs(300),
        maintenance_interval: Duration::from_secs(3600),
        session_timeout: Duration::from_secs(5),
    }
}

fn leasing(id: &'static str, pool: &BrowserPool, behaviour: Behaviour) -> Arc<dyn Phase> {
    Arc::new(LeasingPhase {
        id,
        pool: pool.clone(),
        behaviour,
    })
}

fn security(http: TableHttp) -> Arc<dyn Phase> {
    let http: Arc<dyn HttpClient> = Arc::new(http);
    Arc::new(SecurityPhase::new(
        http,
        FanOut::new(Duration::from_secs(2)),
        Duration::from_secs(1),
    ))
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Scoring and correlation
// ============================================================================

#[tokio::test]
async fn test_healthy_site_scores_every_phase() {
    let pool = BrowserPool::start(CountingEngine::new(), pool_config()).await.unwrap();
    let mut pipeline = Pipeline::new();
    pipeline.register_phase(leasing("speed", &pool, Behaviour::Score(90)), PhaseConfig::new(0.5, Duration::from_secs(5)));
    pipeline.register_phase(security(healthy_site()), PhaseConfig::new(0.5, Duration::from_secs(5)));
    pipeline.validate_weights().unwrap();

    let report = pipeline
        .run("https://example.com", RunOptions::default(), &RecordingSink::default())
        .await
        .unwrap();

    assert_eq!(report.target, "https://example.com/");
    assert_eq!(report.phase("security").unwrap().score(), 100);
    assert_eq!(report.overall_score, 95);
    assert_eq!(report.overall_grade, Grade::A);
    assert!(report.degradations.is_empty());
    assert!(report.degraded_phases().is_empty());

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_target_cascades_through_security_probes() {
    let mut pipeline = Pipeline::new();
    pipeline.register_phase(security(TableHttp::new()), PhaseConfig::new(1.0, Duration::from_secs(5)));

    let report = pipeline
        .run("https://example.com", RunOptions::default(), &RecordingSink::default())
        .await
        .unwrap();

    // The phase itself completes; its probes carry the damage.
    let phase = report.phase("security").unwrap();
    assert!(phase.outcome.is_completed());
    assert_eq!(report.overall_score, 0);
    assert_eq!(report.overall_grade, Grade::F);

    let details = phase.outcome.payload().unwrap();
    assert_eq!(details["reachability"]["state"], "unreachable");

    assert!(!report.degradations.is_empty());
    for degradation in &report.degradations {
        assert_eq!(degradation.phase.as_deref(), Some("security"));
        assert_eq!(degradation.kind, DegradationKind::ForcedFailure);
        assert_eq!(degradation.adjusted_score, 0);
    }
    assert!(report.degradations.iter().all(|d| d.probe_id != "certificate"));
    assert!(report.top_recommendations[0].contains("reachable"));
}

#[tokio::test]
async fn test_tls_failure_reduces_dependent_probe_confidence() {
    let http = healthy_site().fail("https://example.com/", HttpErrorKind::Tls);
    let mut pipeline = Pipeline::new();
    pipeline.register_phase(security(http), PhaseConfig::new(1.0, Duration::from_secs(5)));

    let report = pipeline
        .run("https://example.com", RunOptions::default(), &RecordingSink::default())
        .await
        .unwrap();

    let details = report.phase("security").unwrap().outcome.payload().unwrap().clone();
    assert_eq!(details["reachability"]["state"], "degraded");
    let reduced: Vec<_> = report
        .degradations
        .iter()
        .filter(|d| d.kind == DegradationKind::ReducedConfidence)
        .collect();
    assert!(!reduced.is_empty());
    for degradation in reduced {
        let original = degradation.original_score.unwrap();
        assert_eq!(degradation.adjusted_score, original / 2);
    }
}

// ============================================================================
// Degraded phases release their leases
// ============================================================================

#[tokio::test]
async fn test_failing_phases_release_leases_and_score_zero() {
    let engine = CountingEngine::new();
    let pool = BrowserPool::start(engine.clone(), pool_config()).await.unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.register_phase(leasing("fails", &pool, Behaviour::Fail), PhaseConfig::new(0.25, Duration::from_secs(5)));
    pipeline.register_phase(leasing("panics", &pool, Behaviour::Panic), PhaseConfig::new(0.25, Duration::from_secs(5)));
    pipeline.register_phase(leasing("hangs", &pool, Behaviour::Hang), PhaseConfig::new(0.25, Duration::from_millis(50)));
    pipeline.register_phase(leasing("works", &pool, Behaviour::Score(80)), PhaseConfig::new(0.25, Duration::from_secs(5)));

    let sink = RecordingSink::default();
    let report = pipeline
        .run("https://example.com", RunOptions::default(), &sink)
        .await
        .unwrap();
    settle().await;

    assert!(matches!(report.phase("fails").unwrap().outcome, Outcome::Failed { .. }));
    assert!(matches!(report.phase("panics").unwrap().outcome, Outcome::Failed { .. }));
    assert!(matches!(report.phase("hangs").unwrap().outcome, Outcome::TimedOut { .. }));
    assert_eq!(report.phase("works").unwrap().score(), 80);
    // Degraded phases keep their weight at zero score
    assert_eq!(report.overall_score, 20);
    assert_eq!(report.degraded_phases(), vec!["fails", "panics", "hangs"]);

    let stats = pool.stats();
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.total_leases, 4);
    assert_eq!(engine.overlaps(), 0);

    let events = sink.events();
    assert_eq!(events.first().unwrap().stage, "init");
    assert_eq!(events.first().unwrap().percent, 0);
    assert_eq!(events.last().unwrap().stage, "done");
    assert_eq!(events.last().unwrap().percent, 100);
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
    let errors: Vec<_> = events.iter().filter(|e| e.is_error).map(|e| e.stage.as_str()).collect();
    assert_eq!(errors, vec!["fails", "panics", "hangs"]);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancellation_releases_lease_and_returns_error() {
    let pool = BrowserPool::start(CountingEngine::new(), pool_config()).await.unwrap();
    let mut pipeline = Pipeline::new();
    pipeline.register_phase(leasing("hangs", &pool, Behaviour::Hang), PhaseConfig::new(1.0, Duration::from_secs(3600)));

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let err = pipeline
        .run(
            "https://example.com",
            RunOptions::default().with_cancellation(token),
            &RecordingSink::default(),
        )
        .await
        .unwrap_err();
    settle().await;

    assert!(matches!(err, CoreError::Cancelled));
    assert_eq!(pool.stats().leased, 0);
    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_target_is_the_only_hard_error() {
    let mut pipeline = Pipeline::new();
    pipeline.register_phase(security(TableHttp::new()), PhaseConfig::new(1.0, Duration::from_secs(5)));
    let sink = RecordingSink::default();

    let err = pipeline
        .run("ftp://example.com", RunOptions::default(), &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTarget(_)));
    assert!(sink.events().is_empty());

    let err = pipeline
        .run("http://127.0.0.1:8080", RunOptions::default(), &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTarget(_)));
}

#[test]
fn test_reachability_is_tagged_in_json() {
    let value = serde_json::to_value(Reachability::Unreachable { reason: "refused".into() }).unwrap();
    assert_eq!(value["state"], "unreachable");
}
