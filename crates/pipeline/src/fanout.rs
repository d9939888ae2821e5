//! Probe Fan-Out Aggregator
//!
//! Launches a fixed set of probes concurrently against one target. Each
//! probe is bounded by its own timeout and isolated from panics, so one
//! probe's failure never discards its siblings' results. Once every probe
//! has settled, the correlation pass runs over the full set.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use webaudit_core::{CoreError, CoreResult, Outcome};

use crate::correlation::CorrelationPolicy;
use crate::models::{Confidence, Degradation, ProbeOutput, ProbeResult, ProbeRole, Reachability};

/// Default per-probe timeout (10s).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One sub-check executed concurrently with its siblings.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Stable identifier (e.g. "headers").
    fn id(&self) -> &str;

    fn role(&self) -> ProbeRole {
        ProbeRole::Dependent
    }

    /// Override for the fan-out's default timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn run(&self, target: &Url) -> CoreResult<ProbeOutput>;
}

/// Everything one fan-out produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    /// One result per probe, in the order the probes were supplied
    pub results: Vec<ProbeResult>,
    pub reachability: Reachability,
    pub degradations: Vec<Degradation>,
    pub duration_ms: u64,
}

impl FanOutReport {
    pub fn result(&self, probe_id: &str) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.probe_id == probe_id)
    }

    /// Score of a probe, 0 if it is missing or degraded.
    pub fn score_of(&self, probe_id: &str) -> u8 {
        self.result(probe_id).map(ProbeResult::score).unwrap_or(0)
    }
}

/// Runs probe sets and applies correlation.
#[derive(Debug, Clone)]
pub struct FanOut {
    probe_timeout: Duration,
    policy: CorrelationPolicy,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl FanOut {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            policy: CorrelationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CorrelationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CorrelationPolicy {
        &self.policy
    }

    /// Run every probe against `target` and return one result per probe.
    pub async fn run(&self, target: &Url, probes: &[Arc<dyn Probe>]) -> FanOutReport {
        let start = Instant::now();

        let futures = probes.iter().map(|probe| self.run_probe(target, probe.as_ref()));
        let mut results = join_all(futures).await;

        let (reachability, degradations) = self.policy.apply(&mut results);
        if !degradations.is_empty() {
            warn!(
                target = %target,
                verdict = ?reachability,
                count = degradations.len(),
                "Correlation downgraded dependent probes"
            );
        }

        FanOutReport {
            results,
            reachability,
            degradations,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn run_probe(&self, target: &Url, probe: &dyn Probe) -> ProbeResult {
        let probe_id = probe.id().to_string();
        let limit = probe.timeout().unwrap_or(self.probe_timeout);
        let start = Instant::now();

        let settled = tokio::time::timeout(limit, AssertUnwindSafe(probe.run(target)).catch_unwind()).await;

        let (outcome, signal) = match settled {
            Ok(Ok(Ok(output))) => (
                Outcome::completed(output.details, output.score),
                output.reachability,
            ),
            Ok(Ok(Err(err))) => {
                let err = CoreError::ProbeFailed {
                    probe: probe_id.clone(),
                    reason: err.to_string(),
                };
                warn!(probe = %probe_id, error = %err, "Probe failed");
                (Outcome::failed(err.to_string()), None)
            }
            Ok(Err(_panic)) => {
                warn!(probe = %probe_id, "Probe panicked");
                (Outcome::failed(format!("probe '{}' panicked", probe_id)), None)
            }
            Err(_) => {
                let err = CoreError::ProbeTimeout {
                    probe: probe_id.clone(),
                    after_ms: limit.as_millis() as u64,
                };
                warn!(probe = %probe_id, error = %err, "Probe timed out");
                (Outcome::timed_out(limit), None)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(probe = %probe_id, status = outcome.status_label(), elapsed_ms = duration_ms, "Probe settled");

        ProbeResult {
            probe_id,
            role: probe.role(),
            outcome,
            confidence: Confidence::Full,
            signal,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedProbe {
        id: &'static str,
        role: ProbeRole,
        score: u8,
        signal: Option<Reachability>,
    }

    #[async_trait]
    impl Probe for FixedProbe {
        fn id(&self) -> &str {
            self.id
        }
        fn role(&self) -> ProbeRole {
            self.role
        }
        async fn run(&self, _target: &Url) -> CoreResult<ProbeOutput> {
            let output = ProbeOutput::new(self.score, json!({ "probe": self.id }));
            Ok(match &self.signal {
                Some(signal) => output.with_reachability(signal.clone()),
                None => output,
            })
        }
    }

    struct ErrorProbe;

    #[async_trait]
    impl Probe for ErrorProbe {
        fn id(&self) -> &str {
            "broken"
        }
        async fn run(&self, _target: &Url) -> CoreResult<ProbeOutput> {
            Err(CoreError::internal("header parse error"))
        }
    }

    struct PanicProbe;

    #[async_trait]
    impl Probe for PanicProbe {
        fn id(&self) -> &str {
            "panics"
        }
        async fn run(&self, _target: &Url) -> CoreResult<ProbeOutput> {
            panic!("probe exploded");
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl Probe for HangingProbe {
        fn id(&self) -> &str {
            "hangs"
        }
        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(200))
        }
        async fn run(&self, _target: &Url) -> CoreResult<ProbeOutput> {
            futures_util::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn fixed(id: &'static str, score: u8) -> Arc<dyn Probe> {
        Arc::new(FixedProbe {
            id,
            role: ProbeRole::Dependent,
            score,
            signal: None,
        })
    }

    fn target() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[tokio::test]
    async fn test_failing_probe_is_isolated() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            fixed("certificate", 90),
            Arc::new(ErrorProbe),
            fixed("redirect", 100),
            fixed("cookies", 70),
        ];

        let report = FanOut::default().run(&target(), &probes).await;

        assert_eq!(report.results.len(), 4);
        assert!(matches!(report.results[1].outcome, Outcome::Failed { .. }));
        assert_eq!(report.results[0].score(), 90);
        assert_eq!(report.results[2].score(), 100);
        assert_eq!(report.results[3].score(), 70);
        assert_eq!(
            report.results[0].outcome.payload(),
            Some(&json!({ "probe": "certificate" }))
        );
    }

    #[tokio::test]
    async fn test_panicking_probe_is_contained() {
        let probes: Vec<Arc<dyn Probe>> = vec![fixed("headers", 80), Arc::new(PanicProbe)];
        let report = FanOut::default().run(&target(), &probes).await;

        assert_eq!(report.score_of("headers"), 80);
        let panicked = report.result("panics").unwrap();
        assert_eq!(panicked.outcome.reason().as_deref(), Some("probe 'panics' panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out() {
        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(HangingProbe), fixed("headers", 60)];
        let report = FanOut::default().run(&target(), &probes).await;

        assert!(matches!(
            report.results[0].outcome,
            Outcome::TimedOut { after_ms: 200 }
        ));
        assert_eq!(report.results[1].score(), 60);
    }

    #[tokio::test]
    async fn test_unreachable_foundation_cascades() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(FixedProbe {
                id: "connectivity",
                role: ProbeRole::Foundational,
                score: 0,
                signal: Some(Reachability::Unreachable {
                    reason: "dns lookup failed".into(),
                }),
            }),
            fixed("headers", 95),
            fixed("cookies", 100),
        ];

        let report = FanOut::default().run(&target(), &probes).await;

        assert!(report.reachability.is_unreachable());
        assert_eq!(report.degradations.len(), 2);
        for id in ["headers", "cookies"] {
            assert!(matches!(
                report.result(id).unwrap().outcome,
                Outcome::Failed { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_empty_probe_set() {
        let report = FanOut::default().run(&target(), &[]).await;
        assert!(report.results.is_empty());
        assert!(report.reachability.is_reachable());
    }
}
