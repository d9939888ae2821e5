//! Security Phase
//!
//! Fans out five probes concurrently and combines their scores. The
//! connectivity probe is foundational: when it reports the target
//! unreachable the dependent probes are forced to fail, and when it reports
//! a degraded connection their scores are reduced.

pub mod probes;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use webaudit_core::{CoreResult, HttpClient};
use webaudit_pipeline::{FanOut, FanOutReport, Phase, PhaseContext, PhaseOutput, Probe, Reachability};

use super::clamp_score;
pub use probes::{
    CertificateProbe, ConnectivityProbe, CookiesProbe, HeadersProbe, HttpsRedirectProbe,
};

/// Probe weights within the security score.
pub const PROBE_WEIGHTS: &[(&str, f64)] = &[
    ("certificate", 0.30),
    ("headers", 0.25),
    ("https_redirect", 0.20),
    ("cookies", 0.15),
    ("connectivity", 0.10),
];

pub struct SecurityPhase {
    fan_out: FanOut,
    probes: Vec<Arc<dyn Probe>>,
}

impl SecurityPhase {
    pub fn new(http: Arc<dyn HttpClient>, fan_out: FanOut, connectivity_timeout: Duration) -> Self {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(ConnectivityProbe::new(Arc::clone(&http), connectivity_timeout)),
            Arc::new(CertificateProbe::new(Arc::clone(&http))),
            Arc::new(HeadersProbe::new(Arc::clone(&http))),
            Arc::new(HttpsRedirectProbe::new(Arc::clone(&http))),
            Arc::new(CookiesProbe::new(http)),
        ];
        Self::with_probes(fan_out, probes)
    }

    /// Run an explicit probe set instead of the standard five.
    pub fn with_probes(fan_out: FanOut, probes: Vec<Arc<dyn Probe>>) -> Self {
        Self { fan_out, probes }
    }
}

/// Weighted combination of probe scores. Degraded probes count as 0.
pub fn combine_scores(report: &FanOutReport) -> u8 {
    clamp_score(
        PROBE_WEIGHTS
            .iter()
            .map(|(id, weight)| report.score_of(id) as f64 * weight)
            .sum(),
    )
}

fn collect_recommendations(report: &FanOutReport) -> Vec<String> {
    let mut recs = Vec::new();
    if let Reachability::Unreachable { reason } = &report.reachability {
        recs.push(format!("Make sure the site is reachable ({})", reason));
    }
    for result in &report.results {
        let Some(details) = result.outcome.payload() else {
            continue;
        };
        if let Some(Value::Array(items)) = details.get("recommendations") {
            for item in items.iter().filter_map(Value::as_str) {
                if !recs.iter().any(|r| r == item) {
                    recs.push(item.to_string());
                }
            }
        }
    }
    recs
}

#[async_trait]
impl Phase for SecurityPhase {
    fn id(&self) -> &str {
        "security"
    }

    fn label(&self) -> &str {
        "Security"
    }

    async fn run(&self, ctx: &PhaseContext) -> CoreResult<PhaseOutput> {
        let report = self.fan_out.run(&ctx.target, &self.probes).await;
        let score = combine_scores(&report);

        info!(
            analysis_id = %ctx.analysis_id,
            score,
            degraded_probes = report.degradations.len(),
            elapsed_ms = report.duration_ms,
            "Security probes settled"
        );

        let recommendations = collect_recommendations(&report);
        let details = json!({
            "reachability": report.reachability,
            "probes": report.results,
            "durationMs": report.duration_ms,
        });
        Ok(PhaseOutput::new(score, details)
            .with_recommendations(recommendations)
            .with_degradations(report.degradations))
    }
}
