//! Phase Orchestrator
//!
//! Runs the registered analysis phases in order against one target:
//! `Init -> Phase 1 -> ... -> Phase n -> Aggregate -> Done`.
//!
//! Every phase runs under its own timeout and panic boundary. A phase that
//! fails, panics, or times out is recorded as a degraded `PhaseResult` and the
//! run moves on; no phase is ever skipped. Progress percentages are computed
//! here rather than by the phases, and are clamped so they never go down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use webaudit_core::{CoreError, CoreResult, Outcome, ProgressEvent, ProgressSink, MAX_SCORE};

use crate::models::{
    collect_top_recommendations, grade_for, AggregateResult, Degradation, PhaseOutput,
    PhaseResult,
};
use crate::target::validate_target;

/// Longest time a single progress notification may take.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// Allowed distance of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

// ============================================================================
// Phase Trait
// ============================================================================

/// Inputs shared by every phase of one run.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub analysis_id: String,
    pub target: Url,
    pub include_screenshots: bool,
    /// Cancelled when the whole run is cancelled; phases holding a lease
    /// stop work and release it
    pub cancellation: CancellationToken,
}

/// One weighted, timeout-bounded stage of the pipeline.
#[async_trait]
pub trait Phase: Send + Sync {
    /// Stable identifier (e.g. "security").
    fn id(&self) -> &str;

    /// Display label used in progress messages.
    fn label(&self) -> &str;

    async fn run(&self, ctx: &PhaseContext) -> CoreResult<PhaseOutput>;
}

/// Weight and deadline for one registered phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseConfig {
    pub weight: f64,
    pub timeout_ms: u64,
    /// Shorter deadline used when screenshots are disabled
    #[serde(default)]
    pub fast_timeout_ms: Option<u64>,
}

impl PhaseConfig {
    pub fn new(weight: f64, timeout: Duration) -> Self {
        Self {
            weight,
            timeout_ms: timeout.as_millis() as u64,
            fast_timeout_ms: None,
        }
    }

    pub fn with_fast_timeout(mut self, timeout: Duration) -> Self {
        self.fast_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Deadline for a run with the given screenshot setting.
    pub fn effective_timeout(&self, include_screenshots: bool) -> Duration {
        let ms = match (include_screenshots, self.fast_timeout_ms) {
            (false, Some(fast)) => fast,
            _ => self.timeout_ms,
        };
        Duration::from_millis(ms)
    }
}

// ============================================================================
// Run Options
// ============================================================================

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub analysis_id: String,
    pub include_screenshots: bool,
    /// Permit loopback and private-network targets
    pub allow_private_targets: bool,
    pub cancellation: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            analysis_id: uuid::Uuid::new_v4().to_string(),
            include_screenshots: true,
            allow_private_targets: false,
            cancellation: CancellationToken::new(),
        }
    }
}

impl RunOptions {
    pub fn with_analysis_id(mut self, id: impl Into<String>) -> Self {
        self.analysis_id = id.into();
        self
    }

    pub fn with_screenshots(mut self, include: bool) -> Self {
        self.include_screenshots = include;
        self
    }

    pub fn allow_private_targets(mut self, allow: bool) -> Self {
        self.allow_private_targets = allow;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Central progress bookkeeping for one run.
///
/// Maps pipeline position to a percentage: `init` is 0, phase `i` of `n`
/// spans `5 + i*90/n` to `5 + (i+1)*90/n`, `aggregate` is 95 and `done` is
/// 100. Values never decrease.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    phase_count: usize,
    last: u8,
}

impl ProgressTracker {
    pub fn new(phase_count: usize) -> Self {
        Self {
            phase_count: phase_count.max(1),
            last: 0,
        }
    }

    pub fn init(&mut self) -> u8 {
        self.advance(0)
    }

    pub fn before_phase(&mut self, index: usize) -> u8 {
        self.advance(self.position(index))
    }

    pub fn after_phase(&mut self, index: usize) -> u8 {
        self.advance(self.position(index + 1))
    }

    pub fn aggregate(&mut self) -> u8 {
        self.advance(95)
    }

    pub fn done(&mut self) -> u8 {
        self.advance(100)
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    fn position(&self, index: usize) -> u8 {
        let span = 5 + index.min(self.phase_count) * 90 / self.phase_count;
        span as u8
    }

    fn advance(&mut self, percent: u8) -> u8 {
        self.last = self.last.max(percent.min(100));
        self.last
    }
}

/// Deliver one event, bounded by `limit`. Sink errors, panics, and slow
/// sinks are logged and swallowed.
async fn notify_sink(sink: &dyn ProgressSink, limit: Duration, event: ProgressEvent) {
    let delivery = AssertUnwindSafe(sink.notify(&event)).catch_unwind();
    match tokio::time::timeout(limit, delivery).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            warn!(stage = %event.stage, error = %e, "Progress sink failed");
        }
        Ok(Err(_)) => {
            warn!(stage = %event.stage, "Progress sink panicked");
        }
        Err(_) => {
            warn!(stage = %event.stage, timeout_ms = limit.as_millis() as u64, "Progress sink timed out");
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Weighted overall score.
///
/// Degraded phases contribute 0 at their full configured weight; weights are
/// not renormalized.
pub fn compute_overall_score(phases: &[PhaseResult]) -> u8 {
    let total: f64 = phases
        .iter()
        .map(|p| f64::from(p.score()) * p.weight)
        .sum();
    total.round().clamp(0.0, f64::from(MAX_SCORE)) as u8
}

// ============================================================================
// Pipeline
// ============================================================================

struct RegisteredPhase {
    phase: Arc<dyn Phase>,
    config: PhaseConfig,
}

/// The phase orchestrator.
pub struct Pipeline {
    phases: Vec<RegisteredPhase>,
    sink_timeout: Duration,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            phases: Vec::new(),
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    /// Append a phase. Phases run in registration order.
    pub fn register_phase(&mut self, phase: Arc<dyn Phase>, config: PhaseConfig) {
        self.phases.push(RegisteredPhase { phase, config });
    }

    /// Registered phase ids, in run order.
    pub fn phase_ids(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.phase.id()).collect()
    }

    /// Check that weights are non-negative and sum to 1.0 within tolerance.
    pub fn validate_weights(&self) -> CoreResult<()> {
        if let Some(bad) = self.phases.iter().find(|p| p.config.weight < 0.0) {
            return Err(CoreError::validation(format!(
                "Phase '{}' has a negative weight",
                bad.phase.id()
            )));
        }
        let sum: f64 = self.phases.iter().map(|p| p.config.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(CoreError::validation(format!(
                "Phase weights sum to {:.3}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }

    /// Run every phase against `target` and aggregate the results.
    ///
    /// Returns an error only for an invalid target or external cancellation;
    /// phase failures and timeouts are folded into the report.
    pub async fn run(
        &self,
        target: &str,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> CoreResult<AggregateResult> {
        let url = validate_target(target, options.allow_private_targets)?;
        let started_at = Utc::now();
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(self.phases.len());

        info!(
            analysis_id = %options.analysis_id,
            target = %url,
            phases = self.phases.len(),
            "Starting analysis"
        );
        self.emit(
            sink,
            ProgressEvent::new("init", tracker.init(), format!("Starting analysis of {}", url)),
        )
        .await;

        let ctx = PhaseContext {
            analysis_id: options.analysis_id.clone(),
            target: url.clone(),
            include_screenshots: options.include_screenshots,
            cancellation: options.cancellation.child_token(),
        };

        let mut results = Vec::with_capacity(self.phases.len());
        let mut degradations: Vec<Degradation> = Vec::new();

        for (index, entry) in self.phases.iter().enumerate() {
            let label = entry.phase.label().to_string();
            self.emit(
                sink,
                ProgressEvent::new(
                    entry.phase.id(),
                    tracker.before_phase(index),
                    format!("Running {} analysis...", label),
                ),
            )
            .await;

            // The phase future is dropped before this block returns, so any
            // lease it holds is released before cancellation is reported.
            let settled = {
                let phase_run = self.run_phase(entry, &ctx);
                tokio::select! {
                    biased;
                    _ = options.cancellation.cancelled() => None,
                    settled = phase_run => Some(settled),
                }
            };
            let Some((result, phase_degradations)) = settled else {
                ctx.cancellation.cancel();
                warn!(analysis_id = %options.analysis_id, phase = %entry.phase.id(), "Analysis cancelled");
                return Err(CoreError::Cancelled);
            };

            let event = match result.outcome.reason() {
                None => ProgressEvent::new(
                    entry.phase.id(),
                    tracker.after_phase(index),
                    format!("{} analysis complete (score {})", label, result.score()),
                ),
                Some(reason) => ProgressEvent::error(
                    entry.phase.id(),
                    tracker.after_phase(index),
                    format!("{} analysis degraded: {}", label, reason),
                ),
            };
            self.emit(sink, event).await;

            degradations.extend(phase_degradations);
            results.push(result);
        }

        self.emit(
            sink,
            ProgressEvent::new("aggregate", tracker.aggregate(), "Calculating overall score..."),
        )
        .await;

        let overall_score = compute_overall_score(&results);
        let report = AggregateResult {
            analysis_id: options.analysis_id.clone(),
            target: url.to_string(),
            overall_score,
            overall_grade: grade_for(overall_score),
            top_recommendations: collect_top_recommendations(&results),
            phases: results,
            degradations,
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
            cached: false,
        };

        info!(
            analysis_id = %report.analysis_id,
            overall_score = report.overall_score,
            grade = %report.overall_grade,
            elapsed_ms = report.duration_ms,
            "Analysis finished"
        );
        self.emit(
            sink,
            ProgressEvent::new(
                "done",
                tracker.done(),
                format!("Analysis complete, overall score {}", report.overall_score),
            ),
        )
        .await;

        Ok(report)
    }

    /// Run one phase under its timeout and panic boundary.
    async fn run_phase(
        &self,
        entry: &RegisteredPhase,
        ctx: &PhaseContext,
    ) -> (PhaseResult, Vec<Degradation>) {
        let phase_id = entry.phase.id().to_string();
        let limit = entry.config.effective_timeout(ctx.include_screenshots);
        let start = Instant::now();

        let settled =
            tokio::time::timeout(limit, AssertUnwindSafe(entry.phase.run(ctx)).catch_unwind())
                .await;

        let mut degradations = Vec::new();
        let (outcome, recommendations): (Outcome<Value>, Vec<String>) = match settled {
            Ok(Ok(Ok(output))) => {
                degradations = output
                    .degradations
                    .into_iter()
                    .map(|d| Degradation {
                        phase: Some(phase_id.clone()),
                        ..d
                    })
                    .collect();
                (
                    Outcome::completed(output.details, output.score),
                    output.recommendations,
                )
            }
            Ok(Ok(Err(e))) => {
                let err = CoreError::PhaseFailed {
                    phase: phase_id.clone(),
                    reason: e.to_string(),
                };
                warn!(phase = %phase_id, error = %err, "Phase degraded");
                (Outcome::failed(e.to_string()), Vec::new())
            }
            Ok(Err(_)) => {
                warn!(phase = %phase_id, "Phase panicked");
                (Outcome::failed("phase panicked"), Vec::new())
            }
            Err(_) => {
                let err = CoreError::PhaseTimeout {
                    phase: phase_id.clone(),
                    after_ms: limit.as_millis() as u64,
                };
                warn!(phase = %phase_id, error = %err, "Phase degraded");
                (Outcome::timed_out(limit), Vec::new())
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        if outcome.is_completed() {
            info!(phase = %phase_id, score = outcome.score(), elapsed_ms = duration_ms, "Phase completed");
        }

        let result = PhaseResult {
            phase: phase_id,
            label: entry.phase.label().to_string(),
            weight: entry.config.weight,
            outcome,
            recommendations,
            duration_ms,
        };
        (result, degradations)
    }

    /// Deliver one event the way a run does: bounded by the sink timeout,
    /// with sink errors and panics logged and swallowed.
    pub async fn emit(&self, sink: &dyn ProgressSink, event: ProgressEvent) {
        debug!(stage = %event.stage, percent = event.percent, "Progress");
        notify_sink(sink, self.sink_timeout, event).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
