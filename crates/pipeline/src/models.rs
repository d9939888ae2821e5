//! Result Models
//!
//! Data types produced by the fan-out aggregator and the phase orchestrator:
//! probe results, phase results, correlation-driven degradations, and the
//! final aggregate report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webaudit_core::Outcome;

// ============================================================================
// Probe Types
// ============================================================================

/// Reachability verdict derived from the foundational probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reachability {
    /// The target answered normally
    Reachable,
    /// The target answered, but a lower layer (e.g. TLS handshake) failed
    Degraded { reason: String },
    /// The target could not be reached at all
    Unreachable { reason: String },
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Reachability::Unreachable { .. })
    }
}

/// Confidence in a probe's reported score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    Full,
    /// Score was gathered over a degraded connection and has been reduced
    Reduced,
}

/// How a probe participates in the correlation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeRole {
    /// Its result decides the reachability verdict for its siblings
    Foundational,
    /// Downgraded when the foundational probe reports trouble
    #[default]
    Dependent,
    /// Never touched by correlation
    Independent,
}

/// What a probe returns when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutput {
    /// Score in 0-100
    pub score: u8,
    /// Free-form findings
    pub details: Value,
    /// Reachability signal (only meaningful for foundational probes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachability: Option<Reachability>,
}

impl ProbeOutput {
    pub fn new(score: u8, details: Value) -> Self {
        Self {
            score,
            details,
            reachability: None,
        }
    }

    pub fn with_reachability(mut self, reachability: Reachability) -> Self {
        self.reachability = Some(reachability);
        self
    }
}

/// Settled result of one probe after fan-out and correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub probe_id: String,
    pub role: ProbeRole,
    pub outcome: Outcome<Value>,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Reachability>,
    pub duration_ms: u64,
}

impl ProbeResult {
    /// Score contributed by this probe (0 when degraded).
    pub fn score(&self) -> u8 {
        self.outcome.score()
    }
}

// ============================================================================
// Degradations
// ============================================================================

/// Kind of correlation-driven adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    /// The probe result was replaced with `Failed`
    ForcedFailure,
    /// The probe score was kept but reduced
    ReducedConfidence,
}

/// One adjustment the correlation pass applied to a probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Degradation {
    /// Phase that ran the probe; filled in by the orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub probe_id: String,
    pub kind: DegradationKind,
    pub reason: String,
    /// Score before adjustment, if the probe had completed
    pub original_score: Option<u8>,
    pub adjusted_score: u8,
}

// ============================================================================
// Phase Types
// ============================================================================

/// What a phase returns when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutput {
    pub score: u8,
    pub details: Value,
    pub recommendations: Vec<String>,
    pub degradations: Vec<Degradation>,
}

impl PhaseOutput {
    pub fn new(score: u8, details: Value) -> Self {
        Self {
            score,
            details,
            recommendations: Vec::new(),
            degradations: Vec::new(),
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    pub fn with_degradations(mut self, degradations: Vec<Degradation>) -> Self {
        self.degradations = degradations;
        self
    }
}

/// Settled result of one phase within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    /// Phase identifier (e.g. "speed")
    pub phase: String,
    /// Display label (e.g. "Speed")
    pub label: String,
    /// Configured weight
    pub weight: f64,
    pub outcome: Outcome<Value>,
    pub recommendations: Vec<String>,
    pub duration_ms: u64,
}

impl PhaseResult {
    pub fn score(&self) -> u8 {
        self.outcome.score()
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Letter grade for an overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        write!(f, "{}", letter)
    }
}

/// Map a 0-100 score to a letter grade.
pub fn grade_for(score: u8) -> Grade {
    match score {
        90..=u8::MAX => Grade::A,
        80..=89 => Grade::B,
        70..=79 => Grade::C,
        60..=69 => Grade::D,
        _ => Grade::F,
    }
}

/// Recommendations kept per phase in the aggregate.
pub const RECOMMENDATIONS_PER_PHASE: usize = 2;
/// Total recommendations kept in the aggregate.
pub const MAX_TOP_RECOMMENDATIONS: usize = 5;

/// Collect the headline recommendations, in phase order, without duplicates.
pub fn collect_top_recommendations(phases: &[PhaseResult]) -> Vec<String> {
    let mut top: Vec<String> = Vec::new();
    for phase in phases {
        for rec in phase.recommendations.iter().take(RECOMMENDATIONS_PER_PHASE) {
            if top.len() == MAX_TOP_RECOMMENDATIONS {
                return top;
            }
            if !top.contains(rec) {
                top.push(rec.clone());
            }
        }
    }
    top
}

/// Final report for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub analysis_id: String,
    /// Normalized target URL
    pub target: String,
    pub overall_score: u8,
    pub overall_grade: Grade,
    /// Every configured phase, in pipeline order
    pub phases: Vec<PhaseResult>,
    pub degradations: Vec<Degradation>,
    pub top_recommendations: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Whether this report was served from the report store
    #[serde(default)]
    pub cached: bool,
}

impl AggregateResult {
    /// Look up one phase result by id.
    pub fn phase(&self, id: &str) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == id)
    }

    /// Phases that failed or timed out.
    pub fn degraded_phases(&self) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|p| p.outcome.is_degraded())
            .map(|p| p.phase.as_str())
            .collect()
    }
}
