//! WebAudit Pipeline
//!
//! The analysis execution core, independent of the browser engine and the
//! HTTP stack:
//!
//! - `models` - Probe, phase, and aggregate result types
//! - `fanout` - Concurrent probe fan-out with per-probe isolation (`FanOut`, `Probe`)
//! - `correlation` - Cascade-degrade rules driven by the foundational probe
//! - `pipeline` - Phase orchestrator with timeouts, progress, and weighted scoring
//! - `target` - Target URL normalization and validation
//! - `store` - Report persistence seam (`ReportStore`)

pub mod correlation;
pub mod fanout;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod target;

// Re-export result models
pub use models::{
    collect_top_recommendations, grade_for, AggregateResult, Confidence, Degradation,
    DegradationKind, Grade, PhaseOutput, PhaseResult, ProbeOutput, ProbeResult, ProbeRole,
    Reachability,
};

// Re-export fan-out and correlation
pub use correlation::{foundational_signal, CorrelationPolicy, DEFAULT_DEGRADED_MULTIPLIER};
pub use fanout::{FanOut, FanOutReport, Probe, DEFAULT_PROBE_TIMEOUT};

// Re-export orchestrator
pub use pipeline::{
    compute_overall_score, Phase, PhaseConfig, PhaseContext, Pipeline, ProgressTracker,
    RunOptions,
};

pub use store::ReportStore;
pub use target::{validate_target, MAX_URL_LENGTH};
