//! Cross-Probe Correlation
//!
//! Runs after every probe in a fan-out has settled. The foundational probe
//! decides a reachability verdict; dependent probes are then either forced to
//! `Failed` (target unreachable) or kept with a reduced score (target
//! reachable over a degraded connection).

use serde::{Deserialize, Serialize};
use webaudit_core::{CoreError, Outcome};

use crate::models::{
    Confidence, Degradation, DegradationKind, ProbeResult, ProbeRole, Reachability,
};

/// Score multiplier applied to dependent probes over a degraded connection.
pub const DEFAULT_DEGRADED_MULTIPLIER: f64 = 0.5;

/// Tunables for the correlation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationPolicy {
    /// Multiplier in (0, 1]; out-of-range values fall back to the default
    pub degraded_multiplier: f64,
}

impl Default for CorrelationPolicy {
    fn default() -> Self {
        Self {
            degraded_multiplier: DEFAULT_DEGRADED_MULTIPLIER,
        }
    }
}

impl CorrelationPolicy {
    pub fn new(degraded_multiplier: f64) -> Self {
        let degraded_multiplier = if degraded_multiplier > 0.0 && degraded_multiplier <= 1.0 {
            degraded_multiplier
        } else {
            DEFAULT_DEGRADED_MULTIPLIER
        };
        Self {
            degraded_multiplier,
        }
    }

    /// Reduced score for a probe gathered over a degraded connection.
    pub fn reduce(&self, score: u8) -> u8 {
        (f64::from(score) * self.degraded_multiplier).floor() as u8
    }

    /// Apply the cascade rules in place and return the verdict plus every
    /// adjustment made.
    pub fn apply(&self, results: &mut [ProbeResult]) -> (Reachability, Vec<Degradation>) {
        let verdict = foundational_signal(results);
        let mut degradations = Vec::new();

        match &verdict {
            Reachability::Reachable => {}
            Reachability::Unreachable { reason } => {
                for result in results
                    .iter_mut()
                    .filter(|r| r.role == ProbeRole::Dependent)
                {
                    let original_score = match &result.outcome {
                        Outcome::Completed { score, .. } => Some(*score),
                        _ => None,
                    };
                    let forced = CoreError::UnreachableTarget(reason.clone()).to_string();
                    result.outcome = Outcome::failed(forced.clone());
                    degradations.push(Degradation {
                        phase: None,
                        probe_id: result.probe_id.clone(),
                        kind: DegradationKind::ForcedFailure,
                        reason: forced,
                        original_score,
                        adjusted_score: 0,
                    });
                }
            }
            Reachability::Degraded { reason } => {
                for result in results
                    .iter_mut()
                    .filter(|r| r.role == ProbeRole::Dependent)
                {
                    if let Outcome::Completed { score, .. } = &mut result.outcome {
                        let original = *score;
                        let adjusted = self.reduce(original);
                        *score = adjusted;
                        result.confidence = Confidence::Reduced;
                        degradations.push(Degradation {
                            phase: None,
                            probe_id: result.probe_id.clone(),
                            kind: DegradationKind::ReducedConfidence,
                            reason: format!("gathered over a degraded connection: {}", reason),
                            original_score: Some(original),
                            adjusted_score: adjusted,
                        });
                    }
                }
            }
        }

        (verdict, degradations)
    }
}

/// Reachability verdict from the first foundational probe.
///
/// A foundational probe that failed or timed out counts as unreachable. A
/// fan-out without a foundational probe is treated as reachable.
pub fn foundational_signal(results: &[ProbeResult]) -> Reachability {
    let Some(foundation) = results.iter().find(|r| r.role == ProbeRole::Foundational) else {
        return Reachability::Reachable;
    };

    match &foundation.outcome {
        Outcome::Completed { .. } => foundation
            .signal
            .clone()
            .unwrap_or(Reachability::Reachable),
        degraded => Reachability::Unreachable {
            reason: format!(
                "{} {}",
                foundation.probe_id,
                degraded.reason().unwrap_or_default()
            ),
        },
    }
}
