//! Concrete Analysis Phases
//!
//! - `speed` - Navigation timing through a pooled browser session
//! - `seo` - Markup checks over a plain HTTP fetch
//! - `security` - Probe fan-out (connectivity, certificate, headers, redirect, cookies)
//! - `mobile` - Viewport and layout checks under a phone profile

pub mod mobile;
pub mod security;
pub mod seo;
pub mod speed;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use webaudit_core::HttpClient;
use webaudit_pipeline::{FanOut, Phase, PhaseConfig};

use crate::models::settings::AppConfig;
use crate::services::browser::BrowserPool;

pub use mobile::MobilePhase;
pub use security::SecurityPhase;
pub use seo::SeoPhase;
pub use speed::SpeedPhase;

/// Round and clamp a heuristic score into 0-100.
pub(crate) fn clamp_score(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.round().clamp(0.0, 100.0) as u8
}

/// Build every enabled phase, in pipeline order, with its configured weight
/// and deadline.
pub fn default_phases(
    config: &AppConfig,
    pool: &BrowserPool,
    http: &Arc<dyn HttpClient>,
) -> Vec<(Arc<dyn Phase>, PhaseConfig)> {
    let session_timeout_ms = pool.config().session_timeout.as_millis() as u64;

    config
        .phases
        .enabled()
        .into_iter()
        .filter_map(|(id, setting)| {
            let phase: Arc<dyn Phase> = match id {
                "speed" => Arc::new(SpeedPhase::new(pool.clone(), session_timeout_ms)),
                "seo" => Arc::new(SeoPhase::new(Arc::clone(http))),
                "security" => {
                    let fan_out = FanOut::new(Duration::from_secs(config.probes.probe_timeout_secs))
                        .with_policy(config.probes.correlation_policy());
                    Arc::new(SecurityPhase::new(
                        Arc::clone(http),
                        fan_out,
                        Duration::from_secs(config.probes.connectivity_timeout_secs),
                    ))
                }
                "mobile" => Arc::new(MobilePhase::new(pool.clone(), session_timeout_ms)),
                _ => return None,
            };
            Some((phase, setting.to_phase_config()))
        })
        .collect()
}
