//! Settings Models
//!
//! Application configuration stored in `~/.webaudit/config.json`. Every
//! section carries serde defaults so a partial file loads cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use webaudit_core::engine::DEFAULT_USER_AGENT;
use webaudit_pipeline::{CorrelationPolicy, PhaseConfig};

use crate::services::browser::PoolConfig;

/// Application configuration stored in config.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolSettings,
    pub phases: PhaseSettings,
    pub probes: ProbeSettings,
    pub http: HttpSettings,
    pub cache: CacheSettings,
    /// Permit loopback and private-network targets
    pub allow_private_targets: bool,
}

/// Browser pool sizing and lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub max_uses: u32,
    pub max_idle_secs: u64,
    pub maintenance_interval_secs: u64,
    pub session_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_size: 3,
            min_size: 2,
            max_size: 3,
            max_uses: 50,
            max_idle_secs: 300,
            maintenance_interval_secs: 60,
            session_timeout_ms: 30_000,
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            initial_size: self.initial_size,
            min_size: self.min_size,
            max_size: self.max_size,
            max_uses: self.max_uses,
            max_idle: Duration::from_secs(self.max_idle_secs),
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs),
            session_timeout: Duration::from_millis(self.session_timeout_ms),
        }
    }
}

/// Weight and deadline of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSetting {
    pub weight: f64,
    pub timeout_secs: u64,
    /// Deadline when screenshots are disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl PhaseSetting {
    fn new(weight: f64, timeout_secs: u64) -> Self {
        Self {
            weight,
            timeout_secs,
            fast_timeout_secs: None,
            enabled: true,
        }
    }

    pub fn to_phase_config(&self) -> PhaseConfig {
        let config = PhaseConfig::new(self.weight, Duration::from_secs(self.timeout_secs));
        match self.fast_timeout_secs {
            Some(secs) => config.with_fast_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

/// Per-phase settings, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    pub speed: PhaseSetting,
    pub seo: PhaseSetting,
    pub security: PhaseSetting,
    pub mobile: PhaseSetting,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            speed: PhaseSetting::new(0.35, 30),
            seo: PhaseSetting::new(0.25, 20),
            security: PhaseSetting::new(0.25, 15),
            mobile: PhaseSetting {
                fast_timeout_secs: Some(10),
                ..PhaseSetting::new(0.15, 25)
            },
        }
    }
}

impl PhaseSettings {
    /// Enabled phases with their ids, in pipeline order.
    pub fn enabled(&self) -> Vec<(&'static str, &PhaseSetting)> {
        [
            ("speed", &self.speed),
            ("seo", &self.seo),
            ("security", &self.security),
            ("mobile", &self.mobile),
        ]
        .into_iter()
        .filter(|(_, setting)| setting.enabled)
        .collect()
    }
}

/// Fan-out probe tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub probe_timeout_secs: u64,
    /// Deadline for the foundational connectivity probe
    pub connectivity_timeout_secs: u64,
    /// Score multiplier for probes gathered over a degraded connection
    pub degraded_confidence_multiplier: f64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            connectivity_timeout_secs: 5,
            degraded_confidence_multiplier: webaudit_pipeline::DEFAULT_DEGRADED_MULTIPLIER,
        }
    }
}

impl ProbeSettings {
    pub fn correlation_policy(&self) -> CorrelationPolicy {
        CorrelationPolicy::new(self.degraded_confidence_multiplier)
    }
}

/// Plain HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            max_redirects: 5,
        }
    }
}

/// Finished-report cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 100,
        }
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.pool
            .to_pool_config()
            .validate()
            .map_err(|e| e.to_string())?;
        if self.pool.session_timeout_ms == 0 {
            return Err("pool.session_timeout_ms must be positive".to_string());
        }

        let enabled = self.phases.enabled();
        if enabled.is_empty() {
            return Err("at least one phase must be enabled".to_string());
        }
        for (id, setting) in &enabled {
            if setting.weight < 0.0 {
                return Err(format!("phases.{}.weight cannot be negative", id));
            }
            if setting.timeout_secs == 0 || setting.fast_timeout_secs == Some(0) {
                return Err(format!("phases.{} timeouts must be positive", id));
            }
        }
        let sum: f64 = enabled.iter().map(|(_, s)| s.weight).sum();
        if (sum - 1.0).abs() > webaudit_pipeline::pipeline::WEIGHT_TOLERANCE {
            return Err(format!(
                "weights of enabled phases sum to {:.3}, expected 1.0",
                sum
            ));
        }

        let multiplier = self.probes.degraded_confidence_multiplier;
        if !(multiplier > 0.0 && multiplier <= 1.0) {
            return Err(format!(
                "probes.degraded_confidence_multiplier must be in (0, 1], got {}",
                multiplier
            ));
        }
        if self.probes.probe_timeout_secs == 0 || self.probes.connectivity_timeout_secs == 0 {
            return Err("probe timeouts must be positive".to_string());
        }

        if self.http.timeout_secs == 0 {
            return Err("http.timeout_secs must be positive".to_string());
        }
        if self.http.user_agent.trim().is_empty() {
            return Err("http.user_agent cannot be empty".to_string());
        }

        if self.cache.enabled && (self.cache.ttl_secs == 0 || self.cache.max_entries == 0) {
            return Err("cache ttl_secs and max_entries must be positive".to_string());
        }

        Ok(())
    }
}
