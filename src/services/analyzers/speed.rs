//! Speed Phase
//!
//! Loads the target in a pooled desktop session and scores navigation
//! timing, paint metrics and page weight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};
use webaudit_core::{CoreError, CoreResult, EngineSession, WaitUntil};
use webaudit_pipeline::{Phase, PhaseContext, PhaseOutput};

use super::clamp_score;
use crate::services::browser::BrowserPool;

const MAX_RECOMMENDATIONS: usize = 8;

/// Collects navigation, paint, and resource timing in one evaluation.
const TIMING_SCRIPT: &str = r#"(() => {
  const nav = performance.getEntriesByType('navigation')[0] || {};
  const paint = performance.getEntriesByName('first-contentful-paint')[0];
  const lcp = performance.getEntriesByType('largest-contentful-paint');
  const resources = performance.getEntriesByType('resource');
  let cls = 0;
  for (const shift of performance.getEntriesByType('layout-shift')) {
    if (!shift.hadRecentInput) cls += shift.value;
  }
  return {
    dns_lookup_ms: (nav.domainLookupEnd || 0) - (nav.domainLookupStart || 0),
    connection_ms: (nav.connectEnd || 0) - (nav.connectStart || 0),
    server_response_ms: (nav.responseStart || 0) - (nav.requestStart || 0),
    dom_content_loaded_ms: nav.domContentLoadedEventEnd || 0,
    load_event_ms: nav.loadEventEnd || 0,
    first_contentful_paint_ms: paint ? paint.startTime : 0,
    largest_contentful_paint_ms: lcp.length ? lcp[lcp.length - 1].startTime : 0,
    cumulative_layout_shift: cls,
    resource_count: resources.length,
    image_count: resources.filter((r) => r.initiatorType === 'img').length,
    transfer_bytes: resources.reduce((sum, r) => sum + (r.transferSize || 0), nav.transferSize || 0),
  };
})()"#;

/// Raw page metrics as reported by the timing script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMetrics {
    pub dns_lookup_ms: f64,
    pub connection_ms: f64,
    pub server_response_ms: f64,
    pub dom_content_loaded_ms: f64,
    pub load_event_ms: f64,
    pub first_contentful_paint_ms: f64,
    pub largest_contentful_paint_ms: f64,
    pub cumulative_layout_shift: f64,
    pub resource_count: u64,
    pub image_count: u64,
    pub transfer_bytes: f64,
    /// Wall-clock navigation time measured outside the page
    #[serde(skip_deserializing)]
    pub wall_load_ms: f64,
}

impl PageMetrics {
    /// Page load time, preferring the in-page load event.
    pub fn load_ms(&self) -> f64 {
        if self.load_event_ms > 0.0 {
            self.load_event_ms
        } else {
            self.wall_load_ms
        }
    }

    pub fn fcp_ms(&self) -> f64 {
        if self.first_contentful_paint_ms > 0.0 {
            self.first_contentful_paint_ms
        } else {
            self.load_ms()
        }
    }

    pub fn lcp_ms(&self) -> f64 {
        if self.largest_contentful_paint_ms > 0.0 {
            self.largest_contentful_paint_ms
        } else {
            self.fcp_ms() * 1.2
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.transfer_bytes / (1024.0 * 1024.0)
    }
}

/// Per-factor scores behind the phase score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedBreakdown {
    pub load: f64,
    pub vitals: f64,
    pub efficiency: f64,
}

/// Weighted speed score: load time 40%, paint/layout vitals 35%, page
/// weight 25%.
pub fn score_metrics(metrics: &PageMetrics) -> (u8, SpeedBreakdown) {
    let load_secs = metrics.load_ms() / 1000.0;
    let load = match load_secs {
        t if t <= 1.5 => 100.0,
        t if t <= 3.0 => 85.0,
        t if t <= 5.0 => 65.0,
        t if t <= 8.0 => 40.0,
        _ => 20.0,
    };

    let fcp = tiered(metrics.fcp_ms(), 1800.0, 3000.0);
    let lcp = tiered(metrics.lcp_ms(), 2500.0, 4000.0);
    let cls = tiered(metrics.cumulative_layout_shift, 0.1, 0.25);
    let vitals = (fcp + lcp + cls) / 3.0;

    let efficiency = (100.0 - metrics.size_mb() * 5.0).clamp(0.0, 100.0);

    let breakdown = SpeedBreakdown {
        load,
        vitals,
        efficiency,
    };
    let score = clamp_score(load * 0.40 + vitals * 0.35 + efficiency * 0.25);
    (score, breakdown)
}

fn tiered(value: f64, good: f64, fair: f64) -> f64 {
    if value <= good {
        100.0
    } else if value <= fair {
        75.0
    } else {
        40.0
    }
}

pub fn recommendations(metrics: &PageMetrics, score: u8) -> Vec<String> {
    let mut recs = Vec::new();
    let load_secs = metrics.load_ms() / 1000.0;

    if load_secs > 5.0 {
        recs.push("Optimize server response time - page loads very slowly".to_string());
    } else if load_secs > 3.0 {
        recs.push("Reduce page load time to under 3 seconds for better user experience".to_string());
    }
    if metrics.size_mb() > 3.0 {
        recs.push(format!(
            "Reduce page size ({:.1}MB) - compress images and minify code",
            metrics.size_mb()
        ));
    }
    if metrics.resource_count > 100 {
        recs.push(format!(
            "Reduce HTTP requests ({}) - combine CSS/JS files",
            metrics.resource_count
        ));
    }
    if metrics.fcp_ms() > 3000.0 {
        recs.push("Improve First Contentful Paint - optimize above-the-fold content".to_string());
    }
    if metrics.lcp_ms() > 4000.0 {
        recs.push("Optimize Largest Contentful Paint - prioritize main content loading".to_string());
    }
    if metrics.server_response_ms > 1000.0 {
        recs.push("Improve server response time - consider faster hosting or caching".to_string());
    }
    if metrics.image_count > 20 {
        recs.push("Optimize images - use WebP format and lazy loading".to_string());
    }
    if score < 50 {
        recs.push("Consider using a Content Delivery Network (CDN)".to_string());
    }
    if score < 70 {
        recs.push("Minify CSS and JavaScript files".to_string());
    }

    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}

pub struct SpeedPhase {
    pool: BrowserPool,
    navigation_timeout_ms: u64,
}

impl SpeedPhase {
    pub fn new(pool: BrowserPool, navigation_timeout_ms: u64) -> Self {
        Self {
            pool,
            navigation_timeout_ms,
        }
    }

    async fn measure(&self, session: &dyn EngineSession, url: &str) -> CoreResult<PageMetrics> {
        let started = Instant::now();
        session
            .navigate(url, WaitUntil::Load, self.navigation_timeout_ms)
            .await?;
        let wall_load_ms = started.elapsed().as_millis() as f64;

        let raw = session.evaluate(TIMING_SCRIPT).await?;
        let mut metrics: PageMetrics = if raw.is_null() {
            PageMetrics::default()
        } else {
            serde_json::from_value(raw)?
        };
        metrics.wall_load_ms = wall_load_ms;
        Ok(metrics)
    }
}

#[async_trait]
impl Phase for SpeedPhase {
    fn id(&self) -> &str {
        "speed"
    }

    fn label(&self) -> &str {
        "Speed"
    }

    async fn run(&self, ctx: &PhaseContext) -> CoreResult<PhaseOutput> {
        let lease = self.pool.checkout_default().await?;
        let measured = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(CoreError::Cancelled),
            measured = self.measure(&*lease, ctx.target.as_str()) => measured,
        };
        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release speed session");
        }
        let metrics = measured?;

        let (score, breakdown) = score_metrics(&metrics);
        debug!(
            url = %ctx.target,
            load_ms = metrics.load_ms(),
            score,
            "Speed metrics collected"
        );

        let details = json!({
            "loadTimeMs": metrics.load_ms().round(),
            "firstContentfulPaintMs": metrics.fcp_ms().round(),
            "largestContentfulPaintMs": metrics.lcp_ms().round(),
            "cumulativeLayoutShift": metrics.cumulative_layout_shift,
            "pageSizeMb": (metrics.size_mb() * 100.0).round() / 100.0,
            "requestsCount": metrics.resource_count,
            "scoreBreakdown": {
                "load": breakdown.load,
                "vitals": breakdown.vitals.round(),
                "efficiency": breakdown.efficiency.round(),
            },
            "timing": metrics,
        });

        Ok(PhaseOutput::new(score, details).with_recommendations(recommendations(&metrics, score)))
    }
}
