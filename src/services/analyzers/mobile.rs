//! Mobile Phase
//!
//! Loads the target under a phone profile and checks the viewport meta tag,
//! horizontal overflow, text size, and touch target size. Optionally
//! captures a screenshot.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use webaudit_core::{CoreError, CoreResult, EngineSession, SessionConfig, WaitUntil};
use webaudit_pipeline::{Phase, PhaseContext, PhaseOutput};

use super::clamp_score;
use crate::services::browser::BrowserPool;

const MIN_TAP_TARGET_PX: u32 = 44;

const LAYOUT_SCRIPT: &str = r#"(() => {
  const meta = document.querySelector('meta[name="viewport"]');
  const textNodes = Array.from(document.querySelectorAll('p, li, span, a, td, label'))
    .filter((el) => el.textContent.trim().length > 0);
  const smallText = textNodes.filter((el) => parseFloat(getComputedStyle(el).fontSize) < 12);
  const targets = Array.from(document.querySelectorAll('a, button, input, select, textarea, [role="button"]'));
  const smallTargets = targets.filter((el) => {
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0 && (r.width < 44 || r.height < 44);
  });
  return {
    viewport_content: meta ? meta.getAttribute('content') : null,
    scroll_width: document.documentElement.scrollWidth,
    viewport_width: window.innerWidth,
    text_elements: textNodes.length,
    small_text_elements: smallText.length,
    tap_targets: targets.length,
    small_tap_targets: smallTargets.length,
  };
})()"#;

/// Layout facts reported by the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileLayout {
    pub viewport_content: Option<String>,
    pub scroll_width: u32,
    pub viewport_width: u32,
    pub text_elements: u32,
    pub small_text_elements: u32,
    pub tap_targets: u32,
    pub small_tap_targets: u32,
}

impl MobileLayout {
    /// `width=device-width` or an `initial-scale` is enough.
    pub fn has_viewport_meta(&self) -> bool {
        self.viewport_content.as_deref().is_some_and(|content| {
            let content = content.to_ascii_lowercase().replace(' ', "");
            content.contains("width=device-width") || content.contains("initial-scale")
        })
    }

    pub fn overflows_horizontally(&self) -> bool {
        self.viewport_width > 0 && self.scroll_width > self.viewport_width
    }
}

fn share_ok(total: u32, bad: u32) -> f64 {
    if total == 0 {
        100.0
    } else {
        100.0 * f64::from(total.saturating_sub(bad)) / f64::from(total)
    }
}

/// Viewport meta 25%, no horizontal overflow 25%, readable text 25%, tap
/// targets 25%.
pub fn score_layout(layout: &MobileLayout) -> (u8, Vec<String>) {
    let mut recs = Vec::new();

    let viewport = if layout.has_viewport_meta() {
        100.0
    } else {
        recs.push(
            "Add a viewport meta tag: <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
                .to_string(),
        );
        0.0
    };

    let fit = if layout.overflows_horizontally() {
        recs.push("Fix horizontal scrolling by using responsive CSS and flexible widths".to_string());
        0.0
    } else {
        100.0
    };

    let readability = share_ok(layout.text_elements, layout.small_text_elements);
    if readability < 70.0 {
        recs.push("Increase font sizes to at least 14-16px for better mobile readability".to_string());
    }

    let touch = share_ok(layout.tap_targets, layout.small_tap_targets);
    if touch < 60.0 {
        recs.push(format!(
            "Increase touch target sizes to at least {0}x{0} pixels",
            MIN_TAP_TARGET_PX
        ));
    }

    let score = clamp_score((viewport + fit + readability + touch) / 4.0);
    (score, recs)
}

pub struct MobilePhase {
    pool: BrowserPool,
    navigation_timeout_ms: u64,
}

impl MobilePhase {
    pub fn new(pool: BrowserPool, navigation_timeout_ms: u64) -> Self {
        Self {
            pool,
            navigation_timeout_ms,
        }
    }

    async fn inspect(
        &self,
        session: &dyn EngineSession,
        url: &str,
        include_screenshots: bool,
    ) -> CoreResult<(MobileLayout, Option<String>)> {
        session
            .navigate(url, WaitUntil::DomContentLoaded, self.navigation_timeout_ms)
            .await?;

        let raw = session.evaluate(LAYOUT_SCRIPT).await?;
        let layout: MobileLayout = if raw.is_null() {
            MobileLayout::default()
        } else {
            serde_json::from_value(raw)?
        };

        let screenshot = if include_screenshots {
            match session.capture().await {
                Ok(png) => Some(format!("data:image/png;base64,{}", STANDARD.encode(png))),
                Err(e) => {
                    warn!(error = %e, "Mobile screenshot failed");
                    None
                }
            }
        } else {
            None
        };

        Ok((layout, screenshot))
    }
}

#[async_trait]
impl Phase for MobilePhase {
    fn id(&self) -> &str {
        "mobile"
    }

    fn label(&self) -> &str {
        "Mobile"
    }

    async fn run(&self, ctx: &PhaseContext) -> CoreResult<PhaseOutput> {
        let profile = SessionConfig::mobile().with_timeout_ms(self.navigation_timeout_ms);
        let lease = self.pool.checkout(&profile).await?;
        let inspected = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(CoreError::Cancelled),
            inspected = self.inspect(&*lease, ctx.target.as_str(), ctx.include_screenshots) => inspected,
        };
        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release mobile session");
        }
        let (layout, screenshot) = inspected?;

        let (score, recommendations) = score_layout(&layout);
        let details = json!({
            "viewportMeta": layout.has_viewport_meta(),
            "horizontalOverflow": layout.overflows_horizontally(),
            "layout": layout,
            "device": { "width": profile.viewport.width, "height": profile.viewport.height },
            "screenshot": screenshot,
        });
        Ok(PhaseOutput::new(score, details).with_recommendations(recommendations))
    }
}
