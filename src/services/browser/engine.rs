//! Automation engine implementations.
//!
//! `UnavailableEngine` is always compiled and reports every launch as an
//! acquisition failure, so browser-backed phases degrade while HTTP-backed
//! phases still run. The headless Chromium engine is gated behind
//! `#[cfg(feature = "browser")]` to avoid pulling in chromiumoxide by default.

use std::sync::Arc;

use async_trait::async_trait;
use webaudit_core::{AutomationEngine, CoreError, CoreResult, EngineInstance};

/// Engine used when no browser backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEngine;

#[async_trait]
impl AutomationEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn open(&self) -> CoreResult<Arc<dyn EngineInstance>> {
        Err(CoreError::acquisition(
            "no browser engine available; rebuild with `--features browser`",
        ))
    }
}

/// Default engine for this build.
pub fn default_engine() -> Arc<dyn AutomationEngine> {
    #[cfg(feature = "browser")]
    {
        Arc::new(chromium::ChromiumEngine::default())
    }

    #[cfg(not(feature = "browser"))]
    {
        Arc::new(UnavailableEngine)
    }
}

#[cfg(feature = "browser")]
pub mod chromium {
    //! Headless Chromium over CDP.

    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::emulation::{
        SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams,
    };
    use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
    use chromiumoxide::page::ScreenshotParams;
    use chromiumoxide::Page;
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};
    use webaudit_core::{
        AutomationEngine, CoreError, CoreResult, EngineInstance, EngineSession, SessionConfig,
        WaitUntil,
    };

    /// Launches one headless Chromium process per instance.
    #[derive(Debug, Clone, Default)]
    pub struct ChromiumEngine {
        /// Explicit browser executable; autodetected when `None`
        pub executable: Option<std::path::PathBuf>,
    }

    #[async_trait]
    impl AutomationEngine for ChromiumEngine {
        fn name(&self) -> &str {
            "chromium"
        }

        async fn open(&self) -> CoreResult<Arc<dyn EngineInstance>> {
            let mut builder = BrowserConfig::builder().args([
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
            ]);
            if let Some(path) = &self.executable {
                builder = builder.chrome_executable(path);
            }
            let config = builder.build().map_err(CoreError::acquisition)?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| CoreError::acquisition(e.to_string()))?;
            let driver = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            Ok(Arc::new(ChromiumInstance {
                browser: Mutex::new(Some(browser)),
                driver,
            }))
        }
    }

    struct ChromiumInstance {
        browser: Mutex<Option<Browser>>,
        driver: JoinHandle<()>,
    }

    #[async_trait]
    impl EngineInstance for ChromiumInstance {
        async fn new_session(&self, config: &SessionConfig) -> CoreResult<Box<dyn EngineSession>> {
            let guard = self.browser.lock().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| CoreError::engine("browser instance already closed"))?;
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| CoreError::engine(e.to_string()))?;
            drop(guard);

            page.set_user_agent(config.user_agent.as_str())
                .await
                .map_err(|e| CoreError::engine(e.to_string()))?;
            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(config.viewport.width),
                i64::from(config.viewport.height),
                config.device_scale_factor,
                config.is_mobile,
            ))
            .await
            .map_err(|e| CoreError::engine(e.to_string()))?;
            if config.has_touch {
                page.execute(SetTouchEmulationEnabledParams::new(true))
                    .await
                    .map_err(|e| CoreError::engine(e.to_string()))?;
            }
            if config.ignore_https_errors {
                page.execute(SetIgnoreCertificateErrorsParams::new(true))
                    .await
                    .map_err(|e| CoreError::engine(e.to_string()))?;
            }

            Ok(Box::new(ChromiumSession {
                page: Mutex::new(Some(page)),
                default_timeout: Duration::from_millis(config.default_timeout_ms),
            }))
        }

        async fn close(&self) -> CoreResult<()> {
            let Some(mut browser) = self.browser.lock().await.take() else {
                return Ok(());
            };
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Chromium close failed");
            }
            let _ = browser.wait().await;
            self.driver.abort();
            Ok(())
        }
    }

    struct ChromiumSession {
        page: Mutex<Option<Page>>,
        default_timeout: Duration,
    }

    impl ChromiumSession {
        async fn page(&self) -> CoreResult<Page> {
            self.page
                .lock()
                .await
                .clone()
                .ok_or_else(|| CoreError::engine("session already closed"))
        }
    }

    #[async_trait]
    impl EngineSession for ChromiumSession {
        async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout_ms: u64) -> CoreResult<()> {
            let page = self.page().await?;
            let limit = if timeout_ms == 0 {
                self.default_timeout
            } else {
                Duration::from_millis(timeout_ms)
            };

            let navigation = async {
                page.goto(url)
                    .await
                    .map_err(|e| CoreError::engine(e.to_string()))?;
                match wait_until {
                    WaitUntil::DomContentLoaded => Ok(()),
                    WaitUntil::Load | WaitUntil::NetworkIdle => page
                        .wait_for_navigation()
                        .await
                        .map(|_| ())
                        .map_err(|e| CoreError::engine(e.to_string())),
                }
            };

            tokio::time::timeout(limit, navigation)
                .await
                .map_err(|_| CoreError::engine(format!("navigation timed out after {} ms", limit.as_millis())))?
        }

        async fn evaluate(&self, script: &str) -> CoreResult<serde_json::Value> {
            let page = self.page().await?;
            let result = page
                .evaluate(script)
                .await
                .map_err(|e| CoreError::engine(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
        }

        async fn capture(&self) -> CoreResult<Vec<u8>> {
            let page = self.page().await?;
            page.screenshot(ScreenshotParams::builder().full_page(true).build())
                .await
                .map_err(|e| CoreError::engine(e.to_string()))
        }

        async fn close(&self) -> CoreResult<()> {
            if let Some(page) = self.page.lock().await.take() {
                if let Err(e) = page.close().await {
                    debug!(error = %e, "Page close failed");
                }
            }
            Ok(())
        }
    }
}
