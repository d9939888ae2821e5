//! Fakes shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use webaudit_core::{
    AutomationEngine, CoreError, CoreResult, EngineInstance, EngineSession, HttpClient,
    HttpErrorKind, HttpRequest, HttpResponse, ProgressEvent, ProgressSink, SessionConfig,
    WaitUntil,
};

/// Engine whose instances flag any overlapping sessions.
#[derive(Default)]
pub struct CountingEngine {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    refuse: AtomicBool,
    script_result: Arc<Mutex<Value>>,
}

impl CountingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let engine = Self::new();
        engine.refuse.store(true, Ordering::SeqCst);
        engine
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened on an instance that already had one.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn set_script_result(&self, value: Value) {
        *self.script_result.lock().unwrap() = value;
    }
}

#[async_trait]
impl AutomationEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    async fn open(&self) -> CoreResult<Arc<dyn EngineInstance>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CoreError::engine("no browser binary"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingInstance {
            busy: Arc::new(AtomicBool::new(false)),
            closed: Arc::clone(&self.closed),
            overlaps: Arc::clone(&self.overlaps),
            script_result: self.script_result.lock().unwrap().clone(),
        }))
    }
}

struct CountingInstance {
    busy: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    script_result: Value,
}

#[async_trait]
impl EngineInstance for CountingInstance {
    async fn new_session(&self, _config: &SessionConfig) -> CoreResult<Box<dyn EngineSession>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Box::new(CountingSession {
            busy: Arc::clone(&self.busy),
            script_result: self.script_result.clone(),
        }))
    }

    async fn close(&self) -> CoreResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingSession {
    busy: Arc<AtomicBool>,
    script_result: Value,
}

#[async_trait]
impl EngineSession for CountingSession {
    async fn navigate(&self, _url: &str, _wait_until: WaitUntil, _timeout_ms: u64) -> CoreResult<()> {
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> CoreResult<Value> {
        Ok(self.script_result.clone())
    }

    async fn capture(&self) -> CoreResult<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn close(&self) -> CoreResult<()> {
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// HTTP client answering from a URL table; anything else is refused.
#[derive(Default)]
pub struct TableHttp {
    routes: HashMap<String, Result<HttpResponse, HttpErrorKind>>,
    hits: AtomicUsize,
}

impl TableHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Ok(HttpResponse {
                status,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.to_string(),
                final_url: url.to_string(),
            }),
        );
        self
    }

    pub fn fail(mut self, url: &str, kind: HttpErrorKind) -> Self {
        self.routes.insert(url.to_string(), Err(kind));
        self
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for TableHttp {
    async fn request(&self, request: HttpRequest) -> CoreResult<HttpResponse> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        match self.routes.get(&request.url) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(kind)) => Err(CoreError::http(*kind, format!("{} failed", request.url))),
            None => Err(CoreError::http(HttpErrorKind::Connect, "connection refused")),
        }
    }
}

/// Records every progress event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn notify(&self, event: &ProgressEvent) -> CoreResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink that never returns, or panics, on every event.
pub enum MisbehavingSink {
    Hang,
    Panic,
}

#[async_trait]
impl ProgressSink for MisbehavingSink {
    async fn notify(&self, event: &ProgressEvent) -> CoreResult<()> {
        match self {
            MisbehavingSink::Hang => std::future::pending().await,
            MisbehavingSink::Panic => panic!("sink exploded at {}", event.stage),
        }
    }
}

/// A healthy HTML page with everything the SEO phase looks for.
pub const GOOD_HTML: &str = r#"<html><head>
<title>Example Domain - A Well Described Page For Tests</title>
<meta name="description" content="An example page used by integration tests to check the SEO analysis end to end with enough text.">
<link rel="canonical" href="https://example.com/">
</head><body><h1>Example</h1><h2>Details</h2><img src="a.png" alt="logo"></body></html>"#;

/// HTTP table for a well-configured https://example.com/.
pub fn healthy_site() -> TableHttp {
    let secure_headers: &[(&str, &str)] = &[
        ("Strict-Transport-Security", "max-age=31536000"),
        ("Content-Security-Policy", "default-src 'self'"),
        ("X-Frame-Options", "DENY"),
        ("X-Content-Type-Options", "nosniff"),
        ("Referrer-Policy", "no-referrer"),
        ("Permissions-Policy", "camera=()"),
        ("X-XSS-Protection", "1; mode=block"),
    ];
    TableHttp::new()
        .respond("https://example.com/", 200, secure_headers, GOOD_HTML)
        .respond(
            "http://example.com/",
            301,
            &[("Location", "https://example.com/")],
            "",
        )
}
