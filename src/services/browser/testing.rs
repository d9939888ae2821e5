//! In-memory engine for pool unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use webaudit_core::{
    AutomationEngine, CoreError, CoreResult, EngineInstance, EngineSession, SessionConfig,
    WaitUntil,
};

#[derive(Default)]
pub struct FakeEngine {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    shutdowns: AtomicUsize,
    fail: AtomicBool,
    script_result: Arc<Mutex<Value>>,
    sessions: Arc<SessionKnobs>,
}

/// Behaviour of `close` on every session, including ones already open.
#[derive(Default)]
struct SessionKnobs {
    hang_close: AtomicBool,
    fail_close: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Session `close` never completes.
    pub fn hang_session_close(&self, hang: bool) {
        self.sessions.hang_close.store(hang, Ordering::SeqCst);
    }

    /// Session `close` returns an engine error.
    pub fn fail_session_close(&self, fail: bool) {
        self.sessions.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Value every session returns from `evaluate`.
    pub fn set_script_result(&self, value: Value) {
        *self.script_result.lock().unwrap() = value;
    }
}

#[async_trait]
impl AutomationEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn open(&self) -> CoreResult<Arc<dyn EngineInstance>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::engine("launch refused"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeInstance {
            closed: Arc::clone(&self.closed),
            script_result: Arc::clone(&self.script_result),
            sessions: Arc::clone(&self.sessions),
        }))
    }

    async fn shutdown(&self) -> CoreResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeInstance {
    closed: Arc<AtomicUsize>,
    script_result: Arc<Mutex<Value>>,
    sessions: Arc<SessionKnobs>,
}

#[async_trait]
impl EngineInstance for FakeInstance {
    async fn new_session(&self, _config: &SessionConfig) -> CoreResult<Box<dyn EngineSession>> {
        let script_result = self.script_result.lock().unwrap().clone();
        Ok(Box::new(FakeSession {
            script_result,
            knobs: Arc::clone(&self.sessions),
        }))
    }

    async fn close(&self) -> CoreResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeSession {
    script_result: Value,
    knobs: Arc<SessionKnobs>,
}

#[async_trait]
impl EngineSession for FakeSession {
    async fn navigate(&self, _url: &str, _wait_until: WaitUntil, _timeout_ms: u64) -> CoreResult<()> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> CoreResult<Value> {
        Ok(self.script_result.clone())
    }

    async fn capture(&self) -> CoreResult<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn close(&self) -> CoreResult<()> {
        if self.knobs.hang_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.knobs.fail_close.load(Ordering::SeqCst) {
            return Err(CoreError::engine("target closed"));
        }
        Ok(())
    }
}
