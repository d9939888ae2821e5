//! WebAudit Core
//!
//! Foundational traits, error types, and progress events for the WebAudit
//! workspace. This crate has no dependency on the browser engine, the HTTP
//! stack, or the async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error taxonomy (`CoreError`, `CoreResult`, `HttpErrorKind`)
//! - `outcome` - Tagged result of one phase or probe (`Outcome`)
//! - `progress` - Progress events and the `ProgressSink` capability
//! - `engine` - Automation engine seams (`AutomationEngine`, `EngineInstance`, `EngineSession`)
//! - `http` - Plain HTTP client seam (`HttpClient`, `HttpRequest`, `HttpResponse`)

pub mod engine;
pub mod error;
pub mod http;
pub mod outcome;
pub mod progress;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult, HttpErrorKind};

// ── Outcomes ───────────────────────────────────────────────────────────
pub use outcome::{Outcome, MAX_SCORE};

// ── Progress ───────────────────────────────────────────────────────────
pub use progress::{NoopSink, ProgressEvent, ProgressSink};

// ── Engine Seams ───────────────────────────────────────────────────────
pub use engine::{
    AutomationEngine, EngineInstance, EngineSession, SessionConfig, Viewport, WaitUntil,
};

// ── HTTP Seams ─────────────────────────────────────────────────────────
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
