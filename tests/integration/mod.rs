//! Integration Tests Module
//!
//! Exercises the browser pool, probe fan-out, phase pipeline and audit
//! service together through fake engines and fake HTTP clients.

// Shared fakes
mod support;

// Pool exclusivity, reuse and retirement under concurrency
mod pool_test;

// Pipeline scoring, degradation and lease release across phases
mod pipeline_test;

// Service facade: caching, run ids, degraded browser
mod audit_service_test;
