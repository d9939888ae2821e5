//! Services
//!
//! Runtime services behind the CLI: the browser pool, concrete phases, the
//! HTTP client, progress sinks, the report cache, and the audit facade.

pub mod analyzers;
pub mod audit;
pub mod browser;
pub mod http;
pub mod progress;
pub mod report_cache;

pub use audit::{AnalyzeOptions, AuditService, ServiceHealth};
pub use browser::{BrowserPool, Lease, PoolConfig, PoolHealth, PoolStats};
pub use http::ReqwestHttpClient;
pub use progress::{ChannelSink, TracingSink};
pub use report_cache::MemoryReportStore;
