//! Browser Resource Pool
//!
//! Pooled automation-engine instances with exclusive leases, use-count
//! retirement, and idle eviction bounded by a floor.

mod entry;
pub mod engine;
mod lease;
mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{default_engine, UnavailableEngine};
pub use entry::EntryState;
pub use lease::{Lease, SESSION_CLOSE_TIMEOUT};
pub use pool::{BrowserPool, MaintenanceReport, PoolConfig, PoolHealth, PoolStats};
