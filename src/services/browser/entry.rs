//! Pool entry bookkeeping.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use webaudit_core::EngineInstance;

/// Lifecycle state of a pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Engine instance is being launched
    Provisioning,
    /// Ready for checkout
    Idle,
    /// Exclusively held by one lease
    Leased,
    /// Removed from the pool, close pending
    Retiring,
    /// Instance closed; the entry is gone from the pool
    Closed,
}

/// One pooled engine instance plus its lifecycle metadata.
pub(crate) struct PoolEntry {
    pub id: u64,
    pub state: EntryState,
    /// `None` only while provisioning
    pub instance: Option<Arc<dyn EngineInstance>>,
    pub created_at: Instant,
    pub last_used: Instant,
    pub use_count: u32,
    pub max_uses: u32,
    /// Temporary entry created past `max_size`; closed on release
    pub overflow: bool,
}

impl PoolEntry {
    pub fn provisioning(id: u64, max_uses: u32, overflow: bool) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: EntryState::Provisioning,
            instance: None,
            created_at: now,
            last_used: now,
            use_count: 0,
            max_uses,
            overflow,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == EntryState::Idle && self.instance.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.use_count >= self.max_uses
    }

    /// Counted toward the steady-state size and floor.
    pub fn is_steady(&self) -> bool {
        !self.overflow
    }

    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_used)
    }

    /// Attach a launched instance.
    pub fn fill(&mut self, instance: Arc<dyn EngineInstance>, state: EntryState) {
        let now = Instant::now();
        self.instance = Some(instance);
        self.state = state;
        self.created_at = now;
        self.last_used = now;
    }
}

impl std::fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("age_ms", &self.created_at.elapsed().as_millis())
            .field("use_count", &self.use_count)
            .field("max_uses", &self.max_uses)
            .field("overflow", &self.overflow)
            .finish()
    }
}
