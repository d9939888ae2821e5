//! Leases and claim guards.
//!
//! A `Lease` is the only way to reach a pooled session. Releasing consumes
//! it, so a lease cannot be released twice. If a lease is dropped without an
//! explicit release (early return, panic, cancelled future) the entry is
//! settled synchronously in `Drop` and the session close runs on the runtime.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use webaudit_core::{CoreError, CoreResult, EngineSession};

use super::pool::{PoolShared, Settled};

/// Longest wait for a session to close before its instance is retired.
pub const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive handle to one pooled session.
pub struct Lease {
    shared: Arc<PoolShared>,
    entry_id: u64,
    overflow: bool,
    session: Arc<dyn EngineSession>,
    released: bool,
}

impl Lease {
    pub(crate) fn new(
        shared: Arc<PoolShared>,
        entry_id: u64,
        overflow: bool,
        session: Arc<dyn EngineSession>,
    ) -> Self {
        Self {
            shared,
            entry_id,
            overflow,
            session,
            released: false,
        }
    }

    /// Pool entry backing this lease.
    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    /// Whether this lease runs on a temporary overflow instance.
    pub fn is_overflow(&self) -> bool {
        self.overflow
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<PoolShared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    /// Close the session and hand the entry back to the pool.
    ///
    /// The close and settle run on a spawned task, so dropping this future
    /// part-way never strands the entry in `Leased`. A session that fails to
    /// close still returns its entry and reports the error; one that does not
    /// close within `SESSION_CLOSE_TIMEOUT` retires its instance. Releasing
    /// after the pool shut down is a no-op.
    pub async fn release(mut self) -> CoreResult<()> {
        self.released = true;

        let shared = Arc::clone(&self.shared);
        let session = Arc::clone(&self.session);
        let entry_id = self.entry_id;
        let follow_up = tokio::spawn(async move {
            let close = tokio::time::timeout(SESSION_CLOSE_TIMEOUT, session.close());
            let (closed, wedged) = match close.await {
                Ok(result) => (result, false),
                Err(_) => (
                    Err(CoreError::engine(format!(
                        "session close timed out after {} ms",
                        SESSION_CLOSE_TIMEOUT.as_millis()
                    ))),
                    true,
                ),
            };
            if let Err(e) = &closed {
                debug!(entry_id, error = %e, "Session close failed");
            }

            let settled = shared.settle(entry_id, true, wedged);
            if matches!(settled, Settled::Missing) {
                debug!(entry_id, "Released lease no longer tracked by pool");
            }
            shared.finish(settled).await;
            closed
        });

        match follow_up.await {
            Ok(closed) => closed,
            Err(e) => Err(CoreError::internal(format!(
                "release of entry {} did not complete: {}",
                entry_id, e
            ))),
        }
    }
}

impl Deref for Lease {
    type Target = dyn EngineSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!(entry_id = self.entry_id, "Lease dropped without release, settling");
        self.shared
            .settle_detached(self.entry_id, true, Some(Arc::clone(&self.session)));
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("entry_id", &self.entry_id)
            .field("overflow", &self.overflow)
            .field("released", &self.released)
            .finish()
    }
}

/// Guard for an entry claimed by checkout or maintenance before a lease
/// exists. Dropping it un-claims the entry.
pub(crate) struct Claim {
    shared: Arc<PoolShared>,
    entry_id: u64,
    armed: bool,
}

impl Claim {
    pub fn new(shared: &Arc<PoolShared>, entry_id: u64) -> Self {
        Self {
            shared: Arc::clone(shared),
            entry_id,
            armed: true,
        }
    }

    /// The claim was converted into a lease or a live entry.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.armed {
            self.shared.settle_detached(self.entry_id, false, None);
        }
    }
}
