//! Browser Resource Pool
//!
//! Owns a bounded set of automation-engine instances and hands out
//! exclusively-leased sessions on them. All mutations of the entry list go
//! through one `std::sync::Mutex` that is never held across an await point;
//! engine I/O (launch, session creation, close) always happens outside it.
//!
//! Lifecycle rules:
//! - checkout prefers the least-recently-used idle entry, then provisions up
//!   to `max_size`, then provisions an uncounted overflow entry
//! - release bumps the use count; an exhausted entry is retired and replaced
//!   immediately, an overflow entry is closed, and an entry whose session
//!   would not close is retired like an exhausted one
//! - retired entries pass through `Retiring` to `Closed` once their instance
//!   is closed
//! - maintenance evicts long-idle entries down to `min_size` and tops the pool
//!   back up to `min_size`; failures are retried on the next cycle
//! - shutdown is idempotent and force-closes every instance, leased or not

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webaudit_core::{
    AutomationEngine, CoreError, CoreResult, EngineInstance, EngineSession, SessionConfig,
};

use super::entry::{EntryState, PoolEntry};
use super::lease::{Claim, Lease};

// ============================================================================
// Configuration
// ============================================================================

/// Pool sizing and lifecycle tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Instances launched at start
    pub initial_size: usize,
    /// Floor kept by maintenance
    pub min_size: usize,
    /// Steady-state ceiling; checkouts beyond it get overflow instances
    pub max_size: usize,
    /// Releases before an instance is retired
    pub max_uses: u32,
    /// Idle time after which an instance may be evicted
    pub max_idle: Duration,
    pub maintenance_interval: Duration,
    /// Default per-operation timeout for sessions
    pub session_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 3,
            min_size: 2,
            max_size: 3,
            max_uses: 50,
            max_idle: Duration::from_secs(300),
            maintenance_interval: Duration::from_secs(60),
            session_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_size == 0 {
            return Err(CoreError::config("pool max_size must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(CoreError::config(format!(
                "pool min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.initial_size > self.max_size {
            return Err(CoreError::config(format!(
                "pool initial_size ({}) exceeds max_size ({})",
                self.initial_size, self.max_size
            )));
        }
        if self.max_uses == 0 {
            return Err(CoreError::config("pool max_uses must be at least 1"));
        }
        if self.maintenance_interval.is_zero() {
            return Err(CoreError::config("pool maintenance_interval must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Health & Stats
// ============================================================================

/// Coarse pool health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolHealth {
    /// Not shutting down and at least one live instance
    pub ready: bool,
    /// Live steady-state instances (idle + leased, overflow excluded)
    pub size: usize,
    pub idle: usize,
    /// Leased instances, overflow included
    pub leased: usize,
}

/// Detailed pool counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub engine: String,
    pub size: usize,
    pub idle: usize,
    pub leased: usize,
    pub provisioning: usize,
    pub overflow: usize,
    pub total_created: u64,
    pub total_leases: u64,
    pub total_retired: u64,
    pub shutting_down: bool,
}

/// What one maintenance cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceReport {
    pub evicted: usize,
    pub provisioned: usize,
    pub failed: usize,
}

// ============================================================================
// Shared State
// ============================================================================

#[derive(Default)]
struct Counters {
    created: u64,
    leases: u64,
    retired: u64,
}

struct PoolState {
    entries: Vec<PoolEntry>,
    next_id: u64,
    shutting_down: bool,
    counters: Counters,
}

impl PoolState {
    fn steady_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_steady()).count()
    }

    fn push_placeholder(&mut self, max_uses: u32, overflow: bool) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(PoolEntry::provisioning(id, max_uses, overflow));
        id
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

/// Result of taking an entry for a new lease.
pub(crate) struct Ticket {
    pub id: u64,
    pub instance: Option<Arc<dyn EngineInstance>>,
    pub overflow: bool,
}

/// Follow-up work after an entry was settled under the lock.
pub(crate) enum Settled {
    /// Entry returned to idle
    Idle,
    /// Provisioning placeholder dropped
    Abandoned,
    /// Entry removed in `Retiring`; its instance must be closed and
    /// possibly replaced
    Retired {
        entry: PoolEntry,
        replacement: Option<u64>,
    },
    /// Pool no longer tracks the entry (shutdown or stale handle)
    Missing,
}

pub(crate) struct PoolShared {
    engine: Arc<dyn AutomationEngine>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    cancel: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim an idle entry or reserve a placeholder for a new one.
    fn claim(&self) -> CoreResult<Ticket> {
        let mut state = self.lock();
        if state.shutting_down {
            return Err(CoreError::ShuttingDown);
        }

        let PoolState {
            entries, counters, ..
        } = &mut *state;
        if let Some(entry) = entries
            .iter_mut()
            .filter(|e| e.is_idle())
            .min_by_key(|e| e.last_used)
        {
            entry.state = EntryState::Leased;
            counters.leases += 1;
            debug!(entry_id = entry.id, use_count = entry.use_count, "Checked out idle instance");
            return Ok(Ticket {
                id: entry.id,
                instance: entry.instance.clone(),
                overflow: entry.overflow,
            });
        }

        let overflow = state.steady_count() >= self.config.max_size;
        if overflow {
            warn!(
                max_size = self.config.max_size,
                "Pool exhausted, provisioning temporary overflow instance"
            );
        }
        let id = state.push_placeholder(self.config.max_uses, overflow);
        state.counters.leases += 1;
        Ok(Ticket {
            id,
            instance: None,
            overflow,
        })
    }

    /// Launch an engine instance into placeholder `id`, leaving the entry in
    /// `target` state.
    async fn provision(&self, id: u64, target: EntryState) -> CoreResult<Arc<dyn EngineInstance>> {
        let instance = match self.engine.open().await {
            Ok(instance) => instance,
            Err(e @ CoreError::AcquisitionFailed(_)) => return Err(e),
            Err(e) => return Err(CoreError::acquisition(e.to_string())),
        };

        let accepted = {
            let mut state = self.lock();
            let shutting_down = state.shutting_down;
            match state.position(id) {
                Some(idx) if !shutting_down => {
                    state.entries[idx].fill(instance.clone(), target);
                    state.counters.created += 1;
                    true
                }
                _ => false,
            }
        };

        if !accepted {
            // Shutdown drained the placeholder while the engine was launching.
            close_instance(id, instance).await;
            return Err(CoreError::ShuttingDown);
        }

        info!(entry_id = id, state = ?target, engine = self.engine.name(), "Provisioned engine instance");
        Ok(instance)
    }

    /// Settle entry `id` after a lease or claim ends.
    ///
    /// `used` bumps the use count; `retire` removes the entry regardless of
    /// its count.
    pub(crate) fn settle(&self, id: u64, used: bool, retire: bool) -> Settled {
        let mut state = self.lock();
        let Some(idx) = state.position(id) else {
            return Settled::Missing;
        };

        if state.entries[idx].state == EntryState::Provisioning {
            state.entries.remove(idx);
            return Settled::Abandoned;
        }
        if state.entries[idx].state != EntryState::Leased {
            return Settled::Missing;
        }

        let shutting_down = state.shutting_down;
        let entry = &mut state.entries[idx];
        if used {
            entry.use_count += 1;
            entry.last_used = Instant::now();
        }

        let must_retire = retire || entry.overflow || entry.is_exhausted();
        if !must_retire {
            entry.state = EntryState::Idle;
            debug!(entry_id = id, use_count = entry.use_count, "Released instance to pool");
            return Settled::Idle;
        }

        entry.state = EntryState::Retiring;
        let overflow = entry.overflow;
        let use_count = entry.use_count;
        let removed = state.entries.remove(idx);
        if !overflow {
            state.counters.retired += 1;
        }
        let replacement = if overflow || shutting_down {
            None
        } else {
            Some(state.push_placeholder(self.config.max_uses, false))
        };
        drop(state);

        info!(
            entry_id = id,
            use_count,
            overflow,
            replacement = ?replacement,
            "Retiring engine instance"
        );
        Settled::Retired {
            entry: removed,
            replacement,
        }
    }

    /// Async follow-up for a settled entry: close retired instances and
    /// provision their replacements.
    ///
    /// The replacement placeholder is claimed before the first await, so a
    /// cancelled follow-up drops it instead of leaving it in `Provisioning`.
    pub(crate) async fn finish(self: &Arc<Self>, settled: Settled) {
        let Settled::Retired { entry, replacement } = settled else {
            return;
        };
        let claim = replacement.map(|id| Claim::new(self, id));

        close_entry(entry).await;

        if let (Some(new_id), Some(claim)) = (replacement, claim) {
            match self.provision(new_id, EntryState::Idle).await {
                Ok(_) => claim.disarm(),
                Err(e) => {
                    warn!(entry_id = new_id, error = %e, "Replacement provisioning failed, maintenance will retry");
                }
            }
        }
    }

    fn drop_placeholder(&self, id: u64) {
        let mut state = self.lock();
        if let Some(idx) = state.position(id) {
            if state.entries[idx].state == EntryState::Provisioning {
                state.entries.remove(idx);
            }
        }
    }

    /// Settle synchronously and push the async follow-up onto the runtime.
    /// Used from `Drop`, where awaiting is impossible.
    pub(crate) fn settle_detached(
        self: &Arc<Self>,
        id: u64,
        used: bool,
        session: Option<Arc<dyn EngineSession>>,
    ) {
        let settled = self.settle(id, used, false);
        let needs_work = session.is_some() || matches!(settled, Settled::Retired { .. });
        if !needs_work {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(entry_id = id, "No runtime available, skipping async lease cleanup");
            return;
        };
        let shared = Arc::clone(self);
        handle.spawn(async move {
            if let Some(session) = session {
                if let Err(e) = session.close().await {
                    debug!(entry_id = id, error = %e, "Session close failed");
                }
            }
            shared.finish(settled).await;
        });
    }

    async fn maintain(self: &Arc<Self>) -> MaintenanceReport {
        let (evicted, placeholders) = {
            let mut state = self.lock();
            if state.shutting_down {
                return MaintenanceReport::default();
            }

            let now = Instant::now();
            let mut candidates: Vec<(u64, Duration)> = state
                .entries
                .iter()
                .filter(|e| e.is_idle() && e.idle_for(now) > self.config.max_idle)
                .map(|e| (e.id, e.idle_for(now)))
                .collect();
            // Longest idle goes first.
            candidates.sort_by(|a, b| b.1.cmp(&a.1));

            let mut evicted = Vec::new();
            for (id, idle) in candidates {
                if state.steady_count() <= self.config.min_size {
                    break;
                }
                if let Some(idx) = state.position(id) {
                    let mut entry = state.entries.remove(idx);
                    entry.state = EntryState::Retiring;
                    state.counters.retired += 1;
                    debug!(entry_id = id, idle_ms = idle.as_millis() as u64, "Evicting idle instance");
                    evicted.push(entry);
                }
            }

            let deficit = self.config.min_size.saturating_sub(state.steady_count());
            let placeholders: Vec<u64> = (0..deficit)
                .map(|_| state.push_placeholder(self.config.max_uses, false))
                .collect();
            (evicted, placeholders)
        };

        let report_evicted = evicted.len();
        join_all(evicted.into_iter().map(close_entry)).await;

        let results = join_all(placeholders.iter().map(|id| {
            let claim = Claim::new(self, *id);
            async move {
                let result = self.provision(*id, EntryState::Idle).await;
                if result.is_ok() {
                    claim.disarm();
                }
                result
            }
        }))
        .await;

        let provisioned = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - provisioned;
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!(error = %err, "Maintenance provisioning failed, retrying next cycle");
        }

        let report = MaintenanceReport {
            evicted: report_evicted,
            provisioned,
            failed,
        };
        if report != MaintenanceReport::default() {
            info!(
                evicted = report.evicted,
                provisioned = report.provisioned,
                failed = report.failed,
                "Pool maintenance cycle"
            );
        }
        report
    }

    fn stats(&self) -> PoolStats {
        let state = self.lock();
        let live = |e: &&PoolEntry| e.instance.is_some();
        PoolStats {
            engine: self.engine.name().to_string(),
            size: state.entries.iter().filter(|e| e.is_steady()).filter(live).count(),
            idle: state.entries.iter().filter(|e| e.is_idle()).count(),
            leased: state
                .entries
                .iter()
                .filter(|e| e.state == EntryState::Leased)
                .count(),
            provisioning: state
                .entries
                .iter()
                .filter(|e| e.state == EntryState::Provisioning)
                .count(),
            overflow: state.entries.iter().filter(|e| e.overflow).count(),
            total_created: state.counters.created,
            total_leases: state.counters.leases,
            total_retired: state.counters.retired,
            shutting_down: state.shutting_down,
        }
    }
}

/// Close a removed entry's instance; the entry ends in `Closed`.
async fn close_entry(mut entry: PoolEntry) -> PoolEntry {
    if let Some(instance) = entry.instance.take() {
        close_instance(entry.id, instance).await;
    }
    entry.state = EntryState::Closed;
    entry
}

async fn close_instance(id: u64, instance: Arc<dyn EngineInstance>) {
    match instance.close().await {
        Ok(()) => debug!(entry_id = id, "Closed engine instance"),
        Err(e) => warn!(entry_id = id, error = %e, "Failed to close engine instance"),
    }
}

// ============================================================================
// Browser Pool
// ============================================================================

/// Handle to a running pool. Cloning shares the same pool.
#[derive(Clone)]
pub struct BrowserPool {
    shared: Arc<PoolShared>,
}

impl BrowserPool {
    /// Launch the initial instances and start background maintenance.
    ///
    /// Launch failures are logged, not fatal: maintenance keeps retrying to
    /// reach the floor.
    pub async fn start(engine: Arc<dyn AutomationEngine>, config: PoolConfig) -> CoreResult<Self> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            engine,
            state: Mutex::new(PoolState {
                entries: Vec::new(),
                next_id: 0,
                shutting_down: false,
                counters: Counters::default(),
            }),
            cancel: CancellationToken::new(),
            maintenance: Mutex::new(None),
            config,
        });

        let placeholders: Vec<u64> = {
            let mut state = shared.lock();
            (0..shared.config.initial_size)
                .map(|_| state.push_placeholder(shared.config.max_uses, false))
                .collect()
        };
        let launched = join_all(placeholders.iter().map(|id| {
            let shared = &shared;
            async move {
                let result = shared.provision(*id, EntryState::Idle).await;
                if let Err(e) = &result {
                    shared.drop_placeholder(*id);
                    warn!(entry_id = *id, error = %e, "Initial provisioning failed");
                }
                result.is_ok()
            }
        }))
        .await;
        let ready = launched.iter().filter(|ok| **ok).count();

        let handle = tokio::spawn(maintenance_loop(
            Arc::downgrade(&shared),
            shared.cancel.clone(),
            shared.config.maintenance_interval,
        ));
        *shared
            .maintenance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        info!(
            engine = shared.engine.name(),
            ready,
            requested = shared.config.initial_size,
            max_size = shared.config.max_size,
            "Browser pool started"
        );
        Ok(Self { shared })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Lease a session with the default desktop profile.
    pub async fn checkout_default(&self) -> CoreResult<Lease> {
        let config = SessionConfig::desktop()
            .with_timeout_ms(self.shared.config.session_timeout.as_millis() as u64);
        self.checkout(&config).await
    }

    /// Lease a session on an idle, new, or overflow instance.
    pub async fn checkout(&self, session: &SessionConfig) -> CoreResult<Lease> {
        let ticket = self.shared.claim()?;
        let claim = Claim::new(&self.shared, ticket.id);

        let instance = match ticket.instance {
            Some(instance) => instance,
            None => self.shared.provision(ticket.id, EntryState::Leased).await?,
        };

        match instance.new_session(session).await {
            Ok(engine_session) => {
                claim.disarm();
                Ok(Lease::new(
                    Arc::clone(&self.shared),
                    ticket.id,
                    ticket.overflow,
                    Arc::from(engine_session),
                ))
            }
            Err(e) => {
                claim.disarm();
                warn!(entry_id = ticket.id, error = %e, "Session creation failed, retiring instance");
                let settled = self.shared.settle(ticket.id, false, true);
                self.shared.finish(settled).await;
                Err(CoreError::acquisition(format!("session creation failed: {}", e)))
            }
        }
    }

    /// Return a lease to this pool.
    pub async fn release(&self, lease: Lease) -> CoreResult<()> {
        if !lease.belongs_to(&self.shared) {
            return Err(CoreError::LeaseNotHeld(format!(
                "entry {} belongs to another pool",
                lease.entry_id()
            )));
        }
        lease.release().await
    }

    /// Run one maintenance cycle now.
    pub async fn maintain(&self) -> MaintenanceReport {
        self.shared.maintain().await
    }

    pub fn health(&self) -> PoolHealth {
        let stats = self.shared.stats();
        PoolHealth {
            ready: !stats.shutting_down && stats.size > 0,
            size: stats.size,
            idle: stats.idle,
            leased: stats.leased,
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Stop maintenance, close every instance, and release the engine.
    /// Later calls are no-ops.
    pub async fn shutdown(&self) -> CoreResult<()> {
        let drained: Vec<PoolEntry> = {
            let mut state = self.shared.lock();
            if state.shutting_down {
                return Ok(());
            }
            state.shutting_down = true;
            state.entries.drain(..).collect()
        };

        self.shared.cancel.cancel();
        let handle = self
            .shared
            .maintenance
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }

        let leased = drained
            .iter()
            .filter(|e| e.state == EntryState::Leased)
            .count();
        let closing: Vec<PoolEntry> = drained
            .into_iter()
            .filter(|e| e.instance.is_some())
            .map(|mut e| {
                e.state = EntryState::Retiring;
                e
            })
            .collect();
        let closed = closing.len();
        join_all(closing.into_iter().map(close_entry)).await;

        self.shared.engine.shutdown().await?;
        info!(closed, force_closed_leases = leased, "Browser pool shut down");
        Ok(())
    }
}

async fn maintenance_loop(pool: Weak<PoolShared>, cancel: CancellationToken, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(shared) = pool.upgrade() else {
            break;
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.maintain() => {}
        }
    }
    debug!("Pool maintenance stopped");
}
