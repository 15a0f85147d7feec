//! Authorization Cache
//!
//! Keyed, TTL-bound, single-flight cache of resolved permission sets per
//! (actor, tenant). It is the only component that writes cache entries; the
//! resolver, evaluator, and service go through this API.
//!
//! # Request ordering
//!
//! Every fetch and every optimistic write takes a sequence number from one
//! monotonically increasing counter. An entry remembers the latest sequence
//! issued for it, and a fetch response is applied only if it carries that
//! sequence. A response that was overtaken by a newer request (or by a
//! purge) is discarded on arrival.
//!
//! ```text
//! evaluate ─▶ lookup ─▶ Fresh ──────────────▶ snapshot
//!                  └──▶ Stale/Missing ─▶ request_refresh ─▶ spawn fetch ─▶ apply(seq)
//!                                         (single-flight,    │
//!                                          cooldown)         └─▶ ChangeHub
//! ```

use crate::client::GrantStoreClient;
use crate::error::{AuthzError, Result};
use crate::notify::{ChangeEvent, ChangeHub, ChangeKind, Subscription};
use crate::persistence::{PersistedSnapshot, SnapshotStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantgate_core::{ActorId, PermissionCode, SessionTerminator, TenantId};
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which a snapshot is served stale and refreshed in background
    pub ttl: Duration,

    /// Minimum gap between two non-forced fetches of the same key
    pub refetch_cooldown: Duration,

    /// Keep the previous snapshot instead of degrading to zero permissions
    /// when a fetch fails
    pub retain_last_known_good: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            refetch_cooldown: Duration::from_secs(3),
            retain_last_known_good: false,
        }
    }
}

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
}

impl CacheKey {
    pub fn new(actor_id: impl Into<ActorId>, tenant_id: impl Into<TenantId>) -> Self {
        Self {
            actor_id: actor_id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.actor_id, self.tenant_id)
    }
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Fetched,
    Optimistic,
    Degraded,
    Restored,
}

/// Resolved permission set for one (actor, tenant)
#[derive(Debug, Clone)]
pub struct CachedAuthorizationState {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    pub active_permission_codes: BTreeSet<PermissionCode>,
    pub fetched_at: DateTime<Utc>,
    /// Sequence number of the request that produced this snapshot
    pub version: u64,
    pub origin: SnapshotOrigin,
    /// Monotonic refresh instant; `None` means stale from the start
    refreshed_at: Option<Instant>,
}

impl CachedAuthorizationState {
    fn new(
        key: &CacheKey,
        codes: BTreeSet<PermissionCode>,
        version: u64,
        origin: SnapshotOrigin,
        refreshed_at: Option<Instant>,
    ) -> Self {
        Self {
            actor_id: key.actor_id.clone(),
            tenant_id: key.tenant_id.clone(),
            active_permission_codes: codes,
            fetched_at: Utc::now(),
            version,
            origin,
            refreshed_at,
        }
    }

    /// Freshly fetched snapshot that no cache owns, for offline evaluation
    pub fn from_codes(key: &CacheKey, codes: impl IntoIterator<Item = PermissionCode>) -> Self {
        Self::new(
            key,
            codes.into_iter().collect(),
            0,
            SnapshotOrigin::Fetched,
            Some(Instant::now()),
        )
    }

    /// Whether the snapshot carries an explicit grant for `code`
    pub fn holds(&self, code: PermissionCode) -> bool {
        self.active_permission_codes.contains(&code)
    }

    /// Number of explicitly granted codes
    pub fn permission_count(&self) -> usize {
        self.active_permission_codes.len()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.refreshed_at {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }

    fn to_persisted(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            actor_id: self.actor_id.clone(),
            tenant_id: self.tenant_id.clone(),
            granted_permission_codes: self.active_permission_codes.iter().copied().collect(),
            fetched_at: self.fetched_at,
        }
    }
}

/// Result of a synchronous cache read
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Nothing cached and nothing in flight
    Missing,
    /// First fetch outstanding, no snapshot yet
    Loading,
    /// Snapshot within its TTL
    Fresh(Arc<CachedAuthorizationState>),
    /// Snapshot past its TTL (servable while a refresh runs)
    Stale(Arc<CachedAuthorizationState>),
}

impl CacheLookup {
    pub fn snapshot(&self) -> Option<&Arc<CachedAuthorizationState>> {
        match self {
            CacheLookup::Fresh(s) | CacheLookup::Stale(s) => Some(s),
            CacheLookup::Missing | CacheLookup::Loading => None,
        }
    }
}

/// Completes once a fetch has been applied or discarded
pub type FetchDone = Shared<BoxFuture<'static, ()>>;

struct InFlight {
    seq: u64,
    done: FetchDone,
}

#[derive(Default)]
struct Entry {
    snapshot: Option<Arc<CachedAuthorizationState>>,
    latest_seq: u64,
    in_flight: Option<InFlight>,
    last_fetch_started: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    suppressed: AtomicU64,
    discarded: AtomicU64,
    degraded: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    /// Fetches actually issued to the Grant Store Client
    pub fetches: u64,
    /// Requests that joined an outstanding fetch
    pub coalesced: u64,
    /// Requests skipped because of the refetch cooldown
    pub suppressed: u64,
    /// Responses dropped because a newer request superseded them
    pub discarded: u64,
    /// Fetches that ended in a zero-permission snapshot
    pub degraded: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate (stale hits count as hits)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.stale_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.stale_hits) as f64 / total as f64
        }
    }
}

struct CacheInner {
    config: CacheConfig,
    client: GrantStoreClient,
    persistence: Arc<dyn SnapshotStore>,
    terminator: Arc<dyn SessionTerminator>,
    entries: DashMap<CacheKey, Entry>,
    sequence: AtomicU64,
    expired_sessions: DashMap<ActorId, ()>,
    hub: ChangeHub,
    counters: Counters,
    runtime: Handle,
}

/// Single-flight authorization cache
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct AuthorizationCache {
    inner: Arc<CacheInner>,
}

impl AuthorizationCache {
    /// Create a cache bound to the current tokio runtime.
    ///
    /// Background refreshes are spawned on that runtime, which lets
    /// synchronous callers trigger them.
    pub fn new(
        config: CacheConfig,
        client: GrantStoreClient,
        persistence: Arc<dyn SnapshotStore>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AuthzError::Runtime(format!("authorization cache needs a tokio runtime: {e}")))?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                config,
                client,
                persistence,
                terminator,
                entries: DashMap::new(),
                sequence: AtomicU64::new(0),
                expired_sessions: DashMap::new(),
                hub: ChangeHub::new(),
                counters: Counters::default(),
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Read the entry for `key` without triggering anything
    pub fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let counters = &self.inner.counters;
        let Some(entry) = self.inner.entries.get(key) else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Missing;
        };

        match &entry.snapshot {
            Some(snapshot) if snapshot.is_stale(self.inner.config.ttl) => {
                counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Stale(snapshot.clone())
            }
            Some(snapshot) => {
                counters.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Fresh(snapshot.clone())
            }
            None if entry.in_flight.is_some() => {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Loading
            }
            None => {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Missing
            }
        }
    }

    /// Current snapshot regardless of staleness
    pub fn snapshot(&self, key: &CacheKey) -> Option<Arc<CachedAuthorizationState>> {
        self.inner
            .entries
            .get(key)
            .and_then(|entry| entry.snapshot.clone())
    }

    /// Read the entry and, if it is missing or stale, start a background
    /// refresh. Never waits.
    pub fn lookup_and_revalidate(&self, key: &CacheKey) -> CacheLookup {
        match self.lookup(key) {
            CacheLookup::Missing => {
                if self.request_refresh(key, false).is_some() {
                    CacheLookup::Loading
                } else {
                    CacheLookup::Missing
                }
            }
            stale @ CacheLookup::Stale(_) => {
                self.request_refresh(key, false);
                stale
            }
            other => other,
        }
    }

    /// Snapshot for `key`, waiting for a fetch if there is nothing fresh.
    ///
    /// Joins an outstanding fetch instead of starting a second one. Returns
    /// `None` only if no snapshot could be produced (e.g. expired session).
    pub async fn load(&self, key: &CacheKey) -> Option<Arc<CachedAuthorizationState>> {
        if let CacheLookup::Fresh(snapshot) = self.lookup(key) {
            return Some(snapshot);
        }
        if let Some(done) = self.request_refresh(key, false) {
            done.await;
        }
        self.snapshot(key)
    }

    /// Fetch `key` now, superseding any outstanding request, and wait for it
    pub async fn refresh(&self, key: &CacheKey) -> Option<Arc<CachedAuthorizationState>> {
        if let Some(done) = self.request_refresh(key, true) {
            done.await;
        }
        self.snapshot(key)
    }

    /// Start a fetch for `key` unless one is already outstanding.
    ///
    /// `force` bypasses both the single-flight join and the cooldown; the
    /// new request supersedes whatever is in flight. Returns a future that
    /// completes once the fetch has been applied (or discarded), or `None`
    /// when no fetch was started or joined.
    pub fn request_refresh(&self, key: &CacheKey, force: bool) -> Option<FetchDone> {
        let inner = &self.inner;
        if inner.expired_sessions.contains_key(&key.actor_id) {
            debug!("Session expired for actor={}, not fetching {}", key.actor_id, key);
            return None;
        }

        let mut entry = inner.entries.entry(key.clone()).or_default();
        let now = Instant::now();

        if !force {
            if let Some(in_flight) = &entry.in_flight {
                inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                return Some(in_flight.done.clone());
            }
            if let Some(started) = entry.last_fetch_started {
                if now.duration_since(started) < inner.config.refetch_cooldown {
                    inner.counters.suppressed.fetch_add(1, Ordering::Relaxed);
                    debug!("Refetch of {} suppressed by cooldown", key);
                    return None;
                }
            }
        }

        let seq = inner.next_seq();
        entry.latest_seq = seq;
        entry.last_fetch_started = Some(now);

        let task_inner = self.inner.clone();
        let task_key = key.clone();
        let handle = inner
            .runtime
            .spawn(async move { task_inner.run_fetch(task_key, seq).await });
        // A fetch task that dies (panicking store) must still settle the entry
        let watch_inner = self.inner.clone();
        let watch_key = key.clone();
        let watched = inner.runtime.spawn(async move {
            if let Err(err) = handle.await {
                watch_inner.abandon_fetch(&watch_key, seq, err);
            }
        });
        let done: FetchDone = async move {
            let _ = watched.await;
        }
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            seq,
            done: done.clone(),
        });
        inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
        debug!("Issued fetch seq={} for {} (force={})", seq, key, force);

        Some(done)
    }

    /// Apply a local change ahead of the Grant Store confirming it.
    ///
    /// Supersedes any outstanding fetch for the key; callers reconcile with
    /// [`AuthorizationCache::refresh`] once the mutation settles.
    pub fn apply_optimistic(
        &self,
        key: &CacheKey,
        mutate: impl FnOnce(&mut BTreeSet<PermissionCode>),
    ) -> u64 {
        let inner = &self.inner;
        let seq = inner.next_seq();
        {
            let mut entry = inner.entries.entry(key.clone()).or_default();
            let mut codes = entry
                .snapshot
                .as_ref()
                .map(|s| s.active_permission_codes.clone())
                .unwrap_or_default();
            mutate(&mut codes);

            entry.latest_seq = seq;
            entry.snapshot = Some(Arc::new(CachedAuthorizationState::new(
                key,
                codes,
                seq,
                SnapshotOrigin::Optimistic,
                Some(Instant::now()),
            )));
        }

        debug!("Applied optimistic update seq={} for {}", seq, key);
        inner.publish(key, ChangeKind::Optimistic, seq);
        seq
    }

    /// Load persisted snapshots for an actor into empty entries.
    ///
    /// Restored snapshots are stale from the start so the first use
    /// revalidates them.
    pub fn hydrate(&self, actor_id: &ActorId) -> Result<usize> {
        let inner = &self.inner;
        let persisted = inner.persistence.load_actor(actor_id)?;
        let mut restored = Vec::new();

        for record in persisted {
            let key = CacheKey::new(record.actor_id.clone(), record.tenant_id.clone());
            let mut entry = inner.entries.entry(key.clone()).or_default();
            if entry.snapshot.is_some() || entry.in_flight.is_some() {
                continue;
            }

            let seq = inner.next_seq();
            let mut snapshot = CachedAuthorizationState::new(
                &key,
                record.granted_permission_codes.into_iter().collect(),
                seq,
                SnapshotOrigin::Restored,
                None,
            );
            snapshot.fetched_at = record.fetched_at;
            entry.latest_seq = seq;
            entry.snapshot = Some(Arc::new(snapshot));
            restored.push((key, seq));
        }

        for (key, seq) in &restored {
            inner.publish(key, ChangeKind::Restored, *seq);
        }
        if !restored.is_empty() {
            info!("Restored {} persisted snapshots for actor={}", restored.len(), actor_id);
        }
        Ok(restored.len())
    }

    /// Drop every entry for an actor, in memory and on disk.
    ///
    /// Outstanding fetches for those keys are discarded when they land.
    /// Also clears the expired-session mark so a new session can fetch.
    pub fn purge_actor(&self, actor_id: &ActorId) -> Result<()> {
        let inner = &self.inner;
        let mut removed = Vec::new();
        inner.entries.retain(|key, _| {
            if &key.actor_id == actor_id {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });
        inner.expired_sessions.remove(actor_id);
        inner.persistence.purge_actor(actor_id)?;

        for key in &removed {
            inner.publish(key, ChangeKind::Purged, 0);
        }
        info!("Purged {} cache entries for actor={}", removed.len(), actor_id);
        Ok(())
    }

    /// Keys currently cached for an actor
    pub fn keys_for(&self, actor_id: &ActorId) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .inner
            .entries
            .iter()
            .filter(|entry| &entry.key().actor_id == actor_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Whether an `AuthExpired` signal was seen for the actor
    pub fn is_session_expired(&self, actor_id: &ActorId) -> bool {
        self.inner.expired_sessions.contains_key(actor_id)
    }

    /// Listen to every entry change
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.hub.subscribe(listener)
    }

    /// Persist the active tenant through the cache's snapshot store
    pub(crate) fn persist_active_tenant(&self, actor_id: &ActorId, tenant_id: &TenantId) {
        if let Err(e) = self.inner.persistence.save_active_tenant(actor_id, tenant_id) {
            warn!("Failed to persist active tenant for actor={}: {}", actor_id, e);
        }
    }

    pub(crate) fn persisted_active_tenant(&self, actor_id: &ActorId) -> Option<TenantId> {
        match self.inner.persistence.load_active_tenant(actor_id) {
            Ok(tenant) => tenant,
            Err(e) => {
                warn!("Failed to read persisted active tenant for actor={}: {}", actor_id, e);
                None
            }
        }
    }

    /// Record an `AuthExpired` seen outside a cache fetch (e.g. a
    /// membership listing). The terminator runs once per session.
    pub(crate) fn expire_session(&self, actor_id: &ActorId) {
        self.inner.expire_session(actor_id);
    }

    pub(crate) fn client(&self) -> &GrantStoreClient {
        &self.inner.client
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            stale_hits: c.stale_hits.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            suppressed: c.suppressed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            degraded: c.degraded.load(Ordering::Relaxed),
            entries: self.inner.entries.len(),
        }
    }
}

impl CacheInner {
    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, key: &CacheKey, kind: ChangeKind, version: u64) {
        self.hub.publish(&ChangeEvent {
            actor_id: key.actor_id.clone(),
            tenant_id: key.tenant_id.clone(),
            kind,
            version,
        });
    }

    fn expire_session(&self, actor_id: &ActorId) {
        if self.expired_sessions.insert(actor_id.clone(), ()).is_none() {
            warn!("Authentication expired for actor={}, ending session", actor_id);
            self.terminator.session_expired(actor_id);
        }
    }

    async fn run_fetch(self: Arc<Self>, key: CacheKey, seq: u64) {
        let result = self
            .client
            .fetch_effective_codes(&key.tenant_id, &key.actor_id)
            .await;
        self.apply(&key, seq, result);
    }

    /// Settle an entry whose fetch task ended without applying a result
    fn abandon_fetch(&self, key: &CacheKey, seq: u64, err: JoinError) {
        let outstanding = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.as_ref().map(|f| f.seq) == Some(seq));
        if !outstanding {
            return;
        }
        warn!("Fetch task seq={} for {} did not complete: {}", seq, key, err);
        self.apply(key, seq, Err(AuthzError::Internal(format!("fetch task failed: {err}"))));
    }

    fn apply(&self, key: &CacheKey, seq: u64, result: Result<BTreeSet<PermissionCode>>) {
        let mut expired = false;
        let change = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding response seq={} for purged key {}", seq, key);
                return;
            };

            if entry.in_flight.as_ref().map(|f| f.seq) == Some(seq) {
                entry.in_flight = None;
            }
            if entry.latest_seq != seq {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Discarding superseded response seq={} for {} (latest={})",
                    seq, key, entry.latest_seq
                );
                return;
            }

            match result {
                Ok(codes) => {
                    let snapshot = CachedAuthorizationState::new(
                        key,
                        codes,
                        seq,
                        SnapshotOrigin::Fetched,
                        Some(Instant::now()),
                    );
                    if let Err(e) = self.persistence.save(&snapshot.to_persisted()) {
                        warn!("Failed to persist snapshot for {}: {}", key, e);
                    }
                    debug!(
                        "Applied seq={} for {} ({} codes)",
                        seq,
                        key,
                        snapshot.permission_count()
                    );
                    entry.snapshot = Some(Arc::new(snapshot));
                    Some(ChangeKind::Refreshed)
                }
                Err(AuthzError::AuthExpired) => {
                    expired = true;
                    None
                }
                Err(err) => {
                    self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                    if self.config.retain_last_known_good && entry.snapshot.is_some() {
                        warn!("Fetch for {} failed ({}), keeping last known snapshot", key, err);
                        None
                    } else {
                        warn!("Fetch for {} failed ({}), degrading to zero permissions", key, err);
                        entry.snapshot = Some(Arc::new(CachedAuthorizationState::new(
                            key,
                            BTreeSet::new(),
                            seq,
                            SnapshotOrigin::Degraded,
                            None,
                        )));
                        Some(ChangeKind::Degraded)
                    }
                }
            }
        };

        if expired {
            self.expire_session(&key.actor_id);
            return;
        }

        if let Some(kind) = change {
            self.publish(key, kind, seq);
        }
    }
}
