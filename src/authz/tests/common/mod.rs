//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantgate_authz::{
    AuthorizationCache, CacheConfig, ClientConfig, GrantStoreClient, InMemoryGrantStore, MemorySnapshotStore,
    RetryConfig, SnapshotStore,
};
use tenantgate_core::error::{CoreError, Result as CoreResult};
use tenantgate_core::{
    ActorId, Grant, GrantRequest, GrantStore, MembershipRecord, PermissionCode, RevokeRequest,
    SessionTerminator, TenantId,
};

/// Grant Store wrapper with per-tenant scripted latency and failures.
///
/// Grant data is read before the scripted delay, so a slow call answers
/// with the data as it was when the call started.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    pub inner: InMemoryGrantStore,
    delays: Arc<Mutex<HashMap<TenantId, VecDeque<Duration>>>>,
    failures: Arc<Mutex<HashMap<TenantId, VecDeque<CoreError>>>>,
    panics: Arc<Mutex<HashSet<TenantId>>>,
    membership_failure: Arc<Mutex<Option<CoreError>>>,
    membership_delay: Arc<Mutex<Option<Duration>>>,
    mutation_failure: Arc<Mutex<Option<CoreError>>>,
    grant_calls: Arc<AtomicUsize>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the next `grants` call for `tenant`
    pub fn delay_next(&self, tenant: &str, delay: Duration) {
        self.delays
            .lock()
            .entry(TenantId::from(tenant))
            .or_default()
            .push_back(delay);
    }

    /// Fail the next `grants` call for `tenant`
    pub fn fail_next(&self, tenant: &str, error: CoreError) {
        self.failures
            .lock()
            .entry(TenantId::from(tenant))
            .or_default()
            .push_back(error);
    }

    /// Panic inside the next `grants` call for `tenant`
    pub fn panic_next(&self, tenant: &str) {
        self.panics.lock().insert(TenantId::from(tenant));
    }

    /// Delay every membership listing
    pub fn delay_memberships(&self, delay: Duration) {
        *self.membership_delay.lock() = Some(delay);
    }

    /// Fail the next membership listing
    pub fn fail_memberships(&self, error: CoreError) {
        *self.membership_failure.lock() = Some(error);
    }

    /// Fail the next grant or revoke
    pub fn fail_next_mutation(&self, error: CoreError) {
        *self.mutation_failure.lock() = Some(error);
    }

    /// `grants` calls received, including failed ones
    pub fn grant_calls(&self) -> usize {
        self.grant_calls.load(Ordering::SeqCst)
    }

    pub async fn member(&self, actor: &str, tenant: &str, owner: Option<&str>) {
        self.inner
            .add_membership(actor, membership(tenant, owner, true))
            .await;
    }

    pub async fn inactive_member(&self, actor: &str, tenant: &str) {
        self.inner
            .add_membership(actor, membership(tenant, None, false))
            .await;
    }

    /// Seed grants directly, bypassing client-side validation
    pub async fn seed(&self, actor: &str, tenant: &str, codes: &[PermissionCode]) {
        self.inner
            .grant(GrantRequest {
                tenant_id: TenantId::from(tenant),
                actor_id: ActorId::from(actor),
                permission_codes: codes.to_vec(),
                granted_by: ActorId::from("seed"),
                notes: None,
            })
            .await
            .expect("seed grants");
    }

    /// Revoke seeded grants directly
    pub async fn unseed(&self, actor: &str, tenant: &str, codes: &[PermissionCode]) {
        self.inner
            .revoke(RevokeRequest {
                tenant_id: TenantId::from(tenant),
                actor_id: ActorId::from(actor),
                permission_codes: codes.to_vec(),
                revoked_by: ActorId::from("seed"),
                reason: None,
            })
            .await
            .expect("revoke seeded grants");
    }
}

/// Let spawned fetch tasks run to completion
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[async_trait]
impl GrantStore for ScriptedStore {
    async fn grants(&self, tenant_id: &TenantId, actor_id: &ActorId) -> CoreResult<Vec<Grant>> {
        if self.panics.lock().remove(tenant_id) {
            panic!("grant store blew up for {tenant_id}");
        }
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .get_mut(tenant_id)
            .and_then(|queue| queue.pop_front());
        let delay = self
            .delays
            .lock()
            .get_mut(tenant_id)
            .and_then(|queue| queue.pop_front());

        let result = match failure {
            Some(err) => Err(err),
            None => self.inner.grants(tenant_id, actor_id).await,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn grant(&self, request: GrantRequest) -> CoreResult<Vec<Grant>> {
        if let Some(err) = self.mutation_failure.lock().take() {
            return Err(err);
        }
        self.inner.grant(request).await
    }

    async fn revoke(&self, request: RevokeRequest) -> CoreResult<()> {
        if let Some(err) = self.mutation_failure.lock().take() {
            return Err(err);
        }
        self.inner.revoke(request).await
    }

    async fn tenant_memberships(&self, actor_id: &ActorId) -> CoreResult<Vec<MembershipRecord>> {
        let delay = *self.membership_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.membership_failure.lock().take() {
            return Err(err);
        }
        self.inner.tenant_memberships(actor_id).await
    }
}

pub fn membership(tenant: &str, owner: Option<&str>, is_active: bool) -> MembershipRecord {
    MembershipRecord {
        tenant_id: TenantId::from(tenant),
        tenant_name: tenant.to_uppercase(),
        local_membership_id: format!("member-{tenant}"),
        is_active,
        owner_id: owner.map(ActorId::from),
    }
}

/// Terminator that counts expiry signals
#[derive(Default)]
pub struct CountingTerminator {
    pub calls: AtomicUsize,
}

impl CountingTerminator {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionTerminator for CountingTerminator {
    fn session_expired(&self, _actor_id: &ActorId) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Client without retries or jitter so failure tests stay deterministic
pub fn quick_client(store: &ScriptedStore) -> GrantStoreClient {
    GrantStoreClient::new(
        Arc::new(store.clone()),
        ClientConfig {
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::no_retry(),
        },
    )
}

pub struct CacheHarness {
    pub cache: AuthorizationCache,
    pub store: ScriptedStore,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub terminator: Arc<CountingTerminator>,
}

pub fn cache_with(store: &ScriptedStore, config: CacheConfig, snapshots: Arc<dyn SnapshotStore>) -> CacheHarness {
    let terminator = Arc::new(CountingTerminator::default());
    let cache = AuthorizationCache::new(config, quick_client(store), snapshots.clone(), terminator.clone())
        .expect("cache inside runtime");
    CacheHarness {
        cache,
        store: store.clone(),
        snapshots,
        terminator,
    }
}

pub fn cache_harness(store: &ScriptedStore, config: CacheConfig) -> CacheHarness {
    cache_with(store, config, Arc::new(MemorySnapshotStore::new()))
}
