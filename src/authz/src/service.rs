//! Authorization service
//!
//! Session-scoped facade over the engine. One service is bound to one
//! authenticated actor; the resolver and evaluator it owns share a single
//! Authorization Cache.

use crate::cache::{AuthorizationCache, CacheKey, CacheLookup, CacheStats};
use crate::client::GrantStoreClient;
use crate::config::AuthzConfig;
use crate::error::{AuthzError, Result};
use crate::evaluator::{Decision, PermissionEvaluator};
use crate::navigation::{NavEntry, NavigationFilter, TenantAccess};
use crate::notify::{ChangeEvent, Subscription};
use crate::persistence::{MemorySnapshotStore, SledSnapshotStore, SnapshotStore};
use crate::resolver::{ContextState, Resolution, TenantContext, TenantContextResolver};
use parking_lot::Mutex;
use std::sync::Arc;
use tenantgate_core::{
    Actor, ActorId, CapabilityDescriptor, Grant, GrantStore, PermissionCode, SessionTerminator, Tenant,
    TenantId,
};
use tracing::{info, warn};

#[derive(Clone, PartialEq, Eq)]
struct NavKey {
    settled: bool,
    tenant_id: Option<TenantId>,
    bypass: bool,
    version: Option<u64>,
}

struct NavMemo {
    key: NavKey,
    entries: Vec<NavEntry>,
}

/// Handle for a session-level subscription; dropping it unsubscribes
pub struct SessionSubscription {
    _cache: Subscription,
    _tenant: Subscription,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {}
}

/// Authorization service for one actor session
pub struct AuthorizationService {
    actor: Actor,
    cache: AuthorizationCache,
    resolver: Arc<TenantContextResolver>,
    evaluator: PermissionEvaluator,
    navigation: NavigationFilter,
    nav_memo: Mutex<Option<NavMemo>>,
}

impl AuthorizationService {
    /// Build a service with snapshot persistence chosen by `config.state_dir`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        actor: Actor,
        store: Arc<dyn GrantStore>,
        config: AuthzConfig,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Result<Self> {
        let snapshots: Arc<dyn SnapshotStore> = match &config.state_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Arc::new(SledSnapshotStore::open(dir)?)
            }
            None => Arc::new(MemorySnapshotStore::new()),
        };
        Self::with_snapshot_store(actor, store, config, snapshots, terminator)
    }

    /// Build a service on an explicit snapshot store
    pub fn with_snapshot_store(
        actor: Actor,
        store: Arc<dyn GrantStore>,
        config: AuthzConfig,
        snapshots: Arc<dyn SnapshotStore>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Result<Self> {
        let client = GrantStoreClient::new(store, config.client.clone());
        let cache = AuthorizationCache::new(config.cache.clone(), client, snapshots, terminator)?;
        Ok(Self::with_cache(actor, cache, config))
    }

    /// Build a service on an existing cache (shared between sessions)
    pub fn with_cache(actor: Actor, cache: AuthorizationCache, config: AuthzConfig) -> Self {
        let resolver = Arc::new(TenantContextResolver::new(
            cache.clone(),
            actor.id.clone(),
            config.resolver,
        ));
        Self {
            evaluator: PermissionEvaluator::new(cache.clone()),
            navigation: NavigationFilter::new(config.navigation),
            nav_memo: Mutex::new(None),
            actor,
            cache,
            resolver,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn cache(&self) -> &AuthorizationCache {
        &self.cache
    }

    pub fn resolver(&self) -> &TenantContextResolver {
        &self.resolver
    }

    /// Restore persisted snapshots, then resolve tenants and pick the
    /// active one.
    ///
    /// Until the resolution completes, the previous session's active tenant
    /// answers from its restored snapshot and anything it cannot confirm is
    /// pending.
    pub async fn initialize(&self) -> Result<Resolution> {
        match self.cache.hydrate(&self.actor.id) {
            Ok(restored) => info!("Session start for actor={} ({} snapshots restored)", self.actor.id, restored),
            Err(e) => warn!("Could not restore snapshots for actor={}: {}", self.actor.id, e),
        }
        self.resolver.restore_provisional();
        self.resolver.resolve().await
    }

    /// Allow/deny/pending for a descriptor in the active tenant
    pub fn decide(&self, descriptor: &CapabilityDescriptor) -> Decision {
        match self.resolver.context_state() {
            ContextState::Active(context) => self.evaluator.evaluate(&self.actor, Some(&context.tenant), descriptor),
            ContextState::NoTenant => self.evaluator.evaluate(&self.actor, None, descriptor),
            ContextState::Provisional { tenant_id } => {
                self.evaluator
                    .evaluate_unresolved(&self.actor, Some(&tenant_id), descriptor)
            }
            ContextState::Resolving => self.evaluator.evaluate_unresolved(&self.actor, None, descriptor),
        }
    }

    /// `true` only for an explicit allow; pending counts as not allowed
    pub fn evaluate(&self, descriptor: &CapabilityDescriptor) -> bool {
        self.decide(descriptor).is_allowed()
    }

    pub fn active_tenant(&self) -> Option<TenantContext> {
        self.resolver.active()
    }

    pub async fn set_active_tenant(&self, tenant_id: &TenantId) -> Result<TenantContext> {
        self.resolver.set_active_tenant(tenant_id).await
    }

    /// Listen for changes that affect what this session sees: snapshot
    /// changes in the active tenant and active-tenant switches.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> SessionSubscription {
        let listener = Arc::new(listener);

        let actor_id = self.actor.id.clone();
        let resolver = self.resolver.clone();
        let on_cache = listener.clone();
        let cache = self.cache.subscribe(move |event| {
            let in_active = resolver
                .active()
                .is_some_and(|context| context.tenant.id == event.tenant_id);
            if event.actor_id == actor_id && in_active {
                on_cache(event);
            }
        });

        let tenant = self.resolver.subscribe(move |event| listener(event));

        SessionSubscription {
            _cache: cache,
            _tenant: tenant,
        }
    }

    /// Navigation entries visible in the current context.
    ///
    /// Recomputed only when the active tenant or its snapshot version
    /// changes.
    pub fn visible_navigation(&self) -> Vec<NavEntry> {
        let registry = self.evaluator.registry();
        let context = match self.resolver.context_state() {
            ContextState::Active(context) => context,
            ContextState::NoTenant => {
                return self.memoized(
                    NavKey {
                        settled: true,
                        tenant_id: None,
                        bypass: false,
                        version: None,
                    },
                    || self.navigation.visible_for(registry, self.actor.role, TenantAccess::NoTenant),
                );
            }
            ContextState::Provisional { tenant_id } => {
                // Denials are not final yet; only confirmed allows show
                let key = CacheKey::new(self.actor.id.clone(), tenant_id.clone());
                let snapshot = self.cache.snapshot(&key);
                return self.memoized(
                    NavKey {
                        settled: false,
                        tenant_id: Some(tenant_id),
                        bypass: false,
                        version: snapshot.as_ref().map(|s| s.version),
                    },
                    || {
                        self.navigation.visible_for(
                            registry,
                            self.actor.role,
                            TenantAccess::Snapshot(snapshot.as_deref()),
                        )
                    },
                );
            }
            ContextState::Resolving => {
                return self.memoized(
                    NavKey {
                        settled: false,
                        tenant_id: None,
                        bypass: false,
                        version: None,
                    },
                    || self.navigation.visible_for(registry, self.actor.role, TenantAccess::Snapshot(None)),
                );
            }
        };

        let tenant_id = Some(context.tenant.id.clone());
        if registry.bypasses_grants(&self.actor, &context.tenant) {
            return self.memoized(
                NavKey {
                    settled: true,
                    tenant_id,
                    bypass: true,
                    version: None,
                },
                || self.navigation.visible_for(registry, self.actor.role, TenantAccess::Bypass),
            );
        }

        let key = CacheKey::new(self.actor.id.clone(), context.tenant.id.clone());
        let lookup = self.cache.lookup_and_revalidate(&key);
        let snapshot = lookup.snapshot().cloned();
        self.memoized(
            NavKey {
                settled: true,
                tenant_id,
                bypass: false,
                version: snapshot.as_ref().map(|s| s.version),
            },
            || {
                self.navigation.visible_for(
                    registry,
                    self.actor.role,
                    TenantAccess::Snapshot(snapshot.as_deref()),
                )
            },
        )
    }

    /// Grant codes to `target` in the active tenant.
    ///
    /// The target's cached snapshot is updated optimistically and then
    /// reconciled with the Grant Store whether or not the call succeeded.
    pub async fn grant(
        &self,
        target: &ActorId,
        codes: &[PermissionCode],
        notes: Option<String>,
    ) -> Result<Vec<Grant>> {
        let tenant = self.mutation_tenant()?;
        let client = self.cache_client();
        client.validate_mutation(&self.actor, &tenant, target, codes)?;

        let key = CacheKey::new(target.clone(), tenant.id.clone());
        if self.cache.snapshot(&key).is_some() {
            self.cache.apply_optimistic(&key, |held| held.extend(codes.iter().copied()));
        }

        let result = client.grant(&self.actor, &tenant, target, codes, notes).await;
        self.reconcile(&key, result.as_ref().err()).await;
        if result.is_ok() {
            info!("Granted {:?} to actor={} in tenant={}", codes, target, tenant.id);
        }
        result
    }

    /// Revoke codes from `target` in the active tenant
    pub async fn revoke(
        &self,
        target: &ActorId,
        codes: &[PermissionCode],
        reason: Option<String>,
    ) -> Result<()> {
        let tenant = self.mutation_tenant()?;
        let client = self.cache_client();
        client.validate_mutation(&self.actor, &tenant, target, codes)?;

        let key = CacheKey::new(target.clone(), tenant.id.clone());
        if self.cache.snapshot(&key).is_some() {
            self.cache
                .apply_optimistic(&key, |held| held.retain(|code| !codes.contains(code)));
        }

        let result = client.revoke(&self.actor, &tenant, target, codes, reason).await;
        self.reconcile(&key, result.as_ref().err()).await;
        if result.is_ok() {
            info!("Revoked {:?} from actor={} in tenant={}", codes, target, tenant.id);
        }
        result
    }

    /// Revalidate the active tenant after the app returns to the
    /// foreground. Returns whether a fetch ran.
    pub async fn on_foreground(&self) -> bool {
        let Some(context) = self.active_tenant() else {
            return false;
        };
        let key = CacheKey::new(self.actor.id.clone(), context.tenant.id);
        match self.cache.lookup(&key) {
            CacheLookup::Fresh(_) | CacheLookup::Loading => false,
            CacheLookup::Stale(_) | CacheLookup::Missing => match self.cache.request_refresh(&key, false) {
                Some(done) => {
                    done.await;
                    true
                }
                None => false,
            },
        }
    }

    /// End the session: drop every cached and persisted snapshot for the
    /// actor and forget the active tenant.
    pub fn logout(&self) -> Result<()> {
        self.cache.purge_actor(&self.actor.id)?;
        self.resolver.clear();
        *self.nav_memo.lock() = None;
        info!("Actor={} logged out", self.actor.id);
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn cache_client(&self) -> &GrantStoreClient {
        self.cache.client()
    }

    fn mutation_tenant(&self) -> Result<Tenant> {
        self.active_tenant()
            .map(|context| context.tenant)
            .ok_or_else(|| AuthzError::Validation("no active tenant to manage permissions in".into()))
    }

    async fn reconcile(&self, key: &CacheKey, error: Option<&AuthzError>) {
        if let Some(err) = error {
            warn!("Permission mutation for {} failed ({}), reconciling", key, err);
        }
        self.cache.refresh(key).await;
    }

    fn memoized(&self, key: NavKey, compute: impl FnOnce() -> Vec<NavEntry>) -> Vec<NavEntry> {
        let mut memo = self.nav_memo.lock();
        if let Some(memo) = memo.as_ref() {
            if memo.key == key {
                return memo.entries.clone();
            }
        }
        let entries = compute();
        *memo = Some(NavMemo {
            key,
            entries: entries.clone(),
        });
        entries
    }
}
