//! Tenant Context Resolver
//!
//! Lists an actor's memberships, loads every tenant's grant set through the
//! Authorization Cache concurrently, and picks the active tenant:
//!
//! 1. the previously active tenant, if it is still a valid membership
//! 2. the membership with the most effective grants (earliest wins ties)
//! 3. the first membership
//!
//! A branch that fails or times out counts as zero grants; the rest of the
//! resolution continues.
//!
//! While a resolution runs, the tenant active in the previous session can
//! stand in provisionally (see [`ContextState`]).

use crate::cache::{AuthorizationCache, CacheKey, SnapshotOrigin};
use crate::error::{AuthzError, Result};
use crate::notify::{ChangeEvent, ChangeHub, ChangeKind, Subscription};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tenantgate_core::{ActorId, MembershipRecord, Tenant, TenantId, TenantMembership};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Time budget for one tenant's grant load during fan-out
    pub branch_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            branch_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-tenant result of a resolution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub tenant: Tenant,
    pub membership: TenantMembership,
    pub permission_count: usize,
    /// The grant load failed or timed out; the count is zero
    pub load_failed: bool,
}

/// The tenant an actor currently operates under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant: Tenant,
    pub membership: TenantMembership,
    pub permission_count: usize,
}

/// Which rule picked the active tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Previous,
    MostPermissions,
    First,
}

/// Where the session stands with respect to its active tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState {
    /// No resolution is running and none produced a tenant
    NoTenant,
    /// A resolution is running and no tenant is known yet
    Resolving,
    /// A resolution is running; the tenant active in the previous session
    /// stands in until it completes
    Provisional { tenant_id: TenantId },
    Active(TenantContext),
}

/// Outcome of [`TenantContextResolver::resolve`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub tenants: Vec<TenantSummary>,
    pub active: Option<TenantContext>,
    pub reason: Option<SelectionReason>,
}

#[derive(Default)]
struct ResolverState {
    memberships: Vec<MembershipRecord>,
    active: Option<TenantContext>,
    /// Resolutions currently running
    resolving: usize,
    provisional: Option<TenantId>,
}

/// Marks a resolution as running until dropped, including on early return
/// or cancellation.
struct ResolvingGuard<'a> {
    state: &'a RwLock<ResolverState>,
}

impl<'a> ResolvingGuard<'a> {
    fn enter(state: &'a RwLock<ResolverState>) -> Self {
        state.write().resolving += 1;
        Self { state }
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        state.resolving = state.resolving.saturating_sub(1);
        if state.resolving == 0 {
            state.provisional = None;
        }
    }
}

/// Tenant Context Resolver for one actor
pub struct TenantContextResolver {
    cache: AuthorizationCache,
    config: ResolverConfig,
    actor_id: ActorId,
    state: RwLock<ResolverState>,
    hub: ChangeHub,
}

impl TenantContextResolver {
    pub fn new(cache: AuthorizationCache, actor_id: impl Into<ActorId>, config: ResolverConfig) -> Self {
        Self {
            cache,
            config,
            actor_id: actor_id.into(),
            state: RwLock::new(ResolverState::default()),
            hub: ChangeHub::new(),
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Current active tenant
    pub fn active(&self) -> Option<TenantContext> {
        self.state.read().active.clone()
    }

    /// Active tenant together with the resolution status
    pub fn context_state(&self) -> ContextState {
        let state = self.state.read();
        match (&state.active, &state.provisional) {
            (Some(context), _) => ContextState::Active(context.clone()),
            (None, Some(tenant_id)) if state.resolving > 0 => ContextState::Provisional {
                tenant_id: tenant_id.clone(),
            },
            (None, _) if state.resolving > 0 => ContextState::Resolving,
            (None, _) => ContextState::NoTenant,
        }
    }

    /// Stand in the previous session's active tenant until the next
    /// resolution completes.
    ///
    /// Only applies when nothing is active yet and a restored snapshot for
    /// that tenant is in the cache. Returns the provisional tenant.
    pub fn restore_provisional(&self) -> Option<TenantId> {
        if self.state.read().active.is_some() {
            return None;
        }
        let tenant_id = self.cache.persisted_active_tenant(&self.actor_id)?;
        let key = CacheKey::new(self.actor_id.clone(), tenant_id.clone());
        self.cache.snapshot(&key)?;

        debug!("Provisional active tenant={} for actor={}", tenant_id, self.actor_id);
        self.state.write().provisional = Some(tenant_id.clone());
        Some(tenant_id)
    }

    /// Memberships seen by the last listing, in store order
    pub fn memberships(&self) -> Vec<MembershipRecord> {
        self.state.read().memberships.clone()
    }

    /// Listen for active-tenant switches
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Subscription {
        self.hub.subscribe(listener)
    }

    /// Enumerate memberships, fan out grant loads, and select the active
    /// tenant.
    ///
    /// If the membership listing itself fails, the active tenant is cleared
    /// and the error returned.
    pub async fn resolve(&self) -> Result<Resolution> {
        let _resolving = ResolvingGuard::enter(&self.state);
        let memberships = match self.list_memberships().await {
            Ok(memberships) => memberships,
            Err(err) => {
                let mut state = self.state.write();
                state.memberships.clear();
                state.active = None;
                return Err(err);
            }
        };

        let active_memberships: Vec<&MembershipRecord> =
            memberships.iter().filter(|m| m.is_active).collect();
        let tenants = join_all(active_memberships.iter().map(|m| self.load_branch(m))).await;

        let previous = self.previous_active_id();
        let selected = select_active(&tenants, previous.as_ref());

        let (active, reason) = match selected {
            Some((index, reason)) => {
                let summary = &tenants[index];
                (
                    Some(TenantContext {
                        tenant: summary.tenant.clone(),
                        membership: summary.membership.clone(),
                        permission_count: summary.permission_count,
                    }),
                    Some(reason),
                )
            }
            None => (None, None),
        };

        match &active {
            Some(context) => info!(
                "Resolved active tenant={} for actor={} ({:?}, {} grants, {} memberships)",
                context.tenant.id,
                self.actor_id,
                reason,
                context.permission_count,
                tenants.len()
            ),
            None => info!("Actor={} has no active memberships", self.actor_id),
        }

        self.install(memberships, active.clone());

        Ok(Resolution {
            tenants,
            active,
            reason,
        })
    }

    /// Switch the active tenant.
    ///
    /// Fails with `NotAMember` when the actor holds no active membership for
    /// `tenant_id`; the previous active tenant is kept in that case.
    /// Otherwise the tenant's grants are re-fetched before switching.
    pub async fn set_active_tenant(&self, tenant_id: &TenantId) -> Result<TenantContext> {
        let mut record = self.find_membership(tenant_id);
        if record.is_none() {
            // The membership may be newer than the last listing
            let memberships = self.list_memberships().await?;
            record = memberships
                .iter()
                .find(|m| &m.tenant_id == tenant_id && m.is_active)
                .cloned();
            self.state.write().memberships = memberships;
        }

        let Some(record) = record else {
            warn!("Actor={} is not a member of tenant={}", self.actor_id, tenant_id);
            return Err(AuthzError::NotAMember {
                tenant_id: tenant_id.clone(),
            });
        };

        let key = CacheKey::new(self.actor_id.clone(), tenant_id.clone());
        let permission_count = self
            .cache
            .refresh(&key)
            .await
            .map(|s| s.permission_count())
            .unwrap_or_default();

        let context = TenantContext {
            tenant: record.tenant(),
            membership: record.membership(&self.actor_id),
            permission_count,
        };
        info!("Actor={} switched active tenant to {}", self.actor_id, tenant_id);
        self.set_active(Some(context.clone()));
        Ok(context)
    }

    /// Forget memberships and the active tenant (logout)
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.memberships.clear();
        state.active = None;
        state.provisional = None;
    }

    async fn list_memberships(&self) -> Result<Vec<MembershipRecord>> {
        self.cache.client().memberships(&self.actor_id).await.map_err(|err| {
            warn!("Membership listing failed for actor={}: {}", self.actor_id, err);
            if matches!(err, AuthzError::AuthExpired) {
                self.cache.expire_session(&self.actor_id);
            }
            err
        })
    }

    async fn load_branch(&self, record: &MembershipRecord) -> TenantSummary {
        let key = CacheKey::new(self.actor_id.clone(), record.tenant_id.clone());
        let (permission_count, load_failed) =
            match timeout(self.config.branch_timeout, self.cache.load(&key)).await {
                Ok(Some(snapshot)) if snapshot.origin != SnapshotOrigin::Degraded => {
                    (snapshot.permission_count(), false)
                }
                Ok(_) => (0, true),
                Err(_) => {
                    warn!(
                        "Grant load for {} exceeded {:?}, counting zero grants",
                        key, self.config.branch_timeout
                    );
                    (0, true)
                }
            };
        debug!("Tenant {} resolved with {} grants", key, permission_count);

        TenantSummary {
            tenant: record.tenant(),
            membership: record.membership(&self.actor_id),
            permission_count,
            load_failed,
        }
    }

    fn find_membership(&self, tenant_id: &TenantId) -> Option<MembershipRecord> {
        self.state
            .read()
            .memberships
            .iter()
            .find(|m| &m.tenant_id == tenant_id && m.is_active)
            .cloned()
    }

    fn previous_active_id(&self) -> Option<TenantId> {
        let in_memory = self.state.read().active.as_ref().map(|c| c.tenant.id.clone());
        in_memory.or_else(|| self.cache.persisted_active_tenant(&self.actor_id))
    }

    fn install(&self, memberships: Vec<MembershipRecord>, active: Option<TenantContext>) {
        self.state.write().memberships = memberships;
        self.set_active(active);
    }

    fn set_active(&self, active: Option<TenantContext>) {
        let changed = {
            let mut state = self.state.write();
            let changed = state.active.as_ref().map(|c| &c.tenant.id) != active.as_ref().map(|c| &c.tenant.id);
            state.active = active.clone();
            changed
        };

        let Some(context) = active else {
            return;
        };
        self.cache.persist_active_tenant(&self.actor_id, &context.tenant.id);
        if changed {
            self.hub.publish(&ChangeEvent {
                actor_id: self.actor_id.clone(),
                tenant_id: context.tenant.id.clone(),
                kind: ChangeKind::ActiveTenantChanged,
                version: 0,
            });
        }
    }
}

/// Index of the tenant to activate and the rule that chose it
fn select_active(tenants: &[TenantSummary], previous: Option<&TenantId>) -> Option<(usize, SelectionReason)> {
    if tenants.is_empty() {
        return None;
    }

    if let Some(previous) = previous {
        if let Some(index) = tenants.iter().position(|t| &t.tenant.id == previous) {
            return Some((index, SelectionReason::Previous));
        }
    }

    let mut best = 0;
    for (index, summary) in tenants.iter().enumerate().skip(1) {
        if summary.permission_count > tenants[best].permission_count {
            best = index;
        }
    }

    if tenants[best].permission_count > 0 {
        Some((best, SelectionReason::MostPermissions))
    } else {
        Some((0, SelectionReason::First))
    }
}
