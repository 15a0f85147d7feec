//! In-memory Grant Store
//!
//! Reference implementation of [`GrantStore`] used by tests, benchmarks, and
//! the probe binary. It keeps the same invariants as the remote store: grants
//! are soft-deleted, and at most one effective grant exists per
//! (actor, tenant, code).

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tenantgate_core::error::{CoreError, Result as CoreResult};
use tenantgate_core::{
    ActorId, Grant, GrantRequest, GrantStore, MembershipRecord, RevokeRequest, TenantId,
};
use tokio::sync::RwLock;

/// Seed data for an [`InMemoryGrantStore`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFixture {
    #[serde(default)]
    pub memberships: HashMap<ActorId, Vec<MembershipRecord>>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

/// In-memory Grant Store implementation
#[derive(Clone, Default)]
pub struct InMemoryGrantStore {
    grants: Arc<RwLock<Vec<Grant>>>,
    memberships: Arc<RwLock<HashMap<ActorId, Vec<MembershipRecord>>>>,
    grant_fetches: Arc<AtomicUsize>,
    membership_fetches: Arc<AtomicUsize>,
}

impl InMemoryGrantStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a fixture
    pub fn from_fixture(fixture: StoreFixture) -> Self {
        Self {
            grants: Arc::new(RwLock::new(fixture.grants)),
            memberships: Arc::new(RwLock::new(fixture.memberships)),
            ..Self::default()
        }
    }

    /// Register a membership row for an actor
    pub async fn add_membership(&self, actor_id: impl Into<ActorId>, record: MembershipRecord) {
        let mut memberships = self.memberships.write().await;
        memberships.entry(actor_id.into()).or_default().push(record);
    }

    /// Number of `grants` calls served
    pub fn grant_fetches(&self) -> usize {
        self.grant_fetches.load(Ordering::SeqCst)
    }

    /// Number of `tenant_memberships` calls served
    pub fn membership_fetches(&self) -> usize {
        self.membership_fetches.load(Ordering::SeqCst)
    }

    /// Every record, including revoked ones, for audit inspection
    pub async fn audit_trail(&self, tenant_id: &TenantId, actor_id: &ActorId) -> Vec<Grant> {
        let grants = self.grants.read().await;
        grants
            .iter()
            .filter(|g| &g.tenant_id == tenant_id && &g.actor_id == actor_id)
            .cloned()
            .collect()
    }

    async fn is_member(&self, tenant_id: &TenantId, actor_id: &ActorId) -> bool {
        let memberships = self.memberships.read().await;
        memberships
            .get(actor_id)
            .map(|rows| rows.iter().any(|m| &m.tenant_id == tenant_id && m.is_active))
            .unwrap_or(false)
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn grants(&self, tenant_id: &TenantId, actor_id: &ActorId) -> CoreResult<Vec<Grant>> {
        self.grant_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.audit_trail(tenant_id, actor_id).await)
    }

    async fn grant(&self, request: GrantRequest) -> CoreResult<Vec<Grant>> {
        if !self.is_member(&request.tenant_id, &request.actor_id).await {
            return Err(CoreError::NotAMember(request.tenant_id.to_string()));
        }

        let mut grants = self.grants.write().await;
        let mut result = Vec::with_capacity(request.permission_codes.len());

        for code in &request.permission_codes {
            let existing = grants.iter().find(|g| {
                g.is_effective()
                    && g.tenant_id == request.tenant_id
                    && g.actor_id == request.actor_id
                    && g.permission_code == *code
            });

            match existing {
                Some(grant) => result.push(grant.clone()),
                None => {
                    let grant = Grant::issue(
                        request.tenant_id.clone(),
                        request.actor_id.clone(),
                        *code,
                        request.granted_by.clone(),
                        request.notes.clone(),
                    );
                    grants.push(grant.clone());
                    result.push(grant);
                }
            }
        }

        Ok(result)
    }

    async fn revoke(&self, request: RevokeRequest) -> CoreResult<()> {
        let mut grants = self.grants.write().await;
        for grant in grants.iter_mut().filter(|g| {
            g.is_effective()
                && g.tenant_id == request.tenant_id
                && g.actor_id == request.actor_id
                && request.permission_codes.contains(&g.permission_code)
        }) {
            grant.revoke(request.revoked_by.clone(), request.reason.as_deref());
        }
        Ok(())
    }

    async fn tenant_memberships(&self, actor_id: &ActorId) -> CoreResult<Vec<MembershipRecord>> {
        self.membership_fetches.fetch_add(1, Ordering::SeqCst);
        let memberships = self.memberships.read().await;
        Ok(memberships.get(actor_id).cloned().unwrap_or_default())
    }
}
