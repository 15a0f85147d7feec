//! Grant Store Client
//!
//! Thin client over the remote [`GrantStore`]. Every call gets a bounded
//! timeout and transient failures are retried with exponential backoff.
//! Mutation requests are validated before any I/O so a malformed request
//! fails immediately and synchronously for the caller.

use crate::error::{AuthzError, Result};
use crate::roles::RoleRegistry;
use rand::Rng;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tenantgate_core::error::Result as CoreResult;
use tenantgate_core::types::effective_codes;
use tenantgate_core::{
    Actor, ActorId, Grant, GrantRequest, GrantStore, MembershipRecord, PermissionCode,
    RevokeRequest, Tenant, TenantId,
};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Retry behavior for transient Grant Store failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single backoff
    pub max_backoff: Duration,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);
        if self.add_jitter && backoff_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4);
            duration += Duration::from_millis(jitter);
        }
        duration
    }
}

/// Grant Store Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time budget for a single attempt
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

/// Client for the remote Grant Store
#[derive(Clone)]
pub struct GrantStoreClient {
    store: Arc<dyn GrantStore>,
    config: ClientConfig,
    registry: RoleRegistry,
}

impl GrantStoreClient {
    pub fn new(store: Arc<dyn GrantStore>, config: ClientConfig) -> Self {
        Self {
            store,
            config,
            registry: RoleRegistry::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Effective permission codes an actor holds in a tenant
    pub async fn fetch_effective_codes(
        &self,
        tenant_id: &TenantId,
        actor_id: &ActorId,
    ) -> Result<BTreeSet<PermissionCode>> {
        let grants = self
            .call("grants", || self.store.grants(tenant_id, actor_id))
            .await?;
        let codes = effective_codes(&grants, tenant_id, actor_id);
        debug!(
            "Fetched {} grant records ({} effective) for actor={} tenant={}",
            grants.len(),
            codes.len(),
            actor_id,
            tenant_id
        );
        Ok(codes)
    }

    /// Memberships of an actor, in the order the store returns them
    pub async fn memberships(&self, actor_id: &ActorId) -> Result<Vec<MembershipRecord>> {
        self.call("tenant_memberships", || self.store.tenant_memberships(actor_id))
            .await
    }

    /// Grant codes to `target` in `tenant`, on behalf of `granter`
    pub async fn grant(
        &self,
        granter: &Actor,
        tenant: &Tenant,
        target: &ActorId,
        codes: &[PermissionCode],
        notes: Option<String>,
    ) -> Result<Vec<Grant>> {
        self.validate_mutation(granter, tenant, target, codes)?;

        let request = GrantRequest {
            tenant_id: tenant.id.clone(),
            actor_id: target.clone(),
            permission_codes: codes.to_vec(),
            granted_by: granter.id.clone(),
            notes,
        };
        self.call("grant", || self.store.grant(request.clone())).await
    }

    /// Revoke codes from `target` in `tenant`, on behalf of `revoker`
    pub async fn revoke(
        &self,
        revoker: &Actor,
        tenant: &Tenant,
        target: &ActorId,
        codes: &[PermissionCode],
        reason: Option<String>,
    ) -> Result<()> {
        self.validate_mutation(revoker, tenant, target, codes)?;

        let request = RevokeRequest {
            tenant_id: tenant.id.clone(),
            actor_id: target.clone(),
            permission_codes: codes.to_vec(),
            revoked_by: revoker.id.clone(),
            reason,
        };
        self.call("revoke", || self.store.revoke(request.clone())).await
    }

    /// Reject malformed or unauthorized mutation requests.
    ///
    /// Default capabilities are implicit and never stored as grants.
    pub fn validate_mutation(
        &self,
        caller: &Actor,
        tenant: &Tenant,
        target: &ActorId,
        codes: &[PermissionCode],
    ) -> Result<()> {
        if tenant.id.is_blank() {
            return Err(AuthzError::Validation("tenant id must not be empty".into()));
        }
        if target.is_blank() {
            return Err(AuthzError::Validation("target actor id must not be empty".into()));
        }
        if codes.is_empty() {
            return Err(AuthzError::Validation("at least one permission code is required".into()));
        }

        let mut seen = HashSet::with_capacity(codes.len());
        for code in codes {
            if !seen.insert(*code) {
                return Err(AuthzError::Validation(format!("duplicate permission code {code}")));
            }
            if code.is_default() {
                return Err(AuthzError::Validation(format!(
                    "{code} is a default capability and cannot be granted or revoked"
                )));
            }
        }

        if !self.registry.bypasses_grants(caller, tenant) {
            return Err(AuthzError::Validation(format!(
                "actor {} may not manage permissions in tenant {}",
                caller.id, tenant.id
            )));
        }

        Ok(())
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            let outcome = match timeout(self.config.request_timeout, f()).await {
                Ok(result) => result.map_err(AuthzError::from),
                Err(_) => Err(AuthzError::Timeout),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < retry.max_retries => {
                    let backoff = retry.backoff_duration(attempt);
                    attempt += 1;
                    warn!(
                        "Grant store {} failed ({}), retry {}/{} in {:?}",
                        operation, err, attempt, retry.max_retries, backoff
                    );
                    sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGrantStore;
    use tenantgate_core::Role;

    fn client() -> GrantStoreClient {
        GrantStoreClient::new(Arc::new(InMemoryGrantStore::new()), ClientConfig::default())
    }

    fn salon() -> Tenant {
        Tenant::new("salon-1", "Downtown").owned_by("owner-1")
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            add_jitter: false,
            ..Default::default()
        };
        assert_eq!(retry.backoff_duration(0), Duration::from_millis(200));
        assert_eq!(retry.backoff_duration(1), Duration::from_millis(400));
        assert_eq!(retry.backoff_duration(10), Duration::from_secs(2));
    }

    #[test]
    fn test_validation_rules() {
        let client = client();
        let owner = Actor::new("owner-1", Role::Owner);
        let target = ActorId::from("emp-1");

        assert!(client
            .validate_mutation(&owner, &salon(), &target, &[PermissionCode::ViewClients])
            .is_ok());
        assert!(matches!(
            client.validate_mutation(&owner, &salon(), &target, &[]),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            client.validate_mutation(
                &owner,
                &salon(),
                &target,
                &[PermissionCode::ViewClients, PermissionCode::ViewClients]
            ),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            client.validate_mutation(&owner, &salon(), &target, &[PermissionCode::ViewOwnSchedule]),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            client.validate_mutation(&owner, &salon(), &ActorId::from(""), &[PermissionCode::ViewClients]),
            Err(AuthzError::Validation(_))
        ));
    }

    #[test]
    fn test_only_owner_or_admin_may_mutate() {
        let client = client();
        let target = ActorId::from("emp-1");
        let codes = [PermissionCode::ViewReports];

        let manager = Actor::new("mgr-1", Role::Manager);
        assert!(client.validate_mutation(&manager, &salon(), &target, &codes).is_err());

        let foreign_owner = Actor::new("owner-2", Role::Owner);
        assert!(client.validate_mutation(&foreign_owner, &salon(), &target, &codes).is_err());

        let admin = Actor::new("admin-1", Role::Admin);
        assert!(client.validate_mutation(&admin, &salon(), &target, &codes).is_ok());
    }
}
