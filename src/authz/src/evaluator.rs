//! Permission Evaluator
//!
//! Combines the Role Registry with the Authorization Cache to answer
//! allow/deny for a capability descriptor.
//!
//! # Pipeline
//!
//! 1. Owner of the tenant or elevated admin → allow
//! 2. Read the cached snapshot; if missing or stale, start a background
//!    refresh without waiting for it
//! 3. Public capability → allow
//! 4. No snapshot yet → pending (never reported as a denial)
//! 5. Match the requirement against granted codes plus defaults
//! 6. No match → deny
//!
//! Evaluation never suspends and never fails.

use crate::cache::{AuthorizationCache, CacheKey, CachedAuthorizationState, SnapshotOrigin};
use crate::roles::RoleRegistry;
use serde::Serialize;
use std::fmt;
use tenantgate_core::{Actor, Capability, CapabilityDescriptor, Requirement, Role, Tenant, TenantId};
use tracing::debug;

/// Why a capability was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The tenant snapshot lacks the required permission(s)
    MissingPermission,
    /// No tenant context and the role table does not list the capability
    RoleNotPermitted,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::MissingPermission => "missing_permission",
            DenyReason::RoleNotPermitted => "role_not_permitted",
        }
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
    /// The first fetch for the key is still outstanding
    Pending,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_denied(self) -> bool {
        matches!(self, Decision::Deny(_))
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Decision::Pending)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("ALLOW"),
            Decision::Deny(reason) => write!(f, "DENY({})", reason.as_str()),
            Decision::Pending => f.write_str("PENDING"),
        }
    }
}

/// Decide a requirement against a snapshot.
///
/// Pure and deterministic: the same requirement and snapshot always give the
/// same decision. Default capabilities count as held unless the snapshot is
/// a degraded (zero-permission) one.
pub fn decide(requirement: &Requirement, snapshot: Option<&CachedAuthorizationState>) -> Decision {
    if requirement.is_public() {
        return Decision::Allow;
    }
    let Some(snapshot) = snapshot else {
        return Decision::Pending;
    };

    let defaults_apply = snapshot.origin != SnapshotOrigin::Degraded;
    let satisfied =
        requirement.is_satisfied_by(|code| snapshot.holds(code) || (defaults_apply && code.is_default()));

    if satisfied {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::MissingPermission)
    }
}

/// Permission Evaluator
#[derive(Clone)]
pub struct PermissionEvaluator {
    registry: RoleRegistry,
    cache: AuthorizationCache,
}

impl PermissionEvaluator {
    pub fn new(cache: AuthorizationCache) -> Self {
        Self {
            registry: RoleRegistry::new(),
            cache,
        }
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    /// Evaluate a descriptor for an actor, optionally inside a tenant.
    ///
    /// Without a tenant the Role Registry answers alone.
    pub fn evaluate(
        &self,
        actor: &Actor,
        tenant: Option<&Tenant>,
        descriptor: &CapabilityDescriptor,
    ) -> Decision {
        let Some(tenant) = tenant else {
            return self.evaluate_role(actor.role, descriptor.capability);
        };

        if self.registry.bypasses_grants(actor, tenant) {
            return Decision::Allow;
        }

        let key = CacheKey::new(actor.id.clone(), tenant.id.clone());
        let lookup = self.cache.lookup_and_revalidate(&key);
        let decision = decide(&descriptor.requirement, lookup.snapshot().map(|s| s.as_ref()));

        debug!(
            "evaluate actor={} tenant={} capability={:?} -> {}",
            actor.id, tenant.id, descriptor.capability, decision
        );
        decision
    }

    /// Evaluate while tenant resolution is still running.
    ///
    /// With a provisional tenant the restored snapshot answers allows, but a
    /// denial is held back as pending: the snapshot is from an earlier
    /// session and the tenant's ownership is not known yet. Without one,
    /// only public capabilities and elevated admins are decided.
    pub fn evaluate_unresolved(
        &self,
        actor: &Actor,
        provisional: Option<&TenantId>,
        descriptor: &CapabilityDescriptor,
    ) -> Decision {
        if self.registry.is_elevated_admin(actor.role) {
            return Decision::Allow;
        }

        let snapshot = provisional.and_then(|tenant_id| {
            self.cache
                .snapshot(&CacheKey::new(actor.id.clone(), tenant_id.clone()))
        });
        match decide(&descriptor.requirement, snapshot.as_deref()) {
            Decision::Deny(_) => Decision::Pending,
            decision => decision,
        }
    }

    /// Role-only path used when no tenant context exists
    pub fn evaluate_role(&self, role: Role, capability: Capability) -> Decision {
        if self.registry.allowed_by_role(role, capability) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::RoleNotPermitted)
        }
    }
}
