//! Grant Store trait
//!
//! The Grant Store is the remote system of record for memberships and
//! grants. Implementations classify failures as [`CoreError`] variants so
//! the engine can tell transient outages from an expired session.
//!
//! [`CoreError`]: crate::error::CoreError

use crate::error::Result;
use crate::types::{ActorId, Grant, GrantRequest, MembershipRecord, RevokeRequest, TenantId};
use async_trait::async_trait;

/// Remote store of tenant memberships and per-tenant grants
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// List every grant record (effective or not) for an actor in a tenant
    async fn grants(&self, tenant_id: &TenantId, actor_id: &ActorId) -> Result<Vec<Grant>>;

    /// Grant codes, returning the effective grant for each requested code
    async fn grant(&self, request: GrantRequest) -> Result<Vec<Grant>>;

    /// Revoke codes; revoking a code without an effective grant is a no-op
    async fn revoke(&self, request: RevokeRequest) -> Result<()>;

    /// List the tenants the actor belongs to
    async fn tenant_memberships(&self, actor_id: &ActorId) -> Result<Vec<MembershipRecord>>;
}
