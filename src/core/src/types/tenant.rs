//! Actors, tenants, and memberships

use super::ids::{ActorId, TenantId};
use super::role::Role;
use serde::{Deserialize, Serialize};

/// Authenticated subject
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

/// Business unit an actor can be a member of
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Actor owning the tenant, when the Grant Store reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<ActorId>,
}

impl Tenant {
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: None,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<ActorId>) -> Self {
        self.owner_id = Some(owner.into());
        self
    }
}

/// Membership of an actor in a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMembership {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    /// Identifier of the member inside the tenant (e.g. the staff record)
    pub local_membership_id: String,
    pub is_active: bool,
}

/// Row returned by the Grant Store membership listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub local_membership_id: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<ActorId>,
}

impl MembershipRecord {
    pub fn tenant(&self) -> Tenant {
        Tenant {
            id: self.tenant_id.clone(),
            name: self.tenant_name.clone(),
            owner_id: self.owner_id.clone(),
        }
    }

    pub fn membership(&self, actor_id: &ActorId) -> TenantMembership {
        TenantMembership {
            actor_id: actor_id.clone(),
            tenant_id: self.tenant_id.clone(),
            local_membership_id: self.local_membership_id.clone(),
            is_active: self.is_active,
        }
    }
}
