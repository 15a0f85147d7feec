//! Grant records and mutation requests

use super::ids::{ActorId, GrantId, TenantId};
use super::permission::PermissionCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A permission given to an actor within a tenant.
///
/// Grants are never deleted. Revocation stamps `revoked_at`/`revoked_by` and
/// clears `is_active`, so the record stays as audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: GrantId,
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    pub permission_code: PermissionCode,
    pub granted_by: ActorId,
    pub granted_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_by: Option<ActorId>,
    pub is_active: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Grant {
    /// Create a fresh, effective grant
    pub fn issue(
        tenant_id: TenantId,
        actor_id: ActorId,
        permission_code: PermissionCode,
        granted_by: ActorId,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: GrantId::new(Uuid::new_v4().to_string()),
            tenant_id,
            actor_id,
            permission_code,
            granted_by,
            granted_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
            is_active: true,
            notes,
        }
    }

    /// A grant counts only while active and not revoked
    pub fn is_effective(&self) -> bool {
        self.is_active && self.revoked_at.is_none()
    }

    /// Soft-delete this grant
    pub fn revoke(&mut self, revoked_by: ActorId, reason: Option<&str>) {
        self.is_active = false;
        self.revoked_at = Some(Utc::now());
        self.revoked_by = Some(revoked_by);
        if let Some(reason) = reason {
            self.notes = Some(match self.notes.take() {
                Some(existing) => format!("{existing}; revoked: {reason}"),
                None => format!("revoked: {reason}"),
            });
        }
    }
}

/// Reduce a grant listing to the codes an actor effectively holds in a tenant
pub fn effective_codes<'a>(
    grants: impl IntoIterator<Item = &'a Grant>,
    tenant_id: &TenantId,
    actor_id: &ActorId,
) -> BTreeSet<PermissionCode> {
    grants
        .into_iter()
        .filter(|g| g.is_effective() && &g.tenant_id == tenant_id && &g.actor_id == actor_id)
        .map(|g| g.permission_code)
        .collect()
}

/// Request to grant one or more codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    pub permission_codes: Vec<PermissionCode>,
    pub granted_by: ActorId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request to revoke one or more codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    pub permission_codes: Vec<PermissionCode>,
    pub revoked_by: ActorId,
    #[serde(default)]
    pub reason: Option<String>,
}
