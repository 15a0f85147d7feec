//! Domain model types

pub mod ids;
pub mod role;
pub mod permission;
pub mod capability;
pub mod tenant;
pub mod grant;

pub use ids::{ActorId, GrantId, TenantId};
pub use role::Role;
pub use permission::{Permission, PermissionCategory, PermissionCode, DEFAULT_PERMISSIONS};
pub use capability::{
    ActionKind, Capability, CapabilityDescriptor, Feature, MatchMode, Requirement, Screen,
};
pub use tenant::{Actor, MembershipRecord, Tenant, TenantMembership};
pub use grant::{effective_codes, Grant, GrantRequest, RevokeRequest};
