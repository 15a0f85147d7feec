//! # TenantGate Core
//!
//! Shared domain model, collaborator traits, and error handling for the
//! TenantGate authorization engine. Kept separate from the engine so that
//! Grant Store implementations only depend on the types they exchange.

pub mod types;
pub mod traits;
pub mod error;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use types::{
    Actor, ActorId, Capability, CapabilityDescriptor, Grant, GrantId, GrantRequest,
    MatchMode, MembershipRecord, PermissionCode, Requirement, RevokeRequest, Role,
    Tenant, TenantId, TenantMembership,
};
pub use traits::{GrantStore, SessionTerminator};
