//! Actor roles and their hierarchy

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse role of an actor
///
/// Roles form a partial hierarchy: the admin tiers are global, `Owner` only
/// carries weight inside the tenants the actor owns, and the remaining roles
/// are plain members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator, allowed everything
    SuperAdmin,
    /// Elevated administrator
    Admin,
    /// Owner of one or more tenants
    Owner,
    /// Tenant manager
    Manager,
    /// Staff member
    Employee,
    /// End customer
    Customer,
}

impl Role {
    /// Every role, highest rank first
    pub const ALL: [Role; 6] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Owner,
        Role::Manager,
        Role::Employee,
        Role::Customer,
    ];

    /// Position in the hierarchy (higher outranks lower)
    pub fn rank(self) -> u8 {
        match self {
            Role::SuperAdmin => 100,
            Role::Admin => 80,
            Role::Owner => 60,
            Role::Manager => 40,
            Role::Employee => 20,
            Role::Customer => 10,
        }
    }

    /// Whether this role strictly outranks `other`
    pub fn outranks(self, other: Role) -> bool {
        self.rank() > other.rank()
    }

    /// Global administrator tiers that bypass grant checks everywhere
    pub fn is_elevated_admin(self) -> bool {
        match self {
            Role::SuperAdmin | Role::Admin => true,
            Role::Owner | Role::Manager | Role::Employee | Role::Customer => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Employee => "employee",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| CoreError::UnknownRole(s.to_string()))
    }
}
