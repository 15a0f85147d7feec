//! Capabilities and the permission requirements that gate them

use super::permission::PermissionCode;
use serde::{Deserialize, Serialize};

/// Screens of the client application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Dashboard,
    Appointments,
    MySchedule,
    Clients,
    Services,
    Sales,
    Inventory,
    Staff,
    Reports,
    Settings,
    Profile,
    AdminConsole,
}

/// Discrete actions a screen may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateAppointment,
    CancelAppointment,
    ProcessSale,
    IssueRefund,
    EditService,
    AdjustInventory,
    InviteStaff,
    GrantPermissions,
    EditSettings,
}

/// Product features that can be toggled per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Analytics,
    Marketing,
    TenantSwitcher,
    Notifications,
}

/// Something being gated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Capability {
    Screen(Screen),
    Action(ActionKind),
    Feature(Feature),
}

/// How a permission set is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchMode {
    /// At least one code held
    Any,
    /// Every code held
    All,
}

/// Permission requirement attached to a capability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// No permission needed
    Public,
    /// Exactly one code needed
    Single { code: PermissionCode },
    /// A set of codes matched with a mode
    Set {
        codes: Vec<PermissionCode>,
        mode: MatchMode,
    },
}

impl Requirement {
    pub fn any(codes: impl IntoIterator<Item = PermissionCode>) -> Self {
        Requirement::Set {
            codes: codes.into_iter().collect(),
            mode: MatchMode::Any,
        }
    }

    pub fn all(codes: impl IntoIterator<Item = PermissionCode>) -> Self {
        Requirement::Set {
            codes: codes.into_iter().collect(),
            mode: MatchMode::All,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Requirement::Public)
    }

    /// Test the requirement against a membership predicate.
    ///
    /// An empty `Any` set is never satisfied and an empty `All` set always is,
    /// matching `Iterator::any` / `Iterator::all`.
    pub fn is_satisfied_by(&self, holds: impl Fn(PermissionCode) -> bool) -> bool {
        match self {
            Requirement::Public => true,
            Requirement::Single { code } => holds(*code),
            Requirement::Set { codes, mode: MatchMode::Any } => codes.iter().any(|c| holds(*c)),
            Requirement::Set { codes, mode: MatchMode::All } => codes.iter().all(|c| holds(*c)),
        }
    }
}

/// A capability together with the permission requirement that gates it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub capability: Capability,
    pub requirement: Requirement,
}

impl CapabilityDescriptor {
    pub fn public(capability: Capability) -> Self {
        Self {
            capability,
            requirement: Requirement::Public,
        }
    }

    pub fn requiring(capability: Capability, code: PermissionCode) -> Self {
        Self {
            capability,
            requirement: Requirement::Single { code },
        }
    }

    pub fn requiring_any(
        capability: Capability,
        codes: impl IntoIterator<Item = PermissionCode>,
    ) -> Self {
        Self {
            capability,
            requirement: Requirement::any(codes),
        }
    }

    pub fn requiring_all(
        capability: Capability,
        codes: impl IntoIterator<Item = PermissionCode>,
    ) -> Self {
        Self {
            capability,
            requirement: Requirement::all(codes),
        }
    }
}
