//! Role Registry
//!
//! Static capability tables per role, independent of any tenant. The tables
//! are exhaustive matches over [`Role`]; there is no fallthrough arm, so a new
//! role cannot silently inherit someone else's capabilities.

use tenantgate_core::types::{ActionKind, Capability, Feature, Screen};
use tenantgate_core::{Actor, Role, Tenant};

/// Screens, actions, and features a role always has
#[derive(Debug, Clone, Copy)]
pub struct RoleCapabilities {
    pub screens: &'static [Screen],
    pub actions: &'static [ActionKind],
    pub features: &'static [Feature],
}

impl RoleCapabilities {
    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Screen(screen) => self.screens.contains(&screen),
            Capability::Action(action) => self.actions.contains(&action),
            Capability::Feature(feature) => self.features.contains(&feature),
        }
    }
}

const ALL_SCREENS: &[Screen] = &[
    Screen::Dashboard,
    Screen::Appointments,
    Screen::MySchedule,
    Screen::Clients,
    Screen::Services,
    Screen::Sales,
    Screen::Inventory,
    Screen::Staff,
    Screen::Reports,
    Screen::Settings,
    Screen::Profile,
    Screen::AdminConsole,
];

const ALL_ACTIONS: &[ActionKind] = &[
    ActionKind::CreateAppointment,
    ActionKind::CancelAppointment,
    ActionKind::ProcessSale,
    ActionKind::IssueRefund,
    ActionKind::EditService,
    ActionKind::AdjustInventory,
    ActionKind::InviteStaff,
    ActionKind::GrantPermissions,
    ActionKind::EditSettings,
];

const ALL_FEATURES: &[Feature] = &[
    Feature::Analytics,
    Feature::Marketing,
    Feature::TenantSwitcher,
    Feature::Notifications,
];

const OWNER: RoleCapabilities = RoleCapabilities {
    screens: &[
        Screen::Dashboard,
        Screen::Appointments,
        Screen::MySchedule,
        Screen::Clients,
        Screen::Services,
        Screen::Sales,
        Screen::Inventory,
        Screen::Staff,
        Screen::Reports,
        Screen::Settings,
        Screen::Profile,
    ],
    actions: ALL_ACTIONS,
    features: ALL_FEATURES,
};

const MANAGER: RoleCapabilities = RoleCapabilities {
    screens: &[
        Screen::Dashboard,
        Screen::Appointments,
        Screen::MySchedule,
        Screen::Clients,
        Screen::Services,
        Screen::Sales,
        Screen::Inventory,
        Screen::Staff,
        Screen::Reports,
        Screen::Profile,
    ],
    actions: &[
        ActionKind::CreateAppointment,
        ActionKind::CancelAppointment,
        ActionKind::ProcessSale,
        ActionKind::EditService,
        ActionKind::AdjustInventory,
    ],
    features: &[Feature::Analytics, Feature::TenantSwitcher, Feature::Notifications],
};

const EMPLOYEE: RoleCapabilities = RoleCapabilities {
    screens: &[
        Screen::Dashboard,
        Screen::Appointments,
        Screen::MySchedule,
        Screen::Clients,
        Screen::Profile,
    ],
    actions: &[ActionKind::CreateAppointment],
    features: &[Feature::TenantSwitcher, Feature::Notifications],
};

const CUSTOMER: RoleCapabilities = RoleCapabilities {
    screens: &[Screen::Dashboard, Screen::Appointments, Screen::Profile],
    actions: &[ActionKind::CreateAppointment],
    features: &[Feature::Notifications],
};

const ADMIN: RoleCapabilities = RoleCapabilities {
    screens: ALL_SCREENS,
    actions: ALL_ACTIONS,
    features: ALL_FEATURES,
};

/// Static role → capability table
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleRegistry;

impl RoleRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Capability table for a role
    pub fn capabilities(&self, role: Role) -> RoleCapabilities {
        match role {
            Role::SuperAdmin | Role::Admin => ADMIN,
            Role::Owner => OWNER,
            Role::Manager => MANAGER,
            Role::Employee => EMPLOYEE,
            Role::Customer => CUSTOMER,
        }
    }

    /// Whether the role alone allows the capability.
    ///
    /// `SuperAdmin` is allowed everything, including capabilities added to
    /// the catalog later and not yet listed in any table.
    pub fn allowed_by_role(&self, role: Role, capability: Capability) -> bool {
        if role == Role::SuperAdmin {
            return true;
        }
        self.capabilities(role).contains(capability)
    }

    /// Global admin tiers bypassing grant checks
    pub fn is_elevated_admin(&self, role: Role) -> bool {
        role.is_elevated_admin()
    }

    /// Owner role and recorded as the tenant's owner
    pub fn is_owner_of(&self, actor: &Actor, tenant: &Tenant) -> bool {
        actor.role == Role::Owner && tenant.owner_id.as_ref() == Some(&actor.id)
    }

    /// Whether the actor skips grant checks for this tenant
    pub fn bypasses_grants(&self, actor: &Actor, tenant: &Tenant) -> bool {
        self.is_elevated_admin(actor.role) || self.is_owner_of(actor, tenant)
    }
}
