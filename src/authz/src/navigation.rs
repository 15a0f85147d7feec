//! Navigation Filter
//!
//! Turns a declarative, ordered list of capability-gated entries into the
//! visible navigation surface: filter by decision, keep declared order, then
//! cap the count by a fixed priority.

use crate::cache::CachedAuthorizationState;
use crate::evaluator::{decide, Decision};
use crate::roles::RoleRegistry;
use serde::Serialize;
use tenantgate_core::types::Screen;
use tenantgate_core::{Capability, PermissionCode, Requirement, Role};

/// Gate on a navigation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "codes", rename_all = "snake_case")]
pub enum NavGate {
    Unconditional,
    /// Visible when any of the codes is held
    AnyOf(Vec<PermissionCode>),
}

/// One navigation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub id: String,
    pub label: String,
    pub screen: Screen,
    pub gate: NavGate,
    /// Lower keeps the entry longer when the cap is exceeded
    pub priority: u8,
}

impl NavEntry {
    pub fn new(id: &str, label: &str, screen: Screen, priority: u8) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            screen,
            gate: NavGate::Unconditional,
            priority,
        }
    }

    pub fn requires_any(mut self, codes: impl IntoIterator<Item = PermissionCode>) -> Self {
        self.gate = NavGate::AnyOf(codes.into_iter().collect());
        self
    }

    pub fn requirement(&self) -> Requirement {
        match &self.gate {
            NavGate::Unconditional => Requirement::Public,
            NavGate::AnyOf(codes) => Requirement::any(codes.iter().copied()),
        }
    }
}

/// Which declared layout a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    Owner,
    Staff,
    Customer,
}

/// Opt-in rule that shows the owner layout to heavily-permissioned staff.
///
/// Off by default. Entries in the owner layout stay gated by grants.
#[derive(Debug, Clone)]
pub struct OwnerLayoutPolicy {
    pub enabled: bool,
    /// Explicit grant count that switches to the owner layout
    pub min_permissions: usize,
    /// Any of these codes switches to the owner layout
    pub trigger_codes: Vec<PermissionCode>,
}

impl Default for OwnerLayoutPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_permissions: 5,
            trigger_codes: vec![PermissionCode::ManageStaff, PermissionCode::ManagePermissions],
        }
    }
}

impl OwnerLayoutPolicy {
    fn elevates(&self, snapshot: Option<&CachedAuthorizationState>) -> bool {
        if !self.enabled {
            return false;
        }
        snapshot.is_some_and(|s| {
            s.permission_count() >= self.min_permissions
                || self.trigger_codes.iter().any(|code| s.holds(*code))
        })
    }
}

/// Navigation configuration
#[derive(Debug, Clone)]
pub struct NavigationConfig {
    /// Hard cap on visible entries
    pub max_visible: usize,
    pub owner_layout: OwnerLayoutPolicy,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_visible: 5,
            owner_layout: OwnerLayoutPolicy::default(),
        }
    }
}

/// How tenant-scoped access is decided for an entry
#[derive(Debug, Clone, Copy)]
pub enum TenantAccess<'a> {
    /// No active tenant: the Role Registry decides
    NoTenant,
    /// Owner of the tenant or elevated admin: everything is allowed
    Bypass,
    /// Grants decide; `None` while the first fetch is outstanding
    Snapshot(Option<&'a CachedAuthorizationState>),
}

/// Navigation Filter
#[derive(Debug, Clone)]
pub struct NavigationFilter {
    config: NavigationConfig,
    owner: Vec<NavEntry>,
    staff: Vec<NavEntry>,
    customer: Vec<NavEntry>,
}

impl NavigationFilter {
    /// Filter with the built-in layouts
    pub fn new(config: NavigationConfig) -> Self {
        Self::with_layouts(config, owner_layout(), staff_layout(), customer_layout())
    }

    pub fn with_layouts(
        config: NavigationConfig,
        owner: Vec<NavEntry>,
        staff: Vec<NavEntry>,
        customer: Vec<NavEntry>,
    ) -> Self {
        Self {
            config,
            owner,
            staff,
            customer,
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn layout(&self, kind: LayoutKind) -> &[NavEntry] {
        match kind {
            LayoutKind::Owner => &self.owner,
            LayoutKind::Staff => &self.staff,
            LayoutKind::Customer => &self.customer,
        }
    }

    /// Layout a role sees with the given snapshot
    pub fn layout_for(&self, role: Role, snapshot: Option<&CachedAuthorizationState>) -> LayoutKind {
        match role {
            Role::SuperAdmin | Role::Admin | Role::Owner => LayoutKind::Owner,
            Role::Manager | Role::Employee => {
                if self.config.owner_layout.elevates(snapshot) {
                    LayoutKind::Owner
                } else {
                    LayoutKind::Staff
                }
            }
            Role::Customer => LayoutKind::Customer,
        }
    }

    /// Visible entries for a role under the given tenant access
    pub fn visible_for(
        &self,
        registry: &RoleRegistry,
        role: Role,
        access: TenantAccess<'_>,
    ) -> Vec<NavEntry> {
        let snapshot = match access {
            TenantAccess::Snapshot(snapshot) => snapshot,
            TenantAccess::NoTenant | TenantAccess::Bypass => None,
        };
        let entries = self.layout(self.layout_for(role, snapshot));

        self.filter(entries, |entry| match access {
            TenantAccess::NoTenant => {
                if registry.allowed_by_role(role, Capability::Screen(entry.screen)) {
                    Decision::Allow
                } else {
                    Decision::Deny(crate::evaluator::DenyReason::RoleNotPermitted)
                }
            }
            TenantAccess::Bypass => Decision::Allow,
            TenantAccess::Snapshot(snapshot) => decide(&entry.requirement(), snapshot),
        })
    }

    /// Keep allowed entries in declared order, then enforce the cap.
    ///
    /// Over the cap, entries with the highest `priority` value go first;
    /// among equal priorities the later-declared entry goes first. Pending
    /// entries are not shown.
    pub fn filter(&self, entries: &[NavEntry], decision: impl Fn(&NavEntry) -> Decision) -> Vec<NavEntry> {
        let mut visible: Vec<(usize, &NavEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| decision(*entry).is_allowed())
            .collect();

        if visible.len() > self.config.max_visible {
            visible.sort_by_key(|(index, entry)| (entry.priority, *index));
            visible.truncate(self.config.max_visible);
            visible.sort_by_key(|(index, _)| *index);
        }

        visible.into_iter().map(|(_, entry)| entry.clone()).collect()
    }
}

/// Built-in layout for owners and admins
pub fn owner_layout() -> Vec<NavEntry> {
    use PermissionCode::*;
    vec![
        NavEntry::new("dashboard", "Dashboard", Screen::Dashboard, 0),
        NavEntry::new("appointments", "Appointments", Screen::Appointments, 1)
            .requires_any([ViewAllAppointments, ManageAppointments]),
        NavEntry::new("clients", "Clients", Screen::Clients, 3).requires_any([ViewClients, ManageClients]),
        NavEntry::new("sales", "Sales", Screen::Sales, 5).requires_any([ProcessSales, IssueRefunds]),
        NavEntry::new("staff", "Staff", Screen::Staff, 4).requires_any([ViewStaff, ManageStaff]),
        NavEntry::new("services", "Services", Screen::Services, 8).requires_any([ViewServices, ManageServices]),
        NavEntry::new("inventory", "Inventory", Screen::Inventory, 7)
            .requires_any([ViewInventory, ManageInventory]),
        NavEntry::new("reports", "Reports", Screen::Reports, 6).requires_any([ViewReports]),
        NavEntry::new("settings", "Settings", Screen::Settings, 9).requires_any([ManageSettings]),
        NavEntry::new("profile", "Profile", Screen::Profile, 2),
    ]
}

/// Built-in layout for managers and employees
pub fn staff_layout() -> Vec<NavEntry> {
    use PermissionCode::*;
    vec![
        NavEntry::new("today", "Today", Screen::Dashboard, 0)
            .requires_any([ViewOwnAppointments, ViewAllAppointments]),
        NavEntry::new("appointments", "Appointments", Screen::Appointments, 1)
            .requires_any([ManageAppointments, ViewAllAppointments]),
        NavEntry::new("my-schedule", "My Schedule", Screen::MySchedule, 2).requires_any([ViewOwnSchedule]),
        NavEntry::new("clients", "Clients", Screen::Clients, 4).requires_any([ViewClients, ManageClients]),
        NavEntry::new("sales", "Sales", Screen::Sales, 5).requires_any([ProcessSales]),
        NavEntry::new("reports", "Reports", Screen::Reports, 6).requires_any([ViewReports]),
        NavEntry::new("inventory", "Inventory", Screen::Inventory, 7)
            .requires_any([ViewInventory, ManageInventory]),
        NavEntry::new("profile", "Profile", Screen::Profile, 3).requires_any([EditOwnProfile]),
    ]
}

/// Built-in layout for customers
pub fn customer_layout() -> Vec<NavEntry> {
    vec![
        NavEntry::new("home", "Home", Screen::Dashboard, 0),
        NavEntry::new("book", "Book", Screen::Appointments, 1),
        NavEntry::new("profile", "Profile", Screen::Profile, 2),
    ]
}
