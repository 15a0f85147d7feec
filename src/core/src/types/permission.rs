//! Fine-grained permission catalog
//!
//! The catalog is a closed enum. Category and description lookups are
//! exhaustive matches, so adding a code without classifying it fails to
//! compile.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fine-grained capability code granted per tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionCode {
    ViewOwnAppointments,
    ViewAllAppointments,
    ManageAppointments,
    CancelAppointments,
    ViewOwnSchedule,
    ManageSchedules,
    ViewClients,
    ManageClients,
    ViewServices,
    ManageServices,
    ProcessSales,
    IssueRefunds,
    ViewInventory,
    ManageInventory,
    ViewStaff,
    ManageStaff,
    ManagePermissions,
    ViewReports,
    ManageSettings,
    EditOwnProfile,
}

/// Grouping used by permission management screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    Appointments,
    Schedule,
    Clients,
    Services,
    Sales,
    Inventory,
    Staff,
    Reports,
    Settings,
    Profile,
}

/// Permission held by every active member without an explicit grant.
///
/// This constant is the only source of default capabilities. Grant requests
/// naming one of these codes are rejected.
pub const DEFAULT_PERMISSIONS: [PermissionCode; 3] = [
    PermissionCode::ViewOwnAppointments,
    PermissionCode::ViewOwnSchedule,
    PermissionCode::EditOwnProfile,
];

impl PermissionCode {
    /// Every code in catalog order
    pub const ALL: [PermissionCode; 20] = [
        PermissionCode::ViewOwnAppointments,
        PermissionCode::ViewAllAppointments,
        PermissionCode::ManageAppointments,
        PermissionCode::CancelAppointments,
        PermissionCode::ViewOwnSchedule,
        PermissionCode::ManageSchedules,
        PermissionCode::ViewClients,
        PermissionCode::ManageClients,
        PermissionCode::ViewServices,
        PermissionCode::ManageServices,
        PermissionCode::ProcessSales,
        PermissionCode::IssueRefunds,
        PermissionCode::ViewInventory,
        PermissionCode::ManageInventory,
        PermissionCode::ViewStaff,
        PermissionCode::ManageStaff,
        PermissionCode::ManagePermissions,
        PermissionCode::ViewReports,
        PermissionCode::ManageSettings,
        PermissionCode::EditOwnProfile,
    ];

    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionCode::ViewOwnAppointments => "VIEW_OWN_APPOINTMENTS",
            PermissionCode::ViewAllAppointments => "VIEW_ALL_APPOINTMENTS",
            PermissionCode::ManageAppointments => "MANAGE_APPOINTMENTS",
            PermissionCode::CancelAppointments => "CANCEL_APPOINTMENTS",
            PermissionCode::ViewOwnSchedule => "VIEW_OWN_SCHEDULE",
            PermissionCode::ManageSchedules => "MANAGE_SCHEDULES",
            PermissionCode::ViewClients => "VIEW_CLIENTS",
            PermissionCode::ManageClients => "MANAGE_CLIENTS",
            PermissionCode::ViewServices => "VIEW_SERVICES",
            PermissionCode::ManageServices => "MANAGE_SERVICES",
            PermissionCode::ProcessSales => "PROCESS_SALES",
            PermissionCode::IssueRefunds => "ISSUE_REFUNDS",
            PermissionCode::ViewInventory => "VIEW_INVENTORY",
            PermissionCode::ManageInventory => "MANAGE_INVENTORY",
            PermissionCode::ViewStaff => "VIEW_STAFF",
            PermissionCode::ManageStaff => "MANAGE_STAFF",
            PermissionCode::ManagePermissions => "MANAGE_PERMISSIONS",
            PermissionCode::ViewReports => "VIEW_REPORTS",
            PermissionCode::ManageSettings => "MANAGE_SETTINGS",
            PermissionCode::EditOwnProfile => "EDIT_OWN_PROFILE",
        }
    }

    pub fn category(self) -> PermissionCategory {
        match self {
            PermissionCode::ViewOwnAppointments
            | PermissionCode::ViewAllAppointments
            | PermissionCode::ManageAppointments
            | PermissionCode::CancelAppointments => PermissionCategory::Appointments,
            PermissionCode::ViewOwnSchedule | PermissionCode::ManageSchedules => {
                PermissionCategory::Schedule
            }
            PermissionCode::ViewClients | PermissionCode::ManageClients => {
                PermissionCategory::Clients
            }
            PermissionCode::ViewServices | PermissionCode::ManageServices => {
                PermissionCategory::Services
            }
            PermissionCode::ProcessSales | PermissionCode::IssueRefunds => PermissionCategory::Sales,
            PermissionCode::ViewInventory | PermissionCode::ManageInventory => {
                PermissionCategory::Inventory
            }
            PermissionCode::ViewStaff
            | PermissionCode::ManageStaff
            | PermissionCode::ManagePermissions => PermissionCategory::Staff,
            PermissionCode::ViewReports => PermissionCategory::Reports,
            PermissionCode::ManageSettings => PermissionCategory::Settings,
            PermissionCode::EditOwnProfile => PermissionCategory::Profile,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PermissionCode::ViewOwnAppointments => "View appointments assigned to me",
            PermissionCode::ViewAllAppointments => "View every appointment in the salon",
            PermissionCode::ManageAppointments => "Create, edit and reschedule appointments",
            PermissionCode::CancelAppointments => "Cancel appointments",
            PermissionCode::ViewOwnSchedule => "View my working schedule",
            PermissionCode::ManageSchedules => "Edit staff schedules",
            PermissionCode::ViewClients => "View client records",
            PermissionCode::ManageClients => "Create and edit client records",
            PermissionCode::ViewServices => "View the service menu",
            PermissionCode::ManageServices => "Edit services and pricing",
            PermissionCode::ProcessSales => "Ring up sales at checkout",
            PermissionCode::IssueRefunds => "Refund completed sales",
            PermissionCode::ViewInventory => "View stock levels",
            PermissionCode::ManageInventory => "Adjust stock and purchase orders",
            PermissionCode::ViewStaff => "View the staff directory",
            PermissionCode::ManageStaff => "Invite and deactivate staff",
            PermissionCode::ManagePermissions => "Grant and revoke staff permissions",
            PermissionCode::ViewReports => "View business reports",
            PermissionCode::ManageSettings => "Edit salon settings",
            PermissionCode::EditOwnProfile => "Edit my own profile",
        }
    }

    /// Whether every active member holds this code implicitly
    pub fn is_default(self) -> bool {
        DEFAULT_PERMISSIONS.contains(&self)
    }

    /// Catalog entry for this code
    pub fn permission(self) -> Permission {
        Permission {
            code: self,
            category: self.category(),
            description: self.description(),
        }
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        PermissionCode::ALL
            .into_iter()
            .find(|code| code.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownPermission(s.to_string()))
    }
}

/// Catalog entry: code with its category and description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub code: PermissionCode,
    pub category: PermissionCategory,
    pub description: &'static str,
}
