//! Platform roles and the per-route allow-lists built from them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The six roles a user account can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Employee,
    Manager,
    Counselor,
    FinancialAdvisor,
    CompanyAdmin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Employee,
        Role::Manager,
        Role::Counselor,
        Role::FinancialAdvisor,
        Role::CompanyAdmin,
        Role::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Counselor => "counselor",
            Role::FinancialAdvisor => "financial-advisor",
            Role::CompanyAdmin => "company-admin",
            Role::SuperAdmin => "super-admin",
        }
    }

    /// Roles that deliver sessions and see owner-only session content
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Counselor | Role::FinancialAdvisor)
    }

    /// Roles whose account must belong to a company
    pub fn requires_company(&self) -> bool {
        matches!(self, Role::Employee | Role::Manager | Role::CompanyAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown role: {s}"))
    }
}

/// Static allow-lists used by route handlers
pub mod allow {
    use super::Role;

    pub const SUPER_ADMIN: &[Role] = &[Role::SuperAdmin];
    pub const COMPANY_ADMIN: &[Role] = &[Role::CompanyAdmin, Role::SuperAdmin];
    pub const SETTLEMENT: &[Role] = &[Role::Counselor, Role::SuperAdmin];
    pub const COUNSELOR: &[Role] = &[Role::Counselor];
    pub const SESSION_BOOKING: &[Role] = &[Role::Employee, Role::Manager];
    pub const FINANCIAL_BOOKING: &[Role] = &[Role::Employee, Role::Manager, Role::FinancialAdvisor];
    pub const CONTENT_AUTHORS: &[Role] = &[Role::Counselor, Role::FinancialAdvisor, Role::SuperAdmin];
    pub const ANY: &[Role] = &Role::ALL;
}

/// Check a role against an allow-list
pub fn is_role_allowed(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
}
