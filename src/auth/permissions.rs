//! Capabilities and the role -> capability map
//!
//! Every route declares one required `Capability`. Roles are flat: a role has
//! exactly the capabilities listed for it, with no inheritance between roles.
//! The map is built once at startup from the built-in table plus config
//! overrides.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::NexusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    ReadEnterprises,
    WriteEnterprises,
    DeleteEnterprises,
    ViewDashboard,
    /// Unscoped aggregate view across DEMO and PROD
    ViewGlobalDashboard,
    ReadPolicies,
    AnalyzePolicy,
    SyncExport,
    SyncImport,
    ImportData,
    ExportData,
    Comment,
    ManageUsers,
    ManageSystem,
}

impl Capability {
    pub const ALL: [Capability; 14] = [
        Capability::ReadEnterprises,
        Capability::WriteEnterprises,
        Capability::DeleteEnterprises,
        Capability::ViewDashboard,
        Capability::ViewGlobalDashboard,
        Capability::ReadPolicies,
        Capability::AnalyzePolicy,
        Capability::SyncExport,
        Capability::SyncImport,
        Capability::ImportData,
        Capability::ExportData,
        Capability::Comment,
        Capability::ManageUsers,
        Capability::ManageSystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadEnterprises => "ReadEnterprises",
            Capability::WriteEnterprises => "WriteEnterprises",
            Capability::DeleteEnterprises => "DeleteEnterprises",
            Capability::ViewDashboard => "ViewDashboard",
            Capability::ViewGlobalDashboard => "ViewGlobalDashboard",
            Capability::ReadPolicies => "ReadPolicies",
            Capability::AnalyzePolicy => "AnalyzePolicy",
            Capability::SyncExport => "SyncExport",
            Capability::SyncImport => "SyncImport",
            Capability::ImportData => "ImportData",
            Capability::ExportData => "ExportData",
            Capability::Comment => "Comment",
            Capability::ManageUsers => "ManageUsers",
            Capability::ManageSystem => "ManageSystem",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| NexusError::Config(format!("unknown capability '{}'", s)))
    }
}

/// Enterprise, dashboard, policy, sync and data-transfer work for one scope
const MANAGER_CAPABILITIES: &[Capability] = &[
    Capability::ReadEnterprises,
    Capability::WriteEnterprises,
    Capability::DeleteEnterprises,
    Capability::ViewDashboard,
    Capability::ReadPolicies,
    Capability::AnalyzePolicy,
    Capability::SyncExport,
    Capability::SyncImport,
    Capability::ImportData,
    Capability::ExportData,
    Capability::Comment,
];

const OPERATOR_CAPABILITIES: &[Capability] = &[
    Capability::ReadEnterprises,
    Capability::WriteEnterprises,
    Capability::ViewDashboard,
    Capability::ReadPolicies,
    Capability::ImportData,
    Capability::ExportData,
    Capability::Comment,
];

const ANALYST_CAPABILITIES: &[Capability] = &[
    Capability::ReadEnterprises,
    Capability::ViewDashboard,
    Capability::ReadPolicies,
    Capability::AnalyzePolicy,
    Capability::ExportData,
    Capability::Comment,
];

/// Role -> capability set, resolved once at startup
#[derive(Debug, Clone)]
pub struct RolePolicy {
    roles: HashMap<String, HashSet<Capability>>,
}

impl RolePolicy {
    /// The built-in role table
    pub fn builtin() -> Self {
        let everything: HashSet<Capability> = Capability::ALL.into_iter().collect();
        let cortex: HashSet<Capability> = everything
            .iter()
            .copied()
            .filter(|c| !matches!(c, Capability::ManageUsers | Capability::ManageSystem))
            .collect();

        let mut roles = HashMap::new();
        roles.insert("ARCHITECT".to_string(), everything.clone());
        roles.insert("SUPER_ADMIN".to_string(), everything);
        roles.insert("CORTEX".to_string(), cortex);
        for role in ["admin", "GANGLION"] {
            roles.insert(role.to_string(), MANAGER_CAPABILITIES.iter().copied().collect());
        }
        for role in ["operator", "NEURON"] {
            roles.insert(role.to_string(), OPERATOR_CAPABILITIES.iter().copied().collect());
        }
        roles.insert("analyst".to_string(), ANALYST_CAPABILITIES.iter().copied().collect());

        Self { roles }
    }

    /// Built-in table with config overrides; an override replaces the role's set
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self, NexusError> {
        let mut policy = Self::builtin();
        for (role, names) in overrides {
            let caps = names
                .iter()
                .map(|n| n.parse())
                .collect::<Result<HashSet<Capability>, _>>()?;
            policy.roles.insert(role.clone(), caps);
        }
        Ok(policy)
    }

    /// Capabilities granted to a role; unknown roles get none
    pub fn capabilities_for(&self, role: &str) -> HashSet<Capability> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    pub fn allows(&self, role: &str, capability: Capability) -> bool {
        self.roles
            .get(role)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }

    pub fn is_known_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Known role names, sorted
    pub fn roles(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_lookup_is_case_sensitive() {
        let policy = RolePolicy::builtin();
        assert!(policy.allows("admin", Capability::WriteEnterprises));
        assert!(!policy.allows("ADMIN", Capability::WriteEnterprises));
    }

    #[test]
    fn test_no_hierarchy_between_roles() {
        let policy = RolePolicy::builtin();
        // analyst can analyze policies, operator cannot, even though operator can write
        assert!(policy.allows("analyst", Capability::AnalyzePolicy));
        assert!(!policy.allows("operator", Capability::AnalyzePolicy));
        assert!(!policy.allows("analyst", Capability::WriteEnterprises));
    }

    #[test]
    fn test_global_dashboard_roles() {
        let policy = RolePolicy::builtin();
        assert!(policy.allows("CORTEX", Capability::ViewGlobalDashboard));
        assert!(policy.allows("ARCHITECT", Capability::ViewGlobalDashboard));
        assert!(!policy.allows("admin", Capability::ViewGlobalDashboard));
        assert!(!policy.allows("CORTEX", Capability::ManageUsers));
    }

    #[test]
    fn test_unknown_role_has_nothing() {
        let policy = RolePolicy::builtin();
        assert!(policy.capabilities_for("intern").is_empty());
        assert!(!policy.is_known_role("intern"));
    }

    #[test]
    fn test_overrides_add_and_replace_roles() {
        let mut overrides = BTreeMap::new();
        overrides.insert("auditor".to_string(), vec!["ReadEnterprises".to_string()]);
        overrides.insert("analyst".to_string(), vec!["ViewDashboard".to_string()]);
        let policy = RolePolicy::with_overrides(&overrides).unwrap();

        assert!(policy.allows("auditor", Capability::ReadEnterprises));
        assert!(!policy.allows("analyst", Capability::ReadEnterprises));
        assert!(policy.allows("analyst", Capability::ViewDashboard));
    }

    #[test]
    fn test_unknown_capability_in_override_fails() {
        let mut overrides = BTreeMap::new();
        overrides.insert("auditor".to_string(), vec!["Teleport".to_string()]);
        assert!(RolePolicy::with_overrides(&overrides).is_err());
    }
}
