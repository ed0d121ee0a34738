//! Per-request caller context
//!
//! Built once per request from verified claims and passed explicitly into
//! every service call. Services read the scope from here; nothing is stored
//! in task-local or global state.

use std::collections::HashSet;
use std::fmt;

use super::permissions::Capability;
use super::scope::EnvScope;
use crate::error::NexusError;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: i32,
    pub username: String,
    pub role: String,
    pub scope: EnvScope,
    capabilities: HashSet<Capability>,
}

impl RequestContext {
    pub fn new(
        user_id: i32,
        username: impl Into<String>,
        role: impl Into<String>,
        scope: EnvScope,
        capabilities: HashSet<Capability>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            role: role.into(),
            scope,
            capabilities,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fail with 403 unless the caller's role grants `capability`
    pub fn require(&self, capability: Capability) -> Result<(), NexusError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(NexusError::Forbidden(format!(
                "role '{}' lacks {}",
                self.role, capability
            )))
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestContext({}#{} {} @ {})", self.username, self.user_id, self.role, self.scope)
    }
}
