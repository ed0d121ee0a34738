//! Environment scopes
//!
//! Every enterprise, policy and user row belongs to exactly one scope.
//! Repositories take an `EnvScope` argument and add it to every WHERE clause.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::NexusError;

/// Partition tag isolating the demo and production datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvScope {
    #[serde(rename = "DEMO")]
    Demo,
    #[serde(rename = "PROD")]
    Prod,
}

impl EnvScope {
    pub const ALL: [EnvScope; 2] = [EnvScope::Demo, EnvScope::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvScope::Demo => "DEMO",
            EnvScope::Prod => "PROD",
        }
    }
}

impl fmt::Display for EnvScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvScope {
    type Err = NexusError;

    /// Case-sensitive: only `DEMO` and `PROD` are scopes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEMO" => Ok(EnvScope::Demo),
            "PROD" => Ok(EnvScope::Prod),
            other => Err(NexusError::field("envScope", format!("unknown scope '{}'", other))),
        }
    }
}

/// What to do with a token that carries no `env` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingScopePolicy {
    /// Refuse the request (401)
    Reject,
    /// Fall back to a fixed scope; logged on every use
    DefaultTo(EnvScope),
}

impl FromStr for MissingScopePolicy {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(MissingScopePolicy::Reject),
            "prod" => Ok(MissingScopePolicy::DefaultTo(EnvScope::Prod)),
            "demo" => Ok(MissingScopePolicy::DefaultTo(EnvScope::Demo)),
            other => Err(NexusError::Config(format!(
                "MISSING_SCOPE must be reject, prod or demo (got '{}')",
                other
            ))),
        }
    }
}

impl MissingScopePolicy {
    /// Resolve the caller's scope from the token claim
    pub fn resolve(&self, claim: Option<&str>, subject: i32) -> Result<EnvScope, NexusError> {
        match claim {
            Some(value) => value
                .parse()
                .map_err(|_| NexusError::Unauthorized(format!("invalid environment scope '{}'", value))),
            None => match self {
                MissingScopePolicy::Reject => {
                    Err(NexusError::Unauthorized("missing environment scope".into()))
                }
                MissingScopePolicy::DefaultTo(scope) => {
                    warn!(user_id = subject, scope = %scope, "Token has no env claim, applying default scope");
                    Ok(*scope)
                }
            },
        }
    }
}
