//! Authentication and authorization
//!
//! - `jwt` - token signing and verification
//! - `password` - Argon2 password hashing
//! - `permissions` - capabilities and the role map
//! - `scope` - DEMO/PROD partitioning and the missing-claim policy
//! - `context` - the explicit per-request caller context

pub mod context;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod scope;

pub use context::RequestContext;
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput};
pub use password::{hash_password, verify_password};
pub use permissions::{Capability, RolePolicy};
pub use scope::{EnvScope, MissingScopePolicy};

use crate::error::NexusError;

/// Turns an Authorization header into a `RequestContext`
#[derive(Clone)]
pub struct Authenticator {
    jwt: JwtValidator,
    roles: RolePolicy,
    missing_scope: MissingScopePolicy,
}

impl Authenticator {
    pub fn new(jwt: JwtValidator, roles: RolePolicy, missing_scope: MissingScopePolicy) -> Self {
        Self {
            jwt,
            roles,
            missing_scope,
        }
    }

    pub fn jwt(&self) -> &JwtValidator {
        &self.jwt
    }

    pub fn roles(&self) -> &RolePolicy {
        &self.roles
    }

    /// Verify the bearer token and resolve scope and capabilities
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<RequestContext, NexusError> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| NexusError::Unauthorized("missing bearer token".into()))?;
        let claims = self.jwt.verify_token(token)?;
        self.context_from_claims(&claims)
    }

    pub fn context_from_claims(&self, claims: &Claims) -> Result<RequestContext, NexusError> {
        let scope = self.missing_scope.resolve(claims.env.as_deref(), claims.sub)?;
        Ok(RequestContext::new(
            claims.sub,
            claims.username.clone(),
            claims.role.clone(),
            scope,
            self.roles.capabilities_for(&claims.role),
        ))
    }

    /// Issue a token for a user row
    pub fn issue_token(&self, input: &TokenInput) -> Result<String, NexusError> {
        self.jwt.generate_token(input)
    }
}
