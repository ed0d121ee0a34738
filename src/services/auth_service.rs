//! Account service - login, tokens, registration and password changes

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, Authenticator, EnvScope, RequestContext, TokenInput};
use crate::db::models::User;
use crate::db::users::{self, CreateUserInput};
use crate::db::Database;
use crate::error::NexusError;

use super::events::{EventBus, NexusEvent};

pub const MIN_PASSWORD_LEN: usize = 6;
const MAX_USERNAME_LEN: usize = 64;
pub const BOOTSTRAP_ROLE: &str = "ARCHITECT";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub env_scope: Option<EnvScope>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub manager_id: Option<i32>,
}

/// A freshly issued token and the user it belongs to
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub access_token: String,
    pub user: User,
}

fn check_password(field: &str, password: &str) -> Result<(), NexusError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(NexusError::field(
            field,
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

fn invalid_credentials() -> NexusError {
    NexusError::Unauthorized("invalid credentials".into())
}

pub struct AuthService {
    db: Database,
    auth: Authenticator,
    events: Arc<EventBus>,
}

impl AuthService {
    pub fn new(db: Database, auth: Authenticator, events: Arc<EventBus>) -> Self {
        Self { db, auth, events }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    fn issue(&self, user: User) -> Result<LoginResult, NexusError> {
        let env: EnvScope = user.env_scope.parse()?;
        let access_token = self.auth.issue_token(&TokenInput {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            env,
        })?;
        self.db.with_conn(|conn| users::touch_last_login(conn, user.id))?;
        Ok(LoginResult { access_token, user })
    }

    /// Verify a username-or-email and password pair
    pub fn login(&self, input: LoginInput) -> Result<LoginResult, NexusError> {
        let login = input
            .username
            .as_deref()
            .or(input.email.as_deref())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| NexusError::field("username", "username or email is required"))?;

        let user = self
            .db
            .with_conn(|conn| users::find_active_by_login(conn, login))?
            .ok_or_else(|| {
                warn!(login, "Login failed - user not found");
                invalid_credentials()
            })?;

        if !verify_password(&input.password, &user.password_hash)? {
            warn!(login, "Login failed - invalid password");
            return Err(invalid_credentials());
        }

        info!(user_id = user.id, env = %user.env_scope, "Login successful");
        self.issue(user)
    }

    /// Token for the first active DEMO user, no password
    pub fn demo_login(&self) -> Result<LoginResult, NexusError> {
        let user = self
            .db
            .with_conn(|conn| users::first_active_in_scope(conn, EnvScope::Demo))?
            .ok_or_else(|| NexusError::NotFound("no demo account is configured".into()))?;
        info!(user_id = user.id, "Demo login");
        self.issue(user)
    }

    pub fn profile(&self, ctx: &RequestContext) -> Result<User, NexusError> {
        self.db
            .with_conn(|conn| users::get_user(conn, ctx.user_id))?
            .ok_or_else(|| NexusError::NotFound(format!("user {}", ctx.user_id)))
    }

    pub fn change_password(&self, ctx: &RequestContext, input: ChangePasswordInput) -> Result<(), NexusError> {
        check_password("newPassword", &input.new_password)?;
        let user = self.profile(ctx)?;
        if !verify_password(&input.old_password, &user.password_hash)? {
            return Err(NexusError::field("oldPassword", "is incorrect"));
        }
        let hash = hash_password(&input.new_password)?;
        self.db
            .with_conn(|conn| users::update_password_hash(conn, user.id, &hash))?;
        info!(user_id = user.id, "Password changed");
        Ok(())
    }

    /// Create an account; the scope defaults to the caller's
    pub fn register(&self, ctx: &RequestContext, input: RegisterInput) -> Result<User, NexusError> {
        let username = input.username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(NexusError::field("username", "must be 1-64 characters"));
        }
        let email = input.email.trim();
        if !email.contains('@') {
            return Err(NexusError::field("email", "must be an email address"));
        }
        check_password("password", &input.password)?;
        if !self.auth.roles().is_known_role(&input.role) {
            return Err(NexusError::field("role", format!("unknown role '{}'", input.role)));
        }

        let create = CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&input.password)?,
            role: input.role.clone(),
            env_scope: input.env_scope.unwrap_or(ctx.scope),
            first_name: input.first_name,
            region: input.region,
            department: input.department,
            manager_id: input.manager_id,
        };
        let user = self.db.transaction(|conn| {
            if users::username_or_email_taken(conn, &create.username, &create.email)? {
                return Err(NexusError::Conflict("username or email is already registered".into()));
            }
            users::create_user(conn, &create)
        })?;

        self.events.emit(NexusEvent::UserRegistered {
            id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
        });
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>, NexusError> {
        self.db.with_conn(users::list_users)
    }

    /// Create the PROD administrator on first start; `None` if the name is taken
    pub fn bootstrap_admin(&self, username: &str, password: &str) -> Result<Option<User>, NexusError> {
        if self.db.with_conn(|conn| users::find_by_username(conn, username))?.is_some() {
            return Ok(None);
        }
        check_password("adminPassword", password)?;
        let create = CreateUserInput {
            username: username.to_string(),
            email: format!("{}@localhost", username),
            password_hash: hash_password(password)?,
            role: BOOTSTRAP_ROLE.to_string(),
            env_scope: EnvScope::Prod,
            first_name: None,
            region: None,
            department: None,
            manager_id: None,
        };
        let user = self.db.with_conn(|conn| users::create_user(conn, &create))?;
        info!(user_id = user.id, username, "Bootstrap administrator created");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{JwtValidator, MissingScopePolicy, RolePolicy};

    fn service() -> AuthService {
        let jwt = JwtValidator::new("test-secret-that-is-at-least-32-characters".into(), 600).unwrap();
        AuthService::new(
            Database::open_in_memory().unwrap(),
            Authenticator::new(jwt, RolePolicy::builtin(), MissingScopePolicy::Reject),
            Arc::new(EventBus::new()),
        )
    }

    fn login(svc: &AuthService, username: &str, password: &str) -> Result<LoginResult, NexusError> {
        svc.login(LoginInput {
            username: Some(username.into()),
            email: None,
            password: password.into(),
        })
    }

    #[test]
    fn test_bootstrap_then_login() {
        let svc = service();
        let admin = svc.bootstrap_admin("root", "secret123").unwrap().unwrap();
        assert_eq!(admin.role, BOOTSTRAP_ROLE);
        assert!(svc.bootstrap_admin("root", "secret123").unwrap().is_none());

        let result = login(&svc, "root", "secret123").unwrap();
        let ctx = svc
            .authenticator()
            .authenticate(Some(&format!("Bearer {}", result.access_token)))
            .unwrap();
        assert_eq!(ctx.scope, EnvScope::Prod);
        assert_eq!(ctx.user_id, admin.id);

        assert!(matches!(login(&svc, "root", "wrong-pass"), Err(NexusError::Unauthorized(_))));
        assert!(matches!(login(&svc, "nobody", "secret123"), Err(NexusError::Unauthorized(_))));
    }

    #[test]
    fn test_register_and_demo_login() {
        let svc = service();
        let admin = svc.bootstrap_admin("root", "secret123").unwrap().unwrap();
        let root = svc
            .authenticator()
            .context_from_claims(
                &svc.authenticator()
                    .jwt()
                    .verify_token(&login(&svc, "root", "secret123").unwrap().access_token)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(root.user_id, admin.id);

        assert!(matches!(svc.demo_login(), Err(NexusError::NotFound(_))));

        let register = |username: &str, role: &str| RegisterInput {
            username: username.into(),
            email: format!("{}@corp.example", username),
            password: "hunter22".into(),
            role: role.into(),
            env_scope: Some(EnvScope::Demo),
            first_name: None,
            region: Some("成都".into()),
            department: None,
            manager_id: None,
        };
        svc.register(&root, register("demo", "operator")).unwrap();
        assert!(matches!(
            svc.register(&root, register("demo", "operator")),
            Err(NexusError::Conflict(_))
        ));
        assert!(svc.register(&root, register("ghost", "wizard")).is_err());

        let demo = svc.demo_login().unwrap();
        assert_eq!(demo.user.username, "demo");
        assert_eq!(svc.list_users().unwrap().len(), 2);
    }

    #[test]
    fn test_change_password() {
        let svc = service();
        svc.bootstrap_admin("root", "secret123").unwrap();
        let token = login(&svc, "root", "secret123").unwrap().access_token;
        let ctx = svc.authenticator().authenticate(Some(&format!("Bearer {}", token))).unwrap();

        let short = ChangePasswordInput {
            old_password: "secret123".into(),
            new_password: "abc".into(),
        };
        assert!(matches!(svc.change_password(&ctx, short), Err(NexusError::Validation { .. })));

        svc.change_password(
            &ctx,
            ChangePasswordInput {
                old_password: "secret123".into(),
                new_password: "rotated-456".into(),
            },
        )
        .unwrap();
        assert!(login(&svc, "root", "secret123").is_err());
        assert!(login(&svc, "root", "rotated-456").is_ok());
    }
}
