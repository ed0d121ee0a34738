//! Staff account storage
//!
//! Users are looked up by username or email at login; everything else goes
//! through the numeric id carried in the token `sub` claim.

use diesel::prelude::*;

use super::diesel_schema::users;
use super::models::{current_timestamp, NewUser, User, STATUS_ACTIVE};
use crate::auth::EnvScope;
use crate::error::NexusError;

/// Fields for creating a user; the password is already hashed
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub env_scope: EnvScope,
    pub first_name: Option<String>,
    pub region: Option<String>,
    pub department: Option<String>,
    pub manager_id: Option<i32>,
}

pub fn get_user(conn: &mut SqliteConnection, id: i32) -> Result<Option<User>, NexusError> {
    Ok(users::table
        .filter(users::id.eq(id))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

/// Active user whose username or email equals `login`
pub fn find_active_by_login(conn: &mut SqliteConnection, login: &str) -> Result<Option<User>, NexusError> {
    Ok(users::table
        .filter(users::status.eq(STATUS_ACTIVE))
        .filter(users::username.eq(login).or(users::email.eq(login)))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn find_by_username(conn: &mut SqliteConnection, username: &str) -> Result<Option<User>, NexusError> {
    Ok(users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

/// True when either the username or the email is already taken
pub fn username_or_email_taken(
    conn: &mut SqliteConnection,
    username: &str,
    email: &str,
) -> Result<bool, NexusError> {
    let count: i64 = users::table
        .filter(users::username.eq(username).or(users::email.eq(email)))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// First active user in a scope (lowest id)
pub fn first_active_in_scope(conn: &mut SqliteConnection, scope: EnvScope) -> Result<Option<User>, NexusError> {
    Ok(users::table
        .filter(users::env_scope.eq(scope.as_str()))
        .filter(users::status.eq(STATUS_ACTIVE))
        .order(users::id.asc())
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

/// Active users of a scope whose username is in `usernames`
pub fn find_active_by_usernames(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    usernames: &[String],
) -> Result<Vec<User>, NexusError> {
    if usernames.is_empty() {
        return Ok(Vec::new());
    }
    Ok(users::table
        .filter(users::env_scope.eq(scope.as_str()))
        .filter(users::status.eq(STATUS_ACTIVE))
        .filter(users::username.eq_any(usernames))
        .select(User::as_select())
        .load(conn)?)
}

/// Active users of a scope among `ids`
pub fn find_active_by_ids(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    ids: &[i32],
) -> Result<Vec<User>, NexusError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(users::table
        .filter(users::env_scope.eq(scope.as_str()))
        .filter(users::status.eq(STATUS_ACTIVE))
        .filter(users::id.eq_any(ids))
        .select(User::as_select())
        .load(conn)?)
}

/// All users, newest first
pub fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>, NexusError> {
    Ok(users::table
        .order(users::created_at.desc())
        .then_order_by(users::id.desc())
        .select(User::as_select())
        .load(conn)?)
}

pub fn create_user(conn: &mut SqliteConnection, input: &CreateUserInput) -> Result<User, NexusError> {
    let now = current_timestamp();
    let new_user = NewUser {
        username: &input.username,
        email: &input.email,
        password_hash: &input.password_hash,
        role: &input.role,
        env_scope: input.env_scope.as_str(),
        status: STATUS_ACTIVE,
        first_name: input.first_name.as_deref(),
        region: input.region.as_deref(),
        department: input.department.as_deref(),
        manager_id: input.manager_id,
        created_at: &now,
        updated_at: &now,
    };

    Ok(diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)?)
}

pub fn update_password_hash(conn: &mut SqliteConnection, id: i32, password_hash: &str) -> Result<(), NexusError> {
    let updated = diesel::update(users::table.filter(users::id.eq(id)))
        .set((
            users::password_hash.eq(password_hash),
            users::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(NexusError::NotFound(format!("user {}", id)));
    }
    Ok(())
}

pub fn touch_last_login(conn: &mut SqliteConnection, id: i32) -> Result<(), NexusError> {
    diesel::update(users::table.filter(users::id.eq(id)))
        .set(users::last_login_at.eq(current_timestamp()))
        .execute(conn)?;
    Ok(())
}
