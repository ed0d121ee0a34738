//! Policy document storage and processing status transitions

use diesel::prelude::*;

use super::diesel_schema::policies;
use super::models::{current_timestamp, NewPolicy, Policy, PolicyAnalysisChanges, STATUS_ACTIVE};
use crate::auth::EnvScope;
use crate::error::NexusError;

/// Values of `policies.process_status`
pub mod process_status {
    pub const PENDING: &str = "PENDING";
    pub const PROCESSING: &str = "PROCESSING";
    pub const COMPLETED: &str = "COMPLETED";
    pub const FAILED: &str = "FAILED";

    /// True once no further transition can happen
    pub fn is_terminal(status: &str) -> bool {
        status == COMPLETED || status == FAILED
    }
}

pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

// ============================================================================
// Read Operations
// ============================================================================

/// Active policies of a scope, newest first
pub fn list_policies(conn: &mut SqliteConnection, scope: EnvScope) -> Result<Vec<Policy>, NexusError> {
    Ok(policies::table
        .filter(policies::env_scope.eq(scope.as_str()))
        .filter(policies::status.eq(STATUS_ACTIVE))
        .order(policies::created_at.desc())
        .then_order_by(policies::id.desc())
        .select(Policy::as_select())
        .load(conn)?)
}

pub fn get_policy(conn: &mut SqliteConnection, scope: EnvScope, id: i32) -> Result<Option<Policy>, NexusError> {
    Ok(policies::table
        .filter(policies::env_scope.eq(scope.as_str()))
        .filter(policies::status.eq(STATUS_ACTIVE))
        .filter(policies::id.eq(id))
        .select(Policy::as_select())
        .first(conn)
        .optional()?)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a new `PENDING` policy for `url`
pub fn create_pending(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    url: &str,
    created_by: Option<i32>,
) -> Result<Policy, NexusError> {
    let now = current_timestamp();
    let new_policy = NewPolicy {
        env_scope: scope.as_str(),
        source_url: url,
        process_status: process_status::PENDING,
        status: STATUS_ACTIVE,
        created_by,
        created_at: &now,
        updated_at: &now,
    };
    Ok(diesel::insert_into(policies::table)
        .values(&new_policy)
        .returning(Policy::as_returning())
        .get_result(conn)?)
}

/// Move a policy to `status`, recording `error` (cleared when `None`)
pub fn set_process_status(
    conn: &mut SqliteConnection,
    id: i32,
    status: &str,
    error: Option<&str>,
) -> Result<(), NexusError> {
    let updated = diesel::update(policies::table.filter(policies::id.eq(id)))
        .set((
            policies::process_status.eq(status),
            policies::error_message.eq(error),
            policies::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(NexusError::NotFound(format!("policy {}", id)));
    }
    Ok(())
}

/// Persist analysis output and mark the policy `COMPLETED`
pub fn complete_policy(
    conn: &mut SqliteConnection,
    id: i32,
    analysis: &PolicyAnalysisChanges,
) -> Result<(), NexusError> {
    conn.transaction::<_, NexusError, _>(|conn| {
        diesel::update(policies::table.filter(policies::id.eq(id)))
            .set(analysis)
            .execute(conn)?;
        set_process_status(conn, id, process_status::COMPLETED, None)
    })
}

/// Fail every policy a previous process left mid-flight
pub fn fail_interrupted(conn: &mut SqliteConnection) -> Result<usize, NexusError> {
    Ok(diesel::update(
        policies::table.filter(
            policies::process_status
                .eq(process_status::PENDING)
                .or(policies::process_status.eq(process_status::PROCESSING)),
        ),
    )
    .set((
        policies::process_status.eq(process_status::FAILED),
        policies::error_message.eq(INTERRUPTED_MESSAGE),
        policies::updated_at.eq(current_timestamp()),
    ))
    .execute(conn)?)
}
