//! Comments on enterprises/policies and per-user notifications

use diesel::prelude::*;

use super::diesel_schema::{comments, notifications, users};
use super::models::{Comment, CommentWithAuthor, NewComment, NewNotification, Notification};
use crate::auth::EnvScope;
use crate::error::NexusError;

/// Notifications returned per listing
pub const NOTIFICATION_PAGE: i64 = 50;

/// Comment target kinds
pub mod target_types {
    pub const ENTERPRISE: &str = "ENTERPRISE";
    pub const POLICY: &str = "POLICY";
}

// ============================================================================
// Comments
// ============================================================================

pub fn insert_comment(conn: &mut SqliteConnection, comment: &NewComment<'_>) -> Result<Comment, NexusError> {
    Ok(diesel::insert_into(comments::table)
        .values(comment)
        .returning(Comment::as_returning())
        .get_result(conn)?)
}

/// Comments on one target, newest first, with author usernames
pub fn list_for_target(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    target_type: &str,
    target_id: i32,
) -> Result<Vec<CommentWithAuthor>, NexusError> {
    let rows: Vec<(Comment, String)> = comments::table
        .inner_join(users::table)
        .filter(comments::env_scope.eq(scope.as_str()))
        .filter(comments::target_type.eq(target_type))
        .filter(comments::target_id.eq(target_id))
        .order(comments::created_at.desc())
        .then_order_by(comments::id.desc())
        .select((Comment::as_select(), users::username))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(comment, author_username)| CommentWithAuthor {
            comment,
            author_username,
        })
        .collect())
}

// ============================================================================
// Notifications
// ============================================================================

pub fn insert_notifications(
    conn: &mut SqliteConnection,
    rows: &[NewNotification<'_>],
) -> Result<usize, NexusError> {
    if rows.is_empty() {
        return Ok(0);
    }
    Ok(diesel::insert_into(notifications::table)
        .values(rows)
        .execute(conn)?)
}

/// Latest notifications for a user
pub fn list_notifications(conn: &mut SqliteConnection, user_id: i32) -> Result<Vec<Notification>, NexusError> {
    Ok(notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .then_order_by(notifications::id.desc())
        .limit(NOTIFICATION_PAGE)
        .select(Notification::as_select())
        .load(conn)?)
}

/// Mark one of the user's notifications read; `false` if it isn't theirs
pub fn mark_read(conn: &mut SqliteConnection, user_id: i32, id: i32) -> Result<bool, NexusError> {
    let updated = diesel::update(
        notifications::table
            .filter(notifications::id.eq(id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .set(notifications::is_read.eq(1))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Build a MENTION notification row
pub fn mention_notification<'a>(
    user_id: i32,
    title: &'a str,
    content: &'a str,
    link: &'a str,
    created_at: &'a str,
) -> NewNotification<'a> {
    NewNotification {
        user_id,
        notification_type: "MENTION",
        title,
        content,
        link: Some(link),
        is_read: 0,
        created_at,
    }
}
