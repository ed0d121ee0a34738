//! Comments on scoped records and @-mention notifications

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use diesel::SqliteConnection;
use regex::Regex;
use serde::Deserialize;

use crate::auth::{EnvScope, RequestContext};
use crate::db::comments::{self, target_types};
use crate::db::models::{current_timestamp, CommentWithAuthor, NewComment, Notification, User};
use crate::db::{enterprises, policies, users, Database};
use crate::error::NexusError;

use super::events::{EventBus, NexusEvent};

const MENTION_TITLE: &str = "您被 @ 了";

fn mention_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([\p{L}\p{N}_.\-]+)").unwrap())
}

/// Usernames written as `@name` in the text, in order of first appearance
pub fn parse_mentions(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in mention_pattern().captures_iter(content) {
        let name = caps[1].trim_end_matches(['.', '-']).to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    pub target_type: String,
    pub target_id: i32,
    pub content: String,
    #[serde(default)]
    pub mentioned_ids: Vec<i32>,
}

fn target_type(raw: &str) -> Result<&'static str, NexusError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ENTERPRISE" => Ok(target_types::ENTERPRISE),
        "POLICY" => Ok(target_types::POLICY),
        _ => Err(NexusError::field("targetType", "must be ENTERPRISE or POLICY")),
    }
}

fn ensure_target(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    kind: &str,
    id: i32,
) -> Result<(), NexusError> {
    let exists = if kind == target_types::ENTERPRISE {
        enterprises::get_enterprise(conn, scope, id)?.is_some()
    } else {
        policies::get_policy(conn, scope, id)?.is_some()
    };
    if exists {
        Ok(())
    } else {
        Err(NexusError::NotFound(format!("{} {}", kind.to_ascii_lowercase(), id)))
    }
}

pub struct CommentService {
    db: Database,
    events: Arc<EventBus>,
}

impl CommentService {
    pub fn new(db: Database, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Post a comment and notify every mentioned user of the same scope
    pub fn create(&self, ctx: &RequestContext, input: CommentInput) -> Result<CommentWithAuthor, NexusError> {
        let kind = target_type(&input.target_type)?;
        let content = input.content.trim();
        if content.is_empty() {
            return Err(NexusError::field("content", "must not be empty"));
        }
        let usernames = parse_mentions(content);

        let (comment, mentioned) = self.db.transaction(|conn| {
            ensure_target(conn, ctx.scope, kind, input.target_id)?;

            let mut mentioned: BTreeMap<i32, User> = BTreeMap::new();
            for user in users::find_active_by_ids(conn, ctx.scope, &input.mentioned_ids)?
                .into_iter()
                .chain(users::find_active_by_usernames(conn, ctx.scope, &usernames)?)
            {
                if user.id != ctx.user_id {
                    mentioned.insert(user.id, user);
                }
            }

            let now = current_timestamp();
            let ids: Vec<i32> = mentioned.keys().copied().collect();
            let ids_json = serde_json::to_string(&ids)?;
            let comment = comments::insert_comment(
                conn,
                &NewComment {
                    env_scope: ctx.scope.as_str(),
                    target_type: kind,
                    target_id: input.target_id,
                    author_id: ctx.user_id,
                    content,
                    mentioned_ids: (!ids.is_empty()).then_some(ids_json.as_str()),
                    created_at: &now,
                },
            )?;

            let body = format!("{} 在评论中提到了您", ctx.username);
            let link = format!("/dashboard/{}/{}", kind.to_ascii_lowercase(), input.target_id);
            let rows: Vec<_> = ids
                .iter()
                .map(|id| comments::mention_notification(*id, MENTION_TITLE, &body, &link, &now))
                .collect();
            comments::insert_notifications(conn, &rows)?;
            Ok((comment, ids.len()))
        })?;

        self.events.emit(NexusEvent::CommentPosted {
            id: comment.id,
            target_type: kind.to_string(),
            target_id: input.target_id,
            mentions: mentioned,
        });
        Ok(CommentWithAuthor {
            comment,
            author_username: ctx.username.clone(),
        })
    }

    pub fn list(
        &self,
        ctx: &RequestContext,
        raw_type: &str,
        target_id: i32,
    ) -> Result<Vec<CommentWithAuthor>, NexusError> {
        let kind = target_type(raw_type)?;
        self.db
            .with_conn(|conn| comments::list_for_target(conn, ctx.scope, kind, target_id))
    }

    pub fn notifications(&self, ctx: &RequestContext) -> Result<Vec<Notification>, NexusError> {
        self.db
            .with_conn(|conn| comments::list_notifications(conn, ctx.user_id))
    }

    pub fn mark_read(&self, ctx: &RequestContext, id: i32) -> Result<(), NexusError> {
        if self
            .db
            .with_conn(|conn| comments::mark_read(conn, ctx.user_id, id))?
        {
            Ok(())
        } else {
            Err(NexusError::NotFound(format!("notification {}", id)))
        }
    }
}
