//! Diesel model definitions for database tables
//!
//! - Queryable structs: rows as read back from SELECT
//! - Insertable / AsChangeset structs: writes
//!
//! Scoped tables carry `env_scope`; the repositories always filter on it.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Fixed-width UTC timestamp so TEXT comparison matches time order
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC timestamp for SQLite TEXT columns
pub fn current_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

pub fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse an RFC 3339 / stored timestamp into UTC
pub fn parse_timestamp(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

// ============================================================================
// Record status
// ============================================================================

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_DELETED: &str = "deleted";

// ============================================================================
// Enterprise Models
// ============================================================================

/// Enterprise row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = enterprises)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Enterprise {
    pub id: i32,
    pub env_scope: String,
    pub name: String,
    pub unified_social_credit_code: Option<String>,
    pub legal_representative: Option<String>,
    pub feijiang_wenxin: Option<String>,
    pub clue_in_time: Option<String>,
    pub clue_update_time: Option<String>,
    pub partner_level: Option<String>,
    pub eco_ai_products: Option<String>,
    pub priority: Option<String>,
    pub base: Option<String>,
    pub registered_capital: Option<i64>,
    pub employee_count: Option<i32>,
    pub enterprise_background: Option<String>,
    pub industry: Option<String>,
    pub task_direction: Option<String>,
    pub tech_field: Option<String>,
    pub contact_info: Option<String>,
    pub usage_scenario: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub adoption_depth: Option<String>,
    pub ernie_model_type: Option<String>,
    pub monthly_api_calls: Option<i64>,
    pub clue_stage: Option<String>,
    pub clue_source: Option<String>,
    pub clue_source_detail: Option<String>,
    pub is_powered_by: i32,
    pub pb_auth_info: Option<String>,
    pub award_status: Option<String>,
    pub award_time: Option<String>,
    pub award_location: Option<String>,
    pub cert_expiry_date: Option<String>,
    pub cert_status: Option<String>,
    pub shipping_status: Option<String>,
    pub tracking_number: Option<String>,
    pub ai_implementation_stage: Option<String>,
    pub status: String,
    pub owner_id: Option<i32>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Column values for INSERT and partial UPDATE.
///
/// `None` means "leave as is" on update and "use the column default" on
/// insert, so one struct serves both paths.
#[derive(Debug, Clone, Default, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = enterprises)]
pub struct EnterpriseChanges {
    pub env_scope: Option<String>,
    pub name: Option<String>,
    pub unified_social_credit_code: Option<String>,
    pub legal_representative: Option<String>,
    pub feijiang_wenxin: Option<String>,
    pub clue_in_time: Option<String>,
    pub clue_update_time: Option<String>,
    pub partner_level: Option<String>,
    pub eco_ai_products: Option<String>,
    pub priority: Option<String>,
    pub base: Option<String>,
    pub registered_capital: Option<i64>,
    pub employee_count: Option<i32>,
    pub enterprise_background: Option<String>,
    pub industry: Option<String>,
    pub task_direction: Option<String>,
    pub tech_field: Option<String>,
    pub contact_info: Option<String>,
    pub usage_scenario: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub adoption_depth: Option<String>,
    pub ernie_model_type: Option<String>,
    pub monthly_api_calls: Option<i64>,
    pub clue_stage: Option<String>,
    pub clue_source: Option<String>,
    pub clue_source_detail: Option<String>,
    pub is_powered_by: Option<i32>,
    pub pb_auth_info: Option<String>,
    pub award_status: Option<String>,
    pub award_time: Option<String>,
    pub award_location: Option<String>,
    pub cert_expiry_date: Option<String>,
    pub cert_status: Option<String>,
    pub shipping_status: Option<String>,
    pub tracking_number: Option<String>,
    pub ai_implementation_stage: Option<String>,
    pub status: Option<String>,
    pub owner_id: Option<i32>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl EnterpriseChanges {
    /// Drop columns an update must never touch
    pub fn for_update(mut self) -> Self {
        self.env_scope = None;
        self.status = None;
        self.created_at = None;
        self.created_by = None;
        self
    }
}

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub env_scope: String,
    pub status: String,
    pub first_name: Option<String>,
    pub region: Option<String>,
    pub department: Option<String>,
    pub manager_id: Option<i32>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub env_scope: &'a str,
    pub status: &'a str,
    pub first_name: Option<&'a str>,
    pub region: Option<&'a str>,
    pub department: Option<&'a str>,
    pub manager_id: Option<i32>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Policy Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = policies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Policy {
    pub id: i32,
    pub env_scope: String,
    pub title: Option<String>,
    pub source_url: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub publish_city: Option<String>,
    pub publish_year: Option<i32>,
    pub industry_tags: Option<String>,
    pub mind_map_json: Option<String>,
    pub process_status: String,
    pub error_message: Option<String>,
    pub status: String,
    pub created_by: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = policies)]
pub struct NewPolicy<'a> {
    pub env_scope: &'a str,
    pub source_url: &'a str,
    pub process_status: &'a str,
    pub status: &'a str,
    pub created_by: Option<i32>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Analysis output written when a policy completes
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = policies)]
pub struct PolicyAnalysisChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub publish_city: Option<String>,
    pub publish_year: Option<i32>,
    pub industry_tags: Option<String>,
    pub mind_map_json: Option<String>,
}

// ============================================================================
// Comment / Notification Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Comment {
    pub id: i32,
    pub env_scope: String,
    pub target_type: String,
    pub target_id: i32,
    pub author_id: i32,
    pub content: String,
    pub mentioned_ids: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment<'a> {
    pub env_scope: &'a str,
    pub target_type: &'a str,
    pub target_id: i32,
    pub author_id: i32,
    pub content: &'a str,
    pub mentioned_ids: Option<&'a str>,
    pub created_at: &'a str,
}

/// Comment joined with its author's username
#[derive(Debug, Clone)]
pub struct CommentWithAuthor {
    pub comment: Comment,
    pub author_username: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub notification_type: String,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    pub is_read: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification<'a> {
    pub user_id: i32,
    pub notification_type: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub link: Option<&'a str>,
    pub is_read: i32,
    pub created_at: &'a str,
}

// ============================================================================
// Report Models
// ============================================================================

/// Report metadata; the rendered workbook is read separately
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Report {
    pub id: i32,
    pub env_scope: String,
    pub title: String,
    pub report_type: String,
    pub format: String,
    pub status: String,
    pub description: String,
    pub filters: Option<String>,
    pub file_name: Option<String>,
    pub row_count: Option<i32>,
    pub error_message: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport<'a> {
    pub env_scope: &'a str,
    pub title: &'a str,
    pub report_type: &'a str,
    pub format: &'a str,
    pub status: &'a str,
    pub description: &'a str,
    pub filters: Option<&'a str>,
    pub created_by: Option<i32>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = parse_timestamp("2025-01-01T00:00:00Z").unwrap();
        let later = parse_timestamp("2025-01-01T00:00:00.500+00:00").unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
        assert_eq!(format_timestamp(earlier), "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_update_changes_never_touch_scope() {
        let changes = EnterpriseChanges {
            env_scope: Some("PROD".into()),
            status: Some("deleted".into()),
            name: Some("Acme AI".into()),
            ..Default::default()
        }
        .for_update();
        assert!(changes.env_scope.is_none());
        assert!(changes.status.is_none());
        assert_eq!(changes.name.as_deref(), Some("Acme AI"));
    }
}
