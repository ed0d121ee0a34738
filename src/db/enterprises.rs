//! Enterprise CRUD operations using Diesel with scope isolation
//!
//! Every function takes an `EnvScope`; reads additionally require
//! `status = 'active'` except where noted.

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::Deserialize;

use super::diesel_schema::enterprises;
use super::models::{current_timestamp, Enterprise, EnterpriseChanges, STATUS_ACTIVE, STATUS_DELETED};
use crate::auth::EnvScope;
use crate::error::NexusError;

/// Certificates expiring within this many days count as "expiring soon"
pub const EXPIRY_WINDOW_DAYS: i64 = 90;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 200;

// ============================================================================
// Query Types
// ============================================================================

/// Filters for listing enterprises
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseQuery {
    /// Substring match across name, industry, task direction and tech field
    #[serde(default, alias = "keyword", alias = "searchTerm")]
    pub search: Option<String>,
    #[serde(default, alias = "region")]
    pub base: Option<String>,
    #[serde(default)]
    pub clue_stage: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub partner_level: Option<String>,
    #[serde(default)]
    pub feijiang_wenxin: Option<String>,
    /// `soon` restricts to certificates expiring within the window
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl EnterpriseQuery {
    pub fn expiring_soon(&self) -> bool {
        self.expiry.as_deref() == Some("soon")
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results
#[derive(Debug, Clone)]
pub struct EnterprisePage {
    pub items: Vec<Enterprise>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// Inclusive `[today, today + 90d]` as stored date strings
pub fn expiry_window(today: NaiveDate) -> (String, String) {
    let end = today + chrono::Duration::days(EXPIRY_WINDOW_DAYS);
    (
        today.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    )
}

/// `%term%` with LIKE wildcards in `term` taken literally (escape char `\`)
fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Scoped, active rows matching the query filters (no ordering or paging)
fn filtered<'a>(
    scope: EnvScope,
    query: &'a EnterpriseQuery,
    today: NaiveDate,
) -> enterprises::BoxedQuery<'a, Sqlite> {
    let mut q = enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .into_boxed();

    if let Some(term) = non_empty(&query.search) {
        let pattern = contains_pattern(term);
        q = q.filter(
            enterprises::name
                .nullable()
                .like(pattern.clone())
                .escape('\\')
                .or(enterprises::industry.like(pattern.clone()).escape('\\'))
                .or(enterprises::task_direction.like(pattern.clone()).escape('\\'))
                .or(enterprises::tech_field.like(pattern).escape('\\')),
        );
    }
    if let Some(base) = non_empty(&query.base) {
        q = q.filter(enterprises::base.like(contains_pattern(base)).escape('\\'));
    }
    if let Some(stage) = non_empty(&query.clue_stage) {
        q = q.filter(enterprises::clue_stage.eq(stage.to_string()));
    }
    if let Some(priority) = non_empty(&query.priority) {
        q = q.filter(enterprises::priority.eq(priority.to_string()));
    }
    if let Some(level) = non_empty(&query.partner_level) {
        q = q.filter(enterprises::partner_level.eq(level.to_string()));
    }
    if let Some(tech) = non_empty(&query.feijiang_wenxin) {
        q = q.filter(enterprises::feijiang_wenxin.eq(tech.to_string()));
    }
    if query.expiring_soon() {
        let (start, end) = expiry_window(today);
        q = q
            .filter(enterprises::cert_expiry_date.ge(start))
            .filter(enterprises::cert_expiry_date.le(end));
    }
    q
}

// ============================================================================
// Read Operations
// ============================================================================

/// List enterprises - scoped, filtered, paginated
///
/// Ordered by `updated_at` desc, or by expiry date asc when filtering for
/// certificates that expire soon.
pub fn list_enterprises(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    query: &EnterpriseQuery,
    today: NaiveDate,
) -> Result<EnterprisePage, NexusError> {
    let page = query.page();
    let limit = query.limit();

    let total: i64 = filtered(scope, query, today).count().get_result(conn)?;

    let mut items_query = filtered(scope, query, today);
    items_query = if query.expiring_soon() {
        items_query
            .order(enterprises::cert_expiry_date.asc())
            .then_order_by(enterprises::id.asc())
    } else {
        items_query
            .order(enterprises::updated_at.desc())
            .then_order_by(enterprises::id.desc())
    };

    let offset = page
        .checked_mul(limit)
        .ok_or_else(|| NexusError::field("page", "is too large"))?;
    let items = items_query
        .offset(offset)
        .limit(limit)
        .select(Enterprise::as_select())
        .load(conn)?;

    Ok(EnterprisePage {
        items,
        total,
        page,
        limit,
        total_pages: (total + limit - 1) / limit,
    })
}

/// Get an active enterprise by id - scoped
pub fn get_enterprise(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    id: i32,
) -> Result<Option<Enterprise>, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .filter(enterprises::id.eq(id))
        .select(Enterprise::as_select())
        .first(conn)
        .optional()?)
}

/// Get an enterprise by id in any status - scoped
fn get_enterprise_any_status(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    id: i32,
) -> Result<Option<Enterprise>, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::id.eq(id))
        .select(Enterprise::as_select())
        .first(conn)
        .optional()?)
}

/// Active enterprise with this exact name - scoped
pub fn find_by_name(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    name: &str,
) -> Result<Option<Enterprise>, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .filter(enterprises::name.eq(name))
        .select(Enterprise::as_select())
        .first(conn)
        .optional()?)
}

/// Active enterprise with this credit code - scoped
pub fn find_by_credit_code(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    code: &str,
) -> Result<Option<Enterprise>, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .filter(enterprises::unified_social_credit_code.eq(code))
        .select(Enterprise::as_select())
        .first(conn)
        .optional()?)
}

/// Active rows changed after `since` (all rows when `None`) - scoped
pub fn list_changed_since(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    since: Option<&str>,
) -> Result<Vec<Enterprise>, NexusError> {
    let mut q = enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .into_boxed();
    if let Some(since) = since {
        q = q.filter(enterprises::updated_at.gt(since.to_string()));
    }
    Ok(q.order(enterprises::id.asc())
        .select(Enterprise::as_select())
        .load(conn)?)
}

/// Export listing: search across name/background/scenario/products/contact
pub fn list_for_export(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    search: Option<&str>,
    priority: Option<&str>,
    feijiang_wenxin: Option<&str>,
) -> Result<Vec<Enterprise>, NexusError> {
    let mut q = enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .into_boxed();
    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(term);
        q = q.filter(
            enterprises::name
                .nullable()
                .like(pattern.clone())
                .escape('\\')
                .or(enterprises::enterprise_background.like(pattern.clone()).escape('\\'))
                .or(enterprises::usage_scenario.like(pattern.clone()).escape('\\'))
                .or(enterprises::eco_ai_products.like(pattern.clone()).escape('\\'))
                .or(enterprises::contact_info.like(pattern).escape('\\')),
        );
    }
    if let Some(priority) = priority.filter(|s| !s.is_empty()) {
        q = q.filter(enterprises::priority.eq(priority.to_string()));
    }
    if let Some(tech) = feijiang_wenxin.filter(|s| !s.is_empty()) {
        q = q.filter(enterprises::feijiang_wenxin.eq(tech.to_string()));
    }
    Ok(q.order(enterprises::id.asc())
        .select(Enterprise::as_select())
        .load(conn)?)
}

/// Rows for an intelligence report: created at or after `since` - scoped
pub fn list_for_report(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    since: Option<&str>,
    priority: Option<&str>,
    base: Option<&str>,
) -> Result<Vec<Enterprise>, NexusError> {
    let mut q = enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .into_boxed();
    if let Some(since) = since {
        q = q.filter(enterprises::created_at.ge(since.to_string()));
    }
    if let Some(priority) = priority.filter(|s| !s.is_empty()) {
        q = q.filter(enterprises::priority.eq(priority.to_string()));
    }
    if let Some(base) = base.filter(|s| !s.is_empty()) {
        q = q.filter(enterprises::base.eq(base.to_string()));
    }
    Ok(q.order(enterprises::id.asc())
        .select(Enterprise::as_select())
        .load(conn)?)
}

/// Rows with coordinates, for the map view - scoped
pub fn list_with_coordinates(
    conn: &mut SqliteConnection,
    scope: EnvScope,
) -> Result<Vec<Enterprise>, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .filter(enterprises::longitude.is_not_null())
        .filter(enterprises::latitude.is_not_null())
        .order(enterprises::id.asc())
        .select(Enterprise::as_select())
        .load(conn)?)
}

/// Latest updated active rows - scoped
pub fn recently_updated(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    limit: i64,
) -> Result<Vec<Enterprise>, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .order(enterprises::updated_at.desc())
        .then_order_by(enterprises::id.desc())
        .limit(limit)
        .select(Enterprise::as_select())
        .load(conn)?)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a new active enterprise into `scope`
///
/// Scope, status and timestamps are set here; values in `changes` for those
/// columns are ignored unless `updated_at` is given (sync keeps remote times).
pub fn insert_enterprise(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    mut changes: EnterpriseChanges,
) -> Result<Enterprise, NexusError> {
    let now = current_timestamp();
    changes.env_scope = Some(scope.as_str().to_string());
    changes.status = Some(STATUS_ACTIVE.to_string());
    changes.created_at = Some(now.clone());
    if changes.updated_at.is_none() {
        changes.updated_at = Some(now);
    }
    if changes.is_powered_by.is_none() {
        changes.is_powered_by = Some(0);
    }

    Ok(diesel::insert_into(enterprises::table)
        .values(&changes)
        .returning(Enterprise::as_returning())
        .get_result(conn)?)
}

/// Apply a partial update to an active enterprise - scoped
///
/// `updated_at` defaults to now. Returns `None` when the row is not visible.
pub fn update_enterprise(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    id: i32,
    changes: EnterpriseChanges,
) -> Result<Option<Enterprise>, NexusError> {
    let mut changes = changes.for_update();
    if changes.updated_at.is_none() {
        changes.updated_at = Some(current_timestamp());
    }

    let updated = diesel::update(
        enterprises::table
            .filter(enterprises::env_scope.eq(scope.as_str()))
            .filter(enterprises::status.eq(STATUS_ACTIVE))
            .filter(enterprises::id.eq(id)),
    )
    .set(&changes)
    .execute(conn)?;

    if updated == 0 {
        return Ok(None);
    }
    get_enterprise(conn, scope, id)
}

/// Soft-delete an enterprise - scoped
///
/// Returns `false` only when the id does not exist in this scope. Deleting
/// an already-deleted row succeeds without writing.
pub fn soft_delete_enterprise(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    id: i32,
    actor: Option<&str>,
) -> Result<bool, NexusError> {
    let existing = match get_enterprise_any_status(conn, scope, id)? {
        Some(row) => row,
        None => return Ok(false),
    };
    if existing.status == STATUS_DELETED {
        return Ok(true);
    }

    diesel::update(
        enterprises::table
            .filter(enterprises::env_scope.eq(scope.as_str()))
            .filter(enterprises::id.eq(id)),
    )
    .set((
        enterprises::status.eq(STATUS_DELETED),
        enterprises::updated_at.eq(current_timestamp()),
        enterprises::updated_by.eq(actor),
    ))
    .execute(conn)?;

    Ok(true)
}

/// Count of active rows - scoped
pub fn enterprise_count(conn: &mut SqliteConnection, scope: EnvScope) -> Result<i64, NexusError> {
    Ok(enterprises::table
        .filter(enterprises::env_scope.eq(scope.as_str()))
        .filter(enterprises::status.eq(STATUS_ACTIVE))
        .count()
        .get_result(conn)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::Database;

    pub(crate) fn named(name: &str) -> EnterpriseChanges {
        EnterpriseChanges {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_scope_isolation() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let demo = insert_enterprise(conn, EnvScope::Demo, named("Demo Co"))?;
            let prod = insert_enterprise(conn, EnvScope::Prod, named("Prod Co"))?;

            assert!(get_enterprise(conn, EnvScope::Demo, demo.id)?.is_some());
            assert!(get_enterprise(conn, EnvScope::Demo, prod.id)?.is_none());
            assert!(get_enterprise(conn, EnvScope::Prod, demo.id)?.is_none());

            let listed = list_enterprises(conn, EnvScope::Demo, &EnterpriseQuery::default(), today())?;
            assert_eq!(listed.total, 1);
            assert_eq!(listed.items[0].name, "Demo Co");

            // Writes across scopes do nothing
            let changes = EnterpriseChanges {
                priority: Some("P0".into()),
                ..Default::default()
            };
            assert!(update_enterprise(conn, EnvScope::Prod, demo.id, changes)?.is_none());
            assert!(!soft_delete_enterprise(conn, EnvScope::Prod, demo.id, None)?);
            assert!(get_enterprise(conn, EnvScope::Demo, demo.id)?.is_some());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_soft_delete_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let row = insert_enterprise(conn, EnvScope::Demo, named("Gone Co"))?;
            assert!(soft_delete_enterprise(conn, EnvScope::Demo, row.id, Some("ana"))?);
            let after_first = get_enterprise_any_status(conn, EnvScope::Demo, row.id)?.unwrap();

            assert!(soft_delete_enterprise(conn, EnvScope::Demo, row.id, Some("ana"))?);
            let after_second = get_enterprise_any_status(conn, EnvScope::Demo, row.id)?.unwrap();

            assert_eq!(after_first.status, STATUS_DELETED);
            assert_eq!(after_first.updated_at, after_second.updated_at);
            assert!(get_enterprise(conn, EnvScope::Demo, row.id)?.is_none());
            let listed = list_enterprises(conn, EnvScope::Demo, &EnterpriseQuery::default(), today())?;
            assert_eq!(listed.total, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_expiring_soon_window() {
        let db = Database::open_in_memory().unwrap();
        let t = today();
        db.with_conn(|conn| {
            for (name, expiry) in [
                ("expired", Some(t - chrono::Duration::days(1))),
                ("soon", Some(t + chrono::Duration::days(10))),
                ("later", Some(t + chrono::Duration::days(91))),
                ("none", None),
            ] {
                let changes = EnterpriseChanges {
                    name: Some(name.to_string()),
                    cert_expiry_date: expiry.map(|d| d.format("%Y-%m-%d").to_string()),
                    ..Default::default()
                };
                insert_enterprise(conn, EnvScope::Demo, changes)?;
            }

            let query = EnterpriseQuery {
                expiry: Some("soon".into()),
                ..Default::default()
            };
            let page = list_enterprises(conn, EnvScope::Demo, &query, t)?;
            let names: Vec<&str> = page.items.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["soon"]);
            assert_eq!(page.total, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_expiring_soon_ordered_by_expiry() {
        let db = Database::open_in_memory().unwrap();
        let t = today();
        db.with_conn(|conn| {
            for (name, days) in [("b", 60), ("a", 5), ("c", 30)] {
                let changes = EnterpriseChanges {
                    name: Some(name.to_string()),
                    cert_expiry_date: Some((t + chrono::Duration::days(days)).format("%Y-%m-%d").to_string()),
                    ..Default::default()
                };
                insert_enterprise(conn, EnvScope::Prod, changes)?;
            }
            let query = EnterpriseQuery {
                expiry: Some("soon".into()),
                ..Default::default()
            };
            let page = list_enterprises(conn, EnvScope::Prod, &query, t)?;
            let names: Vec<&str> = page.items.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["a", "c", "b"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_search_and_filters() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_enterprise(
                conn,
                EnvScope::Demo,
                EnterpriseChanges {
                    name: Some("Chengdu Vision".into()),
                    base: Some("成都".into()),
                    tech_field: Some("OCR".into()),
                    clue_stage: Some("ADOPTED".into()),
                    ..Default::default()
                },
            )?;
            insert_enterprise(
                conn,
                EnvScope::Demo,
                EnterpriseChanges {
                    name: Some("Beijing Speech".into()),
                    base: Some("北京".into()),
                    industry: Some("Finance".into()),
                    clue_stage: Some("LEAD".into()),
                    ..Default::default()
                },
            )?;

            let by_tech = EnterpriseQuery {
                search: Some("ocr".into()),
                ..Default::default()
            };
            assert_eq!(list_enterprises(conn, EnvScope::Demo, &by_tech, today())?.total, 1);

            let by_industry = EnterpriseQuery {
                search: Some("finance".into()),
                ..Default::default()
            };
            let page = list_enterprises(conn, EnvScope::Demo, &by_industry, today())?;
            assert_eq!(page.items[0].name, "Beijing Speech");

            let by_base_and_stage = EnterpriseQuery {
                base: Some("成都".into()),
                clue_stage: Some("ADOPTED".into()),
                ..Default::default()
            };
            assert_eq!(list_enterprises(conn, EnvScope::Demo, &by_base_and_stage, today())?.total, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_pagination_and_default_order() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            for i in 0..5 {
                let mut changes = named(&format!("co-{}", i));
                changes.updated_at = Some(format!("2025-01-0{}T00:00:00.000Z", i + 1));
                insert_enterprise(conn, EnvScope::Demo, changes)?;
            }
            let query = EnterpriseQuery {
                page: Some(1),
                limit: Some(2),
                ..Default::default()
            };
            let page = list_enterprises(conn, EnvScope::Demo, &query, today())?;
            assert_eq!(page.total, 5);
            assert_eq!(page.total_pages, 3);
            let names: Vec<&str> = page.items.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["co-2", "co-1"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_huge_page_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let query: EnterpriseQuery =
            serde_urlencoded::from_str("page=9223372036854775807&limit=10").unwrap();
        let err = db
            .with_conn(|conn| list_enterprises(conn, EnvScope::Demo, &query, today()))
            .unwrap_err();
        assert!(matches!(err, NexusError::Validation { ref field, .. } if field == "page"));
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_enterprise(conn, EnvScope::Demo, named("100% AI"))?;
            insert_enterprise(conn, EnvScope::Demo, named("1000 AI"))?;
            insert_enterprise(conn, EnvScope::Demo, named("deep_learn"))?;
            insert_enterprise(conn, EnvScope::Demo, named("deepXlearn"))?;

            let search = |term: &str| EnterpriseQuery {
                search: Some(term.to_string()),
                ..Default::default()
            };
            let names = |page: EnterprisePage| -> Vec<String> {
                page.items.into_iter().map(|e| e.name).collect()
            };
            assert_eq!(names(list_enterprises(conn, EnvScope::Demo, &search("0%"), today())?), vec!["100% AI"]);
            assert_eq!(names(list_enterprises(conn, EnvScope::Demo, &search("p_l"), today())?), vec!["deep_learn"]);

            let exported = list_for_export(conn, EnvScope::Demo, Some("%"), None, None)?;
            assert_eq!(exported.len(), 1);
            Ok(())
        })
        .unwrap();
    }
}
