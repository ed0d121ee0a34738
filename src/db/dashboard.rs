//! Grouped aggregate queries over enterprises
//!
//! Every grouping runs as `GROUP BY` + `COUNT(*)` in SQLite; rows with a
//! null grouping key are left out.

use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};

use super::diesel_schema::{enterprises, policies, users};
use super::enterprises::expiry_window;
use super::models::{format_timestamp, STATUS_ACTIVE};
use crate::auth::EnvScope;
use crate::error::NexusError;

/// Tech family values stored in `feijiang_wenxin`
pub const FEIJIANG: &str = "飞桨";
pub const WENXIN: &str = "文心";

/// One bucket of a grouped count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}

/// Headline counts for one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    pub total: i64,
    pub p0: i64,
    pub feijiang: i64,
    pub wenxin: i64,
}

/// Full grouped statistics for one scope
#[derive(Debug, Clone, Default)]
pub struct ScopeStats {
    pub summary: SummaryCounts,
    pub expiring_soon: i64,
    pub new_last_30_days: i64,
    pub by_clue_stage: Vec<GroupCount>,
    pub by_partner_level: Vec<GroupCount>,
    pub by_base: Vec<GroupCount>,
    pub by_priority: Vec<GroupCount>,
    pub by_feijiang_wenxin: Vec<GroupCount>,
}

/// Unscoped totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalTotals {
    pub users: i64,
    pub enterprises: i64,
    pub policies: i64,
}

#[derive(QueryableByName)]
struct MonthRow {
    #[diesel(sql_type = Text)]
    month: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn into_groups(rows: Vec<(Option<String>, i64)>) -> Vec<GroupCount> {
    let mut groups: Vec<GroupCount> = rows
        .into_iter()
        .filter_map(|(key, count)| key.map(|key| GroupCount { key, count }))
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    groups
}

macro_rules! grouped_count {
    ($conn:expr, $scope:expr, $column:expr) => {
        enterprises::table
            .filter(enterprises::env_scope.eq($scope.as_str()))
            .filter(enterprises::status.eq(STATUS_ACTIVE))
            .filter($column.is_not_null())
            .group_by($column)
            .select(($column, diesel::dsl::count_star()))
            .load::<(Option<String>, i64)>($conn)
            .map(into_groups)
    };
}

macro_rules! scoped_count {
    ($conn:expr, $scope:expr, $predicate:expr) => {
        enterprises::table
            .filter(enterprises::env_scope.eq($scope.as_str()))
            .filter(enterprises::status.eq(STATUS_ACTIVE))
            .filter($predicate)
            .count()
            .get_result::<i64>($conn)
    };
}

// ============================================================================
// Scoped Aggregates
// ============================================================================

/// Total, P0, and per-tech-family counts
pub fn summary_counts(conn: &mut SqliteConnection, scope: EnvScope) -> Result<SummaryCounts, NexusError> {
    Ok(SummaryCounts {
        total: super::enterprises::enterprise_count(conn, scope)?,
        p0: scoped_count!(conn, scope, enterprises::priority.eq("P0"))?,
        feijiang: scoped_count!(conn, scope, enterprises::feijiang_wenxin.eq(FEIJIANG))?,
        wenxin: scoped_count!(conn, scope, enterprises::feijiang_wenxin.eq(WENXIN))?,
    })
}

/// Certificates expiring within the window starting `today`
pub fn expiring_soon_count(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    today: NaiveDate,
) -> Result<i64, NexusError> {
    let (start, end) = expiry_window(today);
    Ok(scoped_count!(
        conn,
        scope,
        enterprises::cert_expiry_date.ge(start).and(enterprises::cert_expiry_date.le(end))
    )?)
}

/// Rows created in the last `days` days
pub fn new_since_count(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    days: i64,
) -> Result<i64, NexusError> {
    let since = format_timestamp(Utc::now() - Duration::days(days));
    Ok(scoped_count!(conn, scope, enterprises::created_at.ge(since))?)
}

/// All grouped statistics for one scope
pub fn scope_stats(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    today: NaiveDate,
) -> Result<ScopeStats, NexusError> {
    Ok(ScopeStats {
        summary: summary_counts(conn, scope)?,
        expiring_soon: expiring_soon_count(conn, scope, today)?,
        new_last_30_days: new_since_count(conn, scope, 30)?,
        by_clue_stage: grouped_count!(conn, scope, enterprises::clue_stage)?,
        by_partner_level: grouped_count!(conn, scope, enterprises::partner_level)?,
        by_base: grouped_count!(conn, scope, enterprises::base)?,
        by_priority: grouped_count!(conn, scope, enterprises::priority)?,
        by_feijiang_wenxin: grouped_count!(conn, scope, enterprises::feijiang_wenxin)?,
    })
}

/// Industry distribution, largest first
pub fn industry_distribution(
    conn: &mut SqliteConnection,
    scope: EnvScope,
) -> Result<Vec<GroupCount>, NexusError> {
    Ok(grouped_count!(conn, scope, enterprises::industry)?)
}

/// Enterprises created per `YYYY-MM`, oldest month first
pub fn monthly_trend(
    conn: &mut SqliteConnection,
    scope: EnvScope,
) -> Result<Vec<GroupCount>, NexusError> {
    let rows: Vec<MonthRow> = diesel::sql_query(
        "SELECT substr(created_at, 1, 7) AS month, COUNT(*) AS count \
         FROM enterprises WHERE env_scope = ? AND status = ? \
         GROUP BY month ORDER BY month ASC",
    )
    .bind::<Text, _>(scope.as_str())
    .bind::<Text, _>(STATUS_ACTIVE)
    .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|r| GroupCount {
            key: r.month,
            count: r.count,
        })
        .collect())
}

// ============================================================================
// Unscoped Aggregates (admin only)
// ============================================================================

/// Totals across every scope
pub fn global_totals(conn: &mut SqliteConnection) -> Result<GlobalTotals, NexusError> {
    Ok(GlobalTotals {
        users: users::table
            .filter(users::status.eq(STATUS_ACTIVE))
            .count()
            .get_result(conn)?,
        enterprises: enterprises::table
            .filter(enterprises::status.eq(STATUS_ACTIVE))
            .count()
            .get_result(conn)?,
        policies: policies::table
            .filter(policies::status.eq(STATUS_ACTIVE))
            .count()
            .get_result(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enterprises::insert_enterprise;
    use crate::db::models::EnterpriseChanges;
    use crate::db::Database;

    fn seed(conn: &mut SqliteConnection, scope: EnvScope, name: &str, priority: &str, tech: &str, stage: Option<&str>) {
        insert_enterprise(
            conn,
            scope,
            EnterpriseChanges {
                name: Some(name.into()),
                priority: Some(priority.into()),
                feijiang_wenxin: Some(tech.into()),
                clue_stage: stage.map(String::from),
                base: Some("成都".into()),
                industry: Some("制造".into()),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_scope_stats_grouping() {
        let db = Database::open_in_memory().unwrap();
        let today = Utc::now().date_naive();
        db.with_conn(|conn| {
            seed(conn, EnvScope::Demo, "a", "P0", FEIJIANG, Some("LEAD"));
            seed(conn, EnvScope::Demo, "b", "P1", WENXIN, Some("LEAD"));
            seed(conn, EnvScope::Demo, "c", "P0", FEIJIANG, None);
            seed(conn, EnvScope::Prod, "d", "P0", FEIJIANG, Some("ADOPTED"));

            let stats = scope_stats(conn, EnvScope::Demo, today)?;
            assert_eq!(
                stats.summary,
                SummaryCounts { total: 3, p0: 2, feijiang: 2, wenxin: 1 }
            );
            assert_eq!(stats.new_last_30_days, 3);
            assert_eq!(
                stats.by_clue_stage,
                vec![GroupCount { key: "LEAD".into(), count: 2 }]
            );
            assert_eq!(stats.by_priority[0], GroupCount { key: "P0".into(), count: 2 });
            assert_eq!(stats.by_base[0].count, 3);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_expiry_warning_count() {
        let db = Database::open_in_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        db.with_conn(|conn| {
            let expiring = |name: &str, date: Option<NaiveDate>| EnterpriseChanges {
                name: Some(name.into()),
                cert_expiry_date: date.map(|d| d.format("%Y-%m-%d").to_string()),
                ..Default::default()
            };
            insert_enterprise(conn, EnvScope::Demo, expiring("expired", Some(today - Duration::days(1))))?;
            insert_enterprise(conn, EnvScope::Demo, expiring("soon", Some(today + Duration::days(10))))?;
            insert_enterprise(conn, EnvScope::Demo, expiring("later", Some(today + Duration::days(91))))?;
            insert_enterprise(conn, EnvScope::Demo, expiring("none", None))?;
            insert_enterprise(conn, EnvScope::Prod, expiring("other scope", Some(today + Duration::days(10))))?;

            assert_eq!(expiring_soon_count(conn, EnvScope::Demo, today)?, 1);
            assert_eq!(scope_stats(conn, EnvScope::Demo, today)?.expiring_soon, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_monthly_trend_and_global_totals() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn, EnvScope::Demo, "a", "P2", FEIJIANG, None);
            seed(conn, EnvScope::Prod, "b", "P2", WENXIN, None);

            let trend = monthly_trend(conn, EnvScope::Demo)?;
            assert_eq!(trend.len(), 1);
            assert_eq!(trend[0].key.len(), 7);
            assert_eq!(trend[0].count, 1);

            let industries = industry_distribution(conn, EnvScope::Prod)?;
            assert_eq!(industries, vec![GroupCount { key: "制造".into(), count: 1 }]);

            let totals = global_totals(conn)?;
            assert_eq!(totals.enterprises, 2);
            assert_eq!(totals.users, 0);
            Ok(())
        })
        .unwrap();
    }
}
