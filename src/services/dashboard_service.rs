//! Dashboard service - chart-ready aggregates
//!
//! Scoped endpoints read through the caller's scope; the god view is the only
//! unscoped read in the service and requires `ViewGlobalDashboard`.

use chrono::Utc;

use crate::auth::{Capability, EnvScope, RequestContext};
use crate::db::dashboard::{self, GlobalTotals, GroupCount, ScopeStats};
use crate::db::enterprises;
use crate::db::models::Enterprise;
use crate::db::Database;
use crate::error::NexusError;

const RECENT_ACTIVITY_LIMIT: i64 = 10;

/// `new / total * 100` as `"x.xx%"`, `"0%"` for an empty scope
pub fn growth_rate(new_last_30_days: i64, total: i64) -> String {
    if total <= 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", new_last_30_days as f64 / total as f64 * 100.0)
}

/// Industry distribution and monthly creation trend
#[derive(Debug, Clone, Default)]
pub struct Charts {
    pub industry_distribution: Vec<GroupCount>,
    pub monthly_trend: Vec<GroupCount>,
}

/// One line of the activity feed
#[derive(Debug, Clone)]
pub struct Activity {
    pub enterprise: Enterprise,
    pub activity_type: &'static str,
    pub description: String,
}

/// Unscoped totals plus per-scope stats
#[derive(Debug, Clone)]
pub struct GodView {
    pub totals: GlobalTotals,
    pub scopes: Vec<(EnvScope, ScopeStats)>,
}

pub struct DashboardService {
    db: Database,
}

impl DashboardService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn stats(&self, ctx: &RequestContext) -> Result<ScopeStats, NexusError> {
        let today = Utc::now().date_naive();
        self.db.with_conn(|conn| dashboard::scope_stats(conn, ctx.scope, today))
    }

    pub fn charts(&self, ctx: &RequestContext) -> Result<Charts, NexusError> {
        self.db.with_conn(|conn| {
            Ok(Charts {
                industry_distribution: dashboard::industry_distribution(conn, ctx.scope)?,
                monthly_trend: dashboard::monthly_trend(conn, ctx.scope)?,
            })
        })
    }

    /// Latest updated enterprises as an activity feed
    pub fn recent_activities(&self, ctx: &RequestContext) -> Result<Vec<Activity>, NexusError> {
        let rows = self.db.with_conn(|conn| {
            enterprises::recently_updated(conn, ctx.scope, RECENT_ACTIVITY_LIMIT)
        })?;
        Ok(rows
            .into_iter()
            .map(|enterprise| Activity {
                description: format!("更新了{}的信息", enterprise.name),
                activity_type: "企业信息更新",
                enterprise,
            })
            .collect())
    }

    /// Unscoped totals and every scope's stats
    pub fn god_view(&self, ctx: &RequestContext) -> Result<GodView, NexusError> {
        ctx.require(Capability::ViewGlobalDashboard)?;
        let today = Utc::now().date_naive();
        self.db.with_conn(|conn| {
            let totals = dashboard::global_totals(conn)?;
            let scopes = EnvScope::ALL
                .iter()
                .map(|scope| dashboard::scope_stats(conn, *scope, today).map(|s| (*scope, s)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(GodView { totals, scopes })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RolePolicy;
    use crate::db::enterprises::{insert_enterprise, tests::named};

    #[test]
    fn test_growth_rate_format() {
        assert_eq!(growth_rate(0, 0), "0%");
        assert_eq!(growth_rate(1, 3), "33.33%");
        assert_eq!(growth_rate(2, 2), "100.00%");
    }

    #[test]
    fn test_god_view_requires_capability() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_enterprise(conn, EnvScope::Demo, named("d"))?;
            insert_enterprise(conn, EnvScope::Prod, named("p"))?;
            Ok(())
        })
        .unwrap();
        let svc = DashboardService::new(db);
        let roles = RolePolicy::builtin();

        let analyst = RequestContext::new(2, "an", "analyst", EnvScope::Demo, roles.capabilities_for("analyst"));
        assert!(matches!(svc.god_view(&analyst), Err(NexusError::Forbidden(_))));

        let cortex = RequestContext::new(3, "cx", "CORTEX", EnvScope::Demo, roles.capabilities_for("CORTEX"));
        let view = svc.god_view(&cortex).unwrap();
        assert_eq!(view.totals.enterprises, 2);
        assert_eq!(view.scopes.len(), 2);
        assert!(view.scopes.iter().all(|(_, s)| s.summary.total == 1));

        let feed = svc.recent_activities(&analyst).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].description, "更新了d的信息");
    }
}
