//! View types for the HTTP API boundary
//!
//! These types use camelCase serialization for the TypeScript dashboard.
//! Row types in `db::models` stay snake_case.
//!
//! - Services return rows and domain structs
//! - The HTTP layer converts them to views
//! - ts-rs generates the TypeScript definitions from the views
//!
//! SQLite stores booleans as integers and JSON as TEXT; views expose real
//! booleans and parsed JSON.

use serde::Serialize;
use serde_json::Value;
use ts_rs::TS;

use crate::db::dashboard::{GlobalTotals, GroupCount, ScopeStats, SummaryCounts};
use crate::db::enterprises::EnterprisePage;
use crate::db::models::{CommentWithAuthor, Enterprise, Notification, Policy, Report, User};
use crate::db::reports::ReportCounts;
use crate::services::auth_service::LoginResult;
use crate::services::dashboard_service::{growth_rate, Activity, Charts, GodView};
use crate::services::jobs::JobSnapshot;
use crate::services::policy_service::AnalysisAccepted;
use crate::services::sync_service::{ExportEnvelope, ImportReport, SyncConflict, ValidationReport};

fn parse_json_opt(json_str: &Option<String>) -> Option<Value> {
    json_str.as_ref().and_then(|s| serde_json::from_str(s).ok())
}

// ============================================================================
// Enterprise Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct EnterpriseView {
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
    pub is_powered_by: bool,
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

impl From<Enterprise> for EnterpriseView {
    fn from(e: Enterprise) -> Self {
        Self {
            id: e.id,
            env_scope: e.env_scope,
            name: e.name,
            unified_social_credit_code: e.unified_social_credit_code,
            legal_representative: e.legal_representative,
            feijiang_wenxin: e.feijiang_wenxin,
            clue_in_time: e.clue_in_time,
            clue_update_time: e.clue_update_time,
            partner_level: e.partner_level,
            eco_ai_products: e.eco_ai_products,
            priority: e.priority,
            base: e.base,
            registered_capital: e.registered_capital,
            employee_count: e.employee_count,
            enterprise_background: e.enterprise_background,
            industry: e.industry,
            task_direction: e.task_direction,
            tech_field: e.tech_field,
            contact_info: e.contact_info,
            usage_scenario: e.usage_scenario,
            longitude: e.longitude,
            latitude: e.latitude,
            adoption_depth: e.adoption_depth,
            ernie_model_type: e.ernie_model_type,
            monthly_api_calls: e.monthly_api_calls,
            clue_stage: e.clue_stage,
            clue_source: e.clue_source,
            clue_source_detail: e.clue_source_detail,
            is_powered_by: e.is_powered_by != 0,
            pb_auth_info: e.pb_auth_info,
            award_status: e.award_status,
            award_time: e.award_time,
            award_location: e.award_location,
            cert_expiry_date: e.cert_expiry_date,
            cert_status: e.cert_status,
            shipping_status: e.shipping_status,
            tracking_number: e.tracking_number,
            ai_implementation_stage: e.ai_implementation_stage,
            status: e.status,
            owner_id: e.owner_id,
            created_by: e.created_by,
            updated_by: e.updated_by,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

impl From<&Enterprise> for EnterpriseView {
    fn from(e: &Enterprise) -> Self {
        Self::from(e.clone())
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct EnterprisePageView {
    pub items: Vec<EnterpriseView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl From<EnterprisePage> for EnterprisePageView {
    fn from(p: EnterprisePage) -> Self {
        Self {
            items: p.items.into_iter().map(EnterpriseView::from).collect(),
            total: p.total,
            page: p.page,
            limit: p.limit,
            total_pages: p.total_pages,
        }
    }
}

/// Marker for the map view
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct MapPointView {
    pub id: i32,
    pub name: String,
    pub base: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub priority: Option<String>,
}

impl From<Enterprise> for MapPointView {
    fn from(e: Enterprise) -> Self {
        Self {
            id: e.id,
            name: e.name,
            base: e.base,
            longitude: e.longitude,
            latitude: e.latitude,
            priority: e.priority,
        }
    }
}

// ============================================================================
// Dashboard Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct SummaryView {
    pub total: i64,
    pub p0: i64,
    pub feijiang: i64,
    pub wenxin: i64,
}

impl From<SummaryCounts> for SummaryView {
    fn from(s: SummaryCounts) -> Self {
        Self {
            total: s.total,
            p0: s.p0,
            feijiang: s.feijiang,
            wenxin: s.wenxin,
        }
    }
}

/// Chart slice
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct NameValueView {
    pub name: String,
    pub value: i64,
}

impl From<GroupCount> for NameValueView {
    fn from(g: GroupCount) -> Self {
        Self {
            name: g.key,
            value: g.count,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct MonthCountView {
    pub month: String,
    pub count: i64,
}

fn groups(rows: Vec<GroupCount>) -> Vec<NameValueView> {
    rows.into_iter().map(NameValueView::from).collect()
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct StatsView {
    pub total: i64,
    pub p0: i64,
    pub feijiang: i64,
    pub wenxin: i64,
    pub expiring_soon: i64,
    pub new_last_30_days: i64,
    pub growth_rate: String,
    pub by_clue_stage: Vec<NameValueView>,
    pub by_partner_level: Vec<NameValueView>,
    pub by_base: Vec<NameValueView>,
    pub by_priority: Vec<NameValueView>,
    pub by_feijiang_wenxin: Vec<NameValueView>,
}

impl From<ScopeStats> for StatsView {
    fn from(s: ScopeStats) -> Self {
        Self {
            growth_rate: growth_rate(s.new_last_30_days, s.summary.total),
            total: s.summary.total,
            p0: s.summary.p0,
            feijiang: s.summary.feijiang,
            wenxin: s.summary.wenxin,
            expiring_soon: s.expiring_soon,
            new_last_30_days: s.new_last_30_days,
            by_clue_stage: groups(s.by_clue_stage),
            by_partner_level: groups(s.by_partner_level),
            by_base: groups(s.by_base),
            by_priority: groups(s.by_priority),
            by_feijiang_wenxin: groups(s.by_feijiang_wenxin),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ChartsView {
    pub industry_distribution: Vec<NameValueView>,
    pub monthly_trend: Vec<MonthCountView>,
}

impl From<Charts> for ChartsView {
    fn from(c: Charts) -> Self {
        Self {
            industry_distribution: groups(c.industry_distribution),
            monthly_trend: c
                .monthly_trend
                .into_iter()
                .map(|g| MonthCountView {
                    month: g.key,
                    count: g.count,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ActivityView {
    pub id: i32,
    pub enterprise_name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub description: String,
    pub updated_by: Option<String>,
    pub updated_at: String,
}

impl From<Activity> for ActivityView {
    fn from(a: Activity) -> Self {
        Self {
            id: a.enterprise.id,
            enterprise_name: a.enterprise.name,
            activity_type: a.activity_type.to_string(),
            description: a.description,
            updated_by: a.enterprise.updated_by,
            updated_at: a.enterprise.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct GlobalTotalsView {
    pub users: i64,
    pub enterprises: i64,
    pub policies: i64,
}

impl From<GlobalTotals> for GlobalTotalsView {
    fn from(t: GlobalTotals) -> Self {
        Self {
            users: t.users,
            enterprises: t.enterprises,
            policies: t.policies,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ScopeStatsView {
    pub env_scope: String,
    pub stats: StatsView,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct GodViewView {
    pub totals: GlobalTotalsView,
    pub scopes: Vec<ScopeStatsView>,
}

impl From<GodView> for GodViewView {
    fn from(g: GodView) -> Self {
        Self {
            totals: g.totals.into(),
            scopes: g
                .scopes
                .into_iter()
                .map(|(scope, stats)| ScopeStatsView {
                    env_scope: scope.as_str().to_string(),
                    stats: stats.into(),
                })
                .collect(),
        }
    }
}

// ============================================================================
// Policy Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct PolicyView {
    pub id: i32,
    pub env_scope: String,
    pub title: Option<String>,
    pub source_url: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub publish_city: Option<String>,
    pub publish_year: Option<i32>,
    pub industry_tags: Option<String>,
    /// Parsed mind map (was mind_map_json in storage)
    pub mind_map: Option<Value>,
    pub process_status: String,
    pub error_message: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Policy> for PolicyView {
    fn from(p: Policy) -> Self {
        Self {
            mind_map: parse_json_opt(&p.mind_map_json),
            id: p.id,
            env_scope: p.env_scope,
            title: p.title,
            source_url: p.source_url,
            content: p.content,
            summary: p.summary,
            publish_city: p.publish_city,
            publish_year: p.publish_year,
            industry_tags: p.industry_tags,
            process_status: p.process_status,
            error_message: p.error_message,
            created_by: p.created_by,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct AnalysisAcceptedView {
    pub policy_id: i32,
    pub job_id: String,
    pub status: String,
}

impl From<AnalysisAccepted> for AnalysisAcceptedView {
    fn from(a: AnalysisAccepted) -> Self {
        Self {
            policy_id: a.policy_id,
            job_id: a.job_id,
            status: a.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct JobView {
    pub job_id: String,
    pub policy_id: i32,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

impl From<JobSnapshot> for JobView {
    fn from(j: JobSnapshot) -> Self {
        Self {
            job_id: j.job_id,
            policy_id: j.policy_id,
            status: j.status,
            started_at: j.started_at,
            finished_at: j.finished_at,
            error: j.error,
        }
    }
}

// ============================================================================
// Report Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ReportView {
    pub id: i32,
    pub env_scope: String,
    pub title: String,
    /// Period, serialized as `type`
    #[serde(rename = "type")]
    pub report_type: String,
    pub format: String,
    pub status: String,
    pub description: String,
    /// Parsed filters (was filters JSON text in storage)
    pub filters: Option<Value>,
    pub file_path: Option<String>,
    pub row_count: Option<i32>,
    pub error_message: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Report> for ReportView {
    fn from(r: Report) -> Self {
        Self {
            filters: parse_json_opt(&r.filters),
            id: r.id,
            env_scope: r.env_scope,
            title: r.title,
            report_type: r.report_type,
            format: r.format,
            status: r.status,
            description: r.description,
            file_path: r.file_name,
            row_count: r.row_count,
            error_message: r.error_message,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ReportStatsView {
    pub total: i64,
    pub ready: i64,
}

impl From<ReportCounts> for ReportStatsView {
    fn from(c: ReportCounts) -> Self {
        Self {
            total: c.total,
            ready: c.ready,
        }
    }
}

// ============================================================================
// Sync Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ExportMetadataView {
    pub version: String,
    pub export_timestamp: String,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ExportEnvelopeView {
    pub metadata: ExportMetadataView,
    pub payload: Vec<EnterpriseView>,
}

impl From<ExportEnvelope> for ExportEnvelopeView {
    fn from(e: ExportEnvelope) -> Self {
        Self {
            metadata: ExportMetadataView {
                version: e.metadata.version.to_string(),
                export_timestamp: e.metadata.export_timestamp,
                record_count: e.metadata.record_count,
            },
            payload: e.payload.into_iter().map(EnterpriseView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct SyncConflictView {
    pub index: usize,
    pub local_id: i32,
    pub name: String,
    pub local_updated_at: String,
    pub remote_updated_at: Option<String>,
}

impl From<SyncConflict> for SyncConflictView {
    fn from(c: SyncConflict) -> Self {
        Self {
            index: c.index,
            local_id: c.local_id,
            name: c.name,
            local_updated_at: c.local_updated_at,
            remote_updated_at: c.remote_updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ImportReportView {
    pub updated: usize,
    pub created: usize,
    pub skipped: usize,
    pub conflicts: Vec<SyncConflictView>,
}

impl From<ImportReport> for ImportReportView {
    fn from(r: ImportReport) -> Self {
        Self {
            updated: r.updated,
            created: r.created,
            skipped: r.skipped,
            conflicts: r.conflicts.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct ValidationReportView {
    pub to_update: usize,
    pub to_create: usize,
    pub conflicts: Vec<SyncConflictView>,
}

impl From<ValidationReport> for ValidationReportView {
    fn from(r: ValidationReport) -> Self {
        Self {
            to_update: r.to_update,
            to_create: r.to_create,
            conflicts: r.conflicts.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// User / Comment Views
// ============================================================================

/// User without the password hash
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct UserView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub env_scope: String,
    pub status: String,
    pub first_name: Option<String>,
    pub region: Option<String>,
    pub department: Option<String>,
    pub manager_id: Option<i32>,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            env_scope: u.env_scope,
            status: u.status,
            first_name: u.first_name,
            region: u.region,
            department: u.department,
            manager_id: u.manager_id,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct LoginView {
    pub access_token: String,
    pub user: UserView,
}

impl From<LoginResult> for LoginView {
    fn from(r: LoginResult) -> Self {
        Self {
            access_token: r.access_token,
            user: r.user.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct CommentView {
    pub id: i32,
    pub target_type: String,
    pub target_id: i32,
    pub author_id: i32,
    pub author_username: String,
    pub content: String,
    pub mentioned_ids: Vec<i32>,
    pub created_at: String,
}

impl From<CommentWithAuthor> for CommentView {
    fn from(c: CommentWithAuthor) -> Self {
        let mentioned_ids = c
            .comment
            .mentioned_ids
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        Self {
            id: c.comment.id,
            target_type: c.comment.target_type,
            target_id: c.comment.target_id,
            author_id: c.comment.author_id,
            author_username: c.author_username,
            content: c.comment.content,
            mentioned_ids,
            created_at: c.comment.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct NotificationView {
    pub id: i32,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type,
            title: n.title,
            content: n.content,
            link: n.link,
            is_read: n.is_read != 0,
            created_at: n.created_at,
        }
    }
}

// ============================================================================
// System Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct HealthView {
    pub status: String,
    pub version: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../frontend/src/generated/")]
pub struct BackupView {
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Comment;

    #[test]
    fn test_policy_view_parses_mind_map() {
        let policy = Policy {
            id: 1,
            env_scope: "DEMO".into(),
            title: Some("t".into()),
            source_url: "https://example.com".into(),
            content: None,
            summary: None,
            publish_city: None,
            publish_year: Some(2024),
            industry_tags: None,
            mind_map_json: Some(r#"{"nodes":[{"id":"a"}],"links":[]}"#.into()),
            process_status: "COMPLETED".into(),
            error_message: None,
            status: "active".into(),
            created_by: None,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        };
        let json = serde_json::to_value(PolicyView::from(policy)).unwrap();
        assert_eq!(json["mindMap"]["nodes"][0]["id"], "a");
        assert_eq!(json["processStatus"], "COMPLETED");
        assert!(json.get("mind_map_json").is_none());
    }

    #[test]
    fn test_report_view_wire_names() {
        let view = ReportView::from(Report {
            id: 4,
            env_scope: "DEMO".into(),
            title: "周报".into(),
            report_type: "WEEKLY".into(),
            format: "EXCEL".into(),
            status: "ready".into(),
            description: String::new(),
            filters: Some(r#"{"priority":"P0"}"#.into()),
            file_name: Some("INTEL_1.xlsx".into()),
            row_count: Some(2),
            error_message: None,
            created_by: Some(1),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "WEEKLY");
        assert_eq!(json["filePath"], "INTEL_1.xlsx");
        assert_eq!(json["filters"]["priority"], "P0");
    }

    #[test]
    fn test_comment_view_decodes_mentions() {
        let view = CommentView::from(CommentWithAuthor {
            comment: Comment {
                id: 3,
                env_scope: "PROD".into(),
                target_type: "POLICY".into(),
                target_id: 9,
                author_id: 1,
                content: "@bob".into(),
                mentioned_ids: Some("[2,5]".into()),
                created_at: "2024-01-01T00:00:00.000Z".into(),
            },
            author_username: "ana".into(),
        });
        assert_eq!(view.mentioned_ids, vec![2, 5]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["authorUsername"], "ana");
    }

    #[test]
    fn test_stats_view_growth_rate() {
        let stats = ScopeStats {
            summary: SummaryCounts {
                total: 4,
                p0: 1,
                feijiang: 2,
                wenxin: 1,
            },
            expiring_soon: 0,
            new_last_30_days: 1,
            by_clue_stage: vec![GroupCount {
                key: "LEAD".into(),
                count: 4,
            }],
            by_partner_level: vec![],
            by_base: vec![],
            by_priority: vec![],
            by_feijiang_wenxin: vec![],
        };
        let json = serde_json::to_value(StatsView::from(stats)).unwrap();
        assert_eq!(json["growthRate"], "25.00%");
        assert_eq!(json["byClueStage"][0]["name"], "LEAD");
        assert_eq!(json["newLast30Days"], 1);
    }
}
