//! Intelligence reports
//!
//! ```text
//! generate ─▶ row `generating` ─▶ blocking task
//!                                  │ select rows in the period window
//!                                  │ render the INTEL workbook
//!                                  ▼ ready(file) | failed(error)
//! ```
//!
//! The workbook is kept in the database next to its report row, so a
//! snapshot carries the reports with it.

use std::sync::Arc;

use chrono::{DateTime, Days, Months, Utc};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::auth::{EnvScope, RequestContext};
use crate::db::enterprises;
use crate::db::models::{format_timestamp, Enterprise, Report};
use crate::db::reports::{self, report_status, QueuedReport, ReportCounts};
use crate::db::Database;
use crate::error::NexusError;

use super::events::{EventBus, NexusEvent};

const SHEET_NAME: &str = "INTEL";
const HEADERS: [&str; 6] = ["ID", "企业名称", "战力等级", "核心技术", "月均API", "所属地区"];
const HEADER_FONT_SIZE: f64 = 12.0;
const PLACEHOLDER: &str = "-";
const MAX_TITLE_CHARS: usize = 200;

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Time window a report covers, ending now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Yearly => "YEARLY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, NexusError> {
        match value.trim() {
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "QUARTERLY" => Ok(Self::Quarterly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(NexusError::field(
                "type",
                format!("'{}' is not one of WEEKLY, MONTHLY, QUARTERLY, YEARLY", other),
            )),
        }
    }

    /// Start of the window ending at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Weekly => now.checked_sub_days(Days::new(7)),
            Self::Monthly => now.checked_sub_months(Months::new(1)),
            Self::Quarterly => now.checked_sub_months(Months::new(3)),
            Self::Yearly => now.checked_sub_months(Months::new(12)),
        }
    }
}

/// Optional narrowing on top of the period window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl ReportFilters {
    fn is_empty(&self) -> bool {
        self.priority.is_none() && self.base.is_none()
    }
}

/// Body of `POST /api/reports`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub title: String,
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Option<ReportFilters>,
}

/// A ready workbook with its download name
#[derive(Debug, Clone)]
pub struct ReportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

fn xlsx_error(err: XlsxError) -> NexusError {
    NexusError::Internal(format!("report workbook failed: {}", err))
}

fn text_or_placeholder(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or(PLACEHOLDER)
}

/// Render the INTEL sheet for `rows`
fn render_workbook(rows: &[Enterprise]) -> Result<Vec<u8>, NexusError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold().set_font_size(HEADER_FONT_SIZE);
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(xlsx_error)?;

    for (col, title) in HEADERS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, &header)
            .map_err(xlsx_error)?;
    }

    for (index, e) in rows.iter().enumerate() {
        let row = index as u32 + 1;
        sheet.write_number(row, 0, f64::from(e.id)).map_err(xlsx_error)?;
        sheet.write_string(row, 1, e.name.as_str()).map_err(xlsx_error)?;
        sheet
            .write_string(row, 2, text_or_placeholder(&e.priority))
            .map_err(xlsx_error)?;
        sheet
            .write_string(row, 3, text_or_placeholder(&e.feijiang_wenxin))
            .map_err(xlsx_error)?;
        sheet
            .write_number(row, 4, e.monthly_api_calls.unwrap_or(0) as f64)
            .map_err(xlsx_error)?;
        sheet
            .write_string(row, 5, text_or_placeholder(&e.base))
            .map_err(xlsx_error)?;
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

pub struct ReportService {
    db: Database,
    events: Arc<EventBus>,
}

impl ReportService {
    pub fn new(db: Database, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub fn list(&self, ctx: &RequestContext) -> Result<Vec<Report>, NexusError> {
        self.db.with_conn(|conn| reports::list_reports(conn, ctx.scope))
    }

    pub fn get(&self, ctx: &RequestContext, id: i32) -> Result<Report, NexusError> {
        self.db
            .with_conn(|conn| reports::get_report(conn, ctx.scope, id))?
            .ok_or_else(|| NexusError::NotFound(format!("report {}", id)))
    }

    pub fn stats(&self, ctx: &RequestContext) -> Result<ReportCounts, NexusError> {
        self.db.with_conn(|conn| reports::count_reports(conn, ctx.scope))
    }

    /// Workbook of a ready report, named after its title
    pub fn download(&self, ctx: &RequestContext, id: i32) -> Result<ReportFile, NexusError> {
        let report = self.get(ctx, id)?;
        if report.status != report_status::READY {
            return Err(NexusError::NotFound(format!(
                "report {} is {}, no file yet",
                id, report.status
            )));
        }
        let bytes = self
            .db
            .with_conn(|conn| reports::get_report_file(conn, ctx.scope, id))?
            .ok_or_else(|| NexusError::NotFound(format!("report {} file", id)))?;
        Ok(ReportFile {
            filename: format!("{}.xlsx", report.title),
            bytes,
        })
    }

    pub fn delete(&self, ctx: &RequestContext, id: i32) -> Result<(), NexusError> {
        if self.db.with_conn(|conn| reports::delete_report(conn, ctx.scope, id))? {
            info!(report_id = id, env = %ctx.scope, "Report deleted");
            Ok(())
        } else {
            Err(NexusError::NotFound(format!("report {}", id)))
        }
    }

    /// Queue a report and render it in the background
    pub fn generate(&self, ctx: &RequestContext, input: ReportInput) -> Result<Report, NexusError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(NexusError::field("title", "must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(NexusError::field("title", format!("must be at most {} characters", MAX_TITLE_CHARS)));
        }
        let period = ReportPeriod::parse(&input.report_type)?;
        let filters = input.filters.unwrap_or_default();
        let filters_json = if filters.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&filters)?)
        };
        let since = period.window_start(Utc::now()).map(format_timestamp);

        let report = self.db.with_conn(|conn| {
            reports::create_report(
                conn,
                ctx.scope,
                &QueuedReport {
                    title,
                    report_type: period.as_str(),
                    description: input.description.as_deref().unwrap_or_default(),
                    filters: filters_json.as_deref(),
                    created_by: Some(ctx.user_id),
                },
            )
        })?;
        info!(report_id = report.id, env = %ctx.scope, period = period.as_str(), "Report queued");

        let db = self.db.clone();
        let events = self.events.clone();
        let scope = ctx.scope;
        let report_id = report.id;
        tokio::spawn(async move {
            let assembled = tokio::task::spawn_blocking(move || {
                assemble(&db, scope, report_id, since.as_deref(), &filters)
            })
            .await;
            let error = match assembled {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => {
                    error!(report_id, error = %e, "Report task panicked");
                    Some(e.to_string())
                }
            };
            let status = if error.is_some() {
                report_status::FAILED
            } else {
                report_status::READY
            };
            events.emit(NexusEvent::ReportStatusChanged {
                report_id,
                status: status.to_string(),
                error,
            });
        });

        Ok(report)
    }

    /// Fail reports a previous process left `generating`
    pub fn sweep_interrupted(&self) -> Result<usize, NexusError> {
        let swept = self.db.with_conn(reports::fail_interrupted)?;
        if swept > 0 {
            warn!(count = swept, "Marked interrupted reports as failed");
        }
        Ok(swept)
    }
}

/// Select, render and store; any error marks the report failed
fn assemble(
    db: &Database,
    scope: EnvScope,
    report_id: i32,
    since: Option<&str>,
    filters: &ReportFilters,
) -> Result<(), NexusError> {
    let result = db
        .with_conn(|conn| {
            enterprises::list_for_report(
                conn,
                scope,
                since,
                filters.priority.as_deref(),
                filters.base.as_deref(),
            )
        })
        .and_then(|rows| {
            let bytes = render_workbook(&rows)?;
            let file_name = format!("INTEL_{}.xlsx", Utc::now().format("%Y%m%d%H%M%S%3f"));
            let row_count = i32::try_from(rows.len())
                .map_err(|_| NexusError::Internal("report has too many rows".into()))?;
            db.with_conn(|conn| reports::complete_report(conn, report_id, &file_name, &bytes, row_count))?;
            info!(report_id, rows = row_count, "Report ready");
            Ok(())
        });

    if let Err(err) = &result {
        warn!(report_id, error = %err, "Report generation failed");
        if let Err(e) = db.with_conn(|conn| reports::fail_report(conn, report_id, &err.to_string())) {
            error!(report_id, error = %e, "Failed to record report failure");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::diesel_schema::enterprises as enterprise_table;
    use crate::db::users::{self, CreateUserInput};
    use crate::services::enterprise_service::tests::ctx;
    use crate::services::enterprise_service::{EnterpriseInput, EnterpriseService};
    use chrono::TimeZone;
    use diesel::prelude::*;
    use std::time::Duration;

    /// Report and enterprise services over one database whose user 1 is the `ctx()` caller
    fn services() -> (ReportService, EnterpriseService, Database) {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            users::create_user(
                conn,
                &CreateUserInput {
                    username: "ana".into(),
                    email: "ana@corp.example".into(),
                    password_hash: "unused".into(),
                    role: "ARCHITECT".into(),
                    env_scope: EnvScope::Prod,
                    first_name: None,
                    region: None,
                    department: None,
                    manager_id: None,
                },
            )
        })
        .unwrap();
        let events = Arc::new(EventBus::new());
        (
            ReportService::new(db.clone(), events.clone()),
            EnterpriseService::new(db.clone(), events),
            db,
        )
    }

    fn input(json: serde_json::Value) -> ReportInput {
        serde_json::from_value(json).unwrap()
    }

    fn seed(enterprises: &EnterpriseService, scope: EnvScope, json: serde_json::Value) -> i32 {
        let input: EnterpriseInput = serde_json::from_value(json).unwrap();
        enterprises.create(&ctx(scope), input).unwrap().id
    }

    async fn wait_finished(svc: &ReportService, ctx: &RequestContext, id: i32) -> Report {
        for _ in 0..250 {
            let report = svc.get(ctx, id).unwrap();
            if report.status != report_status::GENERATING {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("report {} never finished", id);
    }

    #[test]
    fn test_period_windows() {
        let now = Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0).unwrap();
        let start = |p: ReportPeriod| format_timestamp(p.window_start(now).unwrap());
        assert_eq!(start(ReportPeriod::Weekly), "2025-05-24T12:00:00.000Z");
        // Month arithmetic clamps to the last day of the shorter month
        assert_eq!(start(ReportPeriod::Monthly), "2025-04-30T12:00:00.000Z");
        assert_eq!(start(ReportPeriod::Quarterly), "2025-02-28T12:00:00.000Z");
        assert_eq!(start(ReportPeriod::Yearly), "2024-05-31T12:00:00.000Z");
        assert!(ReportPeriod::parse("DAILY").is_err());
    }

    #[tokio::test]
    async fn test_weekly_report_covers_recent_rows_only() {
        let (svc, enterprises, db) = services();
        let demo = ctx(EnvScope::Demo);
        seed(&enterprises, EnvScope::Demo, serde_json::json!({"name": "Fresh AI", "priority": "P0"}));
        let old = seed(&enterprises, EnvScope::Demo, serde_json::json!({"name": "Old AI"}));
        seed(&enterprises, EnvScope::Prod, serde_json::json!({"name": "Prod AI"}));
        db.with_conn(|conn| {
            diesel::update(enterprise_table::table.filter(enterprise_table::id.eq(old)))
                .set(enterprise_table::created_at.eq("2020-01-01T00:00:00.000Z"))
                .execute(conn)?;
            Ok(())
        })
        .unwrap();

        let queued = svc
            .generate(&demo, input(serde_json::json!({"title": "周报", "type": "WEEKLY"})))
            .unwrap();
        assert_eq!(queued.status, report_status::GENERATING);
        assert_eq!(queued.created_by, Some(demo.user_id));

        let report = wait_finished(&svc, &demo, queued.id).await;
        assert_eq!(report.status, report_status::READY);
        assert_eq!(report.row_count, Some(1));
        assert!(report.file_name.unwrap().starts_with("INTEL_"));

        let file = svc.download(&demo, queued.id).unwrap();
        assert_eq!(file.filename, "周报.xlsx");
        assert_eq!(&file.bytes[..2], b"PK");

        // Other scope sees neither the report nor its file
        let prod = ctx(EnvScope::Prod);
        assert!(svc.get(&prod, queued.id).is_err());
        assert!(svc.download(&prod, queued.id).is_err());
        assert_eq!(svc.stats(&demo).unwrap(), ReportCounts { total: 1, ready: 1 });
    }

    #[tokio::test]
    async fn test_filters_narrow_the_window() {
        let (svc, enterprises, _db) = services();
        let demo = ctx(EnvScope::Demo);
        seed(&enterprises, EnvScope::Demo, serde_json::json!({"name": "A", "priority": "P0", "base": "成都"}));
        seed(&enterprises, EnvScope::Demo, serde_json::json!({"name": "B", "priority": "P1", "base": "成都"}));
        seed(&enterprises, EnvScope::Demo, serde_json::json!({"name": "C", "priority": "P0", "base": "北京"}));

        let queued = svc
            .generate(
                &demo,
                input(serde_json::json!({
                    "title": "成都 P0",
                    "type": "YEARLY",
                    "filters": {"priority": "P0", "base": "成都"}
                })),
            )
            .unwrap();
        assert_eq!(queued.filters.as_deref(), Some(r#"{"priority":"P0","base":"成都"}"#));
        let report = wait_finished(&svc, &demo, queued.id).await;
        assert_eq!(report.row_count, Some(1));
    }

    #[tokio::test]
    async fn test_invalid_requests_and_pending_download() {
        let (svc, _, db) = services();
        let demo = ctx(EnvScope::Demo);

        let generating = db
            .with_conn(|conn| {
                reports::create_report(
                    conn,
                    EnvScope::Demo,
                    &QueuedReport {
                        title: "季报",
                        report_type: "QUARTERLY",
                        description: "",
                        filters: None,
                        created_by: None,
                    },
                )
            })
            .unwrap();
        assert!(matches!(svc.download(&demo, generating.id), Err(NexusError::NotFound(_))));
        svc.delete(&demo, generating.id).unwrap();

        let err = svc
            .generate(&demo, input(serde_json::json!({"title": "x", "type": "DAILY"})))
            .unwrap_err();
        assert!(matches!(err, NexusError::Validation { ref field, .. } if field == "type"));
        let err = svc
            .generate(&demo, input(serde_json::json!({"title": "  ", "type": "WEEKLY"})))
            .unwrap_err();
        assert!(matches!(err, NexusError::Validation { ref field, .. } if field == "title"));
        assert!(svc.list(&demo).unwrap().is_empty());

        let queued = svc
            .generate(&demo, input(serde_json::json!({"title": "月报", "type": "MONTHLY"})))
            .unwrap();
        let report = wait_finished(&svc, &demo, queued.id).await;
        assert_eq!(report.row_count, Some(0));

        svc.delete(&demo, queued.id).unwrap();
        assert!(matches!(svc.download(&demo, queued.id), Err(NexusError::NotFound(_))));
        assert!(svc.delete(&demo, queued.id).is_err());
    }
}
