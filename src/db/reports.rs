//! Intelligence report records and their rendered workbooks

use diesel::prelude::*;

use super::diesel_schema::reports;
use super::models::{current_timestamp, NewReport, Report};
use super::policies::INTERRUPTED_MESSAGE;
use crate::auth::EnvScope;
use crate::error::NexusError;

/// Values of `reports.status`
pub mod report_status {
    pub const GENERATING: &str = "generating";
    pub const READY: &str = "ready";
    pub const FAILED: &str = "failed";
}

pub const FORMAT_EXCEL: &str = "EXCEL";

/// Fields of a freshly queued report
#[derive(Debug, Clone)]
pub struct QueuedReport<'a> {
    pub title: &'a str,
    pub report_type: &'a str,
    pub description: &'a str,
    pub filters: Option<&'a str>,
    pub created_by: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub total: i64,
    pub ready: i64,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Reports of a scope, newest first
pub fn list_reports(conn: &mut SqliteConnection, scope: EnvScope) -> Result<Vec<Report>, NexusError> {
    Ok(reports::table
        .filter(reports::env_scope.eq(scope.as_str()))
        .order(reports::created_at.desc())
        .then_order_by(reports::id.desc())
        .select(Report::as_select())
        .load(conn)?)
}

pub fn get_report(conn: &mut SqliteConnection, scope: EnvScope, id: i32) -> Result<Option<Report>, NexusError> {
    Ok(reports::table
        .filter(reports::env_scope.eq(scope.as_str()))
        .filter(reports::id.eq(id))
        .select(Report::as_select())
        .first(conn)
        .optional()?)
}

/// Workbook bytes of a ready report - scoped
pub fn get_report_file(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    id: i32,
) -> Result<Option<Vec<u8>>, NexusError> {
    let data: Option<Option<Vec<u8>>> = reports::table
        .filter(reports::env_scope.eq(scope.as_str()))
        .filter(reports::id.eq(id))
        .filter(reports::status.eq(report_status::READY))
        .select(reports::file_data)
        .first(conn)
        .optional()?;
    Ok(data.flatten())
}

pub fn count_reports(conn: &mut SqliteConnection, scope: EnvScope) -> Result<ReportCounts, NexusError> {
    let total: i64 = reports::table
        .filter(reports::env_scope.eq(scope.as_str()))
        .count()
        .get_result(conn)?;
    let ready: i64 = reports::table
        .filter(reports::env_scope.eq(scope.as_str()))
        .filter(reports::status.eq(report_status::READY))
        .count()
        .get_result(conn)?;
    Ok(ReportCounts { total, ready })
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a report in `generating` state
pub fn create_report(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    queued: &QueuedReport<'_>,
) -> Result<Report, NexusError> {
    let now = current_timestamp();
    let new_report = NewReport {
        env_scope: scope.as_str(),
        title: queued.title,
        report_type: queued.report_type,
        format: FORMAT_EXCEL,
        status: report_status::GENERATING,
        description: queued.description,
        filters: queued.filters,
        created_by: queued.created_by,
        created_at: &now,
        updated_at: &now,
    };
    Ok(diesel::insert_into(reports::table)
        .values(&new_report)
        .returning(Report::as_returning())
        .get_result(conn)?)
}

/// Store the rendered workbook and mark the report `ready`
pub fn complete_report(
    conn: &mut SqliteConnection,
    id: i32,
    file_name: &str,
    bytes: &[u8],
    row_count: i32,
) -> Result<(), NexusError> {
    let updated = diesel::update(reports::table.filter(reports::id.eq(id)))
        .set((
            reports::status.eq(report_status::READY),
            reports::file_name.eq(file_name),
            reports::file_data.eq(bytes),
            reports::row_count.eq(row_count),
            reports::error_message.eq(None::<String>),
            reports::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(NexusError::NotFound(format!("report {}", id)));
    }
    Ok(())
}

pub fn fail_report(conn: &mut SqliteConnection, id: i32, message: &str) -> Result<(), NexusError> {
    diesel::update(reports::table.filter(reports::id.eq(id)))
        .set((
            reports::status.eq(report_status::FAILED),
            reports::error_message.eq(message),
            reports::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Remove a report row and its workbook - scoped
pub fn delete_report(conn: &mut SqliteConnection, scope: EnvScope, id: i32) -> Result<bool, NexusError> {
    let deleted = diesel::delete(
        reports::table
            .filter(reports::env_scope.eq(scope.as_str()))
            .filter(reports::id.eq(id)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

/// Fail every report a previous process left `generating`
pub fn fail_interrupted(conn: &mut SqliteConnection) -> Result<usize, NexusError> {
    Ok(diesel::update(reports::table.filter(reports::status.eq(report_status::GENERATING)))
        .set((
            reports::status.eq(report_status::FAILED),
            reports::error_message.eq(INTERRUPTED_MESSAGE),
            reports::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn queued(title: &str) -> QueuedReport<'_> {
        QueuedReport {
            title,
            report_type: "WEEKLY",
            description: "",
            filters: None,
            created_by: None,
        }
    }

    #[test]
    fn test_ready_report_exposes_file() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let report = create_report(conn, EnvScope::Demo, &queued("周报"))?;
            assert_eq!(report.status, report_status::GENERATING);
            assert_eq!(report.format, FORMAT_EXCEL);
            assert!(get_report_file(conn, EnvScope::Demo, report.id)?.is_none());

            complete_report(conn, report.id, "INTEL_1.xlsx", b"PK..", 3)?;
            let ready = get_report(conn, EnvScope::Demo, report.id)?.unwrap();
            assert_eq!(ready.status, report_status::READY);
            assert_eq!(ready.row_count, Some(3));
            assert_eq!(get_report_file(conn, EnvScope::Demo, report.id)?.unwrap(), b"PK..");
            assert!(get_report_file(conn, EnvScope::Prod, report.id)?.is_none());

            assert_eq!(count_reports(conn, EnvScope::Demo)?, ReportCounts { total: 1, ready: 1 });
            assert_eq!(count_reports(conn, EnvScope::Prod)?, ReportCounts::default());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_and_sweep_are_scoped() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let demo = create_report(conn, EnvScope::Demo, &queued("a"))?;
            let prod = create_report(conn, EnvScope::Prod, &queued("b"))?;

            assert!(!delete_report(conn, EnvScope::Prod, demo.id)?);
            assert!(delete_report(conn, EnvScope::Demo, demo.id)?);
            assert!(list_reports(conn, EnvScope::Demo)?.is_empty());

            assert_eq!(fail_interrupted(conn)?, 1);
            let swept = get_report(conn, EnvScope::Prod, prod.id)?.unwrap();
            assert_eq!(swept.status, report_status::FAILED);
            assert_eq!(swept.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
            Ok(())
        })
        .unwrap();
    }
}
