//! Spreadsheet import/export for enterprise data
//!
//! Export writes the fixed Chinese column set as CSV or xlsx. Import reads
//! CSV with loose header matching and upserts by name in the caller's scope,
//! one row at a time; a bad row is reported and the rest carry on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::auth::RequestContext;
use crate::db::enterprises;
use crate::db::models::Enterprise;
use crate::db::Database;
use crate::error::NexusError;

use super::enterprise_service::EnterpriseInput;
use super::events::{EventBus, NexusEvent};

/// Export column headers, in order
pub const EXPORT_HEADERS: [&str; 16] = [
    "ID",
    "企业名称",
    "飞桨_文心",
    "线索入库时间",
    "线索更新时间",
    "伙伴等级",
    "生态AI产品",
    "优先级",
    "地区",
    "注册资本",
    "参保人数",
    "企业背景",
    "行业",
    "任务方向",
    "联系人信息",
    "使用场景",
];

const SHEET_NAME: &str = "企业数据";
const COLUMN_WIDTH: f64 = 20.0;
const DEFAULT_PRIORITY: &str = "P2";
const DEFAULT_BASE: &str = "成都";

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Import header synonyms -> wire field name
const HEADER_SYNONYMS: [(&str, &str); 25] = [
    ("企业名称", "name"),
    ("公司名称", "name"),
    ("名称", "name"),
    ("飞桨_文心", "feijiangWenxin"),
    ("技术类型", "feijiangWenxin"),
    ("线索入库时间", "clueInTime"),
    ("入库时间", "clueInTime"),
    ("线索更新时间", "clueUpdateTime"),
    ("伙伴等级", "partnerLevel"),
    ("生态AI产品", "ecoAiProducts"),
    ("优先级", "priority"),
    ("等级", "priority"),
    ("地区", "base"),
    ("所在城市", "base"),
    ("注册资本", "registeredCapital"),
    ("资金", "registeredCapital"),
    ("参保人数", "employeeCount"),
    ("规模", "employeeCount"),
    ("统一社会信用代码", "unifiedSocialCreditCode"),
    ("信用代码", "unifiedSocialCreditCode"),
    ("文心大模型版本", "ernieModelType"),
    ("大模型", "ernieModelType"),
    ("企业背景", "enterpriseBackground"),
    ("行业", "industry"),
    ("任务方向", "taskDirection"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    Csv,
    #[default]
    Xlsx,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

/// Query parameters of the export endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilter {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default, alias = "优先级")]
    pub priority: Option<String>,
    #[serde(default, alias = "飞桨_文心")]
    pub feijiang_wenxin: Option<String>,
}

impl ExportFilter {
    pub fn format(&self) -> Result<ExportFormat, NexusError> {
        match self.format.as_deref().map(str::trim) {
            None | Some("") | Some("xlsx") => Ok(ExportFormat::Xlsx),
            Some("csv") => Ok(ExportFormat::Csv),
            Some(_) => Err(NexusError::field("format", "must be csv or xlsx")),
        }
    }
}

/// A rendered export file
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<&'static str>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTemplate {
    pub fields: Vec<TemplateField>,
    pub sample_data: Vec<Value>,
}

fn xlsx_error(err: XlsxError) -> NexusError {
    NexusError::Internal(format!("xlsx export failed: {}", err))
}

fn csv_error(err: csv::Error) -> NexusError {
    NexusError::Internal(format!("csv export failed: {}", err))
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_num<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Cells of one export row, matching `EXPORT_HEADERS`
fn row_cells(e: &Enterprise) -> [String; 16] {
    [
        e.id.to_string(),
        e.name.clone(),
        opt(&e.feijiang_wenxin),
        opt(&e.clue_in_time),
        opt(&e.clue_update_time),
        opt(&e.partner_level),
        opt(&e.eco_ai_products),
        opt(&e.priority),
        opt(&e.base),
        opt_num(e.registered_capital),
        opt_num(e.employee_count),
        opt(&e.enterprise_background),
        opt(&e.industry),
        opt(&e.task_direction),
        opt(&e.contact_info),
        opt(&e.usage_scenario),
    ]
}

fn render_csv(rows: &[Enterprise]) -> Result<Vec<u8>, NexusError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS).map_err(csv_error)?;
    for row in rows {
        writer.write_record(row_cells(row)).map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| NexusError::Internal(format!("csv export failed: {}", e)))
}

fn render_xlsx(rows: &[Enterprise]) -> Result<Vec<u8>, NexusError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(xlsx_error)?;

    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        let col = col as u16;
        sheet
            .write_string_with_format(0, col, *header, &bold)
            .map_err(xlsx_error)?;
        sheet.set_column_width(col, COLUMN_WIDTH).map_err(xlsx_error)?;
    }

    for (index, e) in rows.iter().enumerate() {
        let row = index as u32 + 1;
        for (col, cell) in row_cells(e).into_iter().enumerate() {
            let col = col as u16;
            // ID, capital and headcount are numeric columns
            let number = match col {
                0 => Some(f64::from(e.id)),
                9 => e.registered_capital.map(|v| v as f64),
                10 => e.employee_count.map(f64::from),
                _ => None,
            };
            match number {
                Some(n) => sheet.write_number(row, col, n).map_err(xlsx_error)?,
                None => sheet.write_string(row, col, cell).map_err(xlsx_error)?,
            };
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

/// Map a CSV header to its wire field name; unknown headers pass through
fn canonical_header(header: &str) -> String {
    let trimmed = header.trim().trim_start_matches('\u{feff}');
    HEADER_SYNONYMS
        .iter()
        .find(|(label, _)| *label == trimmed)
        .map(|(_, field)| field.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn row_message(err: &NexusError) -> String {
    match err {
        NexusError::Validation { field, message } => format!("{} {}", field, message),
        NexusError::Conflict(msg) | NexusError::InvalidInput(msg) => msg.clone(),
        other => other.to_string(),
    }
}

pub struct ImportExportService {
    db: Database,
    events: Arc<EventBus>,
}

impl ImportExportService {
    pub fn new(db: Database, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Render the caller's scoped rows in the requested format
    pub fn export(&self, ctx: &RequestContext, filter: &ExportFilter) -> Result<ExportFile, NexusError> {
        let format = filter.format()?;
        let rows = self.db.with_conn(|conn| {
            enterprises::list_for_export(
                conn,
                ctx.scope,
                filter.search.as_deref(),
                filter.priority.as_deref(),
                filter.feijiang_wenxin.as_deref(),
            )
        })?;

        let (bytes, content_type) = match format {
            ExportFormat::Csv => (render_csv(&rows)?, CSV_CONTENT_TYPE),
            ExportFormat::Xlsx => (render_xlsx(&rows)?, XLSX_CONTENT_TYPE),
        };
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        debug!(env = %ctx.scope, rows = rows.len(), format = format.extension(), "Export rendered");

        Ok(ExportFile {
            filename: format!("企业数据导出_{}.{}", stamp, format.extension()),
            content_type,
            bytes,
        })
    }

    /// Upsert CSV rows by name into the caller's scope
    pub fn import_csv(&self, ctx: &RequestContext, text: &str) -> Result<ImportSummary, NexusError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| NexusError::InvalidInput(format!("unreadable CSV header: {}", e)))?
            .iter()
            .map(canonical_header)
            .collect();

        let mut summary = ImportSummary::default();
        for (index, record) in reader.records().enumerate() {
            let line = index + 2;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    summary.failed += 1;
                    summary.errors.push(format!("第 {} 行 []: {}", line, e));
                    continue;
                }
            };

            let mut fields: HashMap<&str, &str> = HashMap::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                if !cell.is_empty() {
                    fields.insert(header.as_str(), cell);
                }
            }
            let Some(name) = fields.get("name").map(|n| n.to_string()) else {
                continue;
            };

            match self.upsert_row(ctx, fields) {
                Ok(()) => summary.success += 1,
                Err(err) => {
                    summary.failed += 1;
                    summary
                        .errors
                        .push(format!("第 {} 行 [{}]: {}", line, name, row_message(&err)));
                }
            }
        }

        self.events.emit(NexusEvent::DataImported {
            scope: ctx.scope,
            success: summary.success,
            failed: summary.failed,
        });
        Ok(summary)
    }

    fn upsert_row(&self, ctx: &RequestContext, fields: HashMap<&str, &str>) -> Result<(), NexusError> {
        let mut object: Map<String, Value> = fields
            .into_iter()
            .filter(|(key, _)| *key != "ID")
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        object
            .entry("priority")
            .or_insert_with(|| Value::String(DEFAULT_PRIORITY.into()));
        object
            .entry("base")
            .or_insert_with(|| Value::String(DEFAULT_BASE.into()));

        let input: EnterpriseInput = serde_json::from_value(Value::Object(object))
            .map_err(|e| NexusError::InvalidInput(e.to_string()))?;
        let mut changes = input.into_changes(true)?;
        changes.updated_by = Some(ctx.username.clone());
        let name = changes.name.clone().unwrap_or_default();

        self.db.transaction(|conn| {
            match enterprises::find_by_name(conn, ctx.scope, &name)? {
                Some(existing) => {
                    enterprises::update_enterprise(conn, ctx.scope, existing.id, changes)?;
                }
                None => {
                    changes.created_by = Some(ctx.username.clone());
                    enterprises::insert_enterprise(conn, ctx.scope, changes)?;
                }
            }
            Ok(())
        })
    }

    /// Field definitions and one sample row for the import sheet
    pub fn template(&self) -> ImportTemplate {
        let field = |name, kind, required, description| TemplateField {
            name,
            kind,
            required,
            options: None,
            pattern: None,
            description,
        };
        ImportTemplate {
            fields: vec![
                field("企业名称", "string", true, "企业全称"),
                TemplateField {
                    options: Some(vec!["飞桨", "文心"]),
                    ..field("飞桨_文心", "enum", false, "使用的技术类型")
                },
                TemplateField {
                    pattern: Some("YYYYQ[1-4]"),
                    ..field("线索入库时间", "string", false, "如: 2025Q4")
                },
                TemplateField {
                    options: Some(vec!["认证级", "优选级", "无"]),
                    ..field("伙伴等级", "enum", false, "合作伙伴等级")
                },
                field("生态AI产品", "string", false, "使用的AI产品"),
                TemplateField {
                    options: Some(vec!["P0", "P1", "P2"]),
                    ..field("优先级", "enum", false, "企业优先级")
                },
                field("地区", "string", false, "所在地区"),
                field("注册资本", "number", false, "注册资本金额"),
                field("参保人数", "number", false, "参保人数"),
                field("统一社会信用代码", "string", false, "18位信用代码"),
                field("企业背景", "string", false, "企业背景描述"),
                field("行业", "string", false, "所属行业"),
                field("任务方向", "string", false, "主要业务方向"),
                field("联系人信息", "string", false, "联系人信息"),
                field("使用场景", "string", false, "AI使用场景"),
            ],
            sample_data: vec![json!({
                "企业名称": "示例科技有限公司",
                "飞桨_文心": "飞桨",
                "线索入库时间": "2025Q1",
                "伙伴等级": "认证级",
                "生态AI产品": "飞桨框架",
                "优先级": "P0",
                "地区": "北京",
                "注册资本": 10000000,
                "参保人数": 100,
                "企业背景": "这是一家专注于AI技术研发的创新型企业...",
                "行业": "人工智能",
                "任务方向": "计算机视觉",
                "联系人信息": "张三 13800138000",
                "使用场景": "图像识别"
            })],
        }
    }
}
