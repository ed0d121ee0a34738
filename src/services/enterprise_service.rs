//! Enterprise service - validation and scoped CRUD
//!
//! Wraps `db::enterprises` with field validation, per-scope name
//! uniqueness and event emission. Every call takes the caller's
//! `RequestContext`; the scope is never read from anywhere else.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::RequestContext;
use crate::db::dashboard::{self, SummaryCounts, FEIJIANG, WENXIN};
use crate::db::enterprises::{self, EnterprisePage, EnterpriseQuery};
use crate::db::models::{parse_timestamp, Enterprise, EnterpriseChanges};
use crate::db::Database;
use crate::error::NexusError;

use super::events::{EventBus, NexusEvent};

pub const PRIORITIES: [&str; 3] = ["P0", "P1", "P2"];
pub const TECH_FAMILIES: [&str; 2] = [FEIJIANG, WENXIN];
pub const CLUE_STAGES: [&str; 6] = [
    "LEAD",
    "EMPOWERING",
    "ADOPTED",
    "ECO_PRODUCT",
    "POWERED_BY",
    "CASE_STUDY",
];
pub const CLUE_SOURCES: [&str; 5] = ["PHONE", "EVENT", "ASSOCIATION", "PARTNER", "GOV"];

const MAX_NAME_CHARS: usize = 255;

// ============================================================================
// Wire Input
// ============================================================================

/// Enterprise fields as sent by clients
///
/// Accepts camelCase names plus the Chinese column labels used by the
/// spreadsheet tooling. Every field is optional so the same type serves
/// create, partial update, sync and CSV import.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseInput {
    #[serde(default, alias = "enterpriseName", alias = "企业名称")]
    pub name: Option<String>,
    #[serde(default)]
    pub unified_social_credit_code: Option<String>,
    #[serde(default)]
    pub legal_representative: Option<String>,
    #[serde(default, alias = "飞桨_文心")]
    pub feijiang_wenxin: Option<String>,
    #[serde(default, alias = "线索入库时间")]
    pub clue_in_time: Option<String>,
    #[serde(default, alias = "线索更新时间")]
    pub clue_update_time: Option<String>,
    #[serde(default, alias = "伙伴等级")]
    pub partner_level: Option<String>,
    #[serde(default, alias = "生态AI产品")]
    pub eco_ai_products: Option<String>,
    #[serde(default, alias = "优先级")]
    pub priority: Option<String>,
    #[serde(default, alias = "地区")]
    pub base: Option<String>,
    #[serde(default, alias = "注册资本")]
    pub registered_capital: Option<Value>,
    #[serde(default, alias = "参保人数")]
    pub employee_count: Option<Value>,
    #[serde(default, alias = "企业背景")]
    pub enterprise_background: Option<String>,
    #[serde(default, alias = "行业")]
    pub industry: Option<String>,
    #[serde(default, alias = "任务方向")]
    pub task_direction: Option<String>,
    #[serde(default)]
    pub tech_field: Option<String>,
    #[serde(default, alias = "联系人信息")]
    pub contact_info: Option<String>,
    #[serde(default, alias = "使用场景")]
    pub usage_scenario: Option<String>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub adoption_depth: Option<String>,
    #[serde(default)]
    pub ernie_model_type: Option<String>,
    #[serde(default)]
    pub monthly_api_calls: Option<Value>,
    #[serde(default)]
    pub clue_stage: Option<String>,
    #[serde(default)]
    pub clue_source: Option<String>,
    #[serde(default)]
    pub clue_source_detail: Option<String>,
    #[serde(default)]
    pub is_powered_by: Option<bool>,
    #[serde(default)]
    pub pb_auth_info: Option<String>,
    #[serde(default)]
    pub award_status: Option<String>,
    #[serde(default)]
    pub award_time: Option<String>,
    #[serde(default)]
    pub award_location: Option<String>,
    #[serde(default)]
    pub cert_expiry_date: Option<String>,
    #[serde(default)]
    pub cert_status: Option<String>,
    #[serde(default)]
    pub shipping_status: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub ai_implementation_stage: Option<String>,
    #[serde(default)]
    pub owner_id: Option<i32>,
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn one_of(field: &str, value: Option<String>, allowed: &[&str]) -> Result<Option<String>, NexusError> {
    match text(value) {
        Some(v) if !allowed.contains(&v.as_str()) => Err(NexusError::field(
            field,
            format!("must be one of {}", allowed.join(", ")),
        )),
        other => Ok(other),
    }
}

fn non_negative(field: &str, value: Option<Value>) -> Result<Option<i64>, NexusError> {
    let number = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Some(_) => None,
    };
    match number {
        Some(n) if n >= 0 => Ok(Some(n)),
        Some(_) => Err(NexusError::field(field, "must not be negative")),
        None => Err(NexusError::field(field, "must be a number")),
    }
}

/// Normalize a date or RFC 3339 timestamp to `YYYY-MM-DD`
fn date(field: &str, value: Option<String>) -> Result<Option<String>, NexusError> {
    let Some(v) = text(value) else {
        return Ok(None);
    };
    if let Ok(d) = NaiveDate::parse_from_str(&v, "%Y-%m-%d") {
        return Ok(Some(d.format("%Y-%m-%d").to_string()));
    }
    parse_timestamp(&v)
        .map(|ts| Some(ts.date_naive().format("%Y-%m-%d").to_string()))
        .ok_or_else(|| NexusError::field(field, "must be a date (YYYY-MM-DD)"))
}

/// `YYYYQn` with n in 1..=4
fn quarter(field: &str, value: Option<String>) -> Result<Option<String>, NexusError> {
    let Some(v) = text(value) else {
        return Ok(None);
    };
    let bytes = v.as_bytes();
    let valid = bytes.len() == 6
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'Q'
        && (b'1'..=b'4').contains(&bytes[5]);
    if valid {
        Ok(Some(v))
    } else {
        Err(NexusError::field(field, "must look like 2024Q3"))
    }
}

fn coordinate(field: &str, value: Option<f64>, limit: f64) -> Result<Option<f64>, NexusError> {
    match value {
        Some(v) if !v.is_finite() || v.abs() > limit => {
            Err(NexusError::field(field, format!("must be within ±{}", limit)))
        }
        other => Ok(other),
    }
}

impl EnterpriseInput {
    /// Validate and convert into column changes
    ///
    /// With `require_name` the name must be present (create); otherwise an
    /// absent name leaves the stored one alone (update).
    pub fn into_changes(self, require_name: bool) -> Result<EnterpriseChanges, NexusError> {
        let name = match self.name {
            Some(raw) => {
                let trimmed = raw.trim().to_string();
                let chars = trimmed.chars().count();
                if chars == 0 || chars > MAX_NAME_CHARS {
                    return Err(NexusError::field("name", "must be 1-255 characters"));
                }
                Some(trimmed)
            }
            None if require_name => return Err(NexusError::field("name", "is required")),
            None => None,
        };

        let employee_count = non_negative("employeeCount", self.employee_count)?
            .map(|n| i32::try_from(n).map_err(|_| NexusError::field("employeeCount", "is too large")))
            .transpose()?;

        Ok(EnterpriseChanges {
            name,
            unified_social_credit_code: text(self.unified_social_credit_code),
            legal_representative: text(self.legal_representative),
            feijiang_wenxin: one_of("feijiangWenxin", self.feijiang_wenxin, &TECH_FAMILIES)?,
            clue_in_time: quarter("clueInTime", self.clue_in_time)?,
            clue_update_time: text(self.clue_update_time),
            partner_level: text(self.partner_level),
            eco_ai_products: text(self.eco_ai_products),
            priority: one_of("priority", self.priority, &PRIORITIES)?,
            base: text(self.base),
            registered_capital: non_negative("registeredCapital", self.registered_capital)?,
            employee_count,
            enterprise_background: text(self.enterprise_background),
            industry: text(self.industry),
            task_direction: text(self.task_direction),
            tech_field: text(self.tech_field),
            contact_info: text(self.contact_info),
            usage_scenario: text(self.usage_scenario),
            longitude: coordinate("longitude", self.longitude, 180.0)?,
            latitude: coordinate("latitude", self.latitude, 90.0)?,
            adoption_depth: text(self.adoption_depth),
            ernie_model_type: text(self.ernie_model_type),
            monthly_api_calls: non_negative("monthlyApiCalls", self.monthly_api_calls)?,
            clue_stage: one_of("clueStage", self.clue_stage, &CLUE_STAGES)?,
            clue_source: one_of("clueSource", self.clue_source, &CLUE_SOURCES)?,
            clue_source_detail: text(self.clue_source_detail),
            is_powered_by: self.is_powered_by.map(i32::from),
            pb_auth_info: text(self.pb_auth_info),
            award_status: text(self.award_status),
            award_time: date("awardTime", self.award_time)?,
            award_location: text(self.award_location),
            cert_expiry_date: date("certExpiryDate", self.cert_expiry_date)?,
            cert_status: text(self.cert_status),
            shipping_status: text(self.shipping_status),
            tracking_number: text(self.tracking_number),
            ai_implementation_stage: text(self.ai_implementation_stage),
            owner_id: self.owner_id,
            ..Default::default()
        })
    }
}

// ============================================================================
// Service
// ============================================================================

/// Enterprise service for business logic
pub struct EnterpriseService {
    db: Database,
    events: Arc<EventBus>,
}

impl EnterpriseService {
    pub fn new(db: Database, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn list(&self, ctx: &RequestContext, query: &EnterpriseQuery) -> Result<EnterprisePage, NexusError> {
        self.db
            .with_conn(|conn| enterprises::list_enterprises(conn, ctx.scope, query, Self::today()))
    }

    pub fn get(&self, ctx: &RequestContext, id: i32) -> Result<Enterprise, NexusError> {
        self.db
            .with_conn(|conn| enterprises::get_enterprise(conn, ctx.scope, id))?
            .ok_or_else(|| NexusError::NotFound(format!("enterprise {}", id)))
    }

    /// Headline counts for the caller's scope
    pub fn summary(&self, ctx: &RequestContext) -> Result<SummaryCounts, NexusError> {
        self.db.with_conn(|conn| dashboard::summary_counts(conn, ctx.scope))
    }

    /// Rows with coordinates for the map view
    pub fn map_data(&self, ctx: &RequestContext) -> Result<Vec<Enterprise>, NexusError> {
        self.db
            .with_conn(|conn| enterprises::list_with_coordinates(conn, ctx.scope))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create an enterprise in the caller's scope
    pub fn create(&self, ctx: &RequestContext, input: EnterpriseInput) -> Result<Enterprise, NexusError> {
        let mut changes = input.into_changes(true)?;
        changes.created_by = Some(ctx.username.clone());
        changes.updated_by = Some(ctx.username.clone());

        let created = self.db.transaction(|conn| {
            let name = changes.name.as_deref().unwrap_or_default();
            if enterprises::find_by_name(conn, ctx.scope, name)?.is_some() {
                return Err(NexusError::Conflict(format!(
                    "'{}' is already registered in this environment",
                    name
                )));
            }
            enterprises::insert_enterprise(conn, ctx.scope, changes)
        })?;

        self.events.emit(NexusEvent::EnterpriseCreated {
            id: created.id,
            name: created.name.clone(),
            scope: ctx.scope,
        });
        Ok(created)
    }

    /// Apply a partial update; only provided fields change
    pub fn update(&self, ctx: &RequestContext, id: i32, input: EnterpriseInput) -> Result<Enterprise, NexusError> {
        let mut changes = input.into_changes(false)?;
        changes.updated_by = Some(ctx.username.clone());

        let updated = self.db.transaction(|conn| {
            if let Some(name) = changes.name.as_deref() {
                if let Some(other) = enterprises::find_by_name(conn, ctx.scope, name)? {
                    if other.id != id {
                        return Err(NexusError::Conflict(format!(
                            "'{}' is already registered in this environment",
                            name
                        )));
                    }
                }
            }
            enterprises::update_enterprise(conn, ctx.scope, id, changes)
        })?;

        let updated = updated.ok_or_else(|| NexusError::NotFound(format!("enterprise {}", id)))?;
        self.events.emit(NexusEvent::EnterpriseUpdated {
            id,
            scope: ctx.scope,
        });
        Ok(updated)
    }

    /// Soft-delete; repeating it succeeds with the same end state
    pub fn delete(&self, ctx: &RequestContext, id: i32) -> Result<(), NexusError> {
        let found = self.db.with_conn(|conn| {
            enterprises::soft_delete_enterprise(conn, ctx.scope, id, Some(&ctx.username))
        })?;
        if !found {
            return Err(NexusError::NotFound(format!("enterprise {}", id)));
        }
        self.events.emit(NexusEvent::EnterpriseDeleted {
            id,
            scope: ctx.scope,
        });
        Ok(())
    }
}
