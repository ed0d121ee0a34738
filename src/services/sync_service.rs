//! Sync reconciler - export/import of enterprise batches between instances
//!
//! Import matches each record to a local row by credit code, then by name,
//! inside the caller's scope. A strictly newer remote `updatedAt` wins;
//! anything else leaves the local row alone. The whole batch runs in one
//! transaction.

use std::sync::Arc;

use diesel::SqliteConnection;
use serde::Deserialize;

use crate::auth::{EnvScope, RequestContext};
use crate::db::enterprises;
use crate::db::models::{current_timestamp, format_timestamp, parse_timestamp, Enterprise, EnterpriseChanges};
use crate::db::Database;
use crate::error::NexusError;

use super::enterprise_service::EnterpriseInput;
use super::events::{EventBus, NexusEvent};

pub const SYNC_FORMAT_VERSION: &str = "1.0";

// ============================================================================
// Wire Types
// ============================================================================

/// One enterprise record of an incoming batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: EnterpriseInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncBatch {
    #[serde(default)]
    pub payload: Vec<SyncRecord>,
}

#[derive(Debug, Clone)]
pub struct ExportMetadata {
    pub version: &'static str,
    pub export_timestamp: String,
    pub record_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExportEnvelope {
    pub metadata: ExportMetadata,
    pub payload: Vec<Enterprise>,
}

/// A record skipped because the local copy is newer
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConflict {
    pub index: usize,
    pub local_id: i32,
    pub name: String,
    pub local_updated_at: String,
    pub remote_updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub updated: usize,
    pub created: usize,
    pub skipped: usize,
    pub conflicts: Vec<SyncConflict>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub to_update: usize,
    pub to_create: usize,
    pub conflicts: Vec<SyncConflict>,
}

/// What importing one record would do, with its validated changes
enum Plan {
    Update { local_id: i32, changes: EnterpriseChanges },
    Create(EnterpriseChanges),
    Skip(Option<SyncConflict>),
}

// ============================================================================
// Service
// ============================================================================

pub struct SyncService {
    db: Database,
    events: Arc<EventBus>,
}

impl SyncService {
    pub fn new(db: Database, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Active rows of the caller's scope, optionally only those changed after `since`
    pub fn export(&self, ctx: &RequestContext, since: Option<&str>) -> Result<ExportEnvelope, NexusError> {
        let since = since
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                parse_timestamp(s)
                    .map(format_timestamp)
                    .ok_or_else(|| NexusError::field("since", "must be an RFC 3339 timestamp"))
            })
            .transpose()?;

        let payload = self
            .db
            .with_conn(|conn| enterprises::list_changed_since(conn, ctx.scope, since.as_deref()))?;

        Ok(ExportEnvelope {
            metadata: ExportMetadata {
                version: SYNC_FORMAT_VERSION,
                export_timestamp: current_timestamp(),
                record_count: payload.len(),
            },
            payload,
        })
    }

    /// Merge a batch into the caller's scope; any invalid record rolls back all of it
    pub fn import(&self, ctx: &RequestContext, batch: SyncBatch) -> Result<ImportReport, NexusError> {
        let report = self.db.transaction(|conn| {
            let mut report = ImportReport::default();
            for (index, record) in batch.payload.iter().enumerate() {
                match plan(conn, ctx.scope, index, record)? {
                    Plan::Update { local_id, mut changes } => {
                        changes.updated_by = Some(ctx.username.clone());
                        enterprises::update_enterprise(conn, ctx.scope, local_id, changes)?;
                        report.updated += 1;
                    }
                    Plan::Create(mut changes) => {
                        changes.created_by = Some(ctx.username.clone());
                        changes.updated_by = Some(ctx.username.clone());
                        enterprises::insert_enterprise(conn, ctx.scope, changes)?;
                        report.created += 1;
                    }
                    Plan::Skip(conflict) => {
                        report.skipped += 1;
                        report.conflicts.extend(conflict);
                    }
                }
            }
            Ok(report)
        })?;

        self.events.emit(NexusEvent::SyncCompleted {
            scope: ctx.scope,
            updated: report.updated,
            created: report.created,
            skipped: report.skipped,
        });
        Ok(report)
    }

    /// Dry run of `import`: same matching and validation, nothing is written
    pub fn validate(&self, ctx: &RequestContext, batch: &SyncBatch) -> Result<ValidationReport, NexusError> {
        self.db.with_conn(|conn| {
            let mut report = ValidationReport::default();
            for (index, record) in batch.payload.iter().enumerate() {
                match plan(conn, ctx.scope, index, record)? {
                    Plan::Update { .. } => report.to_update += 1,
                    Plan::Create(_) => report.to_create += 1,
                    Plan::Skip(conflict) => report.conflicts.extend(conflict),
                }
            }
            Ok(report)
        })
    }
}

fn at_record(index: usize, err: NexusError) -> NexusError {
    match err {
        NexusError::Validation { field, message } => NexusError::Validation {
            field: format!("payload[{}].{}", index, field),
            message,
        },
        other => other,
    }
}

fn find_local(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    record: &SyncRecord,
) -> Result<Option<Enterprise>, NexusError> {
    let code = record
        .fields
        .unified_social_credit_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(code) = code {
        if let Some(found) = enterprises::find_by_credit_code(conn, scope, code)? {
            return Ok(Some(found));
        }
    }
    match record.fields.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => enterprises::find_by_name(conn, scope, name),
        None => Ok(None),
    }
}

fn plan(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    index: usize,
    record: &SyncRecord,
) -> Result<Plan, NexusError> {
    let remote_at = record.updated_at.as_deref().and_then(parse_timestamp);

    let Some(local) = find_local(conn, scope, record)? else {
        let mut changes = record
            .fields
            .clone()
            .into_changes(true)
            .map_err(|e| at_record(index, e))?;
        changes.updated_at = remote_at.map(format_timestamp);
        return Ok(Plan::Create(changes));
    };

    let local_at = parse_timestamp(&local.updated_at);
    match (remote_at, local_at) {
        (Some(remote), Some(local_ts)) if remote > local_ts => {
            let mut changes = record
                .fields
                .clone()
                .into_changes(false)
                .map_err(|e| at_record(index, e))?;
            ensure_name_free(conn, scope, index, local.id, changes.name.as_deref())?;
            changes.updated_at = Some(format_timestamp(remote));
            Ok(Plan::Update {
                local_id: local.id,
                changes,
            })
        }
        (Some(remote), Some(local_ts)) if remote == local_ts => Ok(Plan::Skip(None)),
        _ => Ok(Plan::Skip(Some(SyncConflict {
            index,
            local_id: local.id,
            name: local.name,
            local_updated_at: local.updated_at,
            remote_updated_at: record.updated_at.clone(),
        }))),
    }
}

/// A renamed row must not take the name of another active row in the scope
fn ensure_name_free(
    conn: &mut SqliteConnection,
    scope: EnvScope,
    index: usize,
    local_id: i32,
    name: Option<&str>,
) -> Result<(), NexusError> {
    let Some(name) = name else {
        return Ok(());
    };
    match enterprises::find_by_name(conn, scope, name)? {
        Some(other) if other.id != local_id => Err(NexusError::field(
            format!("payload[{}].name", index),
            format!("'{}' is already registered in this environment", name),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::enterprise_service::tests::ctx;
    use crate::services::enterprise_service::EnterpriseService;
    use crate::views::EnterpriseView;
    use serde_json::json;

    fn services() -> (EnterpriseService, SyncService) {
        let db = Database::open_in_memory().unwrap();
        let events = Arc::new(EventBus::new());
        (
            EnterpriseService::new(db.clone(), events.clone()),
            SyncService::new(db, events),
        )
    }

    fn wire(envelope: &ExportEnvelope) -> SyncBatch {
        let payload: Vec<_> = envelope.payload.iter().map(EnterpriseView::from).collect();
        serde_json::from_value(json!({ "payload": payload })).unwrap()
    }

    fn seed(enterprises: &EnterpriseService, scope: EnvScope) -> Enterprise {
        enterprises
            .create(
                &ctx(scope),
                serde_json::from_value(json!({
                    "name": "Acme AI",
                    "unifiedSocialCreditCode": "91510100MA61",
                    "priority": "P1",
                    "registeredCapital": 500,
                    "isPoweredBy": true,
                    "certExpiryDate": "2027-01-31"
                }))
                .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        let (enterprises, sync) = services();
        let demo = ctx(EnvScope::Demo);
        seed(&enterprises, EnvScope::Demo);

        let envelope = sync.export(&demo, None).unwrap();
        assert_eq!(envelope.metadata.record_count, 1);
        assert_eq!(envelope.metadata.version, "1.0");

        let batch = wire(&envelope);
        let dry = sync.validate(&demo, &batch).unwrap();
        assert_eq!(dry, ValidationReport::default());

        let report = sync.import(&demo, batch).unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.created, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let (enterprises, sync) = services();
        let demo = ctx(EnvScope::Demo);
        let local = seed(&enterprises, EnvScope::Demo);

        let older = serde_json::from_value::<SyncBatch>(json!({"payload": [{
            "name": "Acme AI",
            "priority": "P0",
            "updatedAt": "2001-01-01T00:00:00.000Z"
        }]}))
        .unwrap();
        let report = sync.import(&demo, older).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].local_id, local.id);
        assert_eq!(enterprises.get(&demo, local.id).unwrap().priority.as_deref(), Some("P1"));

        let newer = serde_json::from_value::<SyncBatch>(json!({"payload": [{
            "unifiedSocialCreditCode": "91510100MA61",
            "priority": "P0",
            "base": "北京",
            "updatedAt": "2099-06-01T08:00:00+08:00"
        }]}))
        .unwrap();
        let report = sync.import(&demo, newer).unwrap();
        assert_eq!(report.updated, 1);

        let row = enterprises.get(&demo, local.id).unwrap();
        assert_eq!(row.priority.as_deref(), Some("P0"));
        assert_eq!(row.base.as_deref(), Some("北京"));
        assert_eq!(row.name, "Acme AI");
        assert_eq!(row.updated_at, "2099-06-01T00:00:00.000Z");
    }

    #[test]
    fn test_import_stays_in_caller_scope() {
        let (enterprises, sync) = services();
        seed(&enterprises, EnvScope::Demo);

        let demo_export = sync.export(&ctx(EnvScope::Demo), None).unwrap();
        let report = sync.import(&ctx(EnvScope::Prod), wire(&demo_export)).unwrap();
        assert_eq!(report.created, 1);

        let prod_rows = sync.export(&ctx(EnvScope::Prod), None).unwrap();
        assert_eq!(prod_rows.payload[0].env_scope, "PROD");
        assert_eq!(sync.export(&ctx(EnvScope::Demo), None).unwrap().payload.len(), 1);
    }

    #[test]
    fn test_invalid_record_rolls_back_batch() {
        let (_, sync) = services();
        let demo = ctx(EnvScope::Demo);
        let batch = serde_json::from_value::<SyncBatch>(json!({"payload": [
            {"name": "Good Co"},
            {"name": "Bad Co", "priority": "P9"}
        ]}))
        .unwrap();

        match sync.import(&demo, batch) {
            Err(NexusError::Validation { field, .. }) => assert_eq!(field, "payload[1].priority"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(sync.export(&demo, None).unwrap().payload.is_empty());
    }

    #[test]
    fn test_export_since_filters() {
        let (enterprises, sync) = services();
        let demo = ctx(EnvScope::Demo);
        seed(&enterprises, EnvScope::Demo);

        assert!(sync.export(&demo, Some("2999-01-01T00:00:00Z")).unwrap().payload.is_empty());
        assert_eq!(sync.export(&demo, Some("2000-01-01T00:00:00Z")).unwrap().payload.len(), 1);
        assert!(sync.export(&demo, Some("yesterday")).is_err());
    }

    #[test]
    fn test_rename_onto_existing_name_is_rejected() {
        let (enterprises, sync) = services();
        let demo = ctx(EnvScope::Demo);
        let alpha = seed(&enterprises, EnvScope::Demo);
        enterprises
            .create(&demo, serde_json::from_value(json!({"name": "Beta"})).unwrap())
            .unwrap();

        let batch = serde_json::from_value::<SyncBatch>(json!({"payload": [{
            "unifiedSocialCreditCode": "91510100MA61",
            "name": "Beta",
            "updatedAt": "2099-01-01T00:00:00.000Z"
        }]}))
        .unwrap();

        match sync.validate(&demo, &batch) {
            Err(NexusError::Validation { field, .. }) => assert_eq!(field, "payload[0].name"),
            other => panic!("expected validation error, got {:?}", other),
        }
        match sync.import(&demo, batch) {
            Err(NexusError::Validation { field, .. }) => assert_eq!(field, "payload[0].name"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(enterprises.get(&demo, alpha.id).unwrap().name, "Acme AI");
    }

    #[test]
    fn test_validate_reports_field_errors() {
        let (enterprises, sync) = services();
        let demo = ctx(EnvScope::Demo);
        seed(&enterprises, EnvScope::Demo);

        let new_record = serde_json::from_value::<SyncBatch>(json!({"payload": [
            {"name": "Fresh Co", "priority": "P0"},
            {"name": "Broken Co", "priority": "P9"}
        ]}))
        .unwrap();
        match sync.validate(&demo, &new_record) {
            Err(NexusError::Validation { field, .. }) => assert_eq!(field, "payload[1].priority"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let newer_update = serde_json::from_value::<SyncBatch>(json!({"payload": [{
            "name": "Acme AI",
            "registeredCapital": -5,
            "updatedAt": "2099-01-01T00:00:00.000Z"
        }]}))
        .unwrap();
        match sync.validate(&demo, &newer_update) {
            Err(NexusError::Validation { field, .. }) => {
                assert_eq!(field, "payload[0].registeredCapital")
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
