//! Service layer for enterprise-nexus
//!
//! Services sit between the HTTP handlers and the repositories. Each one
//! validates input, opens the transaction boundaries and emits events.
//! The caller's `RequestContext` is passed into every call.
//!
//! ```text
//! HTTP Handlers (thin, capability checks)
//!     ↓
//! Service Layer (validation, orchestration)
//!     ↓
//! Repository Layer (db/*.rs, scope filters)
//!     ↓
//! SQLite Database
//! ```

pub mod auth_service;
pub mod comment_service;
pub mod dashboard_service;
pub mod enterprise_service;
pub mod events;
pub mod import_export;
pub mod intake;
pub mod jobs;
pub mod policy_service;
pub mod report_service;
pub mod response;
pub mod sync_service;

pub use auth_service::AuthService;
pub use comment_service::CommentService;
pub use dashboard_service::DashboardService;
pub use enterprise_service::EnterpriseService;
pub use events::{spawn_logging_listener, EventBus, EventListener, NexusEvent};
pub use import_export::ImportExportService;
pub use jobs::JobRegistry;
pub use policy_service::PolicyService;
pub use report_service::ReportService;
pub use response::*;
pub use sync_service::SyncService;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::Authenticator;
use crate::db::Database;
use crate::error::NexusError;
use crate::summarizer::Summarizer;

/// Service container handed to the HTTP server
pub struct Services {
    pub db: Database,
    pub auth: Arc<AuthService>,
    pub enterprises: Arc<EnterpriseService>,
    pub dashboard: Arc<DashboardService>,
    pub policies: Arc<PolicyService>,
    pub reports: Arc<ReportService>,
    pub sync: Arc<SyncService>,
    pub data: Arc<ImportExportService>,
    pub comments: Arc<CommentService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over one pool and one event bus
    pub fn new(
        db: Database,
        authenticator: Authenticator,
        summarizer: Option<Arc<dyn Summarizer>>,
        fetch_timeout: Duration,
    ) -> Result<Self, NexusError> {
        let events = Arc::new(EventBus::new());

        Ok(Self {
            auth: Arc::new(AuthService::new(db.clone(), authenticator, events.clone())),
            enterprises: Arc::new(EnterpriseService::new(db.clone(), events.clone())),
            dashboard: Arc::new(DashboardService::new(db.clone())),
            policies: Arc::new(PolicyService::new(
                db.clone(),
                events.clone(),
                JobRegistry::new(),
                summarizer,
                fetch_timeout,
            )?),
            reports: Arc::new(ReportService::new(db.clone(), events.clone())),
            sync: Arc::new(SyncService::new(db.clone(), events.clone())),
            data: Arc::new(ImportExportService::new(db.clone(), events.clone())),
            comments: Arc::new(CommentService::new(db.clone(), events.clone())),
            db,
            events,
        })
    }
}
