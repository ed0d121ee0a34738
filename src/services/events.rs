//! Domain event bus
//!
//! Services emit events after successful writes; the logging listener turns
//! them into an audit trail.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::auth::EnvScope;

/// Events emitted by services
#[derive(Debug, Clone)]
pub enum NexusEvent {
    EnterpriseCreated {
        id: i32,
        name: String,
        scope: EnvScope,
    },
    EnterpriseUpdated {
        id: i32,
        scope: EnvScope,
    },
    EnterpriseDeleted {
        id: i32,
        scope: EnvScope,
    },
    PolicyStatusChanged {
        policy_id: i32,
        status: String,
        error: Option<String>,
    },
    ReportStatusChanged {
        report_id: i32,
        status: String,
        error: Option<String>,
    },
    SyncCompleted {
        scope: EnvScope,
        updated: usize,
        created: usize,
        skipped: usize,
    },
    DataImported {
        scope: EnvScope,
        success: usize,
        failed: usize,
    },
    CommentPosted {
        id: i32,
        target_type: String,
        target_id: i32,
        mentions: usize,
    },
    UserRegistered {
        id: i32,
        username: String,
        role: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &NexusEvent);
}

/// Broadcasts events to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<NexusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: NexusEvent) {
        trace!(event = ?event, "Emitting event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NexusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every event to the log
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &NexusEvent) {
        match event {
            NexusEvent::EnterpriseCreated { id, name, scope } => {
                info!(id, name = %name, env = %scope, "Enterprise created");
            }
            NexusEvent::EnterpriseUpdated { id, scope } => {
                debug!(id, env = %scope, "Enterprise updated");
            }
            NexusEvent::EnterpriseDeleted { id, scope } => {
                info!(id, env = %scope, "Enterprise deleted");
            }
            NexusEvent::PolicyStatusChanged {
                policy_id,
                status,
                error: Some(error),
            } => {
                warn!(policy_id, status = %status, error = %error, "Policy analysis failed");
            }
            NexusEvent::PolicyStatusChanged { policy_id, status, .. } => {
                info!(policy_id, status = %status, "Policy status changed");
            }
            NexusEvent::ReportStatusChanged {
                report_id,
                status,
                error: Some(error),
            } => {
                warn!(report_id, status = %status, error = %error, "Report generation failed");
            }
            NexusEvent::ReportStatusChanged { report_id, status, .. } => {
                info!(report_id, status = %status, "Report status changed");
            }
            NexusEvent::SyncCompleted {
                scope,
                updated,
                created,
                skipped,
            } => {
                info!(env = %scope, updated, created, skipped, "Sync import completed");
            }
            NexusEvent::DataImported { scope, success, failed } => {
                info!(env = %scope, success, failed, "CSV import completed");
            }
            NexusEvent::CommentPosted {
                id,
                target_type,
                target_id,
                mentions,
            } => {
                debug!(id, target_type = %target_type, target_id, mentions, "Comment posted");
            }
            NexusEvent::UserRegistered { id, username, role } => {
                info!(id, username = %username, role = %role, "User registered");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
