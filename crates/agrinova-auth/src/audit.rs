//! Best-effort security event recording.

use agrinova_core::models::security_event::NewSecurityEvent;
use agrinova_core::repository::SecurityEventRepository;
use tracing::{debug, error};

/// Appends security events without ever failing the caller: a store
/// error is logged locally and dropped.
#[derive(Clone)]
pub struct SecurityAuditSink<E: SecurityEventRepository> {
    events: E,
}

impl<E: SecurityEventRepository> SecurityAuditSink<E> {
    pub fn new(events: E) -> Self {
        Self { events }
    }

    pub async fn record(&self, event: NewSecurityEvent) {
        let kind = event.kind.as_str();
        let severity = event.severity.as_str();
        match self.events.append(event).await {
            Ok(stored) => debug!(event_id = %stored.id, kind, severity, "Security event recorded"),
            Err(e) => error!(error = %e, kind, severity, "Failed to record security event"),
        }
    }

    /// The underlying store, for read-side queries.
    pub fn store(&self) -> &E {
        &self.events
    }
}
