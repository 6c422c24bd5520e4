//! In-process session event bus.
//!
//! Connection trackers (WebSocket fan-out and similar) subscribe and
//! drop live connections when credentials go away. The auth core only
//! publishes; it never reaches into a tracker's state.

use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DeviceLoggedOut { user_id: Uuid, device_id: String },
    DeviceUnbound { user_id: Uuid, device_id: String },
    WebSessionRevoked { user_id: Uuid, session_id: Uuid },
    UserSignedOutEverywhere { user_id: Uuid },
}

impl SessionEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            SessionEvent::DeviceLoggedOut { user_id, .. }
            | SessionEvent::DeviceUnbound { user_id, .. }
            | SessionEvent::WebSessionRevoked { user_id, .. }
            | SessionEvent::UserSignedOutEverywhere { user_id } => *user_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl AuthEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Fire and forget. Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
