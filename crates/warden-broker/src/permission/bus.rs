//! Permission event publishing.
//!
//! The manager announces new requests and answers through an [`EventBus`];
//! a UI subscribes to render prompts and drop them once answered.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use warden_core::permissions::{PatternSet, PermissionKind};

use super::pending::PendingRequest;
use super::types::PermissionResponse;

/// Broadcast channel buffer size for permission events.
pub const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Payload of `permission.requested`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedEvent {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: PermissionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: u64,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Patterns an "always" answer will remember, for the prompt to show.
    pub always: Vec<String>,
}

impl From<&PendingRequest> for RequestedEvent {
    fn from(request: &PendingRequest) -> Self {
        let ctx = &request.context;
        Self {
            id: request.id.clone(),
            session_id: ctx.session_id.clone(),
            kind: ctx.kind,
            pattern: ctx.pattern.clone(),
            title: ctx.title.clone(),
            metadata: (!ctx.metadata.is_null()).then(|| ctx.metadata.clone()),
            created_at: request.created_at,
            message_id: ctx.message_id.clone(),
            call_id: ctx.call_id.clone(),
            always: ctx.approval_patterns(),
        }
    }
}

/// Payload of `permission.responded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondedEvent {
    pub session_id: String,
    pub permission_id: String,
    pub response: PermissionResponse,
}

/// Event emitted by the permission manager.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionEvent {
    Requested(RequestedEvent),
    Responded(RespondedEvent),
}

impl PermissionEvent {
    pub const REQUESTED: &'static str = "permission.requested";
    pub const RESPONDED: &'static str = "permission.responded";

    pub fn requested(request: &PendingRequest) -> Self {
        Self::Requested(request.into())
    }

    pub fn responded(session_id: &str, permission_id: &str, response: PermissionResponse) -> Self {
        Self::Responded(RespondedEvent {
            session_id: session_id.to_string(),
            permission_id: permission_id.to_string(),
            response,
        })
    }

    /// Topic name the event is published under.
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::Requested(_) => Self::REQUESTED,
            Self::Responded(_) => Self::RESPONDED,
        }
    }

    /// JSON body of the event.
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            Self::Requested(e) => serde_json::to_value(e),
            Self::Responded(e) => serde_json::to_value(e),
        };
        value.unwrap_or_default()
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Requested(e) => &e.session_id,
            Self::Responded(e) => &e.session_id,
        }
    }
}

/// Publish side of an event transport.
///
/// The manager publishes while holding its state lock so subscribers see
/// events in state-transition order. Implementations must not block and
/// must not call back into the manager.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: PermissionEvent);
}

/// In-process bus backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<PermissionEvent>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionEvent> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: PermissionEvent) {
        let topic = event.topic();
        if self.tx.send(event).is_err() {
            trace!(topic, "No subscribers for permission event");
        }
    }
}

/// Bus that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&self, event: PermissionEvent) {
        trace!(topic = event.topic(), "Dropping permission event");
    }
}
