//! Pending permission request store.
//!
//! Tracks requests awaiting a user decision, per session, in registration
//! order. Each entry owns the oneshot sender that unblocks its caller. The
//! store does no locking of its own; the manager serializes access.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use warden_core::permissions::ActionContext;

use super::types::PermissionError;

/// Outcome delivered to a suspended caller.
pub type Resolution = Result<(), PermissionError>;

/// Public view of a pending request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    /// Time-ordered unique id; sorts in creation order.
    pub id: String,
    pub context: ActionContext,
    /// Creation time, unix milliseconds.
    pub created_at: u64,
}

impl PendingRequest {
    pub fn new(context: ActionContext) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            context,
            created_at: unix_millis(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// A pending request together with its completion handle.
#[derive(Debug)]
pub struct PendingEntry {
    pub request: PendingRequest,
    /// Patterns the session must have approved to release this entry.
    pub required_patterns: Vec<String>,
    /// Patterns an "always" answer adds to the session.
    pub approval_patterns: Vec<String>,
    responder: oneshot::Sender<Resolution>,
}

impl PendingEntry {
    /// Create an entry and the receiver its caller waits on.
    pub fn new(request: PendingRequest) -> (Self, oneshot::Receiver<Resolution>) {
        let (responder, rx) = oneshot::channel();
        let required_patterns = request.context.required_patterns();
        let approval_patterns = request.context.approval_patterns();
        let entry = Self {
            request,
            required_patterns,
            approval_patterns,
            responder,
        };
        (entry, rx)
    }

    pub fn id(&self) -> &str {
        &self.request.id
    }

    /// Deliver the outcome. Consumes the entry, so a request resolves once.
    pub fn resolve(self, resolution: Resolution) {
        if self.responder.send(resolution).is_err() {
            debug!(request_id = %self.request.id, "Caller no longer waiting");
        }
    }
}

/// Pending requests grouped by session.
#[derive(Debug, Default)]
pub struct PendingStore {
    sessions: HashMap<String, Vec<PendingEntry>>,
}

impl PendingStore {
    /// Add an entry at the end of its session's queue.
    pub fn insert(&mut self, entry: PendingEntry) {
        debug!(
            session_id = %entry.request.session_id(),
            request_id = %entry.id(),
            "Added pending permission request"
        );
        self.sessions
            .entry(entry.request.session_id().to_string())
            .or_default()
            .push(entry);
    }

    /// Remove and return one entry.
    pub fn take(&mut self, session_id: &str, request_id: &str) -> Option<PendingEntry> {
        let queue = self.sessions.get_mut(session_id)?;
        let index = queue.iter().position(|e| e.id() == request_id)?;
        let entry = queue.remove(index);
        if queue.is_empty() {
            self.sessions.remove(session_id);
        }
        Some(entry)
    }

    /// Remove every entry of a session matching `predicate`, in
    /// registration order.
    pub fn take_where(
        &mut self,
        session_id: &str,
        mut predicate: impl FnMut(&PendingEntry) -> bool,
    ) -> Vec<PendingEntry> {
        let Some(queue) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        let (taken, kept): (Vec<_>, Vec<_>) =
            std::mem::take(queue).into_iter().partition(|e| predicate(e));
        if kept.is_empty() {
            self.sessions.remove(session_id);
        } else {
            *queue = kept;
        }
        taken
    }

    /// Remove every entry of a session.
    pub fn drain_session(&mut self, session_id: &str) -> Vec<PendingEntry> {
        self.sessions.remove(session_id).unwrap_or_default()
    }

    /// Snapshot of a session's pending requests, in registration order.
    pub fn snapshot(&self, session_id: &str) -> Vec<PendingRequest> {
        self.sessions
            .get(session_id)
            .map(|queue| queue.iter().map(|e| e.request.clone()).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn contains(&self, session_id: &str, request_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|queue| queue.iter().any(|e| e.id() == request_id))
    }

    /// Count of pending requests across all sessions.
    pub fn len(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use warden_core::permissions::PermissionKind;

    fn entry(session_id: &str, pattern: &str) -> (PendingEntry, oneshot::Receiver<Resolution>) {
        let ctx = ActionContext::new(PermissionKind::Bash, session_id, "msg-1").with_pattern(pattern);
        PendingEntry::new(PendingRequest::new(ctx))
    }

    #[test]
    fn ids_sort_in_creation_order() {
        let ids: Vec<String> = (0..16)
            .map(|_| PendingRequest::new(ActionContext::new(PermissionKind::Edit, "s", "m")).id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let mut store = PendingStore::default();
        let (a, _ra) = entry("session-1", "npm install");
        let (b, _rb) = entry("session-1", "npm test");
        let (c, _rc) = entry("session-2", "ls");
        let (a_id, b_id) = (a.id().to_string(), b.id().to_string());
        store.insert(a);
        store.insert(b);
        store.insert(c);

        let ids: Vec<_> = store.snapshot("session-1").into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a_id, b_id]);
        assert_eq!(store.len(), 3);
        assert!(store.snapshot("session-3").is_empty());
    }

    #[test]
    fn take_removes_request() {
        let mut store = PendingStore::default();
        let (a, _ra) = entry("session-1", "npm install");
        let id = a.id().to_string();
        store.insert(a);

        assert!(store.contains("session-1", &id));
        assert!(store.take("session-1", &id).is_some());
        assert!(!store.contains("session-1", &id));
        assert!(store.take("session-1", &id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn take_is_scoped_to_session() {
        let mut store = PendingStore::default();
        let (a, _ra) = entry("session-1", "npm install");
        let id = a.id().to_string();
        store.insert(a);

        assert!(store.take("session-2", &id).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn take_where_keeps_the_rest_in_order() {
        let mut store = PendingStore::default();
        for pattern in ["npm a", "ls", "npm b", "pwd"] {
            store.insert(entry("s", pattern).0);
        }

        let taken = store.take_where("s", |e| e.required_patterns[0].starts_with("npm"));
        let taken: Vec<_> = taken.iter().map(|e| e.required_patterns[0].as_str()).collect();
        assert_eq!(taken, vec!["npm a", "npm b"]);

        let left: Vec<_> = store
            .snapshot("s")
            .into_iter()
            .map(|r| r.context.candidates()[0].to_string())
            .collect();
        assert_eq!(left, vec!["ls", "pwd"]);
    }

    #[test]
    fn entry_separates_required_and_approved_patterns() {
        let (e, _rx) = entry("s", "npm:install");
        assert_eq!(e.required_patterns, vec!["npm:install"]);
        assert_eq!(e.approval_patterns, vec!["npm:*"]);
    }

    #[tokio::test]
    async fn resolve_unblocks_receiver_once() {
        let (e, rx) = entry("s", "ls");
        e.resolve(Ok(()));
        assert!(rx.await.unwrap().is_ok());
    }

    #[test]
    fn resolve_after_receiver_dropped_is_quiet() {
        let (e, rx) = entry("s", "ls");
        drop(rx);
        e.resolve(Ok(()));
    }

    #[test]
    fn drain_session_empties_only_that_session() {
        let mut store = PendingStore::default();
        store.insert(entry("a", "x").0);
        store.insert(entry("a", "y").0);
        store.insert(entry("b", "z").0);

        assert_eq!(store.drain_session("a").len(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.drain_session("a").is_empty());
    }
}
