//! Permission manager.
//!
//! Combines policy evaluation with the human-in-the-loop workflow: requests
//! the policy answers with "ask" are parked until the user responds, and
//! "always" answers widen a per-session approval set that can release other
//! parked requests of the same session.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use warden_core::permissions::{ActionContext, Outcome, PermissionConfig, evaluate, matches};

use super::bus::{EventBus, PermissionEvent};
use super::pending::{PendingEntry, PendingRequest, PendingStore};
use super::types::{PermissionError, PermissionResponse};

#[derive(Debug, Default)]
struct State {
    pending: PendingStore,
    /// Patterns approved with "always", keyed by session.
    approvals: HashMap<String, HashSet<String>>,
}

/// True when each pattern is matched by at least one approved pattern.
fn covered(approved: Option<&HashSet<String>>, patterns: &[String]) -> bool {
    let Some(approved) = approved else {
        return false;
    };
    patterns
        .iter()
        .all(|pattern| approved.iter().any(|rule| matches(pattern, rule)))
}

/// Session-aware permission broker.
///
/// Share it between the tool executor and the UI with an `Arc`.
pub struct PermissionManager {
    state: Mutex<State>,
    bus: Arc<dyn EventBus>,
}

impl PermissionManager {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether `context` may proceed.
    ///
    /// Returns immediately for allowed, denied and session-approved actions.
    /// Otherwise a `permission.requested` event is published and the call
    /// waits until the request is answered, released by an "always" answer
    /// to another request, or its session is cleared. Dropping the returned
    /// future withdraws the request as if it had been rejected.
    pub async fn check(
        &self,
        config: &PermissionConfig,
        context: ActionContext,
    ) -> Result<(), PermissionError> {
        let evaluation = evaluate(config, &context);
        match evaluation.outcome() {
            Outcome::Allow => return Ok(()),
            Outcome::Deny => {
                info!(
                    session_id = %context.session_id,
                    kind = %context.kind,
                    rule = ?evaluation.matched_rule,
                    "Permission denied by policy"
                );
                return Err(PermissionError::ConfigDenied {
                    session_id: context.session_id,
                    kind: context.kind,
                    matched_rule: evaluation.matched_rule,
                    reason: evaluation.reason.unwrap_or_default(),
                });
            }
            Outcome::Ask => {}
        }

        let session_id = context.session_id.clone();
        let (request_id, rx) = {
            let mut state = self.lock();
            let patterns = context.required_patterns();
            if covered(state.approvals.get(&session_id), &patterns) {
                debug!(session_id = %session_id, ?patterns, "Session approval hit");
                return Ok(());
            }

            let request = PendingRequest::new(context);
            let request_id = request.id.clone();
            self.bus.publish(PermissionEvent::requested(&request));
            let (entry, rx) = PendingEntry::new(request);
            state.pending.insert(entry);
            (request_id, rx)
        };

        info!(
            session_id = %session_id,
            request_id = %request_id,
            "Permission request pending"
        );

        let mut guard = WithdrawOnDrop {
            manager: self,
            session_id: &session_id,
            request_id: &request_id,
            armed: true,
        };
        let resolution = rx.await;
        guard.armed = false;

        resolution.unwrap_or_else(|_| {
            Err(PermissionError::SessionEnded {
                session_id: session_id.clone(),
                request_id: request_id.clone(),
            })
        })
    }

    /// [`check`](Self::check) with a deadline.
    ///
    /// When the deadline passes the request is withdrawn exactly as a
    /// `reject` answer would, and the caller gets
    /// [`PermissionError::TimedOut`].
    pub async fn check_with_timeout(
        &self,
        config: &PermissionConfig,
        context: ActionContext,
        timeout: Duration,
    ) -> Result<(), PermissionError> {
        let session_id = context.session_id.clone();
        tokio::time::timeout(timeout, self.check(config, context))
            .await
            .unwrap_or_else(|_| {
                warn!(session_id = %session_id, ?timeout, "Permission request timed out");
                Err(PermissionError::TimedOut {
                    session_id,
                    timeout,
                })
            })
    }

    /// Answer a pending request.
    ///
    /// Returns `false` when the request is not pending (already answered,
    /// released, or never existed); nothing changes in that case.
    pub fn respond(
        &self,
        session_id: &str,
        request_id: &str,
        response: PermissionResponse,
    ) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.pending.take(session_id, request_id) else {
            debug!(session_id, request_id, "Response for unknown permission request");
            return false;
        };

        self.bus
            .publish(PermissionEvent::responded(session_id, request_id, response));
        info!(session_id, request_id, %response, "Permission response processed");

        match response {
            PermissionResponse::Once => entry.resolve(Ok(())),
            PermissionResponse::Reject => {
                let context = Box::new(entry.request.context.clone());
                entry.resolve(Err(PermissionError::UserRejected {
                    session_id: session_id.to_string(),
                    request_id: request_id.to_string(),
                    context,
                }));
            }
            PermissionResponse::Always => {
                let approved = state.approvals.entry(session_id.to_string()).or_default();
                approved.extend(entry.approval_patterns.iter().cloned());
                let approved = &*approved;
                entry.resolve(Ok(()));

                let released = state
                    .pending
                    .take_where(session_id, |e| covered(Some(approved), &e.required_patterns));
                for other in released {
                    debug!(
                        session_id,
                        request_id = %other.id(),
                        "Released by session approval"
                    );
                    self.bus.publish(PermissionEvent::responded(
                        session_id,
                        other.id(),
                        PermissionResponse::Always,
                    ));
                    other.resolve(Ok(()));
                }
            }
        }
        true
    }

    /// Snapshot of a session's pending requests, oldest first.
    pub fn get_pending(&self, session_id: &str) -> Vec<PendingRequest> {
        self.lock().pending.snapshot(session_id)
    }

    /// Number of pending requests across all sessions.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Patterns approved with "always" in a session, sorted.
    pub fn approvals(&self, session_id: &str) -> Vec<String> {
        let mut approvals: Vec<String> = self
            .lock()
            .approvals
            .get(session_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        approvals.sort();
        approvals
    }

    /// Tear down a session: every pending request fails with
    /// [`PermissionError::SessionEnded`] and approvals are forgotten.
    pub fn clear_session(&self, session_id: &str) {
        let drained = {
            let mut state = self.lock();
            state.approvals.remove(session_id);
            state.pending.drain_session(session_id)
        };

        if !drained.is_empty() {
            warn!(
                session_id,
                pending = drained.len(),
                "Session cleared with pending permission requests"
            );
        }
        for entry in drained {
            let request_id = entry.id().to_string();
            entry.resolve(Err(PermissionError::SessionEnded {
                session_id: session_id.to_string(),
                request_id,
            }));
        }
        debug!(session_id, "Cleared permission session");
    }

    /// Forget a session's "always" approvals; pending requests stay.
    pub fn reset_approvals(&self, session_id: &str) {
        self.lock().approvals.remove(session_id);
        debug!(session_id, "Reset session approvals");
    }
}

/// Withdraws a pending request if its `check` future is dropped early.
struct WithdrawOnDrop<'a> {
    manager: &'a PermissionManager,
    session_id: &'a str,
    request_id: &'a str,
    armed: bool,
}

impl Drop for WithdrawOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed
            && self
                .manager
                .respond(self.session_id, self.request_id, PermissionResponse::Reject)
        {
            debug!(
                session_id = self.session_id,
                request_id = self.request_id,
                "Withdrew abandoned permission request"
            );
        }
    }
}
