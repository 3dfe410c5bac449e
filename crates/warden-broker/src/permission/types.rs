//! Permission broker types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use warden_core::permissions::{ActionContext, PermissionKind};

/// A user's answer to a pending permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionResponse {
    /// Allow this request only.
    Once,
    /// Allow this request and remember its patterns for the session.
    Always,
    /// Refuse this request.
    Reject,
}

impl fmt::Display for PermissionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Once => "once",
            Self::Always => "always",
            Self::Reject => "reject",
        })
    }
}

impl std::str::FromStr for PermissionResponse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Self::Once),
            "always" => Ok(Self::Always),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown response: {other}")),
        }
    }
}

/// Why a permission check did not succeed.
///
/// None of these are retried by the broker.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    /// Policy denies the action outright; the user is never asked.
    #[error("{kind} blocked by policy in session {session_id}: {reason}")]
    ConfigDenied {
        session_id: String,
        kind: PermissionKind,
        matched_rule: Option<String>,
        reason: String,
    },

    /// The user refused the request.
    #[error("Permission request {request_id} rejected by user in session {session_id}")]
    UserRejected {
        session_id: String,
        request_id: String,
        context: Box<ActionContext>,
    },

    /// The session was torn down before anyone answered.
    #[error("Session {session_id} ended before permission request {request_id} was answered")]
    SessionEnded {
        session_id: String,
        request_id: String,
    },

    /// Nobody answered before the caller's deadline.
    #[error("Permission request in session {session_id} timed out after {timeout:?}")]
    TimedOut {
        session_id: String,
        timeout: Duration,
    },
}

impl PermissionError {
    pub const fn is_config_denied(&self) -> bool {
        matches!(self, Self::ConfigDenied { .. })
    }

    pub const fn is_user_rejected(&self) -> bool {
        matches!(self, Self::UserRejected { .. })
    }

    pub const fn is_session_ended(&self) -> bool {
        matches!(self, Self::SessionEnded { .. })
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::ConfigDenied { session_id, .. }
            | Self::UserRejected { session_id, .. }
            | Self::SessionEnded { session_id, .. }
            | Self::TimedOut { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PermissionError::ConfigDenied {
            session_id: "s1".into(),
            kind: PermissionKind::Bash,
            matched_rule: Some("rm *".into()),
            reason: "denied by configuration".into(),
        };
        assert_eq!(
            err.to_string(),
            "bash blocked by policy in session s1: denied by configuration"
        );
        assert!(err.is_config_denied());

        let err = PermissionError::SessionEnded {
            session_id: "s1".into(),
            request_id: "r1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Session s1 ended before permission request r1 was answered"
        );
        assert!(err.is_session_ended());
        assert_eq!(err.session_id(), "s1");
    }

    #[test]
    fn response_wire_names() {
        assert_eq!(
            serde_json::to_string(&PermissionResponse::Always).ok().as_deref(),
            Some("\"always\"")
        );
        assert_eq!("reject".parse(), Ok(PermissionResponse::Reject));
        assert!("maybe".parse::<PermissionResponse>().is_err());
    }
}
