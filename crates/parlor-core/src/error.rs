use parlor_types::events::{ErrorKind, ServerEvent};
use thiserror::Error;

/// Engine error taxonomy. Every error is surfaced to the originating client
/// only — errors never fan out to other sessions and never abort the process.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed, oversized or empty input. No state was changed.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Wrong author, wrong secret, wrong turn.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Unknown message / game / poll / invite id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Display name already held by a live session.
    #[error("username taken")]
    UsernameTaken,

    /// Ban or private-mode admission failure.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Global mute is on and the sender is not an admin.
    #[error("server is muted")]
    Muted,

    /// Slow mode rejection, with the retry hint in whole seconds (rounded up).
    #[error("slow mode: {remaining}s remaining")]
    SlowMode { remaining: u64 },

    /// Unexpected failure inside a handler. Logged at the boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Map the error onto the wire event sent back to the originator.
    pub fn to_event(&self) -> ServerEvent {
        match self {
            Self::Rejected(msg) => ServerEvent::Error {
                kind: ErrorKind::RejectedInput,
                message: msg.clone(),
            },
            Self::Permission(msg) => ServerEvent::Error {
                kind: ErrorKind::PermissionDenied,
                message: msg.clone(),
            },
            Self::NotFound(msg) => ServerEvent::Error {
                kind: ErrorKind::NotFound,
                message: msg.clone(),
            },
            Self::UsernameTaken => ServerEvent::UsernameTaken,
            Self::AccessDenied(reason) => ServerEvent::AccessDenied {
                reason: reason.clone(),
            },
            Self::Muted => ServerEvent::Muted,
            Self::SlowMode { remaining } => ServerEvent::SlowModeActive {
                remaining_seconds: *remaining,
            },
            Self::Internal(_) => ServerEvent::Error {
                kind: ErrorKind::Internal,
                message: "internal error".into(),
            },
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
