//! Timer service error types.
//!
//! Clients never see most of these: refused timer events are silent no-ops
//! on the wire and only show up in logs and metrics. The exceptions are
//! join failures, which close the socket with [`TimerError::client_message`].

use thiserror::Error;

/// Timer service error type.
#[derive(Debug, Error)]
pub enum TimerError {
    /// Session identifier missing, empty or too long.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Session not found in the registry.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Connection is not a member of any session.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Instance is at its session limit.
    #[error("Session capacity exceeded")]
    CapacityExceeded,

    /// Instance is draining (graceful shutdown).
    #[error("Service is draining")]
    Draining,

    /// Mutation attempted by a connection the lock does not authorize.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Lock transition refused.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Client event could not be turned into a timer command.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Internal error (actor plumbing).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a lock transition can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// PIN is not at least six ASCII digits.
    #[error("PIN must be at least 6 digits")]
    InvalidPin,

    /// Claim attempted while the session is already locked.
    #[error("Session is already locked")]
    AlreadyLocked,

    /// Grant or release attempted while the session is unlocked.
    #[error("Session is not locked")]
    NotLocked,

    /// PIN does not match the one the lock was claimed with.
    #[error("PIN does not match")]
    PinMismatch,

    /// Connection is serving a wrong-PIN penalty.
    #[error("Connection is temporarily blocked")]
    Penalized,

    /// Random key generation for the PIN digest failed.
    #[error("PIN digest key generation failed")]
    KeyGeneration,
}

impl TimerError {
    /// Returns a bounded label for metrics (`timer_commands_total{result}` etc).
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            TimerError::InvalidSessionId(_) => "invalid_session_id",
            TimerError::SessionNotFound(_) => "session_not_found",
            TimerError::ConnectionNotFound(_) => "connection_not_found",
            TimerError::CapacityExceeded => "capacity_exceeded",
            TimerError::Draining => "draining",
            TimerError::PermissionDenied(_) => "permission_denied",
            TimerError::Lock(e) => e.metric_label(),
            TimerError::InvalidCommand(_) => "invalid_command",
            TimerError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            TimerError::InvalidSessionId(_) => "Invalid session id".to_string(),
            TimerError::SessionNotFound(_) => "Session not found".to_string(),
            TimerError::ConnectionNotFound(_) => "Not joined to a session".to_string(),
            TimerError::CapacityExceeded => "Server is at capacity, please try again".to_string(),
            TimerError::Draining => "Server is shutting down, please reconnect".to_string(),
            TimerError::PermissionDenied(_) => "Timer is locked".to_string(),
            TimerError::Lock(e) => e.to_string(),
            TimerError::InvalidCommand(_) => "Invalid request".to_string(),
            TimerError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl LockError {
    /// Returns a bounded label for metrics.
    #[must_use]
    pub const fn metric_label(&self) -> &'static str {
        match self {
            LockError::InvalidPin => "invalid_pin",
            LockError::AlreadyLocked => "already_locked",
            LockError::NotLocked => "not_locked",
            LockError::PinMismatch => "pin_mismatch",
            LockError::Penalized => "penalized",
            LockError::KeyGeneration => "key_generation",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels_are_bounded() {
        assert_eq!(
            TimerError::InvalidSessionId("empty".to_string()).metric_label(),
            "invalid_session_id"
        );
        assert_eq!(TimerError::Draining.metric_label(), "draining");
        assert_eq!(
            TimerError::Lock(LockError::PinMismatch).metric_label(),
            "pin_mismatch"
        );
        assert_eq!(
            TimerError::Internal("channel closed".to_string()).metric_label(),
            "internal"
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = TimerError::Internal("channel send failed: receiver dropped".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = TimerError::InvalidSessionId("x".repeat(600));
        assert!(!err.client_message().contains("xxx"));
    }

    #[test]
    fn test_lock_error_conversion() {
        let err: TimerError = LockError::AlreadyLocked.into();
        assert!(matches!(err, TimerError::Lock(LockError::AlreadyLocked)));
        assert_eq!(err.to_string(), "Lock error: Session is already locked");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", TimerError::SessionNotFound("standup".to_string())),
            "Session not found: standup"
        );
        assert_eq!(
            format!("{}", TimerError::CapacityExceeded),
            "Session capacity exceeded"
        );
    }
}
