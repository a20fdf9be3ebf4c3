//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::TimerError;
use crate::protocol::{ServerEvent, TimerCommand, TimerView};
use crate::timer::Remaining;

use super::session::SessionActorHandle;

use common::types::{ConnectionId, SessionId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Messages sent to `SessionControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Join a connection to a session, creating the session if needed.
    Join {
        session_id: SessionId,
        connection_id: ConnectionId,
        /// Sink for events addressed to this connection.
        outbound: mpsc::Sender<ServerEvent>,
        /// Response channel for the join result.
        respond_to: oneshot::Sender<Result<JoinResult, TimerError>>,
    },

    /// Remove a connection from whatever session it belongs to.
    Leave {
        connection_id: ConnectionId,
        /// Response channel for the leave result.
        respond_to: oneshot::Sender<Result<LeaveResult, TimerError>>,
    },

    /// Look up the session a connection belongs to.
    ResolveSession {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<SessionActorHandle>>,
    },

    /// Get information about an existing session (never creates one).
    GetSession {
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<SessionInfo, TimerError>>,
    },

    /// Get current status of the registry (for health checks).
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        /// Deadline for shutdown.
        deadline: Duration,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), TimerError>>,
    },
}

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Add a connection to the member set.
    ConnectionJoin {
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
        /// Response channel with the joiner's projection.
        respond_to: oneshot::Sender<Result<TimerView, TimerError>>,
    },

    /// Remove a connection from the member set.
    ConnectionLeave {
        connection_id: ConnectionId,
        /// Response channel with the number of members left.
        respond_to: oneshot::Sender<usize>,
    },

    /// A client event from a member connection. Refusals are silent.
    Command {
        connection_id: ConnectionId,
        command: TimerCommand,
    },

    /// Countdown tick from the session's countdown task.
    Tick {
        generation: u64,
        respond_to: oneshot::Sender<TickReply>,
    },

    /// Get current session state (for debugging/health).
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Messages sent to `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Deliver an event to the connected client.
    Deliver { event: ServerEvent },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinResult {
    /// Session the connection now belongs to.
    pub session_id: SessionId,
    /// The joiner's projection at join time (already delivered to it).
    pub view: TimerView,
    /// Handle for forwarding the connection's commands.
    pub session: SessionActorHandle,
}

/// Result of a leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveResult {
    /// Session the connection left.
    pub session_id: SessionId,
    /// Members remaining after the leave.
    pub remaining_members: usize,
    /// Whether the leave emptied and destroyed the session.
    pub session_destroyed: bool,
}

/// Information about a session returned by `GetSession`.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session ID.
    pub session_id: SessionId,
    /// Current member count.
    pub member_count: usize,
    /// Current timer value.
    pub remaining: Remaining,
    /// Whether the session is locked.
    pub locked: bool,
    /// Session creation timestamp.
    pub created_at: i64,
}

/// Status of the `SessionControllerActor`.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    /// Total live sessions.
    pub session_count: usize,
    /// Total joined connections across all sessions.
    pub connection_count: usize,
    /// Whether the controller is draining.
    pub is_draining: bool,
    /// Current mailbox depth.
    pub mailbox_depth: usize,
}

/// Snapshot of a session's state.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: SessionId,
    pub remaining: Remaining,
    /// Value `reset` would restore, if any.
    pub previous: Option<Remaining>,
    pub locked: bool,
    pub authorized_count: usize,
    /// Member connection IDs, sorted.
    pub members: Vec<ConnectionId>,
    /// Generation of the active countdown task, if one is running.
    pub countdown_generation: Option<u64>,
    pub created_at: i64,
}

/// Session actor's answer to a countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReply {
    /// Sleep another interval and tick again.
    Continue,
    /// Exit the countdown task.
    Stop,
}
