//! `SessionControllerActor` - singleton registry and supervisor for sessions.
//!
//! The `SessionControllerActor` is the top-level actor of the timer service:
//!
//! - Singleton per instance
//! - Creates a `SessionActor` lazily on the first join to an unknown id
//! - Destroys a session as soon as its last member leaves
//! - Indexes every joined connection to its one session
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! A session exists exactly while it has at least one member. Joining an id
//! that was destroyed creates a fresh session with a zero timer and no lock.
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the controller:
//! 1. Sets `accepting_new = false` (joins to unknown sessions are refused)
//! 2. Cancels the root `CancellationToken` (propagates to all children)
//! 3. Waits for session actors to stop

use crate::config::RegistrySettings;
use crate::errors::TimerError;
use crate::protocol::ServerEvent;

use super::messages::{ControllerMessage, ControllerStatus, JoinResult, LeaveResult, SessionInfo};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::session::{SessionActor, SessionActorHandle};

use common::types::{ConnectionId, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// How long shutdown waits for session actors when no deadline was given.
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Handle to the `SessionControllerActor`.
///
/// This is the public interface for interacting with the registry.
/// All methods are async and return results via oneshot channels.
#[derive(Clone, Debug)]
pub struct SessionControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl SessionControllerActorHandle {
    /// Create a new `SessionControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        instance_id: String,
        settings: RegistrySettings,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SessionControllerActor::new(
            instance_id,
            receiver,
            cancel_token.clone(),
            settings,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Join `connection_id` to `session_id`, creating the session if needed.
    ///
    /// A connection belongs to at most one session; joining a second one
    /// leaves the first. The joiner's projection is delivered to `outbound`
    /// before any later broadcast.
    pub async fn join(
        &self,
        session_id: SessionId,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Result<JoinResult, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Join {
                session_id,
                connection_id,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a connection from its session, destroying the session when it
    /// becomes empty.
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<LeaveResult, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Leave {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Look up the session a connection has joined.
    pub async fn resolve_session(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<SessionActorHandle>, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::ResolveSession {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))
    }

    /// Get information about a live session. Never creates one.
    pub async fn get_session(&self, session_id: SessionId) -> Result<SessionInfo, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get controller status.
    pub async fn get_status(&self) -> Result<ControllerStatus, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the controller (and all children via token propagation).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the controller is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for creating dependent tasks.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed session.
struct ManagedSession {
    handle: SessionActorHandle,
    task_handle: JoinHandle<()>,
    created_at: i64,
}

/// The `SessionControllerActor` implementation.
///
/// This struct owns the registry state and runs the message loop.
pub struct SessionControllerActor {
    instance_id: String,
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    sessions: HashMap<SessionId, ManagedSession>,
    /// Which session each joined connection belongs to.
    connection_index: HashMap<ConnectionId, SessionId>,
    /// Whether the controller creates new sessions.
    accepting_new: bool,
    /// Total time graceful shutdown may spend waiting for session actors.
    shutdown_deadline: Duration,
    settings: RegistrySettings,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl SessionControllerActor {
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        settings: RegistrySettings,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Controller, &instance_id);

        Self {
            instance_id,
            receiver,
            cancel_token,
            sessions: HashMap::new(),
            connection_index: HashMap::new(),
            accepting_new: true,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
            settings,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "timer.actor.controller", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            "SessionControllerActor started"
        );

        loop {
            // Check for terminated session actors
            self.check_session_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "timer.actor.controller",
                        instance_id = %self.instance_id,
                        "SessionControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue(self.receiver.len());
                            self.handle_message(message).await;
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "timer.actor.controller",
                                instance_id = %self.instance_id,
                                "SessionControllerActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionControllerActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Join {
                session_id,
                connection_id,
                outbound,
                respond_to,
            } => {
                let result = self.join(session_id, connection_id, outbound).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::Leave {
                connection_id,
                respond_to,
            } => {
                let result = self.leave(&connection_id).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::ResolveSession {
                connection_id,
                respond_to,
            } => {
                let handle = self
                    .connection_index
                    .get(&connection_id)
                    .and_then(|session_id| self.sessions.get(session_id))
                    .map(|managed| managed.handle.clone());
                let _ = respond_to.send(handle);
            }

            ControllerMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let result = self.get_session(&session_id).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }
    }

    fn validate_session_id(&self, session_id: &SessionId) -> Result<(), TimerError> {
        if session_id.is_empty() {
            return Err(TimerError::InvalidSessionId("empty".to_string()));
        }
        if session_id.len() >= self.settings.max_session_id_length {
            return Err(TimerError::InvalidSessionId(format!(
                "length {} not below {}",
                session_id.len(),
                self.settings.max_session_id_length
            )));
        }
        Ok(())
    }

    async fn join(
        &mut self,
        session_id: SessionId,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Result<JoinResult, TimerError> {
        self.validate_session_id(&session_id)?;

        // One connection, one session
        if let Some(current) = self.connection_index.get(&connection_id) {
            if *current != session_id {
                debug!(
                    target: "timer.actor.controller",
                    instance_id = %self.instance_id,
                    connection_id = %connection_id,
                    from = %current,
                    to = %session_id,
                    "Connection switching sessions"
                );
                self.leave(&connection_id).await?;
            }
        }

        let handle = match self.sessions.get(&session_id) {
            Some(managed) => managed.handle.clone(),
            None => self.create_session(&session_id)?,
        };

        match handle
            .connection_join(connection_id.clone(), outbound)
            .await
        {
            Ok(view) => {
                self.connection_index
                    .insert(connection_id.clone(), session_id.clone());

                debug!(
                    target: "timer.actor.controller",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    connection_id = %connection_id,
                    "Connection joined"
                );

                Ok(JoinResult {
                    session_id,
                    view,
                    session: handle,
                })
            }
            Err(e) => {
                warn!(
                    target: "timer.actor.controller",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Session refused join"
                );
                if !self.has_members(&session_id) {
                    self.remove_session(&session_id);
                }
                Err(e)
            }
        }
    }

    fn create_session(&mut self, session_id: &SessionId) -> Result<SessionActorHandle, TimerError> {
        if !self.accepting_new {
            return Err(TimerError::Draining);
        }

        if self.sessions.len() >= self.settings.max_sessions {
            warn!(
                target: "timer.actor.controller",
                instance_id = %self.instance_id,
                max_sessions = self.settings.max_sessions,
                "Session capacity reached, refusing new session"
            );
            return Err(TimerError::CapacityExceeded);
        }

        let (handle, task_handle) = SessionActor::spawn(
            session_id.clone(),
            self.settings.session,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.sessions.insert(
            session_id.clone(),
            ManagedSession {
                handle: handle.clone(),
                task_handle,
                created_at: chrono::Utc::now().timestamp(),
            },
        );

        self.metrics.session_created();

        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            session_id = %session_id,
            total_sessions = self.sessions.len(),
            "Session created"
        );

        Ok(handle)
    }

    fn has_members(&self, session_id: &SessionId) -> bool {
        self.connection_index.values().any(|id| id == session_id)
    }

    async fn leave(&mut self, connection_id: &ConnectionId) -> Result<LeaveResult, TimerError> {
        let Some(session_id) = self.connection_index.remove(connection_id) else {
            return Err(TimerError::ConnectionNotFound(connection_id.to_string()));
        };

        let Some(managed) = self.sessions.get(&session_id) else {
            // Session already reaped by the health check
            return Ok(LeaveResult {
                session_id,
                remaining_members: 0,
                session_destroyed: true,
            });
        };

        let remaining_members = match managed.handle.connection_leave(connection_id.clone()).await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    target: "timer.actor.controller",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    connection_id = %connection_id,
                    error = %e,
                    "Session unreachable during leave"
                );
                0
            }
        };

        let session_destroyed = remaining_members == 0;
        if session_destroyed {
            self.remove_session(&session_id);
        }

        debug!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            session_id = %session_id,
            connection_id = %connection_id,
            remaining_members,
            "Connection left"
        );

        Ok(LeaveResult {
            session_id,
            remaining_members,
            session_destroyed,
        })
    }

    /// Remove a session.
    ///
    /// Cancels the session actor and waits for it in a background task so the
    /// message loop never blocks on a stopping session.
    fn remove_session(&mut self, session_id: &SessionId) {
        let Some(managed) = self.sessions.remove(session_id) else {
            return;
        };

        // Drop any index entries still pointing here
        self.connection_index.retain(|_, id| id != session_id);

        managed.handle.cancel();

        let session_id_owned = session_id.clone();
        let instance_id = self.instance_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "timer.actor.controller",
                        instance_id = %instance_id,
                        session_id = %session_id_owned,
                        "Session actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "timer.actor.controller",
                        instance_id = %instance_id,
                        session_id = %session_id_owned,
                        error = ?e,
                        "Session actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "timer.actor.controller",
                        instance_id = %instance_id,
                        session_id = %session_id_owned,
                        "Session actor task cleanup timed out"
                    );
                }
            }
        });

        self.metrics.session_removed();

        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            session_id = %session_id,
            total_sessions = self.sessions.len(),
            "Session destroyed"
        );
    }

    /// Get information about a session, querying the session actor for live state.
    async fn get_session(&self, session_id: &SessionId) -> Result<SessionInfo, TimerError> {
        let Some(managed) = self.sessions.get(session_id) else {
            return Err(TimerError::SessionNotFound(session_id.to_string()));
        };

        let state = managed.handle.get_state().await?;
        Ok(SessionInfo {
            session_id: session_id.clone(),
            member_count: state.members.len(),
            remaining: state.remaining,
            locked: state.locked,
            created_at: managed.created_at,
        })
    }

    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            session_count: self.sessions.len(),
            connection_count: self.connection_index.len(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.receiver.len(),
        }
    }

    /// Initiate graceful shutdown.
    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), TimerError> {
        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            session_count = self.sessions.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;

        // Cancel the root token (propagates to all children)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            session_count = self.sessions.len(),
            deadline_secs = self.shutdown_deadline.as_secs(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;
        let deadline = tokio::time::Instant::now() + self.shutdown_deadline;

        // Already cancelled via the parent token, but be explicit
        for managed in self.sessions.values() {
            managed.handle.cancel();
        }

        for (session_id, managed) in self.sessions.drain() {
            match tokio::time::timeout_at(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "timer.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "timer.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        error = ?e,
                        "Session actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "timer.actor.controller",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        "Session actor shutdown timed out"
                    );
                }
            }
            self.metrics.session_removed();
        }
        self.connection_index.clear();

        info!(
            target: "timer.actor.controller",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Check health of managed session actors.
    async fn check_session_health(&mut self) {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in finished {
            warn!(
                target: "timer.actor.controller",
                instance_id = %self.instance_id,
                session_id = %session_id,
                "Session actor task finished unexpectedly"
            );

            if let Some(managed) = self.sessions.remove(&session_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        info!(
                            target: "timer.actor.controller",
                            instance_id = %self.instance_id,
                            session_id = %session_id,
                            "Session actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "timer.actor.controller",
                                instance_id = %self.instance_id,
                                session_id = %session_id,
                                error = ?join_error,
                                "Session actor panicked - triggering investigation"
                            );
                            self.metrics.record_panic(ActorType::Session);
                        }
                    }
                }

                self.connection_index.retain(|_, id| *id != session_id);
                self.metrics.session_removed();
            }
        }
    }
}
