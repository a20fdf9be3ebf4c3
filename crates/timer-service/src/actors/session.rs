//! `SessionActor` - per-session actor that owns the timer state.
//!
//! Each `SessionActor`:
//! - Owns the timer value, the reset snapshot and the PIN lock for one session
//! - Supervises one `ConnectionActor` per member connection
//! - Owns at most one `Countdown` task while the timer is running
//! - Projects its state per viewer and delivers it to members
//!
//! Every join, leave, client command and countdown tick is a message on this
//! actor's mailbox, so they apply one at a time in arrival order. No other
//! task ever touches the session's fields.
//!
//! # Refusals
//!
//! Commands from non-members, from connections serving a wrong-PIN penalty,
//! or mutations the lock does not allow are dropped without any reply to the
//! client. They are logged and counted in `timer_commands_total`.

use crate::config::SessionSettings;
use crate::errors::TimerError;
use crate::lock::{LockGate, LockTransition, UnlockScope};
use crate::observability::metrics as prom;
use crate::protocol::{ServerEvent, TimerCommand, TimerView};
use crate::timer::{Remaining, TickOutcome};

use super::connection::{ConnectionActor, ConnectionActorHandle};
use super::countdown::Countdown;
use super::messages::{SessionMessage, SessionState, TickReply};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::secret::SecretString;
use common::types::{ConnectionId, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 500;

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Add a connection to this session.
    ///
    /// The joiner's projection is delivered to `outbound` and also returned.
    /// Joining twice with the same connection ID is a no-op apart from
    /// re-sending the projection.
    pub async fn connection_join(
        &self,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Result<TimerView, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::ConnectionJoin {
                connection_id,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a connection. Returns the number of members left.
    pub async fn connection_leave(&self, connection_id: ConnectionId) -> Result<usize, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::ConnectionLeave {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))
    }

    /// Forward a client command. Fire-and-forget: refusals are silent.
    pub async fn command(
        &self,
        connection_id: ConnectionId,
        command: TimerCommand,
    ) -> Result<(), TimerError> {
        self.sender
            .send(SessionMessage::Command {
                connection_id,
                command,
            })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))
    }

    /// Get the current session state.
    pub async fn get_state(&self) -> Result<SessionState, TimerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| TimerError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| TimerError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the session actor (and with it the countdown and connections).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A member connection and its actor task.
struct ManagedConnection {
    handle: ConnectionActorHandle,
    task_handle: JoinHandle<()>,
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    session_id: SessionId,
    receiver: mpsc::Receiver<SessionMessage>,
    /// Own mailbox, handed to countdown tasks. Weak so the actor stops
    /// when every handle is dropped.
    mailbox_sender: mpsc::WeakSender<SessionMessage>,
    /// Cancellation token (child of the controller's token).
    cancel_token: CancellationToken,
    settings: SessionSettings,
    remaining: Remaining,
    /// Snapshot taken by the last `start` or `set`; what `reset` restores.
    previous: Option<Remaining>,
    lock: LockGate,
    members: HashMap<ConnectionId, ManagedConnection>,
    countdown: Option<Countdown>,
    /// Generation handed to the most recently spawned countdown.
    countdown_generation: u64,
    created_at: i64,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl SessionActor {
    /// Spawn a new session actor with a zero-valued, unlocked timer.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        session_id: SessionId,
        settings: SessionSettings,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);

        let actor = Self {
            session_id: session_id.clone(),
            receiver,
            mailbox_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            settings,
            remaining: Remaining::ZERO,
            previous: None,
            lock: LockGate::new(settings.pin_penalty),
            members: HashMap::new(),
            countdown: None,
            countdown_generation: 0,
            created_at: chrono::Utc::now().timestamp(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Session, session_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "timer.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "timer.actor.session",
            session_id = %self.session_id,
            "SessionActor started"
        );

        loop {
            // Check for terminated connection actors
            self.check_connection_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "timer.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue(self.receiver.len());
                            self.handle_message(message);
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "timer.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "timer.actor.session",
            session_id = %self.session_id,
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::ConnectionJoin {
                connection_id,
                outbound,
                respond_to,
            } => {
                let result = self.handle_join(connection_id, outbound);
                let _ = respond_to.send(result);
            }

            SessionMessage::ConnectionLeave {
                connection_id,
                respond_to,
            } => {
                let remaining_members = self.handle_leave(&connection_id);
                let _ = respond_to.send(remaining_members);
            }

            SessionMessage::Command {
                connection_id,
                command,
            } => {
                self.handle_command(&connection_id, command);
            }

            SessionMessage::Tick {
                generation,
                respond_to,
            } => {
                let reply = self.handle_tick(generation);
                let _ = respond_to.send(reply);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }
        }
    }

    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Result<TimerView, TimerError> {
        if self.cancel_token.is_cancelled() {
            return Err(TimerError::SessionNotFound(self.session_id.to_string()));
        }

        let view = self.view_for(&connection_id, false);

        if let Some(managed) = self.members.get(&connection_id) {
            debug!(
                target: "timer.actor.session",
                session_id = %self.session_id,
                connection_id = %connection_id,
                "Connection already joined, re-sending state"
            );
            self.deliver(managed, ServerEvent::TimerUpdate(view.clone()));
            return Ok(view);
        }

        let (handle, task_handle) = ConnectionActor::spawn(
            connection_id.clone(),
            self.session_id.clone(),
            outbound,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );
        let managed = ManagedConnection {
            handle,
            task_handle,
        };
        self.deliver(&managed, ServerEvent::TimerUpdate(view.clone()));
        self.members.insert(connection_id.clone(), managed);
        self.metrics.connection_created();

        info!(
            target: "timer.actor.session",
            session_id = %self.session_id,
            connection_id = %connection_id,
            members = self.members.len(),
            "Connection joined session"
        );

        Ok(view)
    }

    fn handle_leave(&mut self, connection_id: &ConnectionId) -> usize {
        if let Some(managed) = self.members.remove(connection_id) {
            managed.handle.cancel();
            self.lock.forget(connection_id);
            self.metrics.connection_closed();

            info!(
                target: "timer.actor.session",
                session_id = %self.session_id,
                connection_id = %connection_id,
                members = self.members.len(),
                "Connection left session"
            );
        }

        if self.members.is_empty() {
            // Nobody is watching; the registry is about to destroy us
            self.stop_countdown();
        }

        self.members.len()
    }

    fn handle_command(&mut self, connection_id: &ConnectionId, command: TimerCommand) {
        let name = command.name();
        match self.apply_command(connection_id, command) {
            Ok(()) => {
                prom::record_command(name, "ok");
                debug!(
                    target: "timer.actor.session",
                    session_id = %self.session_id,
                    connection_id = %connection_id,
                    command = name,
                    "Command applied"
                );
            }
            Err(e) => {
                prom::record_command(name, e.metric_label());
                if matches!(e, TimerError::Internal(_)) {
                    warn!(
                        target: "timer.actor.session",
                        session_id = %self.session_id,
                        connection_id = %connection_id,
                        command = name,
                        error = %e,
                        "Command failed"
                    );
                } else {
                    info!(
                        target: "timer.actor.session",
                        session_id = %self.session_id,
                        connection_id = %connection_id,
                        command = name,
                        reason = e.metric_label(),
                        "Command refused"
                    );
                }
            }
        }
    }

    /// Apply a command from a member. Mutations broadcast on success.
    fn apply_command(
        &mut self,
        connection_id: &ConnectionId,
        command: TimerCommand,
    ) -> Result<(), TimerError> {
        if !self.members.contains_key(connection_id) {
            return Err(TimerError::ConnectionNotFound(connection_id.to_string()));
        }

        self.lock.check_penalty(connection_id, Instant::now())?;

        if command.is_mutation() && !self.lock.may_mutate(connection_id) {
            return Err(TimerError::PermissionDenied(connection_id.to_string()));
        }

        match command {
            TimerCommand::Start => {
                self.previous = Some(self.remaining);
                self.remaining.running = true;
                self.ensure_countdown();
            }
            TimerCommand::Stop => {
                self.remaining.running = false;
                self.stop_countdown();
            }
            TimerCommand::Reset => {
                self.remaining = self.previous.unwrap_or(Remaining::ZERO);
                self.remaining.running = false;
                self.stop_countdown();
            }
            TimerCommand::Clear => {
                self.remaining = Remaining::ZERO;
                self.stop_countdown();
            }
            TimerCommand::Set { unit, value } => {
                self.previous = Some(self.remaining);
                self.remaining.set(unit, value);
            }
            TimerCommand::Increment { unit } => self.remaining.increment(unit),
            TimerCommand::Decrement { unit } => self.remaining.decrement(unit),
            TimerCommand::GetTimer => {
                self.send_view(connection_id, false);
                return Ok(());
            }
            TimerCommand::ToggleLock { pin, scope } => {
                return self.toggle_lock(connection_id, &pin, scope);
            }
        }

        self.broadcast_views(false);
        Ok(())
    }

    fn toggle_lock(
        &mut self,
        connection_id: &ConnectionId,
        pin: &SecretString,
        scope: UnlockScope,
    ) -> Result<(), TimerError> {
        let transition = match self.lock.toggle(connection_id, pin, scope, Instant::now()) {
            Ok(transition) => transition,
            Err(e) => {
                prom::record_lock_transition(e.metric_label());
                return Err(e.into());
            }
        };
        prom::record_lock_transition(transition.as_str());

        info!(
            target: "timer.actor.session",
            session_id = %self.session_id,
            connection_id = %connection_id,
            transition = transition.as_str(),
            authorized = self.lock.authorized_count(),
            "Lock state changed"
        );

        match transition {
            LockTransition::Claimed => {
                let notice = ServerEvent::Lock {
                    session_id: self.session_id.clone(),
                };
                for (member_id, managed) in &self.members {
                    if member_id != connection_id {
                        self.deliver(managed, notice.clone());
                    }
                }
                self.broadcast_views(false);
            }
            LockTransition::GrantedSelf => self.send_view(connection_id, false),
            LockTransition::ReleasedAll => {
                let notice = ServerEvent::Unlock {
                    session_id: self.session_id.clone(),
                };
                for managed in self.members.values() {
                    self.deliver(managed, notice.clone());
                }
                self.broadcast_views(false);
            }
        }

        Ok(())
    }

    /// Apply a countdown tick if it comes from the active countdown of a
    /// running timer.
    fn handle_tick(&mut self, generation: u64) -> TickReply {
        let is_active = self
            .countdown
            .as_ref()
            .is_some_and(|c| c.generation() == generation && !c.is_cancelled());
        if !is_active || !self.remaining.running {
            debug!(
                target: "timer.countdown",
                session_id = %self.session_id,
                generation,
                running = self.remaining.running,
                "Ignoring stale tick"
            );
            prom::record_tick("stale");
            if is_active {
                self.stop_countdown();
            }
            return TickReply::Stop;
        }

        match self.remaining.apply_tick(self.settings.tick_interval) {
            TickOutcome::Exhausted => {
                prom::record_tick("exhausted");
                self.stop_countdown();
                TickReply::Stop
            }
            TickOutcome::Decremented => {
                prom::record_tick("decremented");
                self.broadcast_views(false);
                TickReply::Continue
            }
            TickOutcome::Finished => {
                prom::record_tick("finished");
                self.stop_countdown();
                info!(
                    target: "timer.countdown",
                    session_id = %self.session_id,
                    "Countdown finished"
                );
                self.broadcast_views(true);
                TickReply::Stop
            }
        }
    }

    /// Spawn a countdown unless one is already running.
    fn ensure_countdown(&mut self) {
        if self
            .countdown
            .as_ref()
            .is_some_and(|c| !c.is_cancelled() && !c.is_finished())
        {
            return;
        }

        self.countdown_generation += 1;
        self.countdown = Some(Countdown::spawn(
            self.session_id.clone(),
            self.countdown_generation,
            self.settings.tick_interval,
            self.mailbox_sender.clone(),
            self.cancel_token.child_token(),
        ));
    }

    /// Cancel the active countdown, if any. Idempotent.
    fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
    }

    /// Project the session for one viewer.
    fn view_for(&self, connection_id: &ConnectionId, just_finished: bool) -> TimerView {
        TimerView {
            session_id: self.session_id.clone(),
            remaining: self.remaining,
            just_finished,
            locked: self.lock.is_locked(),
            locked_for_me: self.lock.may_mutate(connection_id),
        }
    }

    /// Send each member its own projection.
    fn broadcast_views(&self, just_finished: bool) {
        for (connection_id, managed) in &self.members {
            let view = self.view_for(connection_id, just_finished);
            self.deliver(managed, ServerEvent::TimerUpdate(view));
        }
    }

    /// Send one member its projection.
    fn send_view(&self, connection_id: &ConnectionId, just_finished: bool) {
        if let Some(managed) = self.members.get(connection_id) {
            let view = self.view_for(connection_id, just_finished);
            self.deliver(managed, ServerEvent::TimerUpdate(view));
        }
    }

    /// Queue an event on a member's connection actor without blocking.
    fn deliver(&self, managed: &ManagedConnection, event: ServerEvent) {
        match managed.handle.try_deliver(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    target: "timer.actor.session",
                    session_id = %self.session_id,
                    connection_id = %managed.handle.connection_id(),
                    "Connection mailbox full, dropping event"
                );
                self.mailbox.record_drop();
            }
            Err(TrySendError::Closed(_)) => {
                // Reaped by check_connection_health
                debug!(
                    target: "timer.actor.session",
                    session_id = %self.session_id,
                    connection_id = %managed.handle.connection_id(),
                    "Connection actor gone, skipping delivery"
                );
            }
        }
    }

    fn get_state(&self) -> SessionState {
        let mut members: Vec<ConnectionId> = self.members.keys().cloned().collect();
        members.sort();

        SessionState {
            session_id: self.session_id.clone(),
            remaining: self.remaining,
            previous: self.previous,
            locked: self.lock.is_locked(),
            authorized_count: self.lock.authorized_count(),
            members,
            countdown_generation: self
                .countdown
                .as_ref()
                .filter(|c| !c.is_cancelled())
                .map(Countdown::generation),
            created_at: self.created_at,
        }
    }

    /// Remove members whose connection actor has exited on its own.
    async fn check_connection_health(&mut self) {
        let finished: Vec<ConnectionId> = self
            .members
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for connection_id in finished {
            if let Some(managed) = self.members.remove(&connection_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        debug!(
                            target: "timer.actor.session",
                            session_id = %self.session_id,
                            connection_id = %connection_id,
                            "Connection actor exited"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "timer.actor.session",
                                session_id = %self.session_id,
                                connection_id = %connection_id,
                                error = ?join_error,
                                "Connection actor panicked"
                            );
                            self.metrics.record_panic(ActorType::Connection);
                        }
                    }
                }

                self.lock.forget(&connection_id);
                self.metrics.connection_closed();

                if self.members.is_empty() {
                    self.stop_countdown();
                }
            }
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "timer.actor.session",
            session_id = %self.session_id,
            members = self.members.len(),
            "Performing graceful shutdown"
        );

        self.stop_countdown();

        for managed in self.members.values() {
            managed.handle.cancel();
        }

        for (connection_id, managed) in self.members.drain() {
            match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "timer.actor.session",
                        session_id = %self.session_id,
                        connection_id = %connection_id,
                        "Connection completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "timer.actor.session",
                        session_id = %self.session_id,
                        connection_id = %connection_id,
                        error = ?e,
                        "Connection task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "timer.actor.session",
                        session_id = %self.session_id,
                        connection_id = %connection_id,
                        "Connection shutdown timed out"
                    );
                }
            }
            self.metrics.connection_closed();
        }

        info!(
            target: "timer.actor.session",
            session_id = %self.session_id,
            "Graceful shutdown complete"
        );
    }
}
