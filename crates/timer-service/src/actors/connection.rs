//! `ConnectionActor` - per-connection transport endpoint.
//!
//! Each `ConnectionActor`:
//! - Represents exactly one joined connection (one connection = one session)
//! - Owns the outbound sink the gateway reads from
//! - Delivers events from its `SessionActor` to the client in order
//!
//! # Lifecycle
//!
//! 1. Spawned by the `SessionActor` when the connection joins
//! 2. Runs until the sink closes, the connection leaves, or the session ends
//! 3. Cancellation via child token propagates from the `SessionActor`

use crate::protocol::ServerEvent;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{ConnectionId, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the connection mailbox.
const CONNECTION_CHANNEL_BUFFER: usize = 200;

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Queue an event for the client without waiting.
    ///
    /// Used by the session actor, which must never block on a slow client.
    pub fn try_deliver(&self, event: ServerEvent) -> Result<(), TrySendError<ConnectionMessage>> {
        self.sender.try_send(ConnectionMessage::Deliver { event })
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    connection_id: ConnectionId,
    session_id: SessionId,
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Sink read by the gateway's socket writer.
    outbound: mpsc::Sender<ServerEvent>,
    /// Cancellation token (child of the session's token).
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        session_id: SessionId,
        outbound: mpsc::Sender<ServerEvent>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);

        let actor = Self {
            connection_id: connection_id.clone(),
            session_id,
            receiver,
            outbound,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Connection, connection_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "timer.actor.connection",
        fields(connection_id = %self.connection_id, session_id = %self.session_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "timer.actor.connection",
            connection_id = %self.connection_id,
            session_id = %self.session_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "timer.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(ConnectionMessage::Deliver { event }) => {
                            self.mailbox.record_dequeue(self.receiver.len());
                            let delivered = self.handle_deliver(event).await;
                            self.metrics.record_message_processed();

                            if !delivered {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "timer.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "timer.actor.connection",
            connection_id = %self.connection_id,
            session_id = %self.session_id,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Forward an event to the outbound sink. Returns false once the sink
    /// is gone, meaning the client socket has closed.
    async fn handle_deliver(&self, event: ServerEvent) -> bool {
        let name = event.name();
        tokio::select! {
            () = self.cancel_token.cancelled() => true,
            result = self.outbound.send(event) => match result {
                Ok(()) => {
                    debug!(
                        target: "timer.actor.connection",
                        connection_id = %self.connection_id,
                        event = name,
                        "Delivered event to client"
                    );
                    true
                }
                Err(_) => {
                    debug!(
                        target: "timer.actor.connection",
                        connection_id = %self.connection_id,
                        "Outbound sink closed, stopping"
                    );
                    false
                }
            },
        }
    }
}
