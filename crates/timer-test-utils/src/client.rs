//! Fake client connection for driving the registry without a socket.

use common::secret::SecretString;
use common::types::{ConnectionId, SessionId};
use std::time::Duration;
use timer_service::actors::{
    JoinResult, LeaveResult, SessionActorHandle, SessionControllerActorHandle,
};
use timer_service::lock::UnlockScope;
use timer_service::protocol::{ServerEvent, TimerCommand, TimerView};
use tokio::sync::mpsc;

/// How long [`TestClient::expect_no_event`] waits before concluding silence.
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Outbound buffer for a test client.
const CLIENT_BUFFER: usize = 256;

/// A joined connection and the events it has been sent.
pub struct TestClient {
    pub connection_id: ConnectionId,
    pub session: SessionActorHandle,
    /// Projection returned by the join.
    pub joined_view: TimerView,
    rx: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Join `session_id` as connection `name` and consume the initial
    /// `timer_update`.
    pub async fn join(
        controller: &SessionControllerActorHandle,
        session_id: &str,
        name: &str,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel(CLIENT_BUFFER);
        let connection_id = ConnectionId::from(name);
        let JoinResult { session, view, .. } = controller
            .join(SessionId::from(session_id), connection_id.clone(), tx)
            .await
            .expect("join should succeed");

        match rx.recv().await {
            Some(ServerEvent::TimerUpdate(initial)) => assert_eq!(initial, view),
            other => panic!("expected initial timer_update, got {other:?}"),
        }

        Self {
            connection_id,
            session,
            joined_view: view,
            rx,
        }
    }

    /// Forward a command as this connection.
    pub async fn send(&self, command: TimerCommand) {
        self.session
            .command(self.connection_id.clone(), command)
            .await
            .expect("session should accept commands");
    }

    /// Send `toggle_lock` with the given PIN and scope.
    pub async fn toggle_lock(&self, pin: &str, scope: UnlockScope) {
        self.send(TimerCommand::ToggleLock {
            pin: SecretString::from(pin),
            scope,
        })
        .await;
    }

    /// Leave through the registry.
    pub async fn leave(self, controller: &SessionControllerActorHandle) -> LeaveResult {
        controller
            .leave(self.connection_id.clone())
            .await
            .expect("leave should succeed")
    }

    /// Next event of any kind.
    pub async fn next_event(&mut self) -> ServerEvent {
        self.rx.recv().await.expect("event stream closed")
    }

    /// Next event, which must be a `timer_update`.
    pub async fn next_update(&mut self) -> TimerView {
        match self.next_event().await {
            ServerEvent::TimerUpdate(view) => view,
            other => panic!("expected timer_update, got {other:?}"),
        }
    }

    /// Assert that nothing arrives within [`QUIET_PERIOD`].
    pub async fn expect_no_event(&mut self) {
        if let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, self.rx.recv()).await {
            panic!("expected no event, got {event:?}");
        }
    }
}
