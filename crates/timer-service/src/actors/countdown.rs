//! Countdown task - the per-session ticker.
//!
//! A running session owns exactly one `Countdown`. The task sleeps one tick
//! interval, then asks its `SessionActor` to apply a tick. It holds only a
//! weak sender to the session mailbox, so it never keeps a destroyed session
//! alive: once the session actor is gone the upgrade fails and the task
//! exits.
//!
//! Every countdown carries a generation number. The session actor applies a
//! tick only when its generation matches the countdown it currently owns,
//! so a tick that was already in flight when the timer was stopped, cleared,
//! reset or restarted is answered with [`TickReply::Stop`] and changes
//! nothing.

use super::messages::{SessionMessage, TickReply};

use common::types::SessionId;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Handle to a running countdown task.
#[derive(Debug)]
pub struct Countdown {
    generation: u64,
    cancel_token: CancellationToken,
    task_handle: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a countdown task for `session_id`.
    ///
    /// `cancel_token` should be a child of the session's token so that
    /// destroying the session stops the countdown too.
    pub fn spawn(
        session_id: SessionId,
        generation: u64,
        interval: Duration,
        session: mpsc::WeakSender<SessionMessage>,
        cancel_token: CancellationToken,
    ) -> Self {
        let task_handle = tokio::spawn(run(
            session_id,
            generation,
            interval,
            session,
            cancel_token.clone(),
        ));

        Self {
            generation,
            cancel_token,
            task_handle,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[instrument(
    skip_all,
    name = "timer.countdown",
    fields(session_id = %session_id, generation = generation)
)]
async fn run(
    session_id: SessionId,
    generation: u64,
    interval: Duration,
    session: mpsc::WeakSender<SessionMessage>,
    cancel_token: CancellationToken,
) {
    debug!(
        target: "timer.countdown",
        session_id = %session_id,
        generation,
        interval_secs = interval.as_secs(),
        "Countdown started"
    );

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        // A stop may have landed while we slept
        if cancel_token.is_cancelled() {
            break;
        }

        let Some(sender) = session.upgrade() else {
            debug!(
                target: "timer.countdown",
                session_id = %session_id,
                generation,
                "Session is gone, stopping countdown"
            );
            break;
        };

        let (tx, rx) = oneshot::channel();
        if sender
            .send(SessionMessage::Tick {
                generation,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            break;
        }
        drop(sender);

        ticks += 1;
        match rx.await {
            Ok(TickReply::Continue) => {}
            Ok(TickReply::Stop) | Err(_) => break,
        }
    }

    debug!(
        target: "timer.countdown",
        session_id = %session_id,
        generation,
        ticks,
        "Countdown stopped"
    );
}
