//! Actor metrics and mailbox monitoring.
//!
//! Provides mailbox depth monitoring with configurable thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Session    | < 100  | 100-500 | > 500    |
//! | Connection | < 50   | 50-200  | > 200    |
//!
//! [`ActorMetrics`] keeps in-process counters for status queries and
//! mirrors the active session/connection counts into the Prometheus gauges
//! in [`crate::observability::metrics`].

use crate::observability::metrics as prom;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for session actors.
pub const SESSION_MAILBOX_NORMAL: usize = 100;
pub const SESSION_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for connection actors.
pub const CONNECTION_MAILBOX_NORMAL: usize = 50;
pub const CONNECTION_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// SessionControllerActor (singleton).
    Controller,
    /// SessionActor (one per session).
    Session,
    /// ConnectionActor (one per joined connection).
    Connection,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Controller => "controller",
            ActorType::Session => "session",
            ActorType::Connection => "connection",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Controller | ActorType::Session => SESSION_MAILBOX_WARNING,
            ActorType::Connection => CONNECTION_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Controller | ActorType::Session => SESSION_MAILBOX_NORMAL,
            ActorType::Connection => CONNECTION_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Actor identifier (session_id, connection_id, instance id).
    actor_id: String,
    depth: AtomicUsize,
    /// Peak mailbox depth since last reset.
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
    /// Outbound messages dropped due to backpressure.
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Record a message taken off the mailbox with `backlog` messages still
    /// queued behind it.
    ///
    /// The backlog comes from the receiver itself (`Receiver::len`), so the
    /// depth reflects what is actually waiting rather than the message in
    /// hand.
    pub fn record_dequeue(&self, backlog: usize) {
        let previous = self.depth.swap(backlog, Ordering::Relaxed);
        self.peak_depth.fetch_max(backlog, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);

        match self.level_for_depth(backlog) {
            MailboxLevel::Critical => {
                warn!(
                    target: "timer.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = backlog,
                    threshold = self.actor_type.warning_threshold(),
                    "Mailbox depth critical"
                );
            }
            MailboxLevel::Warning if self.level_for_depth(previous) == MailboxLevel::Normal => {
                // Log once when crossing into the warning band
                debug!(
                    target: "timer.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = backlog,
                    "Mailbox depth elevated"
                );
            }
            MailboxLevel::Warning | MailboxLevel::Normal => {}
        }
    }

    /// Record an outbound message dropped due to backpressure.
    pub fn record_drop(&self) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_message_dropped(self.actor_type.as_str());
        warn!(
            target: "timer.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped,
            "Message dropped due to backpressure"
        );
    }

    /// Backlog seen at the most recent dequeue.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Level of the most recently sampled depth.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the actor system.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Total sessions currently live.
    pub active_sessions: AtomicUsize,
    /// Total connections currently joined.
    pub active_connections: AtomicUsize,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment live session count.
    pub fn session_created(&self) {
        let count = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_sessions_active(count);
    }

    /// Decrement live session count.
    pub fn session_removed(&self) {
        let count = decrement(&self.active_sessions);
        prom::set_sessions_active(count);
    }

    /// Increment joined connection count.
    pub fn connection_created(&self) {
        let count = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_connections_active(count);
    }

    /// Decrement joined connection count.
    pub fn connection_closed(&self) {
        let count = decrement(&self.active_connections);
        prom::set_connections_active(count);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        let total = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "timer.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = total,
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    /// Record a message being processed.
    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Saturating decrement; returns the new value.
fn decrement(counter: &AtomicUsize) -> usize {
    let previous = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_sub(1))
        })
        .unwrap_or(0);
    previous.saturating_sub(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_as_str() {
        assert_eq!(ActorType::Controller.as_str(), "controller");
        assert_eq!(ActorType::Session.as_str(), "session");
        assert_eq!(ActorType::Connection.as_str(), "connection");
    }

    #[test]
    fn test_actor_type_thresholds() {
        assert_eq!(ActorType::Session.normal_threshold(), 100);
        assert_eq!(ActorType::Session.warning_threshold(), 500);
        assert_eq!(ActorType::Connection.normal_threshold(), 50);
        assert_eq!(ActorType::Connection.warning_threshold(), 200);
    }

    #[test]
    fn test_mailbox_monitor_tracks_backlog() {
        let monitor = MailboxMonitor::new(ActorType::Session, "standup");

        assert_eq!(monitor.current_depth(), 0);

        monitor.record_dequeue(3);
        assert_eq!(monitor.current_depth(), 3);
        assert_eq!(monitor.peak_depth(), 3);

        monitor.record_dequeue(2);
        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 3); // Peak stays at 3
        assert_eq!(monitor.messages_processed(), 2);
    }

    #[test]
    fn test_mailbox_monitor_levels() {
        let monitor = MailboxMonitor::new(ActorType::Connection, "conn-456");
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        monitor.record_dequeue(75);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        monitor.record_dequeue(225);
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);

        monitor.record_dequeue(0);
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);
    }

    #[tokio::test]
    async fn test_mailbox_monitor_sees_queued_messages() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<u32>(500);
        for i in 0..120 {
            tx.send(i).await.unwrap();
        }

        let monitor = MailboxMonitor::new(ActorType::Session, "standup");
        let first = rx.recv().await.unwrap();
        monitor.record_dequeue(rx.len());

        assert_eq!(first, 0);
        assert_eq!(monitor.current_depth(), 119);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);
    }

    #[test]
    fn test_mailbox_monitor_drop() {
        let monitor = MailboxMonitor::new(ActorType::Session, "standup");

        monitor.record_drop();
        monitor.record_drop();
        assert_eq!(monitor.messages_dropped(), 2);
    }

    #[test]
    fn test_actor_metrics_counts() {
        let metrics = ActorMetrics::new();

        metrics.session_created();
        metrics.session_created();
        metrics.connection_created();
        assert_eq!(metrics.session_count(), 2);
        assert_eq!(metrics.connection_count(), 1);

        metrics.session_removed();
        metrics.connection_closed();
        assert_eq!(metrics.session_count(), 1);
        assert_eq!(metrics.connection_count(), 0);
    }

    #[test]
    fn test_actor_metrics_decrement_saturates() {
        let metrics = ActorMetrics::new();
        metrics.connection_closed();
        assert_eq!(metrics.connection_count(), 0);
    }

    #[test]
    fn test_actor_metrics_panics() {
        let metrics = ActorMetrics::new();

        metrics.record_panic(ActorType::Session);
        metrics.record_panic(ActorType::Connection);
        assert_eq!(metrics.actor_panics.load(Ordering::Relaxed), 2);
    }
}
