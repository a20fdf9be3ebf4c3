//! Metrics definitions for the timer service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `timer_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded; session and connection identifiers are never labels:
//! - `actor_type`: 3 values (controller, session, connection)
//! - `command`: 9 values (bounded by `TimerCommand`)
//! - `result`: bounded by `TimerError::metric_label` plus `ok`
//! - `outcome`: 4 values (decremented, finished, exhausted, stale)
//! - `kind`: bounded by `LockTransition` plus refusal labels

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling latency - in-process actor round trip
        .set_buckets_for_metric(
            Matcher::Prefix("timer_message".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session & Connection Metrics (Gauges)
// ============================================================================

/// Set the number of live sessions.
///
/// Metric: `timer_sessions_active`
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("timer_sessions_active").set(count as f64);
}

/// Set the number of joined connections.
///
/// Metric: `timer_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("timer_connections_active").set(count as f64);
}

// ============================================================================
// Timer Metrics (Counters)
// ============================================================================

/// Record a countdown tick.
///
/// Metric: `timer_ticks_total`
/// Labels: `outcome` (decremented, finished, exhausted, stale)
pub fn record_tick(outcome: &'static str) {
    counter!("timer_ticks_total", "outcome" => outcome).increment(1);
}

/// Record a client command and how it ended.
///
/// Metric: `timer_commands_total`
/// Labels: `command`, `result` (`ok` or an error metric label)
pub fn record_command(command: &'static str, result: &'static str) {
    counter!("timer_commands_total", "command" => command, "result" => result).increment(1);
}

/// Record a lock transition or refusal.
///
/// Metric: `timer_lock_transitions_total`
/// Labels: `kind` (claimed, granted_self, released_all, or a refusal label)
pub fn record_lock_transition(kind: &'static str) {
    counter!("timer_lock_transitions_total", "kind" => kind).increment(1);
}

// ============================================================================
// Latency Metrics (Histograms)
// ============================================================================

/// Record inbound event handling latency at the gateway.
///
/// Metric: `timer_message_latency_seconds`
/// Labels: `message_type`
pub fn record_message_latency(message_type: &'static str, duration: Duration) {
    histogram!("timer_message_latency_seconds", "message_type" => message_type)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Actor Health Metrics
// ============================================================================

/// Record an actor panic event.
///
/// Metric: `timer_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("timer_actor_panics_total", "actor_type" => actor_type).increment(1);
}

/// Record outbound messages dropped due to backpressure.
///
/// Metric: `timer_messages_dropped_total`
/// Labels: `actor_type`
pub fn record_message_dropped(actor_type: &'static str) {
    counter!("timer_messages_dropped_total", "actor_type" => actor_type).increment(1);
}
