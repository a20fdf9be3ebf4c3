//! Observability for the timer service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit safe
//! fields. PINs never appear in spans, logs or labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `timer_sessions_active` | Gauge | none | Live sessions |
//! | `timer_connections_active` | Gauge | none | Joined connections |
//! | `timer_commands_total` | Counter | `command`, `result` | Client commands and refusals |
//! | `timer_ticks_total` | Counter | `outcome` | Countdown ticks |
//! | `timer_lock_transitions_total` | Counter | `kind` | Lock claims, grants, releases, refusals |
//! | `timer_message_latency_seconds` | Histogram | `message_type` | Inbound frame handling latency |
//! | `timer_actor_panics_total` | Counter | `actor_type` | Actor panics (bugs) |
//! | `timer_messages_dropped_total` | Counter | `actor_type` | Backpressure drops |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
