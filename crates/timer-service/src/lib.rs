//! Shared countdown timer service library.
//!
//! Many browser connections join a named session and watch one
//! authoritative countdown. Any member may drive the timer unless the
//! session has been locked with a PIN, in which case only the connections
//! that presented the PIN may.
//!
//! # Architecture
//!
//! ```text
//! SessionControllerActor (singleton per instance)
//! └── SessionActor (one per live session)
//!     ├── Countdown (while running)
//!     └── ConnectionActor (one per joined WebSocket)
//! ```
//!
//! Each session's state lives inside its own actor, so joins, leaves,
//! client commands and countdown ticks for one session apply in a single
//! serial order while different sessions never contend.
//!
//! # Modules
//!
//! - [`actors`] - Actor hierarchy (registry, sessions, connections, countdowns)
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`gateway`] - WebSocket upgrade and per-socket reader/writer tasks
//! - [`lock`] - PIN lock and mutation gate
//! - [`observability`] - Metrics and health endpoints
//! - [`protocol`] - JSON wire events
//! - [`timer`] - Timer value arithmetic

pub mod actors;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod lock;
pub mod observability;
pub mod protocol;
pub mod timer;
