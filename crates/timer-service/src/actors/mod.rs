//! Actor model implementation for the timer service.
//!
//! ```text
//! SessionControllerActor (singleton per instance)
//! └── supervises N SessionActors
//!     └── SessionActor (one per live session)
//!         ├── owns timer value, reset snapshot and PIN lock
//!         ├── owns at most one Countdown task
//!         └── supervises N ConnectionActors
//!             └── ConnectionActor (one per joined WebSocket)
//! ```
//!
//! - **One connection per session**: joining another session leaves the first
//! - **CancellationToken propagation**: parents pass child tokens for graceful shutdown
//! - **Mailbox monitoring**: queued backlog sampled on every dequeue against depth
//!   thresholds (Session: 100/500, Connection: 50/200)
//! - **Message passing**: all inter-actor communication via `tokio::sync::mpsc` channels
//!
//! # Modules
//!
//! - [`controller`] - `SessionControllerActor`, the session registry
//! - [`session`] - `SessionActor` per live session
//! - [`connection`] - `ConnectionActor` per joined connection
//! - [`countdown`] - per-session ticker task
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod controller;
pub mod countdown;
pub mod messages;
pub mod metrics;
pub mod session;

// Re-export primary types
pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use controller::{SessionControllerActor, SessionControllerActorHandle};
pub use countdown::Countdown;
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use session::{SessionActor, SessionActorHandle};
