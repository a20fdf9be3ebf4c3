//! # Timer Test Utilities
//!
//! Shared test utilities for the timer service.
//!
//! - `fixtures` - Pre-configured settings and a registry spawner
//! - `client` - A fake WebSocket client that joins through the registry and
//!   records the events delivered to it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use timer_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let controller = spawn_controller(test_settings());
//!     let session = TestSession::random();
//!
//!     let mut alice = TestClient::join(&controller, &session.id, "alice").await;
//!     alice.send(TimerCommand::Start).await;
//!     let view = alice.next_update().await;
//!     assert!(view.remaining.running);
//! }
//! ```

pub mod client;
pub mod fixtures;

pub use client::*;
pub use fixtures::*;
