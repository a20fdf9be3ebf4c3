//! Pre-configured settings and test data.

use std::time::Duration;
use timer_service::actors::{ActorMetrics, SessionControllerActorHandle};
use timer_service::config::{RegistrySettings, SessionSettings};
use uuid::Uuid;

/// Tick interval used by [`test_settings`].
pub const TEST_TICK: Duration = Duration::from_secs(60);

/// Wrong-PIN penalty used by [`test_settings`].
pub const TEST_PENALTY: Duration = Duration::from_secs(3);

/// A PIN accepted by the lock gate.
pub const TEST_PIN: &str = "123456";

/// Test session fixture.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub id: String,
}

impl TestSession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Create a test session with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("session-{}", Uuid::new_v4()))
    }
}

/// Registry settings with the default tick and penalty, sized for tests.
#[must_use]
pub fn test_settings() -> RegistrySettings {
    RegistrySettings {
        max_sessions: 64,
        max_session_id_length: 128,
        session: SessionSettings {
            tick_interval: TEST_TICK,
            pin_penalty: TEST_PENALTY,
        },
    }
}

/// Same as [`test_settings`] with the wrong-PIN penalty disabled.
#[must_use]
pub fn no_penalty_settings() -> RegistrySettings {
    let mut settings = test_settings();
    settings.session.pin_penalty = Duration::ZERO;
    settings
}

/// Spawn a session registry with fresh metrics.
#[must_use]
pub fn spawn_controller(settings: RegistrySettings) -> SessionControllerActorHandle {
    SessionControllerActorHandle::new(
        format!("timer-test-{}", Uuid::new_v4()),
        settings,
        ActorMetrics::new(),
    )
}
