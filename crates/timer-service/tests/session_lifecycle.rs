//! Integration tests for session creation, membership and destruction.
//!
//! Drives the registry through `timer-test-utils` clients, without sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use common::types::{ConnectionId, SessionId};
use timer_service::errors::TimerError;
use timer_service::protocol::TimerCommand;
use timer_service::timer::{Remaining, TimeUnit};
use timer_test_utils::{spawn_controller, test_settings, TestClient, TestSession, TEST_TICK};

// ============================================================================
// Creation & Destruction
// ============================================================================

#[tokio::test]
async fn test_first_join_sees_zero_unlocked_timer() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();

    let alice = TestClient::join(&controller, &session.id, "alice").await;

    assert_eq!(alice.joined_view.remaining, Remaining::ZERO);
    assert!(!alice.joined_view.locked);
    assert!(alice.joined_view.locked_for_me);
    assert!(!alice.joined_view.just_finished);
    assert_eq!(alice.joined_view.session_id.as_str(), session.id);

    controller.cancel();
}

#[tokio::test]
async fn test_rejoin_after_destroy_starts_from_default_state() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();

    let mut alice = TestClient::join(&controller, &session.id, "alice").await;
    alice
        .send(TimerCommand::Set {
            unit: TimeUnit::Minutes,
            value: 7,
        })
        .await;
    assert_eq!(alice.next_update().await.remaining, Remaining::new(7, 0));

    let left = alice.leave(&controller).await;
    assert!(left.session_destroyed);

    let mut bob = TestClient::join(&controller, &session.id, "bob").await;
    assert_eq!(bob.joined_view.remaining, Remaining::ZERO);

    bob.send(TimerCommand::GetTimer).await;
    let view = bob.next_update().await;
    assert_eq!(view.remaining, Remaining::ZERO);
    assert!(!view.locked);

    // Reset has nothing to restore on a fresh session
    bob.send(TimerCommand::Reset).await;
    assert_eq!(bob.next_update().await.remaining, Remaining::ZERO);

    controller.cancel();
}

#[tokio::test]
async fn test_session_survives_until_last_member_leaves() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();

    let alice = TestClient::join(&controller, &session.id, "alice").await;
    let mut bob = TestClient::join(&controller, &session.id, "bob").await;

    alice
        .send(TimerCommand::Set {
            unit: TimeUnit::Seconds,
            value: 42,
        })
        .await;
    assert_eq!(bob.next_update().await.remaining, Remaining::new(0, 42));

    let left = alice.leave(&controller).await;
    assert_eq!(left.remaining_members, 1);
    assert!(!left.session_destroyed);

    let info = controller
        .get_session(SessionId::from(session.id.as_str()))
        .await
        .unwrap();
    assert_eq!(info.member_count, 1);
    assert_eq!(info.remaining, Remaining::new(0, 42));

    assert!(bob.leave(&controller).await.session_destroyed);
    assert!(matches!(
        controller
            .get_session(SessionId::from(session.id.as_str()))
            .await,
        Err(TimerError::SessionNotFound(_))
    ));

    controller.cancel();
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let controller = spawn_controller(test_settings());

    let alpha = TestClient::join(&controller, "alpha", "alice").await;
    let mut beta = TestClient::join(&controller, "beta", "bob").await;

    alpha.send(TimerCommand::Clear).await;
    alpha
        .send(TimerCommand::Increment {
            unit: TimeUnit::Minutes,
        })
        .await;

    beta.expect_no_event().await;
    let status = controller.get_status().await.unwrap();
    assert_eq!(status.session_count, 2);
    assert_eq!(status.connection_count, 2);

    controller.cancel();
}

// ============================================================================
// Membership index
// ============================================================================

#[tokio::test]
async fn test_joining_another_session_moves_the_connection() {
    let controller = spawn_controller(test_settings());

    let mut stay = TestClient::join(&controller, "alpha", "stay").await;
    let _moving = TestClient::join(&controller, "alpha", "moving").await;
    let _moved = TestClient::join(&controller, "beta", "moving").await;

    let alpha = controller
        .get_session(SessionId::from("alpha"))
        .await
        .unwrap();
    assert_eq!(alpha.member_count, 1);

    let resolved = controller
        .resolve_session(ConnectionId::from("moving"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.session_id().as_str(), "beta");

    // Events from the moved connection no longer reach alpha
    resolved
        .command(ConnectionId::from("moving"), TimerCommand::Start)
        .await
        .unwrap();
    stay.expect_no_event().await;

    controller.cancel();
}

#[tokio::test]
async fn test_resolve_session_for_unknown_connection_is_none() {
    let controller = spawn_controller(test_settings());
    let resolved = controller
        .resolve_session(ConnectionId::from("nobody"))
        .await
        .unwrap();
    assert!(resolved.is_none());
    controller.cancel();
}

#[tokio::test]
async fn test_invalid_session_id_leaves_connection_unjoined() {
    let controller = spawn_controller(test_settings());
    let (tx, _rx) = tokio::sync::mpsc::channel(4);

    let result = controller
        .join(SessionId::from(""), ConnectionId::from("anon"), tx)
        .await;
    assert!(matches!(result, Err(TimerError::InvalidSessionId(_))));

    assert!(controller
        .resolve_session(ConnectionId::from("anon"))
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        controller.leave(ConnectionId::from("anon")).await,
        Err(TimerError::ConnectionNotFound(_))
    ));

    controller.cancel();
}

// ============================================================================
// Serialization of concurrent events
// ============================================================================

/// Fire `n` `increment_timer{seconds}` commands at once, alternating
/// between `clients`, and wait for all of them to be queued.
async fn increment_concurrently(clients: &[&TestClient], n: usize) {
    let mut tasks = Vec::with_capacity(n);
    for client in clients.iter().cycle().take(n) {
        let handle = client.session.clone();
        let connection = client.connection_id.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .command(
                    connection,
                    TimerCommand::Increment {
                        unit: TimeUnit::Seconds,
                    },
                )
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let alice = TestClient::join(&controller, &session.id, "alice").await;
    let bob = TestClient::join(&controller, &session.id, "bob").await;

    increment_concurrently(&[&alice, &bob], 100).await;

    let state = alice.session.get_state().await.unwrap();
    assert_eq!(state.remaining, Remaining::new(1, 40));

    controller.cancel();
}

#[tokio::test]
async fn test_concurrent_increments_wrap_past_maximum() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let alice = TestClient::join(&controller, &session.id, "alice").await;
    let bob = TestClient::join(&controller, &session.id, "bob").await;

    alice
        .send(TimerCommand::Set {
            unit: TimeUnit::Minutes,
            value: 99,
        })
        .await;
    alice
        .send(TimerCommand::Set {
            unit: TimeUnit::Seconds,
            value: 59,
        })
        .await;

    // One step wraps to 00:00, sixty more make a minute
    increment_concurrently(&[&alice, &bob], 61).await;

    let state = bob.session.get_state().await.unwrap();
    assert_eq!(state.remaining, Remaining::new(1, 0));

    controller.cancel();
}

// ============================================================================
// Destroy while running
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_destroy_during_countdown_does_not_resurrect_session() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();

    let mut alice = TestClient::join(&controller, &session.id, "alice").await;
    alice
        .send(TimerCommand::Set {
            unit: TimeUnit::Minutes,
            value: 5,
        })
        .await;
    alice.send(TimerCommand::Start).await;
    alice.next_update().await;
    assert!(alice.next_update().await.remaining.running);

    tokio::time::sleep(TEST_TICK / 2).await;
    assert!(alice.leave(&controller).await.session_destroyed);

    // Let the countdown's next wake-up pass
    tokio::time::sleep(TEST_TICK * 3).await;

    let status = controller.get_status().await.unwrap();
    assert_eq!(status.session_count, 0);

    let fresh = TestClient::join(&controller, &session.id, "bob").await;
    assert_eq!(fresh.joined_view.remaining, Remaining::ZERO);
    let state = fresh.session.get_state().await.unwrap();
    assert_eq!(state.countdown_generation, None);

    controller.cancel();
}

#[tokio::test]
async fn test_shutdown_closes_member_streams() {
    let controller = spawn_controller(test_settings());
    let alice = TestClient::join(&controller, "standup", "alice").await;

    controller.shutdown(Duration::from_secs(5)).await.unwrap();

    // Connection actors drop their sinks as the session stops
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if alice.session.get_state().await.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(controller.is_cancelled());
}
