//! Integration tests for the PIN lock and per-viewer projections.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use timer_service::lock::UnlockScope;
use timer_service::protocol::{ServerEvent, TimerCommand};
use timer_service::timer::{Remaining, TimeUnit};
use timer_test_utils::{
    no_penalty_settings, spawn_controller, test_settings, TestClient, TestSession, TEST_PENALTY,
    TEST_PIN,
};

fn bump() -> TimerCommand {
    TimerCommand::Increment {
        unit: TimeUnit::Minutes,
    }
}

#[tokio::test]
async fn test_claim_grant_release_projections() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let mut alice = TestClient::join(&controller, &session.id, "alice").await;
    let mut bob = TestClient::join(&controller, &session.id, "bob").await;
    let mut carol = TestClient::join(&controller, &session.id, "carol").await;

    // claim
    alice.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    let view = alice.next_update().await;
    assert!(view.locked && view.locked_for_me);
    for other in [&mut bob, &mut carol] {
        assert!(matches!(other.next_event().await, ServerEvent::Lock { .. }));
        let view = other.next_update().await;
        assert!(view.locked && !view.locked_for_me);
    }

    // grant to bob only
    bob.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    let view = bob.next_update().await;
    assert!(view.locked && view.locked_for_me);
    alice.expect_no_event().await;
    carol.expect_no_event().await;

    // bob may now mutate; carol still may not
    bob.send(bump()).await;
    for member in [&mut alice, &mut bob, &mut carol] {
        assert_eq!(member.next_update().await.remaining, Remaining::new(1, 0));
    }
    carol.send(bump()).await;
    carol.expect_no_event().await;
    let state = alice.session.get_state().await.unwrap();
    assert_eq!(state.remaining, Remaining::new(1, 0));
    assert_eq!(state.authorized_count, 2);

    // release for everyone
    carol.toggle_lock(TEST_PIN, UnlockScope::All).await;
    for member in [&mut alice, &mut bob, &mut carol] {
        assert!(matches!(member.next_event().await, ServerEvent::Unlock { .. }));
        let view = member.next_update().await;
        assert!(!view.locked && view.locked_for_me);
    }
    assert_eq!(alice.session.get_state().await.unwrap().authorized_count, 0);

    controller.cancel();
}

#[tokio::test]
async fn test_wrong_pin_grant_changes_nothing() {
    let controller = spawn_controller(no_penalty_settings());
    let session = TestSession::random();
    let mut alice = TestClient::join(&controller, &session.id, "alice").await;
    let mut bob = TestClient::join(&controller, &session.id, "bob").await;

    alice.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    alice.next_update().await;
    bob.next_event().await;
    bob.next_update().await;

    bob.toggle_lock("654321", UnlockScope::Me).await;
    bob.expect_no_event().await;
    alice.expect_no_event().await;

    let state = alice.session.get_state().await.unwrap();
    assert!(state.locked);
    assert_eq!(state.authorized_count, 1);

    controller.cancel();
}

#[tokio::test]
async fn test_malformed_pin_does_not_lock() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let mut alice = TestClient::join(&controller, &session.id, "alice").await;

    alice.toggle_lock("12ab56", UnlockScope::Me).await;
    alice.toggle_lock("12345", UnlockScope::Me).await;
    alice.expect_no_event().await;

    assert!(!alice.session.get_state().await.unwrap().locked);
    controller.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_wrong_pin_penalizes_connection() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let mut alice = TestClient::join(&controller, &session.id, "alice").await;
    let mut bob = TestClient::join(&controller, &session.id, "bob").await;

    alice.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    alice.next_update().await;
    bob.next_event().await;
    bob.next_update().await;

    bob.toggle_lock("000000", UnlockScope::All).await;
    bob.expect_no_event().await;

    // Even the right PIN and reads are ignored during the penalty
    bob.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    bob.send(TimerCommand::GetTimer).await;
    bob.expect_no_event().await;
    assert_eq!(alice.session.get_state().await.unwrap().authorized_count, 1);

    tokio::time::sleep(TEST_PENALTY + Duration::from_millis(10)).await;

    bob.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    let view = bob.next_update().await;
    assert!(view.locked_for_me);

    controller.cancel();
}

#[tokio::test]
async fn test_authorized_leaver_loses_grant_but_lock_stays() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let alice = TestClient::join(&controller, &session.id, "alice").await;
    let mut bob = TestClient::join(&controller, &session.id, "bob").await;

    alice.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    bob.next_event().await;
    bob.next_update().await;

    alice.leave(&controller).await;

    bob.send(bump()).await;
    bob.expect_no_event().await;

    let state = bob.session.get_state().await.unwrap();
    assert!(state.locked);
    assert_eq!(state.authorized_count, 0);
    assert_eq!(state.remaining, Remaining::ZERO);

    // The PIN still works for whoever knows it
    bob.toggle_lock(TEST_PIN, UnlockScope::All).await;
    assert!(matches!(bob.next_event().await, ServerEvent::Unlock { .. }));
    assert!(!bob.next_update().await.locked);

    controller.cancel();
}

#[tokio::test]
async fn test_get_timer_is_allowed_while_locked_out() {
    let controller = spawn_controller(test_settings());
    let session = TestSession::random();
    let alice = TestClient::join(&controller, &session.id, "alice").await;
    let mut bob = TestClient::join(&controller, &session.id, "bob").await;

    alice.toggle_lock(TEST_PIN, UnlockScope::Me).await;
    bob.next_event().await;
    bob.next_update().await;

    bob.send(TimerCommand::GetTimer).await;
    let view = bob.next_update().await;
    assert!(view.locked && !view.locked_for_me);

    controller.cancel();
}
