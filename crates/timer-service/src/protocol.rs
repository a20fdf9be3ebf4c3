//! JSON wire protocol between browsers and the timer service.
//!
//! Frames are adjacently tagged: `{"event": "set_timer", "data": {...}}`.
//! Events without a payload may omit `data`.
//!
//! Inbound frames are parsed into [`ClientEvent`] and then validated into a
//! [`TimerCommand`]. Range checks for `set_timer` happen here; the session
//! actor trusts the values it receives.

use crate::errors::TimerError;
use crate::lock::UnlockScope;
use crate::timer::{Remaining, TimeUnit};

use common::secret::SecretString;
use common::types::SessionId;
use serde::{Deserialize, Serialize};

/// Event received from a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    StartTimer,
    StopTimer,
    ResetTimer,
    ClearTimer,
    GetTimer,
    SetTimer {
        unit: TimeUnit,
        value: u32,
    },
    IncrementTimer {
        unit: TimeUnit,
    },
    DecrementTimer {
        unit: TimeUnit,
    },
    ToggleLock {
        pin: SecretString,
        #[serde(default, rename = "unlockFor")]
        unlock_for: UnlockScope,
    },
}

/// A validated request against the caller's session.
#[derive(Debug)]
pub enum TimerCommand {
    Start,
    Stop,
    Reset,
    Clear,
    Set { unit: TimeUnit, value: u32 },
    Increment { unit: TimeUnit },
    Decrement { unit: TimeUnit },
    GetTimer,
    ToggleLock { pin: SecretString, scope: UnlockScope },
}

impl TimerCommand {
    /// Returns the command name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            TimerCommand::Start => "start",
            TimerCommand::Stop => "stop",
            TimerCommand::Reset => "reset",
            TimerCommand::Clear => "clear",
            TimerCommand::Set { .. } => "set",
            TimerCommand::Increment { .. } => "increment",
            TimerCommand::Decrement { .. } => "decrement",
            TimerCommand::GetTimer => "get_timer",
            TimerCommand::ToggleLock { .. } => "toggle_lock",
        }
    }

    /// Whether the command changes the timer (and so must pass the lock gate).
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(
            self,
            TimerCommand::GetTimer | TimerCommand::ToggleLock { .. }
        )
    }
}

impl TryFrom<ClientEvent> for TimerCommand {
    type Error = TimerError;

    fn try_from(event: ClientEvent) -> Result<Self, Self::Error> {
        Ok(match event {
            ClientEvent::StartTimer => TimerCommand::Start,
            ClientEvent::StopTimer => TimerCommand::Stop,
            ClientEvent::ResetTimer => TimerCommand::Reset,
            ClientEvent::ClearTimer => TimerCommand::Clear,
            ClientEvent::GetTimer => TimerCommand::GetTimer,
            ClientEvent::SetTimer { unit, value } => {
                if value > unit.max_value() {
                    return Err(TimerError::InvalidCommand(format!(
                        "{} out of range: {value}",
                        unit.as_str()
                    )));
                }
                TimerCommand::Set { unit, value }
            }
            ClientEvent::IncrementTimer { unit } => TimerCommand::Increment { unit },
            ClientEvent::DecrementTimer { unit } => TimerCommand::Decrement { unit },
            ClientEvent::ToggleLock { pin, unlock_for } => TimerCommand::ToggleLock {
                pin,
                scope: unlock_for,
            },
        })
    }
}

/// Parse and validate one inbound text frame.
///
/// Parse errors report only the error category and position so that a
/// malformed PIN never ends up in a log line.
pub fn parse_client_frame(text: &str) -> Result<TimerCommand, TimerError> {
    let event: ClientEvent = serde_json::from_str(text).map_err(|e| {
        TimerError::InvalidCommand(format!(
            "malformed frame ({:?} at line {} column {})",
            e.classify(),
            e.line(),
            e.column()
        ))
    })?;
    TimerCommand::try_from(event)
}

/// What one viewer sees of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub session_id: SessionId,
    pub remaining: Remaining,
    /// Set only on the update emitted when a countdown reaches zero.
    pub just_finished: bool,
    pub locked: bool,
    /// True when this viewer may mutate: unlocked, or authorized under the lock.
    pub locked_for_me: bool,
}

/// Event sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    TimerUpdate(TimerView),
    Lock {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    Unlock {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
}

impl ServerEvent {
    /// Returns the event name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::TimerUpdate(_) => "timer_update",
            ServerEvent::Lock { .. } => "lock",
            ServerEvent::Unlock { .. } => "unlock",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    #[test]
    fn test_parse_events_without_payload() {
        assert!(matches!(
            parse_client_frame(r#"{"event":"start_timer"}"#).unwrap(),
            TimerCommand::Start
        ));
        assert!(matches!(
            parse_client_frame(r#"{"event":"get_timer","data":null}"#).unwrap(),
            TimerCommand::GetTimer
        ));
    }

    #[test]
    fn test_parse_set_timer() {
        let cmd = parse_client_frame(r#"{"event":"set_timer","data":{"unit":"minutes","value":5}}"#)
            .unwrap();
        assert!(matches!(
            cmd,
            TimerCommand::Set {
                unit: TimeUnit::Minutes,
                value: 5
            }
        ));
    }

    #[test]
    fn test_set_timer_range_is_validated() {
        let result =
            parse_client_frame(r#"{"event":"set_timer","data":{"unit":"seconds","value":60}}"#);
        assert!(matches!(result, Err(TimerError::InvalidCommand(_))));

        let result =
            parse_client_frame(r#"{"event":"set_timer","data":{"unit":"minutes","value":100}}"#);
        assert!(matches!(result, Err(TimerError::InvalidCommand(_))));

        let result =
            parse_client_frame(r#"{"event":"set_timer","data":{"unit":"minutes","value":-1}}"#);
        assert!(matches!(result, Err(TimerError::InvalidCommand(_))));
    }

    #[test]
    fn test_unknown_unit_is_rejected() {
        let result = parse_client_frame(r#"{"event":"increment_timer","data":{"unit":"hours"}}"#);
        assert!(matches!(result, Err(TimerError::InvalidCommand(_))));
    }

    #[test]
    fn test_parse_toggle_lock() {
        let cmd = parse_client_frame(
            r#"{"event":"toggle_lock","data":{"pin":"123456","unlockFor":"all"}}"#,
        )
        .unwrap();
        let TimerCommand::ToggleLock { pin, scope } = cmd else {
            unreachable!("expected toggle_lock");
        };
        assert_eq!(pin.expose_secret(), "123456");
        assert_eq!(scope, UnlockScope::All);

        let cmd =
            parse_client_frame(r#"{"event":"toggle_lock","data":{"pin":"123456"}}"#).unwrap();
        assert!(matches!(
            cmd,
            TimerCommand::ToggleLock {
                scope: UnlockScope::Me,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_unlock_scope_is_rejected() {
        let result = parse_client_frame(
            r#"{"event":"toggle_lock","data":{"pin":"123456","unlockFor":"everyone"}}"#,
        );
        assert!(matches!(result, Err(TimerError::InvalidCommand(_))));
    }

    #[test]
    fn test_parse_error_does_not_echo_pin() {
        let err = parse_client_frame(r#"{"event":"toggle_lock","data":{"pin":987654}}"#)
            .unwrap_err();
        assert!(!err.to_string().contains("987654"));
    }

    #[test]
    fn test_command_classification() {
        assert!(TimerCommand::Start.is_mutation());
        assert!(TimerCommand::Set {
            unit: TimeUnit::Seconds,
            value: 1
        }
        .is_mutation());
        assert!(!TimerCommand::GetTimer.is_mutation());
        assert!(!TimerCommand::ToggleLock {
            pin: SecretString::from("123456"),
            scope: UnlockScope::Me
        }
        .is_mutation());
        assert_eq!(TimerCommand::Clear.name(), "clear");
    }

    #[test]
    fn test_timer_update_wire_shape() {
        let event = ServerEvent::TimerUpdate(TimerView {
            session_id: SessionId::from("standup"),
            remaining: Remaining::new(5, 0),
            just_finished: false,
            locked: true,
            locked_for_me: false,
        });

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "timer_update");
        assert_eq!(json["data"]["sessionId"], "standup");
        assert_eq!(json["data"]["remaining"]["minutes"], 5);
        assert_eq!(json["data"]["remaining"]["running"], false);
        assert_eq!(json["data"]["locked"], true);
        assert_eq!(json["data"]["lockedForMe"], false);
        assert_eq!(json["data"]["justFinished"], false);
    }

    #[test]
    fn test_lock_notice_wire_shape() {
        let json = serde_json::to_value(ServerEvent::Unlock {
            session_id: SessionId::from("standup"),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "unlock", "data": {"sessionId": "standup"}})
        );
    }
}
