//! Countdown value arithmetic.
//!
//! A [`Remaining`] is the minutes/seconds pair shown on every client plus the
//! running flag. Manual adjustments behave like a two-wheel odometer: the
//! seconds wheel carries into and borrows from the minutes wheel, and the
//! minutes wheel wraps between 0 and [`MAX_MINUTES`]. Countdown ticks never
//! wrap; they clamp at zero.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest value the minutes wheel shows before wrapping to zero.
pub const MAX_MINUTES: u32 = 99;

/// Largest value the seconds wheel shows before carrying into minutes.
pub const MAX_SECONDS: u32 = 59;

const SECONDS_PER_MINUTE: u64 = 60;

/// Which wheel a `set`/`increment`/`decrement` applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Seconds,
}

impl TimeUnit {
    /// Returns the unit as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Seconds => "seconds",
        }
    }

    /// Largest value a client may `set` for this unit.
    #[must_use]
    pub const fn max_value(&self) -> u32 {
        match self {
            TimeUnit::Minutes => MAX_MINUTES,
            TimeUnit::Seconds => MAX_SECONDS,
        }
    }
}

/// Result of applying one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The value was already zero; nothing changed except `running`.
    Exhausted,
    /// Time was subtracted and some is left.
    Decremented,
    /// Time was subtracted and the value is now exactly zero.
    Finished,
}

/// Time left on a session's timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remaining {
    pub minutes: u32,
    pub seconds: u32,
    pub running: bool,
}

impl Remaining {
    /// A stopped timer showing 00:00.
    pub const ZERO: Remaining = Remaining {
        minutes: 0,
        seconds: 0,
        running: false,
    };

    /// A stopped timer showing `minutes:seconds`.
    #[must_use]
    pub const fn new(minutes: u32, seconds: u32) -> Self {
        Self {
            minutes,
            seconds,
            running: false,
        }
    }

    /// Whether both wheels read zero (the running flag is ignored).
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.minutes == 0 && self.seconds == 0
    }

    /// Total time left in seconds.
    #[must_use]
    pub fn total_seconds(&self) -> u64 {
        u64::from(self.minutes) * SECONDS_PER_MINUTE + u64::from(self.seconds)
    }

    /// Overwrite one wheel. Values are taken as-is; range checks belong to
    /// whoever parsed the request.
    pub fn set(&mut self, unit: TimeUnit, value: u32) {
        match unit {
            TimeUnit::Minutes => self.minutes = value,
            TimeUnit::Seconds => self.seconds = value,
        }
    }

    /// Advance one wheel by one step, carrying seconds into minutes.
    pub fn increment(&mut self, unit: TimeUnit) {
        match unit {
            TimeUnit::Minutes => self.increment_minutes(),
            TimeUnit::Seconds => {
                if self.seconds >= MAX_SECONDS {
                    self.seconds = 0;
                    self.increment_minutes();
                } else {
                    self.seconds += 1;
                }
            }
        }
    }

    /// Move one wheel back by one step, borrowing minutes for seconds.
    pub fn decrement(&mut self, unit: TimeUnit) {
        match unit {
            TimeUnit::Minutes => self.decrement_minutes(),
            TimeUnit::Seconds => {
                if self.seconds == 0 {
                    self.seconds = MAX_SECONDS;
                    self.decrement_minutes();
                } else {
                    self.seconds -= 1;
                }
            }
        }
    }

    /// Subtract one tick of `step` from the remaining time.
    ///
    /// Clamps at zero. Clears `running` when the value is (or becomes) zero.
    pub fn apply_tick(&mut self, step: Duration) -> TickOutcome {
        let total = self.total_seconds();
        if total == 0 {
            self.running = false;
            return TickOutcome::Exhausted;
        }

        let left = total.saturating_sub(step.as_secs());
        self.minutes = u32::try_from(left / SECONDS_PER_MINUTE).unwrap_or(u32::MAX);
        self.seconds = u32::try_from(left % SECONDS_PER_MINUTE).unwrap_or(0);

        if left == 0 {
            self.running = false;
            TickOutcome::Finished
        } else {
            TickOutcome::Decremented
        }
    }

    fn increment_minutes(&mut self) {
        self.minutes = if self.minutes >= MAX_MINUTES {
            0
        } else {
            self.minutes + 1
        };
    }

    fn decrement_minutes(&mut self) {
        self.minutes = if self.minutes == 0 {
            MAX_MINUTES
        } else {
            self.minutes - 1
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_decrement_seconds_from_zero_wraps_to_max() {
        let mut r = Remaining::ZERO;
        r.decrement(TimeUnit::Seconds);
        assert_eq!(r, Remaining::new(99, 59));
    }

    #[test]
    fn test_increment_seconds_from_max_wraps_to_zero() {
        let mut r = Remaining::new(99, 59);
        r.increment(TimeUnit::Seconds);
        assert_eq!(r, Remaining::ZERO);
    }

    #[test]
    fn test_seconds_carry_into_minutes() {
        let mut r = Remaining::new(4, 59);
        r.increment(TimeUnit::Seconds);
        assert_eq!(r, Remaining::new(5, 0));

        r.decrement(TimeUnit::Seconds);
        assert_eq!(r, Remaining::new(4, 59));
    }

    #[test]
    fn test_minutes_wrap_without_touching_seconds() {
        let mut r = Remaining::new(99, 30);
        r.increment(TimeUnit::Minutes);
        assert_eq!(r, Remaining::new(0, 30));

        r.decrement(TimeUnit::Minutes);
        assert_eq!(r, Remaining::new(99, 30));
    }

    #[test]
    fn test_adjustments_keep_running_flag() {
        let mut r = Remaining::new(1, 0);
        r.running = true;
        r.decrement(TimeUnit::Seconds);
        assert!(r.running);
        assert_eq!((r.minutes, r.seconds), (0, 59));
    }

    #[test]
    fn test_set_is_not_clamped() {
        let mut r = Remaining::ZERO;
        r.set(TimeUnit::Minutes, 5);
        r.set(TimeUnit::Seconds, 30);
        assert_eq!(r, Remaining::new(5, 30));

        r.set(TimeUnit::Seconds, 75);
        assert_eq!(r.seconds, 75);
    }

    #[test]
    fn test_tick_subtracts_whole_minutes() {
        let mut r = Remaining::new(5, 0);
        r.running = true;
        assert_eq!(r.apply_tick(MINUTE), TickOutcome::Decremented);
        assert_eq!((r.minutes, r.seconds, r.running), (4, 0, true));
    }

    #[test]
    fn test_tick_borrows_across_minutes() {
        let mut r = Remaining::new(2, 30);
        r.running = true;
        r.apply_tick(MINUTE);
        assert_eq!((r.minutes, r.seconds), (1, 30));
        r.apply_tick(MINUTE);
        assert_eq!((r.minutes, r.seconds), (0, 30));
    }

    #[test]
    fn test_tick_clamps_at_zero_and_stops() {
        let mut r = Remaining::new(0, 30);
        r.running = true;
        assert_eq!(r.apply_tick(MINUTE), TickOutcome::Finished);
        assert_eq!(r, Remaining::ZERO);
    }

    #[test]
    fn test_tick_exactly_reaching_zero_finishes() {
        let mut r = Remaining::new(1, 0);
        r.running = true;
        assert_eq!(r.apply_tick(MINUTE), TickOutcome::Finished);
        assert_eq!(r, Remaining::ZERO);
    }

    #[test]
    fn test_tick_on_zero_is_exhausted() {
        let mut r = Remaining::ZERO;
        r.running = true;
        assert_eq!(r.apply_tick(MINUTE), TickOutcome::Exhausted);
        assert!(!r.running);
    }

    #[test]
    fn test_tick_with_short_interval() {
        let mut r = Remaining::new(0, 3);
        r.running = true;
        assert_eq!(
            r.apply_tick(Duration::from_secs(1)),
            TickOutcome::Decremented
        );
        assert_eq!(r.seconds, 2);
    }

    #[test]
    fn test_time_unit_serde_names() {
        let unit: TimeUnit = serde_json::from_str("\"minutes\"").unwrap();
        assert_eq!(unit, TimeUnit::Minutes);
        assert_eq!(serde_json::to_string(&TimeUnit::Seconds).unwrap(), "\"seconds\"");
        assert!(serde_json::from_str::<TimeUnit>("\"hours\"").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn step() -> impl Strategy<Value = (bool, TimeUnit)> {
            (
                any::<bool>(),
                prop_oneof![Just(TimeUnit::Minutes), Just(TimeUnit::Seconds)],
            )
        }

        proptest! {
            #[test]
            fn adjustments_stay_in_range(
                minutes in 0..=MAX_MINUTES,
                seconds in 0..=MAX_SECONDS,
                steps in proptest::collection::vec(step(), 0..400),
            ) {
                let mut r = Remaining::new(minutes, seconds);
                for (up, unit) in steps {
                    if up {
                        r.increment(unit);
                    } else {
                        r.decrement(unit);
                    }
                    prop_assert!(r.minutes <= MAX_MINUTES);
                    prop_assert!(r.seconds <= MAX_SECONDS);
                }
            }

            #[test]
            fn seconds_steps_match_modular_arithmetic(
                minutes in 0..=MAX_MINUTES,
                seconds in 0..=MAX_SECONDS,
                ups in 0u64..10_000,
                downs in 0u64..10_000,
            ) {
                let dial = u64::from(MAX_MINUTES + 1) * SECONDS_PER_MINUTE;
                let mut r = Remaining::new(minutes, seconds);
                for _ in 0..ups {
                    r.increment(TimeUnit::Seconds);
                }
                for _ in 0..downs {
                    r.decrement(TimeUnit::Seconds);
                }

                let start = Remaining::new(minutes, seconds).total_seconds();
                let expected = (start + ups + dial * 2 - downs % dial) % dial;
                prop_assert_eq!(r.total_seconds(), expected);
            }

            #[test]
            fn ticks_never_underflow(
                minutes in 0..=MAX_MINUTES,
                seconds in 0..=MAX_SECONDS,
                step_secs in 1u64..600,
            ) {
                let mut r = Remaining::new(minutes, seconds);
                r.running = true;
                let before = r.total_seconds();
                r.apply_tick(Duration::from_secs(step_secs));
                prop_assert_eq!(r.total_seconds(), before.saturating_sub(step_secs));
                prop_assert!(r.seconds <= MAX_SECONDS);
                prop_assert_eq!(r.running, r.total_seconds() > 0);
            }
        }
    }
}
