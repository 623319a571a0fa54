//! Locally ticking countdown derived from a server-declared duration.
//!
//! The deadline is anchored on local receipt time. Pausing freezes the displayed
//! value without discarding the deadline; resuming re-anchors the deadline on the
//! frozen remainder so the pause never counts against the player.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::state::epoch::Epoch;

/// Boundaries reported exactly once per countdown, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerBoundary {
    /// First tick after the countdown started.
    Entered,
    /// Remaining time dropped to the warning threshold.
    Warning,
    /// Remaining time reached zero.
    Expired,
}

/// Countdown anchoring data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    /// Local deadline.
    pub ends_at: Instant,
    /// Declared duration, used for the progress bar.
    pub duration: Duration,
    /// Remainder frozen at pause time; `None` while running.
    pub paused: Option<Duration>,
}

impl TimerState {
    /// `max(0, ends_at - now)`, or the frozen remainder while paused.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.paused {
            Some(frozen) => frozen,
            None => self.ends_at.saturating_duration_since(now),
        }
    }
}

/// Render-ready countdown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerDisplay {
    /// Integer countdown rounded up, so "0" only shows once time is really out.
    pub seconds: u64,
    /// Progress bar percentage, floored and clamped to `0..=100`.
    pub percent: u8,
    /// Exact remainder in milliseconds.
    pub remaining_ms: u64,
    /// Declared duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the countdown is frozen.
    pub paused: bool,
    /// Whether the warning threshold was reached.
    pub warning: bool,
}

#[derive(Debug, Clone)]
struct Countdown {
    state: TimerState,
    epoch: Epoch,
    entered: bool,
    warned: bool,
    expired: bool,
}

/// Single tick-driven countdown with boundary callbacks.
#[derive(Debug, Clone)]
pub struct TimerController {
    warning: Duration,
    active: Option<Countdown>,
}

impl TimerController {
    /// Create an idle controller warning at `warning` remaining.
    pub fn new(warning: Duration) -> Self {
        Self {
            warning,
            active: None,
        }
    }

    /// Start a countdown of `duration` received at `now`, replacing any running one.
    pub fn start(&mut self, duration: Duration, now: Instant, epoch: Epoch) {
        self.start_with_remaining(duration, duration, now, epoch);
    }

    /// Start a countdown part-way through, as after a reconnection.
    pub fn start_with_remaining(
        &mut self,
        duration: Duration,
        remaining: Duration,
        now: Instant,
        epoch: Epoch,
    ) {
        let remaining = remaining.min(duration);
        self.active = Some(Countdown {
            state: TimerState {
                ends_at: now + remaining,
                duration,
                paused: None,
            },
            epoch,
            entered: false,
            warned: false,
            expired: false,
        });
    }

    /// Freeze the displayed value; the deadline is kept.
    pub fn pause(&mut self, now: Instant) {
        if let Some(countdown) = self.active.as_mut() {
            if countdown.state.paused.is_none() {
                countdown.state.paused =
                    Some(countdown.state.ends_at.saturating_duration_since(now));
            }
        }
    }

    /// Re-anchor the deadline on the frozen remainder.
    pub fn resume(&mut self, now: Instant) {
        if let Some(countdown) = self.active.as_mut() {
            if let Some(frozen) = countdown.state.paused.take() {
                countdown.state.ends_at = now + frozen;
            }
        }
    }

    /// Re-anchor on a server-declared remainder (authoritative countdown ticks).
    pub fn reanchor(&mut self, remaining: Duration, now: Instant) {
        if let Some(countdown) = self.active.as_mut() {
            let remaining = remaining.min(countdown.state.duration);
            countdown.state.ends_at = now + remaining;
            if countdown.state.paused.is_some() {
                countdown.state.paused = Some(remaining);
            }
        }
    }

    /// Force the countdown to zero; the `Expired` boundary fires on the next tick.
    pub fn expire(&mut self, now: Instant) {
        if let Some(countdown) = self.active.as_mut() {
            countdown.state.ends_at = now;
            countdown.state.paused = None;
        }
    }

    /// Drop the countdown.
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Anchoring data of the running countdown.
    pub fn state(&self) -> Option<TimerState> {
        self.active.as_ref().map(|countdown| countdown.state)
    }

    /// Remaining time, if a countdown exists.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.active
            .as_ref()
            .map(|countdown| countdown.state.remaining(now))
    }

    /// Whether the countdown is frozen.
    pub fn is_paused(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|countdown| countdown.state.paused.is_some())
    }

    /// Advance the countdown, returning every boundary crossed since the last tick.
    ///
    /// A countdown started for another round than `current` is stale: it is dropped
    /// and nothing fires.
    pub fn tick(&mut self, now: Instant, current: Epoch) -> Vec<TimerBoundary> {
        let mut crossed = Vec::new();
        let Some(countdown) = self.active.as_mut() else {
            return crossed;
        };

        if countdown.epoch.round != current.round {
            self.active = None;
            return crossed;
        }

        if countdown.state.paused.is_some() {
            return crossed;
        }

        let remaining = countdown.state.remaining(now);
        if !countdown.entered {
            countdown.entered = true;
            crossed.push(TimerBoundary::Entered);
        }
        if !countdown.warned && remaining <= self.warning {
            countdown.warned = true;
            crossed.push(TimerBoundary::Warning);
        }
        if !countdown.expired && remaining.is_zero() {
            countdown.expired = true;
            crossed.push(TimerBoundary::Expired);
        }
        crossed
    }

    /// Render-ready values for the running countdown.
    pub fn display(&self, now: Instant) -> Option<TimerDisplay> {
        let countdown = self.active.as_ref()?;
        let remaining = countdown.state.remaining(now);
        let duration = countdown.state.duration;

        let remaining_ms = remaining.as_millis() as u64;
        let duration_ms = duration.as_millis() as u64;
        let percent = if duration_ms == 0 {
            0
        } else {
            (remaining_ms.saturating_mul(100) / duration_ms).min(100) as u8
        };

        Some(TimerDisplay {
            seconds: remaining_ms.div_ceil(1000),
            percent,
            remaining_ms,
            duration_ms,
            paused: countdown.state.paused.is_some(),
            warning: remaining <= self.warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::epoch::Stage;

    const EPOCH: Epoch = Epoch {
        round: 1,
        stage: Stage::Started,
    };

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn pause_duration_never_counts_against_the_player() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(3_000));
        timer.start(ms(10_000), t0, EPOCH);

        timer.pause(t0 + ms(4_000));
        assert_eq!(timer.remaining(t0 + ms(4_500)), Some(ms(6_000)));

        timer.resume(t0 + ms(5_000));
        assert_eq!(timer.remaining(t0 + ms(5_000)), Some(ms(6_000)));
        assert_eq!(timer.remaining(t0 + ms(6_000)), Some(ms(5_000)));
    }

    #[test]
    fn paused_timer_keeps_its_deadline() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(3_000));
        timer.start(ms(10_000), t0, EPOCH);
        timer.pause(t0 + ms(2_000));

        let state = timer.state().unwrap();
        assert_eq!(state.ends_at, t0 + ms(10_000));
        assert_eq!(state.paused, Some(ms(8_000)));
    }

    #[test]
    fn boundaries_fire_exactly_once_each() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(3_000));
        timer.start(ms(5_000), t0, EPOCH);

        assert_eq!(timer.tick(t0, EPOCH), vec![TimerBoundary::Entered]);
        assert!(timer.tick(t0 + ms(1_000), EPOCH).is_empty());
        assert_eq!(
            timer.tick(t0 + ms(2_100), EPOCH),
            vec![TimerBoundary::Warning]
        );
        assert!(timer.tick(t0 + ms(4_900), EPOCH).is_empty());
        assert_eq!(
            timer.tick(t0 + ms(5_000), EPOCH),
            vec![TimerBoundary::Expired]
        );
        assert!(timer.tick(t0 + ms(9_000), EPOCH).is_empty());
    }

    #[test]
    fn late_first_tick_reports_every_crossed_boundary_in_order() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(3_000));
        timer.start(ms(1_000), t0, EPOCH);

        assert_eq!(
            timer.tick(t0 + ms(2_000), EPOCH),
            vec![
                TimerBoundary::Entered,
                TimerBoundary::Warning,
                TimerBoundary::Expired
            ]
        );
    }

    #[test]
    fn paused_timer_does_not_expire() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(0));
        timer.start(ms(1_000), t0, EPOCH);
        timer.tick(t0, EPOCH);
        timer.pause(t0 + ms(500));

        assert!(timer.tick(t0 + ms(5_000), EPOCH).is_empty());
    }

    #[test]
    fn countdown_from_past_round_is_discarded() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(3_000));
        timer.start(ms(1_000), t0, EPOCH);

        let next_round = Epoch::new(2, Stage::Started);
        assert!(timer.tick(t0 + ms(2_000), next_round).is_empty());
        assert!(timer.state().is_none());
    }

    #[test]
    fn display_rounds_seconds_up_and_percent_down() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(3_000));
        timer.start(ms(10_000), t0, EPOCH);

        let display = timer.display(t0 + ms(9_950)).unwrap();
        assert_eq!(display.seconds, 1);
        assert_eq!(display.percent, 0);
        assert_eq!(display.remaining_ms, 50);

        let display = timer.display(t0 + ms(1)).unwrap();
        assert_eq!(display.seconds, 10);
        assert_eq!(display.percent, 99);

        let display = timer.display(t0 + ms(20_000)).unwrap();
        assert_eq!(display.seconds, 0);
        assert_eq!(display.percent, 0);
    }

    #[test]
    fn reanchor_follows_server_remainder() {
        let t0 = Instant::now();
        let mut timer = TimerController::new(ms(5_000));
        timer.start(ms(20_000), t0, EPOCH);

        timer.reanchor(ms(12_000), t0 + ms(3_000));
        assert_eq!(timer.remaining(t0 + ms(4_000)), Some(ms(11_000)));
    }
}
