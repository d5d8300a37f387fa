//! Timer service: the per-room countdown state machine.
//!
//! DESIGN
//! ======
//! Run state (`running`/paused) and phase (`work`/`break`) are orthogonal.
//! Only the room host may drive the timer; the host also owns the clock and
//! pushes a tick about once per second while running. The engine keeps the
//! authoritative copy, clamps what the host reports, and flips the phase when
//! a tick reaches zero.
//!
//! INVARIANTS
//! ==========
//! - `time_remaining` stays within `[0, phase_duration()]`.
//! - `is_running` is false whenever `time_remaining == 0`.
//!
//! Everything here is pure; locking, broadcast and persistence belong to the
//! room coordinator.

use serde::{Deserialize, Serialize};

use crate::config::TimerDefaults;

/// Authoritative timer snapshot. Serialized as the `timer` payload of
/// `timer-sync` and `room-state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub is_running: bool,
    pub time_remaining: u32,
    pub is_break: bool,
    /// Milliseconds since epoch when the current run started.
    pub started_at: Option<i64>,
    pub work_duration: u32,
    pub break_duration: u32,
}

/// Host-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Reset,
    SwitchMode,
}

/// Payload of a `timer-tick` event as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerTick {
    pub time_remaining: i64,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub is_break: bool,
}

/// What a tick did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Countdown moved; peers need the new value, the host already has it.
    Advanced,
    /// Countdown hit zero and the phase flipped; everyone needs the new state.
    PhaseCompleted,
}

impl TimerState {
    /// Fresh timer at the start of a work phase.
    #[must_use]
    pub fn new(work_duration: u32, break_duration: u32) -> Self {
        let work_duration = work_duration.max(1);
        let break_duration = break_duration.max(1);
        Self {
            is_running: false,
            time_remaining: work_duration,
            is_break: false,
            started_at: None,
            work_duration,
            break_duration,
        }
    }

    /// Rebuild from a durable mirror. Transient fields (`is_running`,
    /// `started_at`) always start from their defaults: nobody is ticking a
    /// room that had no participants.
    #[must_use]
    pub fn hydrate(
        work_duration: Option<u32>,
        break_duration: Option<u32>,
        time_remaining: Option<u32>,
        is_break: bool,
        defaults: TimerDefaults,
    ) -> Self {
        let mut timer = Self::new(
            work_duration.filter(|d| *d > 0).unwrap_or(defaults.work_duration),
            break_duration.filter(|d| *d > 0).unwrap_or(defaults.break_duration),
        );
        timer.is_break = is_break;
        let duration = timer.phase_duration();
        timer.time_remaining = match time_remaining {
            Some(0) | None => duration,
            Some(t) => t.min(duration),
        };
        timer
    }

    /// Length of the current phase in seconds.
    #[must_use]
    pub fn phase_duration(&self) -> u32 {
        if self.is_break { self.break_duration } else { self.work_duration }
    }

    /// Apply a host command at time `now_ms`. Returns `true` if the state
    /// changed (and therefore needs broadcasting and persisting).
    pub fn apply(&mut self, command: TimerCommand, now_ms: i64) -> bool {
        let before = *self;
        match command {
            TimerCommand::Start => {
                if !self.is_running {
                    self.is_running = true;
                    self.started_at = Some(now_ms);
                }
            }
            TimerCommand::Pause => {
                self.is_running = false;
            }
            TimerCommand::Reset => self.reset(),
            TimerCommand::SwitchMode => {
                self.is_break = !self.is_break;
                self.reset();
            }
        }
        *self != before
    }

    /// Apply a host tick at time `now_ms`. Accepted even while paused; the
    /// host's view of the phase and run flag wins, the countdown is clamped.
    /// A tick that resumes the run stamps `started_at`; one that stops it
    /// clears it.
    pub fn tick(&mut self, tick: TimerTick, now_ms: i64) -> TickOutcome {
        self.is_break = tick.is_break;
        let duration = i64::from(self.phase_duration());
        self.time_remaining = u32::try_from(tick.time_remaining.clamp(0, duration)).unwrap_or(0);
        match (self.is_running, tick.is_running) {
            (false, true) => self.started_at = Some(now_ms),
            (true, false) => self.started_at = None,
            _ => {}
        }
        self.is_running = tick.is_running;

        if self.time_remaining == 0 {
            self.is_break = !self.is_break;
            self.reset();
            return TickOutcome::PhaseCompleted;
        }
        TickOutcome::Advanced
    }

    fn reset(&mut self) {
        self.is_running = false;
        self.time_remaining = self.phase_duration();
        self.started_at = None;
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod tests;
