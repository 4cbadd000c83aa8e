//! Timer synchronization.
//!
//! Timers are wall-clock based: nothing ticks internally. The caller invokes
//! [`sync`] at any cadence (the UI does so roughly once a second) and the
//! elapsed time is derived from timestamp deltas only, so a suspended process
//! catches up on the next call.
//!
//! ```text
//! running:  elapsed += whole seconds since last_update_time
//! paused:   last_update_time := now
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ActivityTimerState;

/// Bring a timer snapshot up to `now`.
///
/// Only whole seconds are credited; the sub-second remainder stays between
/// `last_update_time` and `now` and is credited by a later call. A negative
/// delta (clock moved backwards) credits nothing and re-anchors at `now`.
/// Calling twice with the same `now` never changes `elapsed_seconds`.
pub fn sync(timer: &ActivityTimerState, now: DateTime<Utc>) -> ActivityTimerState {
    let mut next = timer.clone();
    if !timer.is_running {
        next.last_update_time = now;
        return next;
    }

    let delta = now.signed_duration_since(timer.last_update_time);
    if delta < Duration::zero() {
        tracing::debug!(
            activity_id = %timer.activity_id,
            skew_ms = delta.num_milliseconds(),
            "negative timer delta, re-anchoring"
        );
        next.last_update_time = now;
        return next;
    }

    let whole_secs = delta.num_seconds();
    next.elapsed_seconds = timer.elapsed_seconds.saturating_add(whole_secs as u64);
    next.last_update_time = timer.last_update_time + Duration::seconds(whole_secs);
    next
}

/// Seconds past the configured duration. Untimed activities never run over.
pub fn overtime_seconds(elapsed_seconds: u64, duration_minutes: Option<u32>) -> u64 {
    match duration_minutes.filter(|m| *m > 0) {
        Some(minutes) => elapsed_seconds.saturating_sub(u64::from(minutes) * 60),
        None => 0,
    }
}

/// Display mode of the current activity's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// No duration configured: an indeterminate "no timer" display.
    NoTimer,
    /// Counting down toward the configured duration.
    Countdown,
    /// Past the configured duration.
    Overtime,
}

/// Derived view of a timer for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerReading {
    pub activity_id: String,
    pub mode: TimerMode,
    pub is_running: bool,
    pub elapsed_seconds: u64,
    pub duration_seconds: Option<u64>,
    pub remaining_seconds: Option<u64>,
    pub overtime_seconds: u64,
}

impl TimerReading {
    pub fn from_timer(timer: &ActivityTimerState, duration_minutes: Option<u32>) -> Self {
        let duration_seconds = duration_minutes
            .filter(|m| *m > 0)
            .map(|m| u64::from(m) * 60);
        let overtime = overtime_seconds(timer.elapsed_seconds, duration_minutes);
        let mode = match duration_seconds {
            None => TimerMode::NoTimer,
            Some(_) if overtime > 0 => TimerMode::Overtime,
            Some(_) => TimerMode::Countdown,
        };
        Self {
            activity_id: timer.activity_id.clone(),
            mode,
            is_running: timer.is_running,
            elapsed_seconds: timer.elapsed_seconds,
            duration_seconds,
            remaining_seconds: duration_seconds.map(|d| d.saturating_sub(timer.elapsed_seconds)),
            overtime_seconds: overtime,
        }
    }

    /// 0.0 .. 1.0 progress toward the duration; `None` without a timer.
    pub fn fraction(&self) -> Option<f64> {
        self.duration_seconds
            .map(|d| (self.elapsed_seconds as f64 / d as f64).min(1.0))
    }

    pub fn has_reached_duration(&self) -> bool {
        matches!(self.duration_seconds, Some(d) if self.elapsed_seconds >= d)
    }
}
