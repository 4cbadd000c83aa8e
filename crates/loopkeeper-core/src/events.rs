use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::ExecutionStatus;
use crate::model::{ActivityExecutionResult, RunOutcome};
use crate::timer::TimerReading;

/// Every state change of the engine produces an Event.
/// The UI renders from them; hosts may forward them elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ExecutionStarted {
        loop_id: String,
        total_activities: usize,
        first_activity_id: Option<String>,
        at: DateTime<Utc>,
    },
    /// An existing execution of the requested loop was re-opened.
    ExecutionReopened {
        loop_id: String,
        current_index: usize,
        at: DateTime<Utc>,
    },
    ExecutionPaused {
        loop_id: String,
        elapsed_seconds: Option<u64>,
        at: DateTime<Utc>,
    },
    ExecutionResumed {
        loop_id: String,
        at: DateTime<Utc>,
    },
    ActivityAdvanced {
        loop_id: String,
        result: ActivityExecutionResult,
        from_index: usize,
        to_index: usize,
        at: DateTime<Utc>,
    },
    ActivityNavigated {
        loop_id: String,
        from_index: usize,
        to_index: usize,
        at: DateTime<Utc>,
    },
    /// Current activity ran past its configured duration.
    TimerOvertime {
        activity_id: String,
        overtime_seconds: u64,
        at: DateTime<Utc>,
    },
    /// Every activity of the loop is done; the slot stays occupied until
    /// the execution is completed.
    LoopFinished {
        loop_id: String,
        time_spent_seconds: u64,
        at: DateTime<Utc>,
    },
    ExecutionCompleted {
        loop_id: String,
        outcome: RunOutcome,
        time_spent_seconds: u64,
        at: DateTime<Utc>,
    },
    /// Restored from persistence after a restart.
    ExecutionRestored {
        loop_id: String,
        current_index: usize,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: ExecutionStatus,
        loop_id: Option<String>,
        current_index: usize,
        total_activities: usize,
        progress: f64,
        timer: Option<TimerReading>,
        at: DateTime<Utc>,
    },
}
