//! Live execution records: the single active run, its timer snapshots and
//! the per-activity results produced while it progresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::loop_def::Loop;
use crate::error::EngineError;

/// Wall-clock timer snapshot for the current activity of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimerState {
    pub activity_id: String,
    pub start_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub is_running: bool,
    pub last_update_time: DateTime<Utc>,
}

impl ActivityTimerState {
    /// A fresh timer anchored at `now`.
    pub fn started(activity_id: impl Into<String>, now: DateTime<Utc>, is_running: bool) -> Self {
        Self {
            activity_id: activity_id.into(),
            start_time: now,
            elapsed_seconds: 0,
            is_running,
            last_update_time: now,
        }
    }
}

/// Progress of the single active execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoopExecutionState {
    pub is_paused: bool,
    pub completed_activities: BTreeSet<String>,
    pub time_spent_seconds: u64,
}

/// The one in-progress run of a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveExecution {
    /// Identifies this run in history; a restart of the same loop gets a new one.
    #[serde(default = "new_run_id")]
    pub run_id: String,
    /// Snapshot of the loop taken when the run started.
    #[serde(rename = "loop")]
    pub definition: Loop,
    pub execution_state: LoopExecutionState,
    pub started_at: DateTime<Utc>,
}

impl ActiveExecution {
    pub fn new(definition: Loop, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: new_run_id(),
            definition,
            execution_state: LoopExecutionState::default(),
            started_at,
        }
    }

    pub fn loop_id(&self) -> &str {
        &self.definition.id
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome of finishing one activity. `completed` and `skipped` are
/// mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityExecutionResult {
    pub activity_id: String,
    pub completed: bool,
    pub skipped: bool,
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub completed_sub_actions: Vec<String>,
}

impl ActivityExecutionResult {
    pub fn completed(activity_id: impl Into<String>, time_spent_seconds: u64) -> Self {
        Self {
            activity_id: activity_id.into(),
            completed: true,
            skipped: false,
            time_spent_seconds,
            completed_sub_actions: Vec::new(),
        }
    }

    pub fn skipped(activity_id: impl Into<String>, time_spent_seconds: u64) -> Self {
        Self {
            activity_id: activity_id.into(),
            completed: false,
            skipped: true,
            time_spent_seconds,
            completed_sub_actions: Vec::new(),
        }
    }

    pub fn with_sub_actions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed_sub_actions = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the result moves the loop forward.
    pub fn is_final(&self) -> bool {
        self.completed || self.skipped
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.completed && self.skipped {
            return Err(EngineError::InvalidResult {
                activity_id: self.activity_id.clone(),
                message: "an activity cannot be both completed and skipped".into(),
            });
        }
        Ok(())
    }
}

/// Derived position of an execution within its loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub current_index: usize,
    pub total_activities: usize,
    pub completed_count: usize,
    /// 0.0 .. 100.0
    pub progress: f64,
    pub is_complete: bool,
}

/// How a run left the active slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every activity was done when the run was completed.
    Finished,
    /// The run was completed early or replaced by another loop.
    Discarded,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Finished => "finished",
            RunOutcome::Discarded => "discarded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "finished" => RunOutcome::Finished,
            _ => RunOutcome::Discarded,
        }
    }
}

/// History entry written when a run leaves the active slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub loop_id: String,
    pub loop_title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub time_spent_seconds: u64,
    pub completed_count: usize,
    pub total_activities: usize,
    pub outcome: RunOutcome,
}
