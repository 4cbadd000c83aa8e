//! Interruption resolution.
//!
//! There is exactly one "now executing" slot. A request to start a loop
//! while a different loop occupies it must be settled by the user before
//! the controller touches the slot.

use serde::{Deserialize, Serialize};

use crate::model::ActiveExecution;
use crate::store::current_activity_progress;

/// Summary of the loop currently holding the slot, for the conflict prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub loop_id: String,
    pub title: String,
    pub current_index: usize,
    pub total_activities: usize,
    pub progress: f64,
}

impl LoopSummary {
    pub fn of(execution: &ActiveExecution) -> Self {
        let progress = current_activity_progress(execution);
        Self {
            loop_id: execution.definition.id.clone(),
            title: execution.definition.title.clone(),
            current_index: progress.current_index,
            total_activities: progress.total_activities,
            progress: progress.progress,
        }
    }
}

/// Decision for a start request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Slot is free, or already holds the requested loop (resume it).
    Proceed,
    /// Another loop is running; the caller must pick a [`ConflictChoice`].
    Conflict {
        current_loop: LoopSummary,
        requested_loop_id: String,
    },
}

/// The caller's answer to a [`Resolution::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    /// Keep the current run and re-open its live view.
    ContinueCurrent,
    /// Discard the current run and start the requested loop.
    StartNew,
    /// Do nothing.
    Cancel,
}

pub fn resolve(current: Option<&ActiveExecution>, requested_loop_id: &str) -> Resolution {
    match current {
        None => Resolution::Proceed,
        Some(active) if active.definition.id == requested_loop_id => Resolution::Proceed,
        Some(active) => {
            tracing::info!(
                current = %active.definition.id,
                requested = requested_loop_id,
                "start request conflicts with active execution"
            );
            Resolution::Conflict {
                current_loop: LoopSummary::of(active),
                requested_loop_id: requested_loop_id.to_string(),
            }
        }
    }
}
