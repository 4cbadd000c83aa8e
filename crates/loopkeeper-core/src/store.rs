//! Execution state store: the single "now executing" slot.
//!
//! The store is a plain owned value handed to the controller, so tests can
//! build as many independent stores as they like. `set_active` always
//! replaces whatever was there; checking for a conflicting loop is the
//! controller's job (via the interruption resolver) before it calls in.

use std::collections::HashMap;

use crate::model::{ActiveExecution, ActivityTimerState, ExecutionProgress, LoopActivityInstance};

#[derive(Debug, Clone, Default)]
pub struct ExecutionStore {
    active: Option<ActiveExecution>,
    timers: HashMap<String, ActivityTimerState>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_active(&self) -> Option<&ActiveExecution> {
        self.active.as_ref()
    }

    pub(crate) fn get_active_mut(&mut self) -> Option<&mut ActiveExecution> {
        self.active.as_mut()
    }

    /// Put `execution` in the slot, replacing any previous one.
    pub fn set_active(&mut self, execution: ActiveExecution) {
        self.active = Some(execution);
    }

    /// Empty the slot and drop every timer.
    pub fn clear_active(&mut self) -> Option<ActiveExecution> {
        self.timers.clear();
        self.active.take()
    }

    pub fn get_timer(&self, activity_id: &str) -> Option<&ActivityTimerState> {
        self.timers.get(activity_id)
    }

    pub fn set_timer(&mut self, activity_id: &str, timer: ActivityTimerState) {
        self.timers.insert(activity_id.to_string(), timer);
    }

    pub fn remove_timer(&mut self, activity_id: &str) -> Option<ActivityTimerState> {
        self.timers.remove(activity_id)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Progress of the execution in the slot, if any.
    pub fn progress(&self) -> Option<ExecutionProgress> {
        self.active.as_ref().map(current_activity_progress)
    }

    /// The current activity of the execution in the slot with its position.
    pub fn current_activity(&self) -> Option<(usize, &LoopActivityInstance)> {
        self.active.as_ref().and_then(current_activity)
    }
}

/// Derive where `active` stands.
///
/// The current activity is the first instance, in `order`, whose id is not
/// in the completed set; `total` when every instance is done.
pub fn current_activity_progress(active: &ActiveExecution) -> ExecutionProgress {
    let ordered = active.definition.ordered_instances();
    let completed = &active.execution_state.completed_activities;
    let total_activities = ordered.len();
    let current_index = ordered
        .iter()
        .position(|instance| !completed.contains(&instance.id))
        .unwrap_or(total_activities);

    let progress = if total_activities > 0 {
        current_index as f64 / total_activities as f64 * 100.0
    } else {
        0.0
    };

    ExecutionProgress {
        current_index,
        total_activities,
        completed_count: completed.len(),
        progress,
        is_complete: current_index >= total_activities,
    }
}

/// Current activity of `active` and its position, `None` once finished.
pub fn current_activity(active: &ActiveExecution) -> Option<(usize, &LoopActivityInstance)> {
    let completed = &active.execution_state.completed_activities;
    active
        .definition
        .ordered_instances()
        .into_iter()
        .enumerate()
        .find(|(_, instance)| !completed.contains(&instance.id))
}
