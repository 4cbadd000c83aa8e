//! Progression controller.
//!
//! The state machine over the single active execution. Every operation runs
//! to completion on `&mut self`: the in-memory store is updated first and
//! then checkpointed through the persistence adapter. A failed checkpoint is
//! logged and leaves the live run untouched; only durability suffers.
//!
//! ## State Transitions
//!
//! ```text
//! NotStarted -> Running <-> Paused
//!                  |
//!                  v
//!              Completed (every activity done, slot still held)
//!                  |
//!                  v complete()
//!              NotStarted
//! ```
//!
//! The controller owns no threads. The host calls [`ProgressionController::tick`]
//! about once a second while the execution view is visible and stops when
//! it is hidden or the execution ends.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, PersistenceError, Result};
use crate::events::Event;
use crate::interruption::{self, ConflictChoice, Resolution};
use crate::model::{
    ActiveExecution, ActivityExecutionResult, ActivityTimerState, ExecutionProgress, Loop,
    RunOutcome, RunRecord,
};
use crate::storage::{ExecutionPersistence, TimerConfig};
use crate::store::{current_activity, current_activity_progress, ExecutionStore};
use crate::timer::{sync, Clock, SystemClock, TimerReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The slot is empty.
    NotStarted,
    Running,
    Paused,
    /// Every activity is done; waiting for `complete`.
    Completed,
}

/// Result of a resolver-gated start request.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The slot was free and the loop started.
    Started(Event),
    /// The requested loop was already running and was re-opened untouched.
    Reopened(Event),
    /// Another loop holds the slot; answer with `resolve_conflict`.
    Conflict(Resolution),
}

/// Result of answering a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOutcome {
    /// The current run is kept and re-opened.
    Continued(Event),
    /// The current run was discarded and the requested loop started.
    Replaced { discarded: Event, started: Event },
    /// Nothing changed and nothing is opened.
    Cancelled,
}

pub struct ProgressionController<P, C = SystemClock> {
    store: ExecutionStore,
    persistence: P,
    clock: C,
    config: TimerConfig,
    /// Results produced during the current run, in order.
    results: Vec<ActivityExecutionResult>,
    /// Activity whose overtime was already announced.
    overtime_announced: Option<String>,
    /// Last checkpoint failed; memory is ahead of storage.
    checkpoint_pending: bool,
}

impl<P: ExecutionPersistence> ProgressionController<P, SystemClock> {
    /// Controller on the system clock with default timer settings.
    pub fn with_system_clock(persistence: P) -> Self {
        Self::new(persistence, SystemClock)
    }
}

impl<P: ExecutionPersistence, C: Clock> ProgressionController<P, C> {
    pub fn new(persistence: P, clock: C) -> Self {
        Self {
            store: ExecutionStore::new(),
            persistence,
            clock,
            config: TimerConfig::default(),
            results: Vec::new(),
            overtime_announced: None,
            checkpoint_pending: false,
        }
    }

    pub fn with_config(mut self, config: TimerConfig) -> Self {
        self.config = config;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn store(&self) -> &ExecutionStore {
        &self.store
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn active(&self) -> Option<&ActiveExecution> {
        self.store.get_active()
    }

    pub fn progress(&self) -> Option<ExecutionProgress> {
        self.store.progress()
    }

    pub fn status(&self) -> ExecutionStatus {
        match self.store.get_active() {
            None => ExecutionStatus::NotStarted,
            Some(active) if current_activity_progress(active).is_complete => {
                ExecutionStatus::Completed
            }
            Some(active) if active.execution_state.is_paused => ExecutionStatus::Paused,
            Some(_) => ExecutionStatus::Running,
        }
    }

    /// Results of the activities finished during the current run.
    pub fn activity_results(&self) -> &[ActivityExecutionResult] {
        &self.results
    }

    /// Timer of the current activity as last stored.
    pub fn current_timer(&self) -> Option<&ActivityTimerState> {
        let (_, current) = self.store.current_activity()?;
        self.store.get_timer(&current.id)
    }

    /// Reading of the current activity's timer as of now, without storing it.
    pub fn current_reading(&self) -> Option<TimerReading> {
        let (_, current) = self.store.current_activity()?;
        let timer = self.store.get_timer(&current.id)?;
        let synced = sync(timer, self.clock.now());
        Some(TimerReading::from_timer(&synced, current.duration_minutes))
    }

    /// True when the last checkpoint failed and has not been retried successfully.
    pub fn checkpoint_pending(&self) -> bool {
        self.checkpoint_pending
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        let progress = self.store.progress();
        Event::StateSnapshot {
            status: self.status(),
            loop_id: self.store.get_active().map(|a| a.definition.id.clone()),
            current_index: progress.as_ref().map(|p| p.current_index).unwrap_or(0),
            total_activities: progress.as_ref().map(|p| p.total_activities).unwrap_or(0),
            progress: progress.as_ref().map(|p| p.progress).unwrap_or(0.0),
            timer: self.current_reading(),
            at: self.clock.now(),
        }
    }

    /// Ask the interruption resolver about starting `loop_id`.
    pub fn resolve_start(&self, loop_id: &str) -> Resolution {
        interruption::resolve(self.store.get_active(), loop_id)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Reload the persisted execution after a restart.
    ///
    /// A running timer is synced against the current clock, so time that
    /// passed while the process was gone is counted. A record that cannot be
    /// decoded is logged and treated as absent.
    pub fn restore(&mut self) -> Result<Option<Event>> {
        let now = self.clock.now();
        let execution = match self.persistence.load_active_execution() {
            Ok(Some(execution)) => execution,
            Ok(None) => return Ok(None),
            Err(PersistenceError::Decode { key, message }) => {
                warn!(%key, %message, "discarding unreadable execution record");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let stored_timer = match self.persistence.load_timer() {
            Ok(timer) => timer,
            Err(e) => {
                warn!(error = %e, "could not load timer snapshot; starting a fresh timer");
                None
            }
        };

        let is_paused = execution.execution_state.is_paused;
        let loop_id = execution.definition.id.clone();
        let current = current_activity(&execution).map(|(_, a)| a.id.clone());
        let progress = current_activity_progress(&execution);

        self.store.clear_active();
        self.store.set_active(execution);
        self.results.clear();
        self.overtime_announced = None;

        if let Some(current_id) = current {
            // The execution's pause flag is authoritative over the snapshot's.
            let timer = match stored_timer {
                Some(timer) if timer.activity_id == current_id => {
                    let timer = ActivityTimerState {
                        is_running: !is_paused,
                        ..timer
                    };
                    sync(&timer, now)
                }
                Some(timer) => {
                    debug!(
                        stored = %timer.activity_id,
                        current = %current_id,
                        "stale timer snapshot replaced"
                    );
                    ActivityTimerState::started(current_id.as_str(), now, !is_paused)
                }
                None => ActivityTimerState::started(current_id.as_str(), now, !is_paused),
            };
            self.store.set_timer(&current_id, timer);
        }

        info!(%loop_id, current_index = progress.current_index, "restored active execution");
        self.persist();
        Ok(Some(Event::ExecutionRestored {
            loop_id,
            current_index: progress.current_index,
            at: now,
        }))
    }

    /// Start `definition`, or re-open it if it is already the active loop.
    /// Another active loop yields a conflict for the caller to settle.
    pub fn request_start(&mut self, definition: &Loop) -> Result<StartOutcome> {
        match self.resolve_start(&definition.id) {
            Resolution::Proceed if self.store.get_active().is_some() => {
                Ok(StartOutcome::Reopened(self.reopen()?))
            }
            Resolution::Proceed => Ok(StartOutcome::Started(self.start(definition)?)),
            conflict @ Resolution::Conflict { .. } => Ok(StartOutcome::Conflict(conflict)),
        }
    }

    /// Apply the caller's answer to a conflict raised for `requested`.
    pub fn resolve_conflict(
        &mut self,
        choice: ConflictChoice,
        requested: &Loop,
    ) -> Result<ConflictOutcome> {
        match choice {
            ConflictChoice::ContinueCurrent => Ok(ConflictOutcome::Continued(self.reopen()?)),
            ConflictChoice::StartNew => {
                let current_id = self
                    .store
                    .get_active()
                    .map(|a| a.definition.id.clone())
                    .ok_or_else(|| {
                        self.rejected("resolve_conflict", EngineError::NoActiveExecution)
                    })?;
                requested.validate()?;
                let discarded = self.complete(&current_id)?;
                let started = self.start(requested)?;
                Ok(ConflictOutcome::Replaced { discarded, started })
            }
            ConflictChoice::Cancel => {
                debug!(requested = %requested.id, "start request cancelled");
                Ok(ConflictOutcome::Cancelled)
            }
        }
    }

    /// Create a fresh execution of `definition` with the first activity's
    /// timer running.
    ///
    /// Starting the loop that already holds the slot completes the old run
    /// (recorded in history) and starts over from the beginning. Starting a
    /// different loop while one is active is rejected; go through
    /// [`Self::request_start`] instead.
    pub fn start(&mut self, definition: &Loop) -> Result<Event> {
        definition.validate()?;
        if let Some(active) = self.store.get_active() {
            if active.definition.id != definition.id {
                let err = EngineError::ExecutionConflict {
                    active: active.definition.id.clone(),
                    requested: definition.id.clone(),
                };
                return Err(self.rejected("start", err).into());
            }
            debug!(loop_id = %definition.id, "restarting active loop");
            self.complete(&definition.id)?;
        }

        let now = self.clock.now();
        let execution = ActiveExecution::new(definition.clone(), now);
        let first = current_activity(&execution).map(|(_, a)| a.id.clone());

        self.store.clear_active();
        self.store.set_active(execution);
        self.results.clear();
        self.overtime_announced = None;
        if let Some(first_id) = &first {
            self.store
                .set_timer(first_id, ActivityTimerState::started(first_id.as_str(), now, true));
        }

        info!(loop_id = %definition.id, total = definition.len(), "started loop execution");
        self.persist();
        Ok(Event::ExecutionStarted {
            loop_id: definition.id.clone(),
            total_activities: definition.len(),
            first_activity_id: first,
            at: now,
        })
    }

    /// Pause (`true`) or resume (`false`) the execution and its current timer.
    pub fn pause(&mut self, is_paused: bool) -> Result<Event> {
        let now = self.clock.now();
        let active = self
            .store
            .get_active()
            .ok_or_else(|| self.rejected("pause", EngineError::NoActiveExecution))?;
        let loop_id = active.definition.id.clone();
        let current_id = current_activity(active).map(|(_, a)| a.id.clone());

        let mut elapsed = None;
        if let Some(current_id) = current_id {
            let timer = match self.store.get_timer(&current_id) {
                Some(timer) => sync(timer, now),
                None => ActivityTimerState::started(current_id.as_str(), now, false),
            };
            let timer = ActivityTimerState {
                is_running: !is_paused,
                ..timer
            };
            elapsed = Some(timer.elapsed_seconds);
            self.store.set_timer(&current_id, timer);
        }
        if let Some(active) = self.store.get_active_mut() {
            active.execution_state.is_paused = is_paused;
        }

        self.persist();
        if is_paused {
            info!(%loop_id, "paused loop execution");
            Ok(Event::ExecutionPaused {
                loop_id,
                elapsed_seconds: elapsed,
                at: now,
            })
        } else {
            info!(%loop_id, "resumed loop execution");
            Ok(Event::ExecutionResumed { loop_id, at: now })
        }
    }

    /// Finish the current activity with `result`.
    ///
    /// A completed or skipped result folds the activity into the completed
    /// set, adds its time to the run total, drops its timer and starts one
    /// for the next activity. A result that is neither leaves everything as
    /// it is. Sub-action progress never blocks advancing.
    pub fn advance(&mut self, result: ActivityExecutionResult) -> Result<Vec<Event>> {
        let now = self.clock.now();
        if let Err(err) = result.validate() {
            return Err(self.rejected("advance", err).into());
        }
        let active = self
            .store
            .get_active()
            .ok_or_else(|| self.rejected("advance", EngineError::NoActiveExecution))?;
        let loop_id = active.definition.id.clone();
        let is_paused = active.execution_state.is_paused;

        let (from_index, current_id) = match current_activity(active) {
            Some((index, current)) => (index, current.id.clone()),
            None => {
                let err = EngineError::LoopAlreadyFinished { loop_id };
                return Err(self.rejected("advance", err).into());
            }
        };
        if current_id != result.activity_id {
            let err = EngineError::StateMismatch {
                expected: current_id,
                actual: result.activity_id.clone(),
            };
            return Err(self.rejected("advance", err).into());
        }
        if !result.is_final() {
            debug!(activity_id = %current_id, "result is neither completed nor skipped; staying");
            return Ok(Vec::new());
        }

        let Some(active) = self.store.get_active_mut() else {
            return Err(EngineError::NoActiveExecution.into());
        };
        let state = &mut active.execution_state;
        state.completed_activities.insert(current_id.clone());
        state.time_spent_seconds = state
            .time_spent_seconds
            .saturating_add(result.time_spent_seconds);
        let time_spent_seconds = state.time_spent_seconds;
        let progress = current_activity_progress(active);
        let next_id = current_activity(active).map(|(_, a)| a.id.clone());

        self.store.remove_timer(&current_id);
        if let Some(next_id) = &next_id {
            self.store.set_timer(
                next_id,
                ActivityTimerState::started(next_id.as_str(), now, !is_paused),
            );
        }
        self.overtime_announced = None;

        info!(
            %loop_id,
            activity_id = %current_id,
            completed = result.completed,
            skipped = result.skipped,
            to_index = progress.current_index,
            "advanced loop execution"
        );

        self.results.push(result.clone());
        let mut events = vec![Event::ActivityAdvanced {
            loop_id: loop_id.clone(),
            result,
            from_index,
            to_index: progress.current_index,
            at: now,
        }];
        if progress.is_complete {
            info!(%loop_id, time_spent_seconds, "every activity done");
            events.push(Event::LoopFinished {
                loop_id,
                time_spent_seconds,
                at: now,
            });
        }

        self.persist();
        Ok(events)
    }

    /// Complete the current activity, crediting its timer's elapsed time and
    /// the sub-actions currently checked off.
    pub fn complete_current_activity(&mut self) -> Result<Vec<Event>> {
        let result = self.result_for_current("complete_current_activity", true)?;
        self.advance(result)
    }

    /// Skip the current activity, crediting its timer's elapsed time.
    pub fn skip(&mut self) -> Result<Vec<Event>> {
        let result = self.result_for_current("skip", false)?;
        self.advance(result)
    }

    /// Check or uncheck a sub-action of the current activity.
    pub fn set_sub_action_done(&mut self, sub_action_id: &str, done: bool) -> Result<()> {
        let (activity_id, owned) = match self.store.current_activity() {
            Some((_, current)) => (
                current.id.clone(),
                current.sub_actions.iter().any(|s| s.id == sub_action_id),
            ),
            None => {
                let err = self.no_current_activity();
                return Err(self.rejected("set_sub_action_done", err).into());
            }
        };
        if !owned {
            let err = EngineError::UnknownSubAction {
                activity_id,
                sub_action_id: sub_action_id.to_string(),
            };
            return Err(self.rejected("set_sub_action_done", err).into());
        }

        let sub_action = self
            .store
            .get_active_mut()
            .and_then(|active| {
                active
                    .definition
                    .activity_instances
                    .iter_mut()
                    .find(|i| i.id == activity_id)
            })
            .and_then(|instance| instance.sub_actions.iter_mut().find(|s| s.id == sub_action_id));
        if let Some(sub_action) = sub_action {
            sub_action.done = done;
        }
        self.persist();
        Ok(())
    }

    /// Jump to the activity at `index`.
    ///
    /// Not a completion judgment: activities before `index` are folded into
    /// the completed set, activities from `index` on are taken out of it.
    /// The abandoned timer's elapsed time still counts toward the run total.
    pub fn navigate_to_activity(&mut self, index: usize) -> Result<Event> {
        let now = self.clock.now();
        let active = self
            .store
            .get_active()
            .ok_or_else(|| self.rejected("navigate_to_activity", EngineError::NoActiveExecution))?;
        let loop_id = active.definition.id.clone();
        let is_paused = active.execution_state.is_paused;
        let progress = current_activity_progress(active);
        if index >= progress.total_activities {
            let err = EngineError::IndexOutOfRange {
                index,
                total: progress.total_activities,
            };
            return Err(self.rejected("navigate_to_activity", err).into());
        }
        if index == progress.current_index {
            return Err(self
                .rejected("navigate_to_activity", EngineError::SameActivity { index })
                .into());
        }
        let ordered_ids: Vec<String> = active
            .definition
            .ordered_instances()
            .iter()
            .map(|i| i.id.clone())
            .collect();
        let abandoned = current_activity(active).map(|(_, a)| a.id.clone());

        let mut abandoned_secs = 0;
        if let Some(abandoned) = &abandoned {
            if let Some(timer) = self.store.remove_timer(abandoned) {
                abandoned_secs = sync(&timer, now).elapsed_seconds;
            }
        }
        if let Some(active) = self.store.get_active_mut() {
            let state = &mut active.execution_state;
            for (position, id) in ordered_ids.iter().enumerate() {
                if position < index {
                    state.completed_activities.insert(id.clone());
                } else {
                    state.completed_activities.remove(id);
                }
            }
            state.time_spent_seconds = state.time_spent_seconds.saturating_add(abandoned_secs);
        }
        let target_id = &ordered_ids[index];
        self.store.set_timer(
            target_id,
            ActivityTimerState::started(target_id.as_str(), now, !is_paused),
        );
        self.overtime_announced = None;

        info!(%loop_id, from = progress.current_index, to = index, "navigated loop execution");
        self.persist();
        Ok(Event::ActivityNavigated {
            loop_id,
            from_index: progress.current_index,
            to_index: index,
            at: now,
        })
    }

    /// Empty the slot for `loop_id`, recording the run in history.
    ///
    /// The run counts as finished only if every activity was done;
    /// otherwise it is recorded as discarded.
    pub fn complete(&mut self, loop_id: &str) -> Result<Event> {
        let now = self.clock.now();
        let active = self
            .store
            .get_active()
            .ok_or_else(|| self.rejected("complete", EngineError::NoActiveExecution))?;
        if active.definition.id != loop_id {
            let err = EngineError::LoopMismatch {
                active: active.definition.id.clone(),
                requested: loop_id.to_string(),
            };
            return Err(self.rejected("complete", err).into());
        }

        let progress = current_activity_progress(active);
        let current_elapsed = current_activity(active)
            .and_then(|(_, current)| self.store.get_timer(&current.id))
            .map(|timer| sync(timer, now).elapsed_seconds)
            .unwrap_or(0);
        let time_spent_seconds = active
            .execution_state
            .time_spent_seconds
            .saturating_add(current_elapsed);
        let outcome = if progress.is_complete {
            RunOutcome::Finished
        } else {
            RunOutcome::Discarded
        };
        let record = RunRecord {
            run_id: active.run_id.clone(),
            loop_id: loop_id.to_string(),
            loop_title: active.definition.title.clone(),
            started_at: active.started_at,
            finished_at: now,
            time_spent_seconds,
            completed_count: progress.completed_count,
            total_activities: progress.total_activities,
            outcome,
        };

        self.store.clear_active();
        self.results.clear();
        self.overtime_announced = None;

        if let Err(e) = self.persistence.record_run(&record) {
            warn!(%loop_id, error = %e, "failed to record run history");
        }
        info!(
            %loop_id,
            outcome = outcome.as_str(),
            time_spent_seconds = record.time_spent_seconds,
            "completed loop execution"
        );
        self.persist();
        Ok(Event::ExecutionCompleted {
            loop_id: loop_id.to_string(),
            outcome,
            time_spent_seconds: record.time_spent_seconds,
            at: now,
        })
    }

    /// Call periodically. Syncs the current timer and reacts to it reaching
    /// its duration: auto-completes when the activity asks for it, otherwise
    /// announces overtime once. Does nothing with an empty slot.
    pub fn tick(&mut self) -> Result<Vec<Event>> {
        let now = self.clock.now();
        let Some(active) = self.store.get_active() else {
            return Ok(Vec::new());
        };
        let is_paused = active.execution_state.is_paused;
        let Some((_, current)) = current_activity(active) else {
            return Ok(Vec::new());
        };
        let current_id = current.id.clone();
        let duration = current.duration_minutes;
        let auto_complete = current.auto_complete_on_timer_end;
        let done_sub_actions = current.done_sub_action_ids();

        let timer = match self.store.get_timer(&current_id) {
            Some(timer) => sync(timer, now),
            None => ActivityTimerState::started(current_id.as_str(), now, !is_paused),
        };
        let reading = TimerReading::from_timer(&timer, duration);
        let is_running = timer.is_running;
        let elapsed = timer.elapsed_seconds;
        self.store.set_timer(&current_id, timer);

        if reading.has_reached_duration()
            && auto_complete
            && self.config.auto_advance_on_timer_end
            && is_running
        {
            info!(activity_id = %current_id, elapsed, "timer ended; auto-completing activity");
            let result = ActivityExecutionResult::completed(current_id, elapsed)
                .with_sub_actions(done_sub_actions);
            return self.advance(result);
        }

        if reading.overtime_seconds > 0
            && self.overtime_announced.as_deref() != Some(current_id.as_str())
        {
            debug!(
                activity_id = %current_id,
                overtime = reading.overtime_seconds,
                "activity in overtime"
            );
            self.overtime_announced = Some(current_id.clone());
            return Ok(vec![Event::TimerOvertime {
                activity_id: current_id,
                overtime_seconds: reading.overtime_seconds,
                at: now,
            }]);
        }
        Ok(Vec::new())
    }

    /// Write the current state through the persistence adapter.
    ///
    /// Called after every command; hosts may call it again to retry after a
    /// failure reported by [`Self::checkpoint_pending`].
    pub fn checkpoint(&mut self) -> Result<(), PersistenceError> {
        let result = self
            .persistence
            .save_checkpoint(self.store.get_active(), self.current_timer());
        self.checkpoint_pending = result.is_err();
        result
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn persist(&mut self) {
        if let Err(e) = self.checkpoint() {
            warn!(error = %e, "checkpoint failed; execution continues in memory");
        }
    }

    fn reopen(&self) -> Result<Event> {
        let active = self
            .store
            .get_active()
            .ok_or_else(|| self.rejected("reopen", EngineError::NoActiveExecution))?;
        let progress = current_activity_progress(active);
        debug!(loop_id = %active.definition.id, "re-opening active execution");
        Ok(Event::ExecutionReopened {
            loop_id: active.definition.id.clone(),
            current_index: progress.current_index,
            at: self.clock.now(),
        })
    }

    /// Error for an operation that needs a current activity and found none.
    fn no_current_activity(&self) -> EngineError {
        match self.store.get_active() {
            Some(active) => EngineError::LoopAlreadyFinished {
                loop_id: active.definition.id.clone(),
            },
            None => EngineError::NoActiveExecution,
        }
    }

    fn result_for_current(
        &self,
        operation: &str,
        completed: bool,
    ) -> Result<ActivityExecutionResult> {
        let (_, current) = self
            .store
            .current_activity()
            .ok_or_else(|| self.rejected(operation, self.no_current_activity()))?;
        let elapsed = self
            .store
            .get_timer(&current.id)
            .map(|timer| sync(timer, self.clock.now()).elapsed_seconds)
            .unwrap_or(0);
        let result = if completed {
            ActivityExecutionResult::completed(current.id.as_str(), elapsed)
                .with_sub_actions(current.done_sub_action_ids())
        } else {
            ActivityExecutionResult::skipped(current.id.as_str(), elapsed)
                .with_sub_actions(current.done_sub_action_ids())
        };
        Ok(result)
    }

    fn rejected(&self, operation: &str, err: EngineError) -> EngineError {
        warn!(operation, error = %err, "rejected engine operation");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::model::LoopActivityInstance;
    use crate::storage::MemoryPersistence;
    use crate::timer::{ManualClock, TimerMode};
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap())
    }

    fn morning() -> Loop {
        Loop::new("morning", "Morning Routine")
            .with_activity(LoopActivityInstance::new("wake", "wake-up", 0).with_duration(5))
            .with_activity(LoopActivityInstance::new("water", "hydrate", 0).with_duration(0))
            .with_activity(LoopActivityInstance::new("stretch", "stretch", 0).with_duration(10))
    }

    type TestController = ProgressionController<MemoryPersistence, ManualClock>;

    fn controller() -> (TestController, ManualClock, MemoryPersistence) {
        let clock = clock();
        let persistence = MemoryPersistence::new();
        let ctl = ProgressionController::new(persistence.clone(), clock.clone());
        (ctl, clock, persistence)
    }

    fn engine_err(err: CoreError) -> EngineError {
        match err {
            CoreError::Engine(e) => e,
            other => panic!("expected engine error, got {other:?}"),
        }
    }

    #[test]
    fn start_creates_running_timer_for_first_activity() {
        let (mut ctl, clock, persistence) = controller();
        assert_eq!(ctl.status(), ExecutionStatus::NotStarted);

        let event = ctl.start(&morning()).unwrap();
        assert!(matches!(event, Event::ExecutionStarted { total_activities: 3, .. }));
        assert_eq!(ctl.status(), ExecutionStatus::Running);

        let timer = ctl.current_timer().unwrap();
        assert_eq!(timer.activity_id, "wake");
        assert!(timer.is_running);
        assert_eq!(timer.start_time, clock.now());
        assert!(persistence.stored_execution().is_some());
        assert_eq!(persistence.stored_timer().unwrap().activity_id, "wake");
    }

    #[test]
    fn operations_without_execution_fail() {
        let (mut ctl, _clock, _) = controller();
        assert_eq!(engine_err(ctl.pause(true).unwrap_err()), EngineError::NoActiveExecution);
        assert_eq!(
            engine_err(ctl.advance(ActivityExecutionResult::completed("wake", 0)).unwrap_err()),
            EngineError::NoActiveExecution
        );
        assert_eq!(
            engine_err(ctl.navigate_to_activity(1).unwrap_err()),
            EngineError::NoActiveExecution
        );
        assert_eq!(
            engine_err(ctl.complete("morning").unwrap_err()),
            EngineError::NoActiveExecution
        );
        assert!(ctl.tick().unwrap().is_empty());
    }

    #[test]
    fn advance_with_wrong_activity_is_state_mismatch_and_changes_nothing() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        let before = ctl.active().cloned();

        let err = ctl
            .advance(ActivityExecutionResult::completed("stretch", 10))
            .unwrap_err();
        assert_eq!(
            engine_err(err),
            EngineError::StateMismatch {
                expected: "wake".into(),
                actual: "stretch".into()
            }
        );
        assert_eq!(ctl.active().cloned(), before);
        assert_eq!(ctl.current_timer().unwrap().activity_id, "wake");
    }

    #[test]
    fn advance_rejects_contradictory_result() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        let mut result = ActivityExecutionResult::completed("wake", 1);
        result.skipped = true;
        assert!(matches!(
            engine_err(ctl.advance(result).unwrap_err()),
            EngineError::InvalidResult { .. }
        ));
    }

    #[test]
    fn non_final_result_keeps_activity_current() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        let mut result = ActivityExecutionResult::completed("wake", 30);
        result.completed = false;
        assert!(ctl.advance(result).unwrap().is_empty());
        assert_eq!(ctl.progress().unwrap().current_index, 0);
        assert_eq!(ctl.active().unwrap().execution_state.time_spent_seconds, 0);
    }

    #[test]
    fn advancing_through_every_activity_finishes_loop() {
        let (mut ctl, clock, _) = controller();
        ctl.start(&morning()).unwrap();
        for (i, id) in ["wake", "water", "stretch"].into_iter().enumerate() {
            clock.advance_secs(60);
            let events = ctl.advance(ActivityExecutionResult::completed(id, 60)).unwrap();
            assert!(matches!(
                events[0],
                Event::ActivityAdvanced { to_index, .. } if to_index == i + 1
            ));
        }
        assert_eq!(ctl.status(), ExecutionStatus::Completed);
        assert!(ctl.current_timer().is_none());
        assert_eq!(ctl.store().timer_count(), 0);
        assert_eq!(ctl.active().unwrap().execution_state.time_spent_seconds, 180);
        assert_eq!(ctl.activity_results().len(), 3);

        let err = ctl.advance(ActivityExecutionResult::completed("stretch", 0)).unwrap_err();
        assert!(matches!(engine_err(err), EngineError::LoopAlreadyFinished { .. }));
    }

    #[test]
    fn last_advance_emits_loop_finished() {
        let (mut ctl, _clock, _) = controller();
        let single =
            Loop::new("one", "One").with_activity(LoopActivityInstance::new("only", "read", 0));
        ctl.start(&single).unwrap();
        let events = ctl.advance(ActivityExecutionResult::skipped("only", 5)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Event::LoopFinished { time_spent_seconds: 5, .. }));
    }

    #[test]
    fn advance_while_paused_starts_next_timer_paused() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        ctl.pause(true).unwrap();
        ctl.advance(ActivityExecutionResult::completed("wake", 0)).unwrap();
        let timer = ctl.current_timer().unwrap();
        assert_eq!(timer.activity_id, "water");
        assert!(!timer.is_running);
        assert_eq!(ctl.status(), ExecutionStatus::Paused);
    }

    #[test]
    fn skip_credits_elapsed_time() {
        let (mut ctl, clock, _) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(42);
        let events = ctl.skip().unwrap();
        match &events[0] {
            Event::ActivityAdvanced { result, .. } => {
                assert!(result.skipped);
                assert_eq!(result.time_spent_seconds, 42);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(ctl.active().unwrap().execution_state.time_spent_seconds, 42);
    }

    #[test]
    fn complete_current_activity_carries_checked_sub_actions() {
        let (mut ctl, _clock, _) = controller();
        let definition = Loop::new("l", "L").with_activity(
            LoopActivityInstance::new("stretch", "stretch", 0)
                .with_sub_actions(["neck", "back", "legs"]),
        );
        ctl.start(&definition).unwrap();
        ctl.set_sub_action_done("stretch-sub-0", true).unwrap();
        ctl.set_sub_action_done("stretch-sub-2", true).unwrap();
        assert!(matches!(
            engine_err(ctl.set_sub_action_done("missing", true).unwrap_err()),
            EngineError::UnknownSubAction { .. }
        ));

        ctl.complete_current_activity().unwrap();
        let result = &ctl.activity_results()[0];
        assert_eq!(result.completed_sub_actions, vec!["stretch-sub-0", "stretch-sub-2"]);
    }

    #[test]
    fn navigate_forward_and_back() {
        let (mut ctl, clock, _) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(20);

        let event = ctl.navigate_to_activity(2).unwrap();
        assert!(matches!(event, Event::ActivityNavigated { from_index: 0, to_index: 2, .. }));
        let active = ctl.active().unwrap();
        assert!(active.execution_state.completed_activities.contains("wake"));
        assert!(active.execution_state.completed_activities.contains("water"));
        assert_eq!(active.execution_state.time_spent_seconds, 20);
        assert_eq!(ctl.current_timer().unwrap().activity_id, "stretch");
        assert_eq!(ctl.store().timer_count(), 1);

        ctl.navigate_to_activity(0).unwrap();
        let active = ctl.active().unwrap();
        assert!(active.execution_state.completed_activities.is_empty());
        assert_eq!(ctl.current_timer().unwrap().activity_id, "wake");
    }

    #[test]
    fn navigate_validates_index() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        assert_eq!(
            engine_err(ctl.navigate_to_activity(3).unwrap_err()),
            EngineError::IndexOutOfRange { index: 3, total: 3 }
        );
        assert_eq!(
            engine_err(ctl.navigate_to_activity(0).unwrap_err()),
            EngineError::SameActivity { index: 0 }
        );
    }

    #[test]
    fn complete_records_outcome_and_empties_slot() {
        let (mut ctl, clock, persistence) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(30);
        ctl.advance(ActivityExecutionResult::completed("wake", 30)).unwrap();

        assert!(matches!(
            engine_err(ctl.complete("evening").unwrap_err()),
            EngineError::LoopMismatch { .. }
        ));

        let event = ctl.complete("morning").unwrap();
        assert!(matches!(
            event,
            Event::ExecutionCompleted { outcome: RunOutcome::Discarded, time_spent_seconds: 30, .. }
        ));
        assert_eq!(ctl.status(), ExecutionStatus::NotStarted);
        assert_eq!(ctl.store().timer_count(), 0);
        assert!(persistence.stored_execution().is_none());
        assert!(persistence.stored_timer().is_none());

        let runs = persistence.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].completed_count, 1);
        assert_eq!(runs[0].total_activities, 3);
    }

    #[test]
    fn start_rejects_different_loop_while_active() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        let evening = Loop::new("evening", "Evening")
            .with_activity(LoopActivityInstance::new("e", "read", 0));
        assert!(matches!(
            engine_err(ctl.start(&evening).unwrap_err()),
            EngineError::ExecutionConflict { .. }
        ));
        assert_eq!(ctl.active().unwrap().loop_id(), "morning");
    }

    #[test]
    fn start_rejects_invalid_loop() {
        let (mut ctl, _clock, _) = controller();
        let mut broken = morning();
        broken.activity_instances[2].order = 7;
        assert!(matches!(ctl.start(&broken), Err(CoreError::Validation(_))));
        assert_eq!(ctl.status(), ExecutionStatus::NotStarted);
    }

    #[test]
    fn empty_loop_is_immediately_completed() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&Loop::new("empty", "Empty")).unwrap();
        assert_eq!(ctl.status(), ExecutionStatus::Completed);
        let progress = ctl.progress().unwrap();
        assert!(progress.is_complete);
        assert_eq!(progress.progress, 0.0);
        assert!(ctl.current_timer().is_none());
        assert!(ctl.tick().unwrap().is_empty());
    }

    #[test]
    fn tick_announces_overtime_once() {
        let (mut ctl, clock, _) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(299);
        assert!(ctl.tick().unwrap().is_empty());
        clock.advance_secs(2);
        let events = ctl.tick().unwrap();
        assert!(matches!(
            events.as_slice(),
            [Event::TimerOvertime { overtime_seconds: 1, .. }]
        ));
        clock.advance_secs(5);
        assert!(ctl.tick().unwrap().is_empty());
        assert_eq!(ctl.current_reading().unwrap().mode, TimerMode::Overtime);
    }

    #[test]
    fn tick_auto_completes_when_asked() {
        let (mut ctl, clock, _) = controller();
        let definition = Loop::new("l", "L")
            .with_activity(
                LoopActivityInstance::new("plank", "exercise", 0)
                    .with_duration(1)
                    .with_auto_complete(true),
            )
            .with_activity(LoopActivityInstance::new("rest", "meditate", 0));
        ctl.start(&definition).unwrap();
        clock.advance_secs(61);
        let events = ctl.tick().unwrap();
        match &events[0] {
            Event::ActivityAdvanced { result, to_index, .. } => {
                assert!(result.completed);
                assert_eq!(result.time_spent_seconds, 61);
                assert_eq!(*to_index, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn auto_complete_respects_config_switch() {
        let clock = clock();
        let config = TimerConfig {
            auto_advance_on_timer_end: false,
            ..TimerConfig::default()
        };
        let mut ctl =
            ProgressionController::new(MemoryPersistence::new(), clock.clone()).with_config(config);
        let definition = Loop::new("l", "L").with_activity(
            LoopActivityInstance::new("plank", "exercise", 0)
                .with_duration(1)
                .with_auto_complete(true),
        );
        ctl.start(&definition).unwrap();
        clock.advance_secs(61);
        let events = ctl.tick().unwrap();
        assert!(matches!(events.as_slice(), [Event::TimerOvertime { .. }]));
        assert_eq!(ctl.progress().unwrap().current_index, 0);
    }

    #[test]
    fn checkpoint_failure_keeps_memory_state() {
        let (mut ctl, _clock, persistence) = controller();
        ctl.start(&morning()).unwrap();
        persistence.set_fail_saves(true);

        ctl.advance(ActivityExecutionResult::completed("wake", 10)).unwrap();
        assert!(ctl.checkpoint_pending());
        assert_eq!(ctl.progress().unwrap().current_index, 1);
        let stored = persistence.stored_execution().unwrap();
        assert!(stored.execution_state.completed_activities.is_empty());

        persistence.set_fail_saves(false);
        ctl.checkpoint().unwrap();
        assert!(!ctl.checkpoint_pending());
        let stored = persistence.stored_execution().unwrap();
        assert!(stored.execution_state.completed_activities.contains("wake"));
    }

    #[test]
    fn snapshot_reports_state() {
        let (mut ctl, clock, _) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(30);
        match ctl.snapshot() {
            Event::StateSnapshot {
                status,
                loop_id,
                total_activities,
                timer,
                ..
            } => {
                assert_eq!(status, ExecutionStatus::Running);
                assert_eq!(loop_id.as_deref(), Some("morning"));
                assert_eq!(total_activities, 3);
                assert_eq!(timer.unwrap().elapsed_seconds, 30);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn starting_the_active_loop_again_records_the_old_run() {
        let (mut ctl, clock, persistence) = controller();
        ctl.start(&morning()).unwrap();
        let first_run = ctl.active().unwrap().run_id.clone();
        clock.advance_secs(100);
        ctl.advance(ActivityExecutionResult::completed("wake", 100)).unwrap();
        clock.advance_secs(20);

        ctl.start(&morning()).unwrap();

        let runs = persistence.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, first_run);
        assert_eq!(runs[0].outcome, RunOutcome::Discarded);
        assert_eq!(runs[0].time_spent_seconds, 120);
        assert_ne!(ctl.active().unwrap().run_id, first_run);
        assert_eq!(ctl.progress().unwrap().current_index, 0);
        assert_eq!(ctl.current_timer().unwrap().activity_id, "wake");
    }

    #[test]
    fn complete_credits_time_on_the_current_activity() {
        let (mut ctl, clock, persistence) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(200);

        let event = ctl.complete("morning").unwrap();
        assert!(matches!(
            event,
            Event::ExecutionCompleted { time_spent_seconds: 200, .. }
        ));
        assert_eq!(persistence.runs()[0].time_spent_seconds, 200);
    }

    #[test]
    fn restore_replaces_timer_saved_for_another_activity() {
        let (mut ctl, clock, persistence) = controller();
        ctl.start(&morning()).unwrap();
        clock.advance_secs(100);
        ctl.advance(ActivityExecutionResult::completed("wake", 100)).unwrap();
        let stale = ActivityTimerState::started("wake", clock.now(), true);
        persistence.save_timer(Some(&stale)).unwrap();
        drop(ctl);

        clock.advance_secs(50);
        let mut ctl = ProgressionController::new(persistence.clone(), clock.clone());
        ctl.restore().unwrap();
        let timer = ctl.current_timer().unwrap();
        assert_eq!(timer.activity_id, "water");
        assert_eq!(timer.elapsed_seconds, 0);
        assert!(timer.is_running);
        assert_eq!(timer.start_time, clock.now());
    }

    #[test]
    fn finished_loop_rejects_activity_operations() {
        let (mut ctl, _clock, _) = controller();
        ctl.start(&morning()).unwrap();
        for _ in 0..3 {
            ctl.complete_current_activity().unwrap();
        }
        let finished = EngineError::LoopAlreadyFinished {
            loop_id: "morning".into(),
        };
        assert_eq!(engine_err(ctl.skip().unwrap_err()), finished);
        assert_eq!(engine_err(ctl.complete_current_activity().unwrap_err()), finished);
        assert_eq!(
            engine_err(ctl.set_sub_action_done("neck", true).unwrap_err()),
            finished
        );
        assert_eq!(ctl.status(), ExecutionStatus::Completed);
    }
}
