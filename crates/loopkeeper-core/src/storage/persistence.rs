//! Persistence adapter contract.
//!
//! The engine treats storage as opaque durable key-value state: it saves the
//! whole active execution (or its absence) and loads it back on startup.

use std::sync::{Arc, Mutex};

use crate::error::PersistenceError;
use crate::model::{ActiveExecution, ActivityTimerState, RunRecord};

/// Durable load/save of the execution record.
pub trait ExecutionPersistence {
    /// Save the active execution; `None` clears it.
    fn save_active_execution(
        &self,
        execution: Option<&ActiveExecution>,
    ) -> Result<(), PersistenceError>;

    fn load_active_execution(&self) -> Result<Option<ActiveExecution>, PersistenceError>;

    /// Save the current activity's timer snapshot; `None` clears it.
    fn save_timer(&self, _timer: Option<&ActivityTimerState>) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn load_timer(&self) -> Result<Option<ActivityTimerState>, PersistenceError> {
        Ok(None)
    }

    /// Save the execution and its current timer as one checkpoint.
    ///
    /// Adapters that can write both atomically should override this.
    fn save_checkpoint(
        &self,
        execution: Option<&ActiveExecution>,
        timer: Option<&ActivityTimerState>,
    ) -> Result<(), PersistenceError> {
        self.save_active_execution(execution)?;
        self.save_timer(timer)
    }

    /// Append a finished or discarded run to history. Recording a run id
    /// that is already present does nothing.
    fn record_run(&self, _record: &RunRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}

impl<P: ExecutionPersistence + ?Sized> ExecutionPersistence for Arc<P> {
    fn save_active_execution(
        &self,
        execution: Option<&ActiveExecution>,
    ) -> Result<(), PersistenceError> {
        (**self).save_active_execution(execution)
    }

    fn load_active_execution(&self) -> Result<Option<ActiveExecution>, PersistenceError> {
        (**self).load_active_execution()
    }

    fn save_timer(&self, timer: Option<&ActivityTimerState>) -> Result<(), PersistenceError> {
        (**self).save_timer(timer)
    }

    fn load_timer(&self) -> Result<Option<ActivityTimerState>, PersistenceError> {
        (**self).load_timer()
    }

    fn save_checkpoint(
        &self,
        execution: Option<&ActiveExecution>,
        timer: Option<&ActivityTimerState>,
    ) -> Result<(), PersistenceError> {
        (**self).save_checkpoint(execution, timer)
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        (**self).record_run(record)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    execution: Option<ActiveExecution>,
    timer: Option<ActivityTimerState>,
    runs: Vec<RunRecord>,
    fail_saves: bool,
    save_count: usize,
}

/// In-memory adapter. Clones share state, which lets a test play "app
/// restart" by building a second controller on the same handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent save fail until switched off again.
    pub fn set_fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Number of successful saves (execution and timer).
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    pub fn stored_execution(&self) -> Option<ActiveExecution> {
        self.lock().execution.clone()
    }

    pub fn stored_timer(&self) -> Option<ActivityTimerState> {
        self.lock().timer.clone()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.clone()
    }
}

impl ExecutionPersistence for MemoryPersistence {
    fn save_active_execution(
        &self,
        execution: Option<&ActiveExecution>,
    ) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(PersistenceError::Unavailable("saves disabled".into()));
        }
        state.execution = execution.cloned();
        state.save_count += 1;
        Ok(())
    }

    fn load_active_execution(&self) -> Result<Option<ActiveExecution>, PersistenceError> {
        Ok(self.lock().execution.clone())
    }

    fn save_timer(&self, timer: Option<&ActivityTimerState>) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(PersistenceError::Unavailable("saves disabled".into()));
        }
        state.timer = timer.cloned();
        state.save_count += 1;
        Ok(())
    }

    fn load_timer(&self) -> Result<Option<ActivityTimerState>, PersistenceError> {
        Ok(self.lock().timer.clone())
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(PersistenceError::Unavailable("saves disabled".into()));
        }
        if state.runs.iter().all(|r| r.run_id != record.run_id) {
            state.runs.push(record.clone());
        }
        Ok(())
    }
}
