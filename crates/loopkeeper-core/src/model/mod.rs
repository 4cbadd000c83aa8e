//! Domain types shared by the engine: templates, loops and execution records.

mod activity;
mod execution;
mod loop_def;

pub use activity::{ActivityTemplate, LoopActivityInstance, Quantity, SubAction, TemplateKind};
pub use execution::{
    ActiveExecution, ActivityExecutionResult, ActivityTimerState, ExecutionProgress,
    LoopExecutionState, RunOutcome, RunRecord,
};
pub use loop_def::Loop;
