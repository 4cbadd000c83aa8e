//! # Loopkeeper Core Library
//!
//! Execution engine for loops: ordered sequences of activities (stretch,
//! journal, review actions...) that a user walks through one by one.
//!
//! ## Architecture
//!
//! - **Controller**: a state machine over a single "now executing" slot.
//!   It owns no threads; the host calls `tick()` periodically while the
//!   execution view is visible
//! - **Timers**: wall-clock based, so time keeps counting across sleep,
//!   backgrounding and restarts
//! - **Storage**: SQLite-backed persistence of the active execution and run
//!   history, plus TOML configuration
//!
//! ## Key Components
//!
//! - [`ProgressionController`]: start, pause, advance, navigate, complete
//! - [`ExecutionStore`]: the active execution and per-activity timers
//! - [`resolve`]: interruption resolver for competing start requests
//! - [`Database`]: persistence adapter
//! - [`Config`]: application configuration management

pub mod catalog;
pub mod controller;
pub mod display;
pub mod error;
pub mod events;
pub mod interruption;
pub mod logging;
pub mod model;
pub mod navigation;
pub mod storage;
pub mod store;
pub mod timer;

pub use catalog::{ActivityCatalog, InMemoryCatalog};
pub use controller::{ConflictOutcome, ExecutionStatus, ProgressionController, StartOutcome};
pub use display::{resolve_display, ActivityDisplay};
pub use error::{
    ConfigError, CoreError, EngineError, NavigationError, PersistenceError, ValidationError,
};
pub use events::Event;
pub use interruption::{resolve, ConflictChoice, LoopSummary, Resolution};
pub use model::{
    ActiveExecution, ActivityExecutionResult, ActivityTemplate, ActivityTimerState,
    ExecutionProgress, Loop, LoopActivityInstance, LoopExecutionState, Quantity, RunOutcome,
    RunRecord, SubAction, TemplateKind,
};
pub use navigation::{
    get_navigation_target, NavigationMode, NavigationTarget, TargetDescriptor, TargetType,
};
pub use storage::{Config, Database, ExecutionPersistence, MemoryPersistence};
pub use store::{current_activity_progress, ExecutionStore};
pub use timer::{sync, Clock, ManualClock, SystemClock, TimerMode, TimerReading};
