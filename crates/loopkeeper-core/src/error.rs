//! Core error types for loopkeeper-core.
//!
//! One top-level [`CoreError`] with a focused enum per concern, all built
//! with thiserror. Engine errors leave in-memory state untouched.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for loopkeeper-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Execution state machine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Loop definition validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Navigation target errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),
}

/// Errors raised by the progression controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An operation needed an active execution but the slot is empty
    #[error("No active loop execution")]
    NoActiveExecution,

    /// `advance` was called for an activity that is not the current one
    #[error("State mismatch: expected current activity '{expected}', got '{actual}'")]
    StateMismatch { expected: String, actual: String },

    /// `advance` was called after every activity was already done
    #[error("Loop '{loop_id}' has no current activity; all activities are done")]
    LoopAlreadyFinished { loop_id: String },

    /// The active execution belongs to another loop
    #[error("Active execution belongs to loop '{active}', not '{requested}'")]
    LoopMismatch { active: String, requested: String },

    /// Navigation index outside `0..total`
    #[error("Activity index {index} out of range (total: {total})")]
    IndexOutOfRange { index: usize, total: usize },

    /// Navigation to the activity that is already current
    #[error("Activity {index} is already the current activity")]
    SameActivity { index: usize },

    /// Result flags are contradictory
    #[error("Invalid activity result for '{activity_id}': {message}")]
    InvalidResult { activity_id: String, message: String },

    /// `start` was called while a different loop holds the active slot
    #[error(
        "Loop '{active}' is already executing; resolve the conflict before starting '{requested}'"
    )]
    ExecutionConflict { active: String, requested: String },

    /// Sub-action id is not part of the current activity
    #[error("Activity '{activity_id}' has no sub-action '{sub_action_id}'")]
    UnknownSubAction {
        activity_id: String,
        sub_action_id: String,
    },
}

/// Persistence adapter errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open the backing database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Record could not be encoded
    #[error("Failed to encode record: {0}")]
    Encode(String),

    /// Stored record could not be decoded
    #[error("Failed to decode stored record '{key}': {message}")]
    Decode { key: String, message: String },

    /// Backend is unavailable (used by test adapters as well)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Loop definition validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An instance id is blank
    #[error("Activity instance at position {position} has an empty id")]
    EmptyInstanceId { position: usize },

    /// The same instance id appears twice
    #[error("Duplicate activity instance id '{0}'")]
    DuplicateInstanceId(String),

    /// `order` values are not a dense 0-based permutation
    #[error("Activity order is not dense: expected {expected}, found {found}")]
    NonDenseOrder { expected: usize, found: usize },

    /// Loop id is blank
    #[error("Loop id must not be empty")]
    EmptyLoopId,
}

/// Navigation target parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// Target type is not one of note/action/spark/path/saga
    #[error("Unknown navigation target type '{0}'")]
    UnknownTargetType(String),

    /// Target mode is not one of create/review/view/select
    #[error("Unknown navigation mode '{0}'")]
    UnknownMode(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked
                    || err.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    PersistenceError::Locked
                } else {
                    PersistenceError::QueryFailed(err.to_string())
                }
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
