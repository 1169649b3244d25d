use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task with the same name is already registered.
    #[error("Task already registered: {name}")]
    DuplicateTask { name: String },

    /// Tasks need a non-zero period.
    #[error("Invalid interval for task {name}: must be greater than zero")]
    InvalidInterval { name: String },

    /// `start` was called while workers are still running.
    #[error("Scheduler already started")]
    AlreadyStarted,

    /// `stop` was called on a scheduler that is not running.
    #[error("Scheduler not started")]
    NotStarted,

    /// A worker terminated by panicking instead of observing shutdown.
    #[error("Worker for task {name} panicked")]
    WorkerPanicked { name: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
