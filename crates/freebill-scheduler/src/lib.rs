//! `freebill-scheduler`: named periodic tasks on independent Tokio workers.
//!
//! # Overview
//!
//! Tasks are registered once at process start on a [`Scheduler`]. `start`
//! spawns one worker per enabled task; each worker fires its handler once per
//! interval and keeps going when the handler fails. `stop` broadcasts a
//! shutdown signal and waits until every worker has left its loop.
//!
//! # Lifecycle
//!
//! | Call       | Effect                                                     |
//! |------------|------------------------------------------------------------|
//! | `register` | Adds a task; ignored by workers already running            |
//! | `start`    | Spawns a worker per enabled task                           |
//! | `stop`     | Signals shutdown, joins every worker                       |
//!
//! Shutdown is observed only between invocations: a handler that is running
//! when `stop` is called finishes first, so `stop` latency includes it.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use types::{handler_fn, ScheduledTask, TaskContext, TaskHandler};
