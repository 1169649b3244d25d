use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Per-invocation execution context handed to a [`TaskHandler`].
///
/// A fresh value is built for every tick. It carries no cancellation signal:
/// once a handler has been called it runs to completion.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Name of the task this invocation belongs to.
    pub task: String,
    /// 1-based tick counter, local to the worker.
    pub tick: u64,
    /// Wall-clock instant the tick fired.
    pub fired_at: DateTime<Utc>,
}

impl TaskContext {
    pub fn new(task: &str, tick: u64) -> Self {
        Self {
            task: task.to_string(),
            tick,
            fired_at: Utc::now(),
        }
    }
}

/// Work executed by a scheduled task on every tick.
///
/// An `Err` is logged by the worker; the task simply waits for its next tick.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// In-memory descriptor of a periodic task. Never persisted.
#[derive(Clone)]
pub struct ScheduledTask {
    /// Unique within a process; used in logs.
    pub name: String,
    /// Fixed period between two invocations.
    pub interval: Duration,
    pub handler: Arc<dyn TaskHandler>,
    /// Disabled tasks stay registered but get no worker.
    pub enabled: bool,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, interval: Duration, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            name: name.into(),
            interval,
            handler,
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
