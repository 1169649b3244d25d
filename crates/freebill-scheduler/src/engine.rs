use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    types::{ScheduledTask, TaskContext, TaskHandler},
};

#[derive(Default)]
struct Registry {
    tasks: Vec<ScheduledTask>,
    workers: Vec<(String, JoinHandle<()>)>,
    running: bool,
}

/// Registry of named periodic tasks, each driven by its own Tokio worker.
///
/// Registration takes the single registry lock; workers receive their own
/// copy of the task at `start` and never touch the registry again.
pub struct Scheduler {
    registry: Mutex<Registry>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry: Mutex::new(Registry::default()),
            shutdown_tx,
        }
    }

    /// Register `handler` to run every `interval` under `name`.
    pub fn register_task(
        &self,
        name: &str,
        interval: Duration,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<()> {
        self.register(ScheduledTask::new(name, interval, handler))
    }

    /// Add a fully described task to the registry.
    ///
    /// Tasks added after `start` are kept but get no worker until the
    /// scheduler is stopped and started again.
    pub fn register(&self, task: ScheduledTask) -> Result<()> {
        if task.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval { name: task.name });
        }
        let mut registry = self.lock();
        if registry.tasks.iter().any(|t| t.name == task.name) {
            return Err(SchedulerError::DuplicateTask { name: task.name });
        }
        if registry.running {
            warn!(task = %task.name, "task registered after start; it will not run until restart");
        } else {
            info!(
                task = %task.name,
                interval_secs = task.interval.as_secs_f64(),
                enabled = task.enabled,
                "task registered"
            );
        }
        registry.tasks.push(task);
        Ok(())
    }

    /// Names of all registered tasks, in registration order.
    pub fn task_names(&self) -> Vec<String> {
        self.lock().tasks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Spawn one worker per enabled task. Must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut registry = self.lock();
        if registry.running {
            return Err(SchedulerError::AlreadyStarted);
        }
        // Reset the signal so a stopped scheduler can be started again.
        self.shutdown_tx.send_replace(false);

        let workers: Vec<(String, JoinHandle<()>)> = registry
            .tasks
            .iter()
            .filter(|t| {
                if !t.enabled {
                    debug!(task = %t.name, "task disabled; no worker spawned");
                }
                t.enabled
            })
            .map(|t| {
                let task = t.clone();
                let shutdown = self.shutdown_tx.subscribe();
                (task.name.clone(), tokio::spawn(run_worker(task, shutdown)))
            })
            .collect();

        info!(workers = workers.len(), "scheduler started");
        registry.workers = workers;
        registry.running = true;
        Ok(())
    }

    /// Signal every worker to exit and wait until all of them have.
    ///
    /// A handler already running is not interrupted; this returns once it
    /// finishes and its worker observes the signal.
    pub async fn stop(&self) -> Result<()> {
        let workers = {
            let mut registry = self.lock();
            if !registry.running {
                return Err(SchedulerError::NotStarted);
            }
            registry.running = false;
            std::mem::take(&mut registry.workers)
        };

        self.shutdown_tx.send_replace(true);
        info!(workers = workers.len(), "scheduler stopping");

        let mut panicked = None;
        for (name, handle) in workers {
            match handle.await {
                Ok(()) => debug!(task = %name, "worker exited"),
                Err(e) => {
                    error!(task = %name, "worker terminated abnormally: {e}");
                    panicked.get_or_insert(name);
                }
            }
        }

        info!("scheduler stopped");
        match panicked {
            Some(name) => Err(SchedulerError::WorkerPanicked { name }),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // The registry holds plain data; a panic elsewhere cannot leave it half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker loop: fire the handler every period until shutdown is signalled.
///
/// Missed ticks are replayed back to back (no skipping, no coalescing).
async fn run_worker(task: ScheduledTask, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval_at(Instant::now() + task.interval, task.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut tick: u64 = 0;

    debug!(task = %task.name, "worker started");
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                // A dropped sender means the scheduler itself is gone.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                tick += 1;
                let ctx = TaskContext::new(&task.name, tick);
                if let Err(e) = task.handler.run(ctx).await {
                    error!(task = %task.name, tick, "task handler failed: {e:#}");
                }
            }
        }
    }
    debug!(task = %task.name, ticks = tick, "worker observed shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::handler_fn;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn TaskHandler> {
        handler_fn(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_task("sweep", Duration::from_secs(1), counting_handler(counter.clone()))
            .unwrap();
        let err = scheduler
            .register_task("sweep", Duration::from_secs(5), counting_handler(counter))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask { .. }));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let scheduler = Scheduler::new();
        let err = scheduler
            .register_task("sweep", Duration::ZERO, counting_handler(Arc::new(AtomicUsize::new(0))))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_task("sweep", Duration::from_millis(100), counting_handler(counter.clone()))
            .unwrap();
        scheduler.start().unwrap();

        // Nothing fires before the first full period.
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(300)).await;
        assert!(counter.load(Ordering::SeqCst) >= 3);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn handler_errors_do_not_stop_the_worker() {
        let scheduler = Scheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        scheduler
            .register_task(
                "flaky",
                Duration::from_millis(10),
                handler_fn(move |_ctx| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Err(anyhow::anyhow!("collaborator unavailable"))
                    }
                }),
            )
            .unwrap();
        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(55)).await;
        scheduler.stop().await.unwrap();

        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_invocations_after_stop_returns() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_task("a", Duration::from_millis(10), counting_handler(counter.clone()))
            .unwrap();
        scheduler
            .register_task("b", Duration::from_millis(15), counting_handler(counter.clone()))
            .unwrap();
        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(100)).await;

        scheduler.stop().await.unwrap();
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_the_in_flight_handler_finish() {
        let scheduler = Scheduler::new();
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
        scheduler
            .register_task(
                "slow",
                Duration::from_millis(10),
                handler_fn(move |_ctx| {
                    let (s, f) = (Arc::clone(&s), Arc::clone(&f));
                    async move {
                        s.store(true, Ordering::SeqCst);
                        time::sleep(Duration::from_millis(500)).await;
                        f.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        scheduler.start().unwrap();

        // First tick at 10ms; the handler is now sleeping.
        time::sleep(Duration::from_millis(20)).await;
        assert!(started.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));

        scheduler.stop().await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn late_registrations_and_disabled_tasks_get_no_worker() {
        let scheduler = Scheduler::new();
        let disabled = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(
                ScheduledTask::new("off", Duration::from_millis(10), counting_handler(disabled.clone()))
                    .enabled(false),
            )
            .unwrap();
        scheduler.start().unwrap();
        scheduler
            .register_task("late", Duration::from_millis(10), counting_handler(late.clone()))
            .unwrap();

        time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await.unwrap();

        assert_eq!(disabled.load(Ordering::SeqCst), 0);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.task_names(), vec!["off".to_string(), "late".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_guard_their_state() {
        let scheduler = Scheduler::new();
        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotStarted)));
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(SchedulerError::AlreadyStarted)));
        scheduler.stop().await.unwrap();

        // A stopped scheduler can be started again, picking up late tasks.
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_task("later", Duration::from_millis(10), counting_handler(counter.clone()))
            .unwrap();
        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(35)).await;
        scheduler.stop().await.unwrap();
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
}
