use std::sync::Arc;

use async_trait::async_trait;
use freebill_scheduler::{TaskContext, TaskHandler};
use tracing::{info, warn};

use crate::pipeline::GenerationPipeline;

/// Name under which the recurring sweep is registered with the scheduler.
pub const RECURRING_TASK_NAME: &str = "recurring-invoices";

/// Scheduler handler that generates every due template on each tick.
///
/// Per-template failures are already logged by the pipeline; only a failed
/// selection is surfaced to the worker as an error.
pub struct RecurringInvoiceTask {
    pipeline: Arc<GenerationPipeline>,
}

impl RecurringInvoiceTask {
    pub fn new(pipeline: Arc<GenerationPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl TaskHandler for RecurringInvoiceTask {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()> {
        let report = self.pipeline.generate_due(false, false).await?;
        if !report.failures.is_empty() {
            warn!(
                task = %ctx.task,
                tick = ctx.tick,
                failed = report.failures.len(),
                "recurring sweep finished with failures"
            );
        }
        info!(
            task = %ctx.task,
            tick = ctx.tick,
            generated = report.generated_count(),
            "recurring sweep complete"
        );
        Ok(())
    }
}
