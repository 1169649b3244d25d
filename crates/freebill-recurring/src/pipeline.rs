use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use freebill_core::{ClientId, InvoiceId, TemplateId};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::collaborators::{
    ClientDirectory, CreatedInvoice, InvoiceNumberAllocator, InvoiceService, LineItem, NewInvoice,
};
use crate::error::{GenerationStage, RecurringError, Result, TemplateFailure};
use crate::frequency::last_day_of_month;
use crate::hooks::PostCreateHook;
use crate::selector::select_due;
use crate::store::TemplateStore;
use crate::types::{Frequency, GenerationRecord, RecurringTemplate, SelectMode};

/// A post-creation side effect that failed. The invoice stands.
#[derive(Debug, Clone, Serialize)]
pub struct SideEffectWarning {
    pub hook: &'static str,
    pub message: String,
}

/// One completed generation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedEntry {
    pub template_id: TemplateId,
    pub client_id: ClientId,
    pub invoice: CreatedInvoice,
    pub next_generation_date: DateTime<Utc>,
    pub warnings: Vec<SideEffectWarning>,
}

/// What a dry run would have generated for one template.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewEntry {
    pub template_id: TemplateId,
    pub client_id: ClientId,
    pub amount_cents: i64,
    pub currency: String,
    pub frequency: Frequency,
    pub next_generation_date: DateTime<Utc>,
    pub projected_next_date: DateTime<Utc>,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
}

/// Outcome of one `generate_due` run.
#[derive(Debug)]
pub struct GenerationReport {
    pub mode: SelectMode,
    pub dry_run: bool,
    pub generated: Vec<GeneratedEntry>,
    pub previews: Vec<PreviewEntry>,
    pub failures: Vec<TemplateFailure>,
}

impl GenerationReport {
    fn new(mode: SelectMode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            generated: Vec::new(),
            previews: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }

    pub fn warning_count(&self) -> usize {
        self.generated.iter().map(|g| g.warnings.len()).sum()
    }

    /// `(generated count, per-template errors)`.
    pub fn into_counts(self) -> (usize, Vec<TemplateFailure>) {
        (self.generated.len(), self.failures)
    }
}

/// Invoice dates for a cycle run at `now`: issued on the last day of the
/// current month, due one calendar month later (clamped to month end).
///
/// Independent of the template's own schedule.
pub fn invoice_dates(now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let issued = last_day_of_month(now.date_naive());
    let due = issued.checked_add_months(Months::new(1)).unwrap_or(issued);
    (issued, due)
}

/// Turns due templates into invoices.
///
/// Templates are processed one at a time in ascending next-date order, so a
/// failure never changes the numbers or dates assigned to later templates.
///
/// No per-template lock is taken. Two runs that overlap (a scheduled tick
/// and a manual `generate`) can both select the same due template and
/// produce two invoices for one cycle.
pub struct GenerationPipeline {
    store: Arc<dyn TemplateStore>,
    clients: Arc<dyn ClientDirectory>,
    numbers: Arc<dyn InvoiceNumberAllocator>,
    invoices: Arc<dyn InvoiceService>,
    hooks: Vec<Arc<dyn PostCreateHook>>,
}

impl GenerationPipeline {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        clients: Arc<dyn ClientDirectory>,
        numbers: Arc<dyn InvoiceNumberAllocator>,
        invoices: Arc<dyn InvoiceService>,
    ) -> Self {
        Self {
            store,
            clients,
            numbers,
            invoices,
            hooks: Vec::new(),
        }
    }

    /// Append a post-creation hook. Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Arc<dyn PostCreateHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Generate invoices for due templates (or every active one with `all`).
    ///
    /// A dry run only selects and reports: no invoices, no side effects and
    /// no template writes.
    pub async fn generate_due(&self, all: bool, dry_run: bool) -> Result<GenerationReport> {
        self.generate_due_at(Utc::now(), SelectMode::from_all_flag(all), dry_run)
            .await
    }

    /// [`generate_due`](Self::generate_due) with an explicit clock.
    ///
    /// Only a selection failure is returned as `Err`; per-template failures
    /// are collected in the report.
    pub async fn generate_due_at(
        &self,
        now: DateTime<Utc>,
        mode: SelectMode,
        dry_run: bool,
    ) -> Result<GenerationReport> {
        let templates = select_due(self.store.as_ref(), mode, now)?;
        info!(count = templates.len(), ?mode, dry_run, "recurring generation run");

        let mut report = GenerationReport::new(mode, dry_run);
        if dry_run {
            report.previews = templates.iter().map(|t| preview(t, now)).collect();
            return Ok(report);
        }

        for template in &templates {
            match self.generate_one(template, now).await {
                Ok(entry) => report.generated.push(entry),
                Err(failure) => {
                    error!(
                        template_id = %failure.template_id,
                        stage = %failure.stage,
                        "recurring generation failed: {}",
                        failure.error
                    );
                    report.failures.push(failure);
                }
            }
        }

        info!(
            generated = report.generated.len(),
            failed = report.failures.len(),
            warnings = report.warning_count(),
            "recurring generation finished"
        );
        Ok(report)
    }

    async fn generate_one(
        &self,
        template: &RecurringTemplate,
        now: DateTime<Utc>,
    ) -> std::result::Result<GeneratedEntry, TemplateFailure> {
        let client = self
            .clients
            .client(&template.client_id)
            .await
            .map_err(failure(template, GenerationStage::Client, None))?
            .ok_or_else(|| {
                failure(template, GenerationStage::Client, None)(RecurringError::ClientNotFound {
                    id: template.client_id.to_string(),
                })
            })?;

        let (issued_on, due_on) = invoice_dates(now);
        let number = self
            .numbers
            .allocate(issued_on)
            .await
            .map_err(failure(template, GenerationStage::Numbering, None))?;

        let invoice_id = self
            .invoices
            .create_invoice(&NewInvoice {
                number: number.clone(),
                client_id: client.id.clone(),
                contract_id: template.contract_id.clone(),
                template_id: Some(template.id.clone()),
                currency: template.currency.clone(),
                issued_on,
                due_on,
            })
            .await
            .map_err(failure(template, GenerationStage::Invoice, None))?;

        let item = LineItem {
            description: format!("{} ({})", template.description, template.frequency),
            quantity: 1,
            unit_price_cents: template.amount_cents,
        };
        self.invoices
            .add_line_item(&invoice_id, &item)
            .await
            .map_err(failure(template, GenerationStage::LineItem, Some(&invoice_id)))?;
        self.invoices
            .link_recipient(&invoice_id, &client.id)
            .await
            .map_err(failure(template, GenerationStage::Recipient, Some(&invoice_id)))?;

        let invoice = CreatedInvoice {
            id: invoice_id,
            number,
            issued_on,
            due_on,
        };

        let mut warnings = Vec::new();
        for hook in self.hooks.iter().filter(|h| h.applies(template)) {
            if let Err(e) = hook.run(template, &invoice).await {
                warn!(
                    template_id = %template.id,
                    invoice_id = %invoice.id,
                    hook = hook.name(),
                    "post-create side effect failed: {e}"
                );
                warnings.push(SideEffectWarning {
                    hook: hook.name(),
                    message: e.to_string(),
                });
            }
        }

        let next = template.next_date_after(now);
        self.store
            .record_generation(
                &template.id,
                &GenerationRecord {
                    generated_at: now,
                    invoice_id: invoice.id.clone(),
                    next_generation_date: next,
                },
            )
            .map_err(failure(template, GenerationStage::Schedule, Some(&invoice.id)))?;

        info!(
            template_id = %template.id,
            invoice_id = %invoice.id,
            number = %invoice.number,
            next = %next,
            "recurring invoice generated"
        );

        Ok(GeneratedEntry {
            template_id: template.id.clone(),
            client_id: client.id,
            invoice,
            next_generation_date: next,
            warnings,
        })
    }
}

fn failure<'a>(
    template: &'a RecurringTemplate,
    stage: GenerationStage,
    invoice_id: Option<&'a InvoiceId>,
) -> impl FnOnce(RecurringError) -> TemplateFailure + 'a {
    move |error| TemplateFailure {
        template_id: template.id.clone(),
        stage,
        invoice_id: invoice_id.cloned(),
        error,
    }
}

fn preview(template: &RecurringTemplate, now: DateTime<Utc>) -> PreviewEntry {
    let (issued_on, due_on) = invoice_dates(now);
    PreviewEntry {
        template_id: template.id.clone(),
        client_id: template.client_id.clone(),
        amount_cents: template.amount_cents,
        currency: template.currency.clone(),
        frequency: template.frequency,
        next_generation_date: template.next_generation_date,
        projected_next_date: template.next_date_after(now),
        issued_on,
        due_on,
    }
}
