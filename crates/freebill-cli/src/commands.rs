use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Weekday};
use clap::Subcommand;
use freebill_core::{ClientId, ContractId, TemplateId};
use freebill_recurring::collaborators::{ClientRecord, ContractRecord};
use freebill_recurring::types::parse_minor_units;
use freebill_recurring::{Frequency, NewTemplate, RecurringInvoiceTask, RECURRING_TASK_NAME};
use freebill_scheduler::{ScheduledTask, Scheduler};
use tracing::{info, warn};

use crate::app::AppState;
use crate::output;

#[derive(Subcommand)]
pub enum RecurringAction {
    /// Create a recurring template
    Create {
        /// Client to bill
        #[arg(long)]
        client: String,

        /// Contract the invoices belong to
        #[arg(long)]
        contract: Option<String>,

        /// Amount per cycle, e.g. 1000.00
        #[arg(long)]
        amount: String,

        /// ISO currency code
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Line item description
        #[arg(long)]
        description: String,

        /// weekly, biweekly, monthly, quarterly or yearly
        #[arg(long, default_value = "monthly")]
        frequency: Frequency,

        /// Day anchor for monthly/quarterly/yearly (clamped to 28)
        #[arg(long, default_value_t = 1)]
        day_of_month: u32,

        /// Weekday anchor for weekly/biweekly
        #[arg(long, default_value = "mon")]
        day_of_week: Weekday,

        /// First generation date (YYYY-MM-DD); computed when omitted
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Render a PDF for each generated invoice
        #[arg(long)]
        auto_pdf: bool,

        /// Email each generated invoice
        #[arg(long)]
        auto_send: bool,

        /// Mail application used for auto-send
        #[arg(long)]
        email_app: Option<String>,
    },

    /// List templates
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Generate invoices for due templates
    Generate {
        /// Include every active template, due or not
        #[arg(long)]
        all: bool,

        /// Show what would be generated without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Pause a template
    Pause { id: String },

    /// Resume a paused template
    Resume { id: String },

    /// Delete a template (generated invoices are kept)
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum ClientAction {
    /// Add or update a client
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },

    /// Add or update a contract for a client
    Contract {
        #[arg(long)]
        id: String,
        #[arg(long)]
        client: String,
        #[arg(long)]
        name: String,
    },
}

pub async fn recurring(state: &AppState, action: RecurringAction) -> Result<()> {
    match action {
        RecurringAction::Create {
            client,
            contract,
            amount,
            currency,
            description,
            frequency,
            day_of_month,
            day_of_week,
            start,
            auto_pdf,
            auto_send,
            email_app,
        } => {
            let new = NewTemplate {
                client_id: ClientId::from(client),
                contract_id: contract.map(ContractId::from),
                amount_cents: parse_minor_units(&amount)?,
                currency,
                description,
                frequency,
                day_of_month,
                day_of_week,
                start: start
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc()),
                auto_pdf,
                auto_send,
                email_app,
            };
            let template = state.manager.create(new).await?;
            println!("Created recurring template {}", template.id);
            println!("  Next generation: {}", output::date(template.next_generation_date));
        }
        RecurringAction::List { json } => {
            let listing = state.manager.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing.templates)?);
            } else {
                output::print_templates(&listing.templates);
            }
            if listing.skipped > 0 {
                eprintln!("{} template(s) could not be read", listing.skipped);
            }
        }
        RecurringAction::Generate { all, dry_run } => {
            let report = state.pipeline.generate_due(all, dry_run).await?;
            output::print_report(&report);
        }
        RecurringAction::Pause { id } => {
            let template = state.manager.pause(&TemplateId::from(id))?;
            println!("Paused {}", template.id);
        }
        RecurringAction::Resume { id } => {
            let template = state.manager.resume(&TemplateId::from(id))?;
            println!(
                "Resumed {} (next generation {})",
                template.id,
                output::date(template.next_generation_date)
            );
        }
        RecurringAction::Delete { id } => {
            let id = TemplateId::from(id);
            state.manager.delete(&id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

pub fn client(state: &AppState, action: ClientAction) -> Result<()> {
    match action {
        ClientAction::Add { id, name, email } => {
            state.book.upsert_client(&ClientRecord {
                id: ClientId::from(id.clone()),
                name,
                email,
            })?;
            println!("Saved client {id}");
        }
        ClientAction::Contract { id, client, name } => {
            state.book.upsert_contract(&ContractRecord {
                id: ContractId::from(id.clone()),
                client_id: ClientId::from(client),
                name,
            })?;
            println!("Saved contract {id}");
        }
    }
    Ok(())
}

/// Register the recurring sweep, run until Ctrl-C, then stop and drain.
pub async fn serve(state: &AppState) -> Result<()> {
    let settings = &state.config.scheduler;
    let scheduler = Scheduler::new();
    scheduler.register(
        ScheduledTask::new(
            RECURRING_TASK_NAME,
            Duration::from_secs(settings.interval_secs),
            Arc::new(RecurringInvoiceTask::new(state.pipeline.clone())),
        )
        .enabled(settings.enabled),
    )?;
    if !settings.enabled {
        warn!("recurring generation disabled in config; serving without a sweep");
    }
    scheduler.start()?;
    info!(interval_secs = settings.interval_secs, "recurring scheduler running, Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested, waiting for in-flight sweep");
    scheduler.stop().await?;
    Ok(())
}
