use std::sync::Arc;

use chrono::{DateTime, Utc};
use freebill_core::TemplateId;
use tracing::{debug, info, instrument};

use crate::collaborators::ClientDirectory;
use crate::error::{RecurringError, Result};
use crate::frequency::{clamp_day_of_month, next_date};
use crate::store::TemplateStore;
use crate::types::{NewTemplate, RecurringTemplate, TemplateListing};

/// Operator-facing template operations: create, list, pause, resume, delete.
///
/// Pausing freezes the next generation date. Resuming recomputes it from the
/// resume instant, so cycles missed while paused are dropped rather than
/// generated in a burst.
pub struct TemplateManager {
    store: Arc<dyn TemplateStore>,
    clients: Arc<dyn ClientDirectory>,
}

impl TemplateManager {
    pub fn new(store: Arc<dyn TemplateStore>, clients: Arc<dyn ClientDirectory>) -> Self {
        Self { store, clients }
    }

    pub async fn create(&self, new: NewTemplate) -> Result<RecurringTemplate> {
        self.create_at(new, Utc::now()).await
    }

    /// Validate and persist a new, active template.
    #[instrument(skip(self, new), fields(client_id = %new.client_id))]
    pub async fn create_at(&self, new: NewTemplate, now: DateTime<Utc>) -> Result<RecurringTemplate> {
        if new.amount_cents <= 0 {
            return Err(RecurringError::InvalidTemplate(
                "amount must be greater than zero".to_string(),
            ));
        }
        let currency = new.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(RecurringError::InvalidTemplate(format!(
                "currency must be a 3-letter code, got {:?}",
                new.currency
            )));
        }
        let description = new.description.trim().to_string();
        if description.is_empty() {
            return Err(RecurringError::InvalidTemplate(
                "description must not be empty".to_string(),
            ));
        }

        if self.clients.client(&new.client_id).await?.is_none() {
            return Err(RecurringError::ClientNotFound {
                id: new.client_id.to_string(),
            });
        }
        if let Some(ref contract_id) = new.contract_id {
            match self.clients.contract(contract_id).await? {
                Some(c) if c.client_id == new.client_id => {}
                Some(_) => {
                    return Err(RecurringError::InvalidTemplate(format!(
                        "contract {contract_id} belongs to another client"
                    )))
                }
                None => {
                    return Err(RecurringError::InvalidTemplate(format!(
                        "contract not found: {contract_id}"
                    )))
                }
            }
        }

        let day_of_month = clamp_day_of_month(new.day_of_month);
        if day_of_month != new.day_of_month {
            debug!(requested = new.day_of_month, day_of_month, "day-of-month anchor clamped");
        }
        let next_generation_date = new
            .start
            .unwrap_or_else(|| next_date(new.frequency, day_of_month, new.day_of_week, now));

        let template = RecurringTemplate {
            id: TemplateId::new(),
            client_id: new.client_id,
            contract_id: new.contract_id,
            amount_cents: new.amount_cents,
            currency,
            description,
            frequency: new.frequency,
            day_of_month,
            day_of_week: new.day_of_week,
            active: true,
            next_generation_date,
            last_generated_date: None,
            last_invoice_id: None,
            generated_count: 0,
            auto_pdf: new.auto_pdf,
            auto_send: new.auto_send,
            email_app: new.email_app.filter(|a| !a.trim().is_empty()),
            created_at: now,
            updated_at: now,
        };
        self.store.create(&template)?;
        info!(template_id = %template.id, next = %template.next_generation_date, "recurring template created");
        Ok(template)
    }

    pub fn list(&self) -> Result<TemplateListing> {
        self.store.list()
    }

    pub fn get(&self, id: &TemplateId) -> Result<RecurringTemplate> {
        self.store
            .get(id)?
            .ok_or_else(|| RecurringError::TemplateNotFound { id: id.to_string() })
    }

    pub fn pause(&self, id: &TemplateId) -> Result<RecurringTemplate> {
        self.pause_at(id, Utc::now())
    }

    /// Active -> Paused. Only the `active` flag changes.
    pub fn pause_at(&self, id: &TemplateId, now: DateTime<Utc>) -> Result<RecurringTemplate> {
        let template = self.get(id)?;
        if !template.active {
            debug!(template_id = %id, "template already paused");
            return Ok(template);
        }
        self.store.pause(id, now)?;
        info!(template_id = %id, "recurring template paused");
        self.get(id)
    }

    pub fn resume(&self, id: &TemplateId) -> Result<RecurringTemplate> {
        self.resume_at(id, Utc::now())
    }

    /// Paused -> Active, with the next date recomputed from `now`.
    pub fn resume_at(&self, id: &TemplateId, now: DateTime<Utc>) -> Result<RecurringTemplate> {
        let template = self.get(id)?;
        if template.active {
            debug!(template_id = %id, "template already active");
            return Ok(template);
        }
        let next = template.next_date_after(now);
        self.store.resume(id, next, now)?;
        info!(template_id = %id, next = %next, "recurring template resumed");
        self.get(id)
    }

    /// Remove a template. Invoices it already produced are kept.
    pub fn delete(&self, id: &TemplateId) -> Result<()> {
        self.store.delete(id)
    }
}
