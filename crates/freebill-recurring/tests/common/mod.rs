#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc, Weekday};
use freebill_core::{ClientId, TemplateId};
use freebill_recurring::collaborators::ClientRecord;
use freebill_recurring::{
    EmailHook, Frequency, GenerationPipeline, PdfHook, RecurringTemplate, SqliteInvoiceBook,
    SqliteOutbox, SqliteTemplateStore, TemplateManager, TemplateStore,
};
use rusqlite::Connection;

pub const CLIENT: &str = "client-acme";

/// Fresh in-memory stores wired the way the binary wires them.
pub struct Harness {
    pub store: Arc<SqliteTemplateStore>,
    pub book: Arc<SqliteInvoiceBook>,
    pub outbox: Arc<SqliteOutbox>,
    pub manager: TemplateManager,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(SqliteTemplateStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let book = Arc::new(SqliteInvoiceBook::new(Connection::open_in_memory().unwrap(), "INV").unwrap());
        let outbox = Arc::new(SqliteOutbox::new(Connection::open_in_memory().unwrap()).unwrap());
        book.upsert_client(&ClientRecord {
            id: ClientId::from(CLIENT),
            name: "Acme Corp".to_string(),
            email: Some("billing@acme.test".to_string()),
        })
        .unwrap();
        let manager = TemplateManager::new(store.clone(), book.clone());
        Self {
            store,
            book,
            outbox,
            manager,
        }
    }

    /// Pipeline with the outbox-backed PDF and email hooks.
    pub fn pipeline(&self) -> GenerationPipeline {
        GenerationPipeline::new(self.store.clone(), self.book.clone(), self.book.clone(), self.book.clone())
            .with_hook(Arc::new(PdfHook::new(self.outbox.clone())))
            .with_hook(Arc::new(EmailHook::new(self.outbox.clone(), "default")))
    }

    /// Store a template directly, bypassing validation.
    pub fn insert(&self, template: &RecurringTemplate) {
        self.store.create(template).unwrap();
    }

    pub fn reload(&self, id: &TemplateId) -> RecurringTemplate {
        self.store.get(id).unwrap().expect("template exists")
    }
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
}

/// Active monthly template for `CLIENT` due at `next`.
pub fn monthly(next: DateTime<Utc>, day_of_month: u32, amount_cents: i64) -> RecurringTemplate {
    RecurringTemplate {
        id: TemplateId::new(),
        client_id: ClientId::from(CLIENT),
        contract_id: None,
        amount_cents,
        currency: "USD".to_string(),
        description: "Retainer".to_string(),
        frequency: Frequency::Monthly,
        day_of_month,
        day_of_week: Weekday::Mon,
        active: true,
        next_generation_date: next,
        last_generated_date: None,
        last_invoice_id: None,
        generated_count: 0,
        auto_pdf: false,
        auto_send: false,
        email_app: None,
        created_at: at(2024, 1, 1),
        updated_at: at(2024, 1, 1),
    }
}

impl Harness {
    pub fn store_select(&self, mode: freebill_recurring::SelectMode, now: DateTime<Utc>) -> Vec<TemplateId> {
        freebill_recurring::selector::select_due(self.store.as_ref(), mode, now)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect()
    }
}
