//! Interfaces to the invoicing subsystem the pipeline drives but does not own.

use async_trait::async_trait;
use chrono::NaiveDate;
use freebill_core::{ClientId, ContractId, InvoiceId, TemplateId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    pub client_id: ClientId,
    pub name: String,
}

/// Invoice header as requested by a generation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub number: String,
    pub client_id: ClientId,
    pub contract_id: Option<ContractId>,
    /// Template that produced the invoice, for traceability.
    pub template_id: Option<TemplateId>,
    pub currency: String,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// What the pipeline knows about an invoice once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub id: InvoiceId,
    pub number: String,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
}

/// Read access to clients and contracts.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn client(&self, id: &ClientId) -> Result<Option<ClientRecord>>;

    async fn contract(&self, id: &ContractId) -> Result<Option<ContractRecord>>;
}

/// Hands out unique invoice numbers.
#[async_trait]
pub trait InvoiceNumberAllocator: Send + Sync {
    /// Allocate the next number for an invoice issued on `issued_on`.
    async fn allocate(&self, issued_on: NaiveDate) -> Result<String>;
}

/// Creates invoices, their line items and recipients.
#[async_trait]
pub trait InvoiceService: Send + Sync {
    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceId>;

    async fn add_line_item(&self, invoice: &InvoiceId, item: &LineItem) -> Result<()>;

    async fn link_recipient(&self, invoice: &InvoiceId, client: &ClientId) -> Result<()>;
}

#[async_trait]
pub trait PdfService: Send + Sync {
    /// Request a PDF rendering of `invoice`.
    async fn render(&self, invoice: &InvoiceId) -> Result<()>;
}

#[async_trait]
pub trait EmailService: Send + Sync {
    /// Request dispatch of `invoice` through the mail application `mail_app`.
    async fn dispatch(&self, invoice: &InvoiceId, mail_app: &str) -> Result<()>;
}
