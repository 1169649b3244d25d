use freebill_core::{InvoiceId, TemplateId};
use thiserror::Error;

/// Errors raised by the recurring-invoice subsystem.
#[derive(Debug, Error)]
pub enum RecurringError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No template with the given id exists.
    #[error("recurring template not found: {id}")]
    TemplateNotFound { id: String },

    /// The referenced client is unknown to the client directory.
    #[error("client not found: {id}")]
    ClientNotFound { id: String },

    /// The template definition violates a field constraint.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// An external collaborator (numbering, invoicing, PDF, email) failed.
    #[error("{service} failed: {reason}")]
    Collaborator {
        service: &'static str,
        reason: String,
    },

    /// A shared connection mutex was poisoned by a panicking thread.
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

impl RecurringError {
    pub fn collaborator(service: &'static str, reason: impl Into<String>) -> Self {
        RecurringError::Collaborator {
            service,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecurringError>;

/// Step of a generation cycle at which a template failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Client,
    Numbering,
    Invoice,
    LineItem,
    Recipient,
    Schedule,
}

impl std::fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GenerationStage::Client => "client lookup",
            GenerationStage::Numbering => "invoice numbering",
            GenerationStage::Invoice => "invoice creation",
            GenerationStage::LineItem => "line item",
            GenerationStage::Recipient => "recipient link",
            GenerationStage::Schedule => "schedule update",
        };
        f.write_str(s)
    }
}

/// A generation cycle that ended without advancing the template.
///
/// Isolated to one template; the rest of the batch still runs.
#[derive(Debug, Error)]
#[error("template {template_id}: {stage} failed: {error}")]
pub struct TemplateFailure {
    pub template_id: TemplateId,
    pub stage: GenerationStage,
    /// Set when an invoice already exists for this cycle (late-stage failures).
    pub invoice_id: Option<InvoiceId>,
    #[source]
    pub error: RecurringError,
}
