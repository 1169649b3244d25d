use std::sync::Arc;

use async_trait::async_trait;

use crate::collaborators::{CreatedInvoice, EmailService, PdfService};
use crate::error::Result;
use crate::types::RecurringTemplate;

/// Optional side effect run after an invoice has been created.
///
/// Hooks are best-effort: a failure is reported as a warning and never
/// undoes the invoice.
#[async_trait]
pub trait PostCreateHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this hook runs for `template`.
    fn applies(&self, template: &RecurringTemplate) -> bool;

    async fn run(&self, template: &RecurringTemplate, invoice: &CreatedInvoice) -> Result<()>;
}

/// Renders a PDF for templates with `auto_pdf`.
pub struct PdfHook {
    pdf: Arc<dyn PdfService>,
}

impl PdfHook {
    pub fn new(pdf: Arc<dyn PdfService>) -> Self {
        Self { pdf }
    }
}

#[async_trait]
impl PostCreateHook for PdfHook {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn applies(&self, template: &RecurringTemplate) -> bool {
        template.auto_pdf
    }

    async fn run(&self, _template: &RecurringTemplate, invoice: &CreatedInvoice) -> Result<()> {
        self.pdf.render(&invoice.id).await
    }
}

/// Emails the invoice for templates with `auto_send`.
pub struct EmailHook {
    email: Arc<dyn EmailService>,
    /// Used when the template does not name a mail application.
    default_app: String,
}

impl EmailHook {
    pub fn new(email: Arc<dyn EmailService>, default_app: impl Into<String>) -> Self {
        Self {
            email,
            default_app: default_app.into(),
        }
    }
}

#[async_trait]
impl PostCreateHook for EmailHook {
    fn name(&self) -> &'static str {
        "email"
    }

    fn applies(&self, template: &RecurringTemplate) -> bool {
        template.auto_send
    }

    async fn run(&self, template: &RecurringTemplate, invoice: &CreatedInvoice) -> Result<()> {
        let app = template
            .email_app
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.default_app);
        self.email.dispatch(&invoice.id, app).await
    }
}
