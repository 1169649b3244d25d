use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use freebill_core::InvoiceId;
use rusqlite::{types::Type, Connection};
use tracing::info;
use uuid::Uuid;

use crate::collaborators::{EmailService, PdfService};
use crate::db::{init_invoicing_db, to_db_time};
use crate::error::{RecurringError, Result};

/// Kind of side effect queued in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxKind {
    Pdf,
    Email,
}

/// A pending side-effect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: String,
    pub kind: OutboxKind,
    pub invoice_id: InvoiceId,
    /// Mail application for email requests.
    pub mail_app: Option<String>,
    pub requested_at: String,
}

/// Queues PDF renders and email dispatches for the renderer and mailer
/// processes, which drain the `pdf_requests` / `email_requests` tables.
pub struct SqliteOutbox {
    db: Mutex<Connection>,
}

impl SqliteOutbox {
    pub fn new(conn: Connection) -> Result<Self> {
        init_invoicing_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| RecurringError::Poisoned("outbox"))
    }

    /// Requests not yet picked up, PDFs first, each kind oldest first.
    pub fn pending(&self) -> Result<Vec<OutboxEntry>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, 'pdf', invoice_id, NULL, requested_at FROM pdf_requests
             WHERE status = 'pending'
             UNION ALL
             SELECT id, 'email', invoice_id, mail_app, requested_at FROM email_requests
             WHERE status = 'pending'
             ORDER BY 2 DESC, 5 ASC",
        )?;
        let rows = stmt.query_map([], decode_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn decode_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let kind = match row.get::<_, String>(1)?.as_str() {
        "pdf" => OutboxKind::Pdf,
        "email" => OutboxKind::Email,
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("unknown outbox kind: {other}").into(),
            ))
        }
    };
    Ok(OutboxEntry {
        id: row.get(0)?,
        kind,
        invoice_id: row.get::<_, String>(2)?.into(),
        mail_app: row.get(3)?,
        requested_at: row.get(4)?,
    })
}

#[async_trait]
impl PdfService for SqliteOutbox {
    async fn render(&self, invoice: &InvoiceId) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO pdf_requests (id, invoice_id, requested_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                Uuid::now_v7().to_string(),
                invoice.as_str(),
                to_db_time(Utc::now())
            ],
        )?;
        info!(invoice_id = %invoice, "pdf render queued");
        Ok(())
    }
}

#[async_trait]
impl EmailService for SqliteOutbox {
    async fn dispatch(&self, invoice: &InvoiceId, mail_app: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO email_requests (id, invoice_id, mail_app, requested_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                Uuid::now_v7().to_string(),
                invoice.as_str(),
                mail_app,
                to_db_time(Utc::now())
            ],
        )?;
        info!(invoice_id = %invoice, %mail_app, "email dispatch queued");
        Ok(())
    }
}
