use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use freebill_core::{ClientId, ContractId, InvoiceId, TemplateId};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::collaborators::{
    ClientDirectory, ClientRecord, ContractRecord, InvoiceNumberAllocator, InvoiceService,
    LineItem, NewInvoice,
};
use crate::db::{init_invoicing_db, to_db_time};
use crate::error::{RecurringError, Result};

/// An invoice row as stored by [`SqliteInvoiceBook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSummary {
    pub id: InvoiceId,
    pub number: String,
    pub client_id: ClientId,
    pub template_id: Option<TemplateId>,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    pub line_items: usize,
}

/// SQLite implementation of the client directory, the invoice-number
/// allocator and the invoice service.
///
/// Numbers follow `<prefix>-<year>-<seq>` with a sequence per issue year.
pub struct SqliteInvoiceBook {
    db: Mutex<Connection>,
    prefix: String,
}

impl SqliteInvoiceBook {
    pub fn new(conn: Connection, prefix: impl Into<String>) -> Result<Self> {
        init_invoicing_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            prefix: prefix.into(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| RecurringError::Poisoned("invoice book"))
    }

    /// Insert or replace a client record.
    pub fn upsert_client(&self, client: &ClientRecord) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO clients (id, name, email) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email",
            rusqlite::params![client.id.as_str(), client.name, client.email],
        )?;
        Ok(())
    }

    /// Insert or replace a contract record.
    pub fn upsert_contract(&self, contract: &ContractRecord) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO contracts (id, client_id, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET client_id = excluded.client_id, name = excluded.name",
            rusqlite::params![contract.id.as_str(), contract.client_id.as_str(), contract.name],
        )?;
        Ok(())
    }

    /// Invoices produced by `template`, oldest number first.
    pub fn invoices_for_template(&self, template: &TemplateId) -> Result<Vec<InvoiceSummary>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT i.id, i.number, i.client_id, i.template_id, i.issued_on, i.due_on,
                    (SELECT COUNT(*) FROM invoice_line_items li WHERE li.invoice_id = i.id)
             FROM invoices i
             WHERE i.template_id = ?1
             ORDER BY i.number",
        )?;
        let rows = stmt.query_map([template.as_str()], |row| {
            Ok(InvoiceSummary {
                id: row.get::<_, String>(0)?.into(),
                number: row.get(1)?,
                client_id: row.get::<_, String>(2)?.into(),
                template_id: row.get::<_, Option<String>>(3)?.map(Into::into),
                issued_on: date_col(row, 4)?,
                due_on: date_col(row, 5)?,
                line_items: row.get::<_, i64>(6)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn date_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[async_trait]
impl ClientDirectory for SqliteInvoiceBook {
    async fn client(&self, id: &ClientId) -> Result<Option<ClientRecord>> {
        let db = self.conn()?;
        let client = db
            .query_row(
                "SELECT id, name, email FROM clients WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(ClientRecord {
                        id: row.get::<_, String>(0)?.into(),
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(client)
    }

    async fn contract(&self, id: &ContractId) -> Result<Option<ContractRecord>> {
        let db = self.conn()?;
        let contract = db
            .query_row(
                "SELECT id, client_id, name FROM contracts WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(ContractRecord {
                        id: row.get::<_, String>(0)?.into(),
                        client_id: row.get::<_, String>(1)?.into(),
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(contract)
    }
}

#[async_trait]
impl InvoiceNumberAllocator for SqliteInvoiceBook {
    #[instrument(skip(self))]
    async fn allocate(&self, issued_on: NaiveDate) -> Result<String> {
        let year = issued_on.year();
        let db = self.conn()?;
        // Single statement: the increment and the read cannot interleave.
        let seq: i64 = db.query_row(
            "INSERT INTO invoice_number_sequences (year, last_value) VALUES (?1, 1)
             ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
            [year],
            |row| row.get(0),
        )?;
        let number = format!("{}-{}-{:04}", self.prefix, year, seq);
        debug!(%number, "invoice number allocated");
        Ok(number)
    }
}

#[async_trait]
impl InvoiceService for SqliteInvoiceBook {
    #[instrument(skip(self, invoice), fields(number = %invoice.number))]
    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceId> {
        let id = InvoiceId::new();
        self.conn()?.execute(
            "INSERT INTO invoices
             (id, number, client_id, contract_id, template_id, currency, issued_on, due_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id.as_str(),
                invoice.number,
                invoice.client_id.as_str(),
                invoice.contract_id.as_ref().map(|c| c.as_str()),
                invoice.template_id.as_ref().map(|t| t.as_str()),
                invoice.currency,
                invoice.issued_on.to_string(),
                invoice.due_on.to_string(),
                to_db_time(Utc::now()),
            ],
        )?;
        Ok(id)
    }

    async fn add_line_item(&self, invoice: &InvoiceId, item: &LineItem) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "INSERT INTO invoice_line_items
             (id, invoice_id, position, description, quantity, unit_price_cents)
             SELECT ?1, ?2,
                    (SELECT COUNT(*) FROM invoice_line_items WHERE invoice_id = ?2) + 1,
                    ?3, ?4, ?5
             WHERE EXISTS (SELECT 1 FROM invoices WHERE id = ?2)",
            rusqlite::params![
                Uuid::now_v7().to_string(),
                invoice.as_str(),
                item.description,
                item.quantity,
                item.unit_price_cents,
            ],
        )?;
        if n == 0 {
            return Err(RecurringError::collaborator(
                "invoice service",
                format!("invoice not found: {invoice}"),
            ));
        }
        Ok(())
    }

    async fn link_recipient(&self, invoice: &InvoiceId, client: &ClientId) -> Result<()> {
        let db = self.conn()?;
        let exists: bool = db.query_row(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE id = ?1)",
            [invoice.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(RecurringError::collaborator(
                "invoice service",
                format!("invoice not found: {invoice}"),
            ));
        }
        let n = db.execute(
            "INSERT INTO invoice_recipients (invoice_id, client_id) VALUES (?1, ?2)
             ON CONFLICT(invoice_id, client_id) DO NOTHING",
            rusqlite::params![invoice.as_str(), client.as_str()],
        )?;
        if n == 0 {
            debug!(invoice_id = %invoice, client_id = %client, "recipient already linked");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> SqliteInvoiceBook {
        let book = SqliteInvoiceBook::new(Connection::open_in_memory().unwrap(), "INV").unwrap();
        book.upsert_client(&ClientRecord {
            id: ClientId::from("c1"),
            name: "Client One".to_string(),
            email: None,
        })
        .unwrap();
        book
    }

    async fn invoice(book: &SqliteInvoiceBook) -> InvoiceId {
        let issued_on = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        book.create_invoice(&NewInvoice {
            number: book.allocate(issued_on).await.unwrap(),
            client_id: ClientId::from("c1"),
            contract_id: None,
            template_id: None,
            currency: "USD".to_string(),
            issued_on,
            due_on: NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn link_recipient_rejects_unknown_invoice() {
        let book = book();
        let err = book
            .link_recipient(&InvoiceId::from("no-such-invoice"), &ClientId::from("c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecurringError::Collaborator { .. }));
    }

    #[tokio::test]
    async fn link_recipient_twice_is_accepted() {
        let book = book();
        let id = invoice(&book).await;
        book.link_recipient(&id, &ClientId::from("c1")).await.unwrap();
        book.link_recipient(&id, &ClientId::from("c1")).await.unwrap();
    }

    #[tokio::test]
    async fn add_line_item_rejects_unknown_invoice() {
        let book = book();
        let item = LineItem {
            description: "Retainer (monthly)".to_string(),
            quantity: 1,
            unit_price_cents: 100_00,
        };
        let err = book
            .add_line_item(&InvoiceId::from("no-such-invoice"), &item)
            .await
            .unwrap_err();
        assert!(matches!(err, RecurringError::Collaborator { .. }));
    }

    #[tokio::test]
    async fn numbers_restart_each_year() {
        let book = book();
        let dec = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let jan = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(book.allocate(dec).await.unwrap(), "INV-2023-0001");
        assert_eq!(book.allocate(dec).await.unwrap(), "INV-2023-0002");
        assert_eq!(book.allocate(jan).await.unwrap(), "INV-2024-0001");
    }
}
