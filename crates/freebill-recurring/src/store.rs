use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc, Weekday};
use freebill_core::TemplateId;
use rusqlite::{types::Type, Connection};
use tracing::{debug, info, instrument, warn};

use crate::db::{from_db_time, init_db, to_db_time};
use crate::error::{RecurringError, Result};
use crate::types::{Frequency, GenerationRecord, RecurringTemplate, SelectMode, TemplateListing};

/// Persistent store for recurring templates.
///
/// Updates are narrow on purpose: pausing, resuming and recording a cycle
/// each touch only their own columns, so concurrent writers never clobber
/// unrelated fields.
pub trait TemplateStore: Send + Sync {
    fn create(&self, template: &RecurringTemplate) -> Result<()>;

    fn get(&self, id: &TemplateId) -> Result<Option<RecurringTemplate>>;

    /// All templates, active and paused, ordered by next generation date.
    fn list(&self) -> Result<TemplateListing>;

    /// Active templates for `mode`, oldest next date first.
    fn select(&self, mode: SelectMode, now: DateTime<Utc>) -> Result<Vec<RecurringTemplate>>;

    /// Mark a template paused. Its next generation date is left untouched.
    fn pause(&self, id: &TemplateId, now: DateTime<Utc>) -> Result<()>;

    /// Reactivate a template with a freshly computed next generation date.
    fn resume(&self, id: &TemplateId, next: DateTime<Utc>, now: DateTime<Utc>) -> Result<()>;

    /// Record a successful cycle and bump `generated_count` by one.
    fn record_generation(&self, id: &TemplateId, record: &GenerationRecord) -> Result<()>;

    fn delete(&self, id: &TemplateId) -> Result<()>;
}

const COLUMNS: &str = "id, client_id, contract_id, amount_cents, currency, description,
     frequency, day_of_month, day_of_week, active, next_generation_date,
     last_generated_date, last_invoice_id, generated_count, auto_pdf, auto_send,
     email_app, created_at, updated_at";

/// SQLite-backed [`TemplateStore`].
///
/// Wraps a single connection in a `Mutex`; the lock is never held across an
/// `.await`, so the store is safe to share with async callers.
pub struct SqliteTemplateStore {
    db: Mutex<Connection>,
}

impl SqliteTemplateStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| RecurringError::Poisoned("template store"))
    }

    fn query_templates(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<(Vec<RecurringTemplate>, usize)> {
        let db = self.conn()?;
        let mut stmt = db.prepare(sql)?;
        let mut templates = Vec::new();
        let mut skipped = 0;
        for row in stmt.query_map(params, row_to_template)? {
            match row {
                Ok(t) => templates.push(t),
                Err(e) => {
                    warn!("skipping unreadable recurring template row: {e}");
                    skipped += 1;
                }
            }
        }
        Ok((templates, skipped))
    }
}

impl TemplateStore for SqliteTemplateStore {
    #[instrument(skip(self, template), fields(template_id = %template.id))]
    fn create(&self, template: &RecurringTemplate) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO recurring_templates
             (id, client_id, contract_id, amount_cents, currency, description,
              frequency, day_of_month, day_of_week, active, next_generation_date,
              last_generated_date, last_invoice_id, generated_count, auto_pdf, auto_send,
              email_app, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
            rusqlite::params![
                template.id.as_str(),
                template.client_id.as_str(),
                template.contract_id.as_ref().map(|c| c.as_str()),
                template.amount_cents,
                template.currency,
                template.description,
                template.frequency.to_string(),
                template.day_of_month,
                template.day_of_week.num_days_from_monday(),
                template.active,
                to_db_time(template.next_generation_date),
                template.last_generated_date.map(to_db_time),
                template.last_invoice_id.as_ref().map(|i| i.as_str()),
                template.generated_count,
                template.auto_pdf,
                template.auto_send,
                template.email_app,
                to_db_time(template.created_at),
                to_db_time(template.updated_at),
            ],
        )?;
        info!(client_id = %template.client_id, frequency = %template.frequency, "recurring template stored");
        Ok(())
    }

    #[instrument(skip(self), fields(template_id = %id))]
    fn get(&self, id: &TemplateId) -> Result<Option<RecurringTemplate>> {
        let db = self.conn()?;
        match db.query_row(
            &format!("SELECT {COLUMNS} FROM recurring_templates WHERE id = ?1"),
            [id.as_str()],
            row_to_template,
        ) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RecurringError::Database(e)),
        }
    }

    #[instrument(skip(self))]
    fn list(&self) -> Result<TemplateListing> {
        let (templates, skipped) = self.query_templates(
            &format!(
                "SELECT {COLUMNS} FROM recurring_templates
                 ORDER BY next_generation_date ASC, id ASC"
            ),
            [],
        )?;
        Ok(TemplateListing { templates, skipped })
    }

    #[instrument(skip(self))]
    fn select(&self, mode: SelectMode, now: DateTime<Utc>) -> Result<Vec<RecurringTemplate>> {
        let (templates, skipped) = match mode {
            SelectMode::OnlyDue => self.query_templates(
                &format!(
                    "SELECT {COLUMNS} FROM recurring_templates
                     WHERE active = 1 AND next_generation_date <= ?1
                     ORDER BY next_generation_date ASC, id ASC"
                ),
                [to_db_time(now)],
            )?,
            SelectMode::All => self.query_templates(
                &format!(
                    "SELECT {COLUMNS} FROM recurring_templates
                     WHERE active = 1
                     ORDER BY next_generation_date ASC, id ASC"
                ),
                [],
            )?,
        };
        if skipped > 0 {
            warn!(skipped, "unreadable templates left out of selection");
        }
        debug!(count = templates.len(), "templates selected");
        Ok(templates)
    }

    #[instrument(skip(self), fields(template_id = %id))]
    fn pause(&self, id: &TemplateId, now: DateTime<Utc>) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE recurring_templates SET active = 0, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id.as_str(), to_db_time(now)],
        )?;
        if n == 0 {
            return Err(RecurringError::TemplateNotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(template_id = %id))]
    fn resume(&self, id: &TemplateId, next: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE recurring_templates
             SET active = 1, next_generation_date = ?2, updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![id.as_str(), to_db_time(next), to_db_time(now)],
        )?;
        if n == 0 {
            return Err(RecurringError::TemplateNotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self, record), fields(template_id = %id, invoice_id = %record.invoice_id))]
    fn record_generation(&self, id: &TemplateId, record: &GenerationRecord) -> Result<()> {
        let db = self.conn()?;
        // A template paused mid-cycle keeps its frozen next date.
        let n = db.execute(
            "UPDATE recurring_templates
             SET last_generated_date  = ?2,
                 last_invoice_id      = ?3,
                 next_generation_date = CASE WHEN active = 1 THEN ?4 ELSE next_generation_date END,
                 generated_count      = generated_count + 1,
                 updated_at           = ?2
             WHERE id = ?1",
            rusqlite::params![
                id.as_str(),
                to_db_time(record.generated_at),
                record.invoice_id.as_str(),
                to_db_time(record.next_generation_date),
            ],
        )?;
        if n == 0 {
            return Err(RecurringError::TemplateNotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(template_id = %id))]
    fn delete(&self, id: &TemplateId) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM recurring_templates WHERE id = ?1", [id.as_str()])?;
        if n == 0 {
            return Err(RecurringError::TemplateNotFound { id: id.to_string() });
        }
        info!("recurring template deleted");
        Ok(())
    }
}

fn conversion_error(
    idx: usize,
    ty: Type,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn time_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    from_db_time(&s).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn opt_time_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => from_db_time(&s)
            .map(Some)
            .map_err(|e| conversion_error(idx, Type::Text, e)),
        None => Ok(None),
    }
}

/// Map a SQLite row (in `COLUMNS` order) to a `RecurringTemplate`.
fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecurringTemplate> {
    let frequency: String = row.get(6)?;
    let day_of_week = Weekday::try_from(row.get::<_, u8>(8)?)
        .map_err(|e| conversion_error(8, Type::Integer, e))?;

    Ok(RecurringTemplate {
        id: row.get::<_, String>(0)?.into(),
        client_id: row.get::<_, String>(1)?.into(),
        contract_id: row.get::<_, Option<String>>(2)?.map(Into::into),
        amount_cents: row.get(3)?,
        currency: row.get(4)?,
        description: row.get(5)?,
        frequency: Frequency::from_stored(&frequency),
        day_of_month: row.get(7)?,
        day_of_week,
        active: row.get(9)?,
        next_generation_date: time_col(row, 10)?,
        last_generated_date: opt_time_col(row, 11)?,
        last_invoice_id: row.get::<_, Option<String>>(12)?.map(Into::into),
        generated_count: row.get(13)?,
        auto_pdf: row.get(14)?,
        auto_send: row.get(15)?,
        email_app: row.get(16)?,
        created_at: time_col(row, 17)?,
        updated_at: time_col(row, 18)?,
    })
}
