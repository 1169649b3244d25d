use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the recurring-template table and its due-query index.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS recurring_templates (
            id                    TEXT    NOT NULL PRIMARY KEY,
            client_id             TEXT    NOT NULL,
            contract_id           TEXT,
            amount_cents          INTEGER NOT NULL,
            currency              TEXT    NOT NULL,
            description           TEXT    NOT NULL,
            frequency             TEXT    NOT NULL,   -- weekly | biweekly | monthly | quarterly | yearly
            day_of_month          INTEGER NOT NULL,   -- 1..=28
            day_of_week           INTEGER NOT NULL,   -- 0 = Monday … 6 = Sunday
            active                INTEGER NOT NULL DEFAULT 1,
            next_generation_date  TEXT    NOT NULL,   -- RFC 3339, UTC, second precision
            last_generated_date   TEXT,
            last_invoice_id       TEXT,
            generated_count       INTEGER NOT NULL DEFAULT 0,
            auto_pdf              INTEGER NOT NULL DEFAULT 0,
            auto_send             INTEGER NOT NULL DEFAULT 0,
            email_app             TEXT,
            created_at            TEXT    NOT NULL,
            updated_at            TEXT    NOT NULL
        );

        -- Due selection: WHERE active = 1 AND next_generation_date <= ? ORDER BY next_generation_date
        CREATE INDEX IF NOT EXISTS idx_recurring_due
            ON recurring_templates (active, next_generation_date);
        ",
    )?;
    Ok(())
}

/// Initialise the invoicing tables the shipped collaborators write to:
/// client directory, numbering sequence, invoices and the side-effect outbox.
pub fn init_invoicing_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clients (
            id     TEXT NOT NULL PRIMARY KEY,
            name   TEXT NOT NULL,
            email  TEXT
        );

        CREATE TABLE IF NOT EXISTS contracts (
            id         TEXT NOT NULL PRIMARY KEY,
            client_id  TEXT NOT NULL,
            name       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invoice_number_sequences (
            year        INTEGER NOT NULL PRIMARY KEY,
            last_value  INTEGER NOT NULL
        );

        -- template_id is informational only: deleting a template keeps its invoices.
        CREATE TABLE IF NOT EXISTS invoices (
            id           TEXT NOT NULL PRIMARY KEY,
            number       TEXT NOT NULL UNIQUE,
            client_id    TEXT NOT NULL,
            contract_id  TEXT,
            template_id  TEXT,
            currency     TEXT NOT NULL,
            issued_on    TEXT NOT NULL,   -- YYYY-MM-DD
            due_on       TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_invoices_template ON invoices (template_id);

        CREATE TABLE IF NOT EXISTS invoice_line_items (
            id                TEXT    NOT NULL PRIMARY KEY,
            invoice_id        TEXT    NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
            position          INTEGER NOT NULL,
            description       TEXT    NOT NULL,
            quantity          INTEGER NOT NULL,
            unit_price_cents  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invoice_recipients (
            invoice_id  TEXT NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
            client_id   TEXT NOT NULL,
            PRIMARY KEY (invoice_id, client_id)
        );

        CREATE TABLE IF NOT EXISTS pdf_requests (
            id            TEXT NOT NULL PRIMARY KEY,
            invoice_id    TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            requested_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS email_requests (
            id            TEXT NOT NULL PRIMARY KEY,
            invoice_id    TEXT NOT NULL,
            mail_app      TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            requested_at  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Canonical on-disk timestamp form; lexicographic order equals time order.
pub(crate) fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn from_db_time(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}
