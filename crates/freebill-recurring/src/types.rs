use chrono::{DateTime, Utc, Weekday};
use freebill_core::{ClientId, ContractId, InvoiceId, TemplateId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RecurringError, Result};
use crate::frequency::next_date;

/// Recurrence rule of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::Weekly,
        Frequency::Biweekly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::Yearly,
    ];

    /// Decode a stored frequency. Unknown or empty values fall back to monthly.
    pub fn from_stored(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            warn!(value = %s, "unknown frequency; treating as monthly");
            Frequency::Monthly
        })
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// Pause/resume state derived from the `active` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    Active,
    Paused,
}

impl std::fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateStatus::Active => write!(f, "active"),
            TemplateStatus::Paused => write!(f, "paused"),
        }
    }
}

/// A standing billing agreement, periodically materialised into invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: TemplateId,
    pub client_id: ClientId,
    pub contract_id: Option<ContractId>,
    /// Amount in minor currency units (cents).
    pub amount_cents: i64,
    /// ISO 4217 code, upper case.
    pub currency: String,
    pub description: String,
    pub frequency: Frequency,
    /// Always within 1..=28.
    pub day_of_month: u32,
    /// Anchor for weekly and biweekly schedules.
    pub day_of_week: Weekday,
    /// False means paused: excluded from selection, next date frozen.
    pub active: bool,
    pub next_generation_date: DateTime<Utc>,
    pub last_generated_date: Option<DateTime<Utc>>,
    pub last_invoice_id: Option<InvoiceId>,
    /// Number of successful generation cycles. Never decreases.
    pub generated_count: u32,
    pub auto_pdf: bool,
    pub auto_send: bool,
    /// Mail application used for dispatch when `auto_send` is set.
    pub email_app: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringTemplate {
    pub fn status(&self) -> TemplateStatus {
        if self.active {
            TemplateStatus::Active
        } else {
            TemplateStatus::Paused
        }
    }

    /// Next due instant after `now` under this template's schedule.
    pub fn next_date_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_date(self.frequency, self.day_of_month, self.day_of_week, now)
    }
}

/// Input for creating a template.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub client_id: ClientId,
    pub contract_id: Option<ContractId>,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub frequency: Frequency,
    /// Clamped into 1..=28 on creation.
    pub day_of_month: u32,
    pub day_of_week: Weekday,
    /// First due instant. Computed from the schedule when absent.
    pub start: Option<DateTime<Utc>>,
    pub auto_pdf: bool,
    pub auto_send: bool,
    pub email_app: Option<String>,
}

/// Which active templates a selection returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    /// Only templates whose next date has arrived.
    OnlyDue,
    /// Every active template, regardless of its next date.
    All,
}

impl SelectMode {
    pub fn from_all_flag(all: bool) -> Self {
        if all {
            SelectMode::All
        } else {
            SelectMode::OnlyDue
        }
    }
}

/// State written back to a template after a successful cycle.
#[derive(Debug, Clone)]
pub struct GenerationRecord {
    pub generated_at: DateTime<Utc>,
    pub invoice_id: InvoiceId,
    pub next_generation_date: DateTime<Utc>,
}

/// Result of listing templates. Rows that could not be decoded are counted
/// instead of failing the whole listing.
#[derive(Debug, Clone, Default)]
pub struct TemplateListing {
    pub templates: Vec<RecurringTemplate>,
    pub skipped: usize,
}

/// Format minor units as a decimal amount, e.g. `123456` -> `"1234.56"`.
pub fn format_minor_units(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a decimal amount with at most two fractional digits into minor units.
pub fn parse_minor_units(s: &str) -> Result<i64> {
    let invalid = || RecurringError::InvalidTemplate(format!("invalid amount: {s}"));
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}
