use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::TemplateStore;
use crate::types::{RecurringTemplate, SelectMode};

/// Templates eligible for generation at `now`, oldest next date first.
///
/// Paused templates are never returned. The store query already filters and
/// orders; both are re-applied here so any store implementation satisfies
/// the same contract. Ties are broken by id for a stable order.
pub fn select_due(
    store: &dyn TemplateStore,
    mode: SelectMode,
    now: DateTime<Utc>,
) -> Result<Vec<RecurringTemplate>> {
    let mut templates = store.select(mode, now)?;
    templates.retain(|t| t.active && (mode == SelectMode::All || t.next_generation_date <= now));
    templates.sort_by(|a, b| {
        a.next_generation_date
            .cmp(&b.next_generation_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(templates)
}
