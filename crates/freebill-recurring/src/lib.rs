//! `freebill-recurring`: recurring-invoice templates and their generation.
//!
//! # Overview
//!
//! Templates live in the `recurring_templates` table. A generation run
//! selects the active templates whose next date has arrived (oldest first)
//! and, for each one, allocates a number, creates the invoice with a single
//! line item, runs the optional PDF/email hooks and advances the schedule.
//!
//! # Frequencies
//!
//! | Variant     | Next date                                             |
//! |-------------|-------------------------------------------------------|
//! | `Weekly`    | Next anchor weekday, a full week if today is the anchor |
//! | `Biweekly`  | Next anchor weekday, two weeks if today is the anchor |
//! | `Monthly`   | +1 month, day pinned to `min(anchor, 28)`             |
//! | `Quarterly` | +3 months, same day rule                              |
//! | `Yearly`    | +12 months, same day rule                             |

pub mod book;
pub mod collaborators;
pub mod db;
pub mod error;
pub mod frequency;
pub mod hooks;
pub mod manager;
pub mod outbox;
pub mod pipeline;
pub mod selector;
pub mod store;
pub mod task;
pub mod types;

pub use book::SqliteInvoiceBook;
pub use error::{GenerationStage, RecurringError, Result, TemplateFailure};
pub use frequency::next_date;
pub use hooks::{EmailHook, PdfHook, PostCreateHook};
pub use manager::TemplateManager;
pub use outbox::SqliteOutbox;
pub use pipeline::{GenerationPipeline, GenerationReport};
pub use store::{SqliteTemplateStore, TemplateStore};
pub use task::{RecurringInvoiceTask, RECURRING_TASK_NAME};
pub use types::{Frequency, NewTemplate, RecurringTemplate, SelectMode, TemplateStatus};
