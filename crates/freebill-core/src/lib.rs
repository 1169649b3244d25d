//! `freebill-core`: identifiers, configuration and the top-level error type
//! shared by every Freebill crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::FreebillConfig;
pub use error::{FreebillError, Result};
pub use types::{ClientId, ContractId, InvoiceId, TemplateId};
