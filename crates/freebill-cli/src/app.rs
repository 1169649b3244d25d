use std::sync::Arc;

use anyhow::Context;
use freebill_core::FreebillConfig;
use freebill_recurring::{
    EmailHook, GenerationPipeline, PdfHook, SqliteInvoiceBook, SqliteOutbox, SqliteTemplateStore,
    TemplateManager,
};
use rusqlite::Connection;
use tracing::info;

/// Everything a command needs, built once from config.
pub struct AppState {
    pub config: FreebillConfig,
    pub book: Arc<SqliteInvoiceBook>,
    pub manager: TemplateManager,
    pub pipeline: Arc<GenerationPipeline>,
}

impl AppState {
    /// Open the database and wire the recurring subsystem.
    ///
    /// Store, invoice book and outbox each get their own connection to the
    /// same file.
    pub fn open(config: FreebillConfig) -> anyhow::Result<Self> {
        let db_path = config.database.path.clone();
        ensure_parent_dir(&db_path);
        info!(path = %db_path, "opening SQLite database");

        let store = Arc::new(SqliteTemplateStore::new(open_db(&db_path)?)?);
        let book = Arc::new(SqliteInvoiceBook::new(
            open_db(&db_path)?,
            config.invoicing.number_prefix.clone(),
        )?);
        let outbox = Arc::new(SqliteOutbox::new(open_db(&db_path)?)?);
        info!("database migrations complete");

        let manager = TemplateManager::new(store.clone(), book.clone());
        let pipeline = GenerationPipeline::new(store, book.clone(), book.clone(), book.clone())
            .with_hook(Arc::new(PdfHook::new(outbox.clone())))
            .with_hook(Arc::new(EmailHook::new(
                outbox,
                config.email.default_app.clone(),
            )));

        Ok(Self {
            config,
            book,
            manager,
            pipeline: Arc::new(pipeline),
        })
    }
}

fn open_db(path: &str) -> anyhow::Result<Connection> {
    let db = Connection::open(path).with_context(|| format!("failed to open database {path}"))?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
    Ok(db)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
