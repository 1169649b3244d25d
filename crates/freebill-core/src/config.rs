use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_NUMBER_PREFIX: &str = "INV";
pub const DEFAULT_EMAIL_APP: &str = "default";

/// Top-level config (freebill.toml + FREEBILL_* env overrides, sections split on `__`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreebillConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub invoicing: InvoicingConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Background generation settings used by `freebill serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false, `serve` starts with the recurring-invoice task disabled.
    /// Override with env var: FREEBILL_SCHEDULER__ENABLED=false
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Seconds between two due-template sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SCHEDULER_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingConfig {
    /// Leading segment of allocated invoice numbers, e.g. `INV-2024-0007`.
    #[serde(default = "default_number_prefix")]
    pub number_prefix: String,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            number_prefix: default_number_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Mail application used when a template does not name one.
    #[serde(default = "default_email_app")]
    pub default_app: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            default_app: default_email_app(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    DEFAULT_SCHEDULER_INTERVAL_SECS
}
fn default_number_prefix() -> String {
    DEFAULT_NUMBER_PREFIX.to_string()
}
fn default_email_app() -> String {
    DEFAULT_EMAIL_APP.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.freebill/freebill.db", home)
}

impl FreebillConfig {
    /// Load config from a TOML file with FREEBILL_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.freebill/freebill.toml
    ///
    /// A missing file is not an error; defaults fill every section.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: FreebillConfig = Figment::from(Serialized::defaults(FreebillConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FREEBILL_").split("__"))
            .extract()
            .map_err(|e| crate::error::FreebillError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(crate::error::FreebillError::Config(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.invoicing.number_prefix.trim().is_empty() {
            return Err(crate::error::FreebillError::Config(
                "invoicing.number_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.freebill/freebill.toml", home)
}
