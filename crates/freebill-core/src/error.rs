use thiserror::Error;

#[derive(Debug, Error)]
pub enum FreebillError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FreebillError {
    /// Short, stable error code for machine-readable CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            FreebillError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FreebillError>;
