// rethinksync/src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Every missing required setting, collected in a single validation pass.
    #[error("configuration error: missing required settings: {0:?}")]
    Config(Vec<String>),

    #[error("ssh tunnel to {host} failed: {reason}")]
    Tunnel { host: String, reason: String },

    /// A dump or import subprocess exited non-zero. `table` is set for
    /// import failures and names the table that was being loaded.
    #[error("{stage} process exited with code {code}{}", .table.as_deref().map(|t| format!(" (table '{t}')")).unwrap_or_default())]
    Process {
        stage: &'static str,
        table: Option<String>,
        code: i32,
    },

    #[error("database driver error: {0}")]
    Driver(#[from] reql::Error),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
