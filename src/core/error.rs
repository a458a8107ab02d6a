use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Column '{column}' of '{family}' is not indexed")]
    IndexUnavailable { family: String, column: String },

    #[error("Column '{0}' not found in family '{1}'")]
    ColumnNotFound(String, String),

    #[error("Connection failure: {0}")]
    Connection(String),

    #[error(
        "Counter {family}[{row}].{column} did not converge on {target} after {attempts} attempts (last observed {observed})"
    )]
    ConvergenceFailure {
        family: String,
        row: String,
        column: String,
        target: i64,
        observed: i64,
        attempts: u32,
    },

    #[error("Validation failure: {0}")]
    Validation(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl DbError {
    /// Fatal categories that must never be swallowed by hydration fallbacks.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::TypeMismatch(_))
    }
}
