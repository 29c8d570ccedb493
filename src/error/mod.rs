use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;
use ts_rs::TS;

/// A structured error that can be serialized and handed to the dashboard.
///
/// Domain errors (`WorkbookError`, `StoreError`, `ImportError`) keep their own
/// `thiserror` enums and are folded into this shape at the boundary, each with a
/// stable `AREA/REASON` code the UI switches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the operator.
    pub message: String,
    /// Key/value details for the failing item (sheet, row, address, machine id).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[ts(as = "Option<HashMap<String, String>>", optional)]
    pub context: HashMap<String, String>,
    /// Underlying error, kept so the chain survives serialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<Box<AppError>>,
}

/// Result alias used across the import and integrity entry points.
pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Code for upstream errors that carry no code of their own.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Code for errors built from a bare message.
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";

    /// Builds an error with no context and no cause.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    /// Returns the `AREA/REASON` code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the operator-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the key/value details attached so far.
    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Returns the nested cause, if any.
    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    /// Adds a contextual key/value pair (sheet name, address, machine id...).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the nested cause, replacing any previous one.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        let mut pairs: Vec<_> = self.context.iter().collect();
        pairs.sort();
        for (key, value) in pairs {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

/// Walks the anyhow chain; an `AppError` anywhere in it is returned as-is so
/// codes raised deep in the import survive `.context(...)` wrapping.
impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn walk(err: &(dyn StdError + 'static)) -> AppError {
            match err.downcast_ref::<AppError>() {
                Some(app) => app.clone(),
                None => AppError {
                    code: AppError::UNKNOWN_CODE.to_string(),
                    message: err.to_string(),
                    context: HashMap::new(),
                    cause: err.source().map(|next| Box::new(walk(next))),
                },
            }
        }

        walk(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let app = AppError::new(format!("IO/{:?}", error.kind()), error.to_string());
        match error.raw_os_error() {
            Some(errno) => app.with_context("errno", errno.to_string()),
            None => app,
        }
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        use serde_json::error::Category;

        let code = match error.classify() {
            Category::Io => "JSON/IO",
            Category::Syntax => "JSON/SYNTAX",
            Category::Data => "JSON/DATA",
            Category::Eof => "JSON/EOF",
        };
        AppError::new(code, error.to_string())
            .with_context("position", format!("{}:{}", error.line(), error.column()))
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "inventory database did not hand out a connection in time",
            ),
            SqlxError::PoolClosed => {
                AppError::new("SQLX/POOL_CLOSED", "inventory database is closed")
            }
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "no matching row"),
            SqlxError::Io(err) => AppError::from(err).with_context("layer", "sqlx"),
            SqlxError::Database(db) => {
                // SQLite extended result codes: 5 busy, 6 locked, 19 constraint.
                let code = match db.code().as_deref() {
                    Some("5") | Some("6") => "SQLX/BUSY".to_string(),
                    Some(c) if c == "19" || c.starts_with("2067") || c.starts_with("1555") => {
                        "SQLX/CONSTRAINT".to_string()
                    }
                    Some(c) => format!("SQLX/SQLITE_{c}"),
                    None => "SQLX/DATABASE".to_string(),
                };
                let app = AppError::new(code, db.message());
                match db.constraint() {
                    Some(name) => app.with_context("constraint", name),
                    None => app,
                }
            }
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}
