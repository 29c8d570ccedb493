//! Bulk import and integrity reconciliation for the mining equipment IP
//! inventory.

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod inventory;
mod logging;
pub mod migrate;
pub mod time;

pub use config::{AppConfig, ImportOptions};
pub use error::{AppError, AppResult};
pub use logging::{flush_file_logs, init_file_logging, init_logging, LOG_ENV, LOG_FILE_NAME};
