//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use passmate_core::model::SettingsError;
use passmate_core::session::Rejection;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,
    #[error("no hearts left; wait for them to refill")]
    NoHearts {
        /// When the next heart comes back.
        next_heart_at: DateTime<Utc>,
    },
    #[error("session has not finished")]
    NotFinished,
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
