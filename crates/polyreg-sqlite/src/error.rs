//! Mapping from SQLite failures onto the registry error taxonomy.

use polyreg_core::RegistryError;
use rusqlite::{ErrorCode, ffi};

/// Which constraint a failed write tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Constraint {
    /// PRIMARY KEY or UNIQUE.
    Key,
    ForeignKey,
    Check,
    Other,
}

/// Constraint kind of `err`, if it is a constraint violation at all.
pub(crate) fn constraint_of(err: &rusqlite::Error) -> Option<Constraint> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(match e.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    Constraint::Key
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Constraint::ForeignKey,
                ffi::SQLITE_CONSTRAINT_CHECK => Constraint::Check,
                _ => Constraint::Other,
            })
        }
        _ => None,
    }
}

/// Classify an error that carries no operation-specific meaning.
///
/// Busy/locked (lock-wait timeout) is transient; everything else is not.
pub(crate) fn classify(err: rusqlite::Error) -> RegistryError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            tracing::warn!(error = %err, "sqlite lock wait timed out");
            RegistryError::Transient(err.to_string())
        }
        _ => RegistryError::Storage(err.to_string()),
    }
}
