//! Error types for registry persistence.

use std::fmt;

use thiserror::Error;

use crate::db::DbError;

/// Structured classification for registry database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryDbErrorKind {
    /// `SQLite` returned busy/locked, or no pooled connection came free in time.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Unclassified database failure.
    Other,
}

impl RegistryDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::BusyOrLocked,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }

    fn suggestion(self) -> &'static str {
        match self {
            Self::BusyOrLocked => {
                "Another nspider process is using this working directory; wait for it to finish and retry"
            }
            Self::ConstraintViolation => {
                "The registry tables are inconsistent; delete database/registry.db and re-run resolution"
            }
            Self::Other => "Check that the working directory is writable",
        }
    }
}

impl fmt::Display for RegistryDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> RegistryDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return RegistryDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return RegistryDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return RegistryDbErrorKind::BusyOrLocked;
    }

    RegistryDbErrorKind::Other
}

/// Errors that can occur while loading or flushing registry tables.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Database statement failed.
    #[error("registry database error ({kind}): {message}\n  Suggestion: {suggestion}", suggestion = .kind.suggestion())]
    Database {
        /// Typed classification of the failure.
        kind: RegistryDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Opening the database failed.
    #[error("registry storage unavailable: {0}")]
    Storage(#[from] DbError),

    /// A persisted row could not be mapped back to a record.
    #[error(
        "invalid {table} row: {reason}\n  Suggestion: Inspect or delete the registry database and re-run resolution"
    )]
    InvalidRow {
        /// Table holding the bad row.
        table: &'static str,
        /// Why the row was rejected.
        reason: String,
    },
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: RegistryDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl RegistryError {
    /// Creates an `InvalidRow` error.
    #[must_use]
    pub fn invalid_row(table: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            table,
            reason: reason.into(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<RegistryDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::Storage(DbError::Connection(source)) => Some(RegistryDbErrorKind::from_sqlx(source)),
            Self::Storage(_) | Self::InvalidRow { .. } => None,
        }
    }

    /// Returns true when another connection holds the registry database.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(RegistryDbErrorKind::BusyOrLocked)
    }
}
