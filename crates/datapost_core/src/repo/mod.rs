//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from criteria and saga orchestration.
//!
//! # Invariants
//! - Repository writes enforce model `validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`,
//!   `DuplicateNotification`, `ConstraintViolation`) in addition to DB
//!   transport errors.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::{sqlite_constraint_kind, ConstraintKind, DbError};
use crate::model::package::PackageId;
use crate::model::subscription::SubscriptionId;
use crate::model::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod directory_repo;
pub mod package_repo;

pub use directory_repo::{SqliteDirectory, SubscriptionDirectory};
pub use package_repo::{PackageRepository, SqlitePackageRepository};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by directory and package storage.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    NotFound {
        entity: &'static str,
        id: Uuid,
    },
    InvalidData(String),
    /// A notification for this `(package, subscription)` pair already exists.
    DuplicateNotification {
        package_id: PackageId,
        subscription_id: SubscriptionId,
    },
    /// Storage rejected a write on a declared constraint.
    ConstraintViolation {
        entity: &'static str,
        kind: ConstraintKind,
        source: DbError,
    },
    /// Subscription still referenced by delivery history.
    SubscriptionHasNotifications {
        subscription_id: SubscriptionId,
        notifications: u64,
    },
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Classifies a write failure, keeping non-constraint errors as `Db`.
    pub(crate) fn from_write(entity: &'static str, err: rusqlite::Error) -> Self {
        match sqlite_constraint_kind(&err) {
            Some(kind) => Self::ConstraintViolation {
                entity,
                kind,
                source: DbError::Sqlite(err),
            },
            None => Self::Db(DbError::Sqlite(err)),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::DuplicateNotification {
                package_id,
                subscription_id,
            } => write!(
                f,
                "notification already exists for package {package_id} and subscription {subscription_id}"
            ),
            Self::ConstraintViolation { entity, kind, .. } => {
                write!(f, "{entity} violates a {kind:?} constraint")
            }
            Self::SubscriptionHasNotifications {
                subscription_id,
                notifications,
            } => write!(
                f,
                "subscription {subscription_id} has {notifications} notification(s) and cannot be deleted"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::ConstraintViolation { source, .. } => Some(source),
            Self::NotFound { .. }
            | Self::InvalidData(_)
            | Self::DuplicateNotification { .. }
            | Self::SubscriptionHasNotifications { .. } => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// `?, ?, ?` list for an `IN (...)` clause of `count` parameters.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn parse_uuid_column(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
