//! Domain model for streams, subscriptions, packages and notifications.
//!
//! # Responsibility
//! - Define canonical records used by the criteria engine and the saga.
//! - Own write-time invariants (`validate()`) shared by all repositories.
//! - Own the package delivery-state machine.
//!
//! # Invariants
//! - Every record is identified by a stable UUID that is never reused.
//! - Timestamps are Unix epoch milliseconds.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod notification;
pub mod organization;
pub mod package;
pub mod stream;
pub mod subscription;

/// Write-time invariant violations for model records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is blank after trim.
    BlankName,
    /// SIRET is not exactly 14 ASCII digits.
    InvalidSiret(String),
    /// Retention must be strictly positive when set.
    InvalidRetentionDays(i64),
    /// Subscription grants neither read nor write.
    NoPermission,
    /// Package title exceeds the storage limit.
    TitleTooLong { len: usize, max: usize },
    /// `acknowledged_at` is set while `sent_at` is not.
    AcknowledgedWithoutSent,
    /// Timestamps disagree with the lifecycle state.
    StateTimestampMismatch(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::InvalidSiret(value) => write!(f, "siret must be 14 digits, got `{value}`"),
            Self::InvalidRetentionDays(days) => {
                write!(f, "retention_days must be greater than 0, got {days}")
            }
            Self::NoPermission => {
                write!(f, "subscription must grant at least one of read or write")
            }
            Self::TitleTooLong { len, max } => {
                write!(f, "title is {len} characters long, maximum is {max}")
            }
            Self::AcknowledgedWithoutSent => {
                write!(f, "acknowledged_at requires sent_at to be set")
            }
            Self::StateTimestampMismatch(state) => {
                write!(f, "timestamps are inconsistent with state `{state}`")
            }
        }
    }
}

impl Error for ValidationError {}

/// Current wall-clock time in epoch milliseconds.
///
/// Falls back to `0` if the system clock is before the Unix epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
