//! Package lifecycle use-cases outside transmission.
//!
//! # Responsibility
//! - Create drafts with validated criteria and a generated title.
//! - Edit criteria while the package is a draft.
//! - Report recipients, acknowledge, and destroy under the state guards.
//!
//! # Invariants
//! - Criteria are validated before every write.
//! - Criteria of a non-draft package never change.
//! - Only `draft` and `acknowledged` packages are destroyed.

use chrono::{DateTime, Utc};
use crate::criteria::{validate_criteria, CriteriaConfig, CriteriaError, ResolveError, Resolver};
use crate::model::notification::NotificationId;
use crate::model::now_epoch_ms;
use crate::model::organization::OrganizationId;
use crate::model::package::{
    DataPackage, PackageEvent, PackageId, PackageState, SubscriptionsSource, TransitionError,
    TransitionFailure, TITLE_MAX_CHARS,
};
use crate::model::stream::StreamId;
use crate::model::subscription::SubscriptionId;
use crate::repo::{PackageRepository, RepoError, SubscriptionDirectory};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TITLE_FALLBACK_PREFIX: &str = "Package";
const TITLE_SUFFIX_LEN: usize = 4;

/// Service error for package use-cases.
#[derive(Debug)]
pub enum PackageServiceError {
    /// Criteria document failed structural validation.
    InvalidCriteria(Vec<CriteriaError>),
    /// Package is mid-delivery and cannot be removed.
    NotDestroyable { state: PackageState },
    Transition(TransitionError),
    /// Criteria may only change while the package is a draft.
    CriteriaLocked { state: PackageState },
    NotFound { entity: &'static str, id: Uuid },
    Repo(RepoError),
    Resolve(ResolveError),
}

impl Display for PackageServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCriteria(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, "invalid delivery criteria: {}", messages.join("; "))
            }
            Self::NotDestroyable { state } => {
                write!(f, "cannot destroy data package in state: {state}")
            }
            Self::Transition(err) => write!(f, "{err}"),
            Self::CriteriaLocked { state } => {
                write!(f, "delivery criteria are locked in state: {state}")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Resolve(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PackageServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transition(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Resolve(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PackageServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Repo(other),
        }
    }
}

impl From<ResolveError> for PackageServiceError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::StreamNotFound(id) => Self::NotFound {
                entity: "data stream",
                id,
            },
            other => Self::Resolve(other),
        }
    }
}

impl From<TransitionError> for PackageServiceError {
    fn from(value: TransitionError) -> Self {
        Self::Transition(value)
    }
}

/// Input for `create_package`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
    pub data_stream_id: StreamId,
    pub sender_organization_id: OrganizationId,
    /// Generated from the stream name when absent or blank.
    pub title: Option<String>,
    pub delivery_criteria: Option<Value>,
}

/// Package service facade over repository implementations.
pub struct PackageService<R: PackageRepository, D: SubscriptionDirectory> {
    packages: R,
    directory: D,
    criteria: CriteriaConfig,
}

impl<R: PackageRepository, D: SubscriptionDirectory> PackageService<R, D> {
    pub fn new(packages: R, directory: D, criteria: CriteriaConfig) -> Self {
        Self {
            packages,
            directory,
            criteria,
        }
    }

    /// Creates a draft package.
    pub fn create_package(&self, input: NewPackage) -> Result<DataPackage, PackageServiceError> {
        if let Some(criteria) = input.delivery_criteria.as_ref() {
            validate_criteria(criteria, &self.criteria)
                .map_err(PackageServiceError::InvalidCriteria)?;
        }

        let stream = self
            .directory
            .find_stream(input.data_stream_id)?
            .ok_or(PackageServiceError::NotFound {
                entity: "data stream",
                id: input.data_stream_id,
            })?;

        let title = match input.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => generate_title(Some(stream.name.as_str()), now_epoch_ms()),
        };

        let mut package = DataPackage::new(input.data_stream_id, input.sender_organization_id)
            .with_title(title);
        package.delivery_criteria = input.delivery_criteria;

        let id = self.packages.create_package(&package)?;
        info!("event=package_create module=service status=ok package_id={id}");
        self.get_package(id)
    }

    pub fn get_package(&self, id: PackageId) -> Result<DataPackage, PackageServiceError> {
        self.packages
            .get_package(id)?
            .ok_or(PackageServiceError::NotFound {
                entity: "data package",
                id,
            })
    }

    /// Replaces the criteria of a draft package.
    pub fn update_criteria(
        &self,
        id: PackageId,
        criteria: Option<Value>,
    ) -> Result<DataPackage, PackageServiceError> {
        let package = self.get_package(id)?;
        if !package.is_draft() {
            return Err(PackageServiceError::CriteriaLocked {
                state: package.state(),
            });
        }
        if let Some(value) = criteria.as_ref() {
            validate_criteria(value, &self.criteria)
                .map_err(PackageServiceError::InvalidCriteria)?;
        }

        if !self.packages.update_criteria(id, criteria.as_ref())? {
            let current = self.get_package(id)?;
            return Err(PackageServiceError::CriteriaLocked {
                state: current.state(),
            });
        }
        self.get_package(id)
    }

    /// Resolves criteria for a stream without persisting anything.
    pub fn preview_recipients(
        &self,
        stream: StreamId,
        criteria: &Value,
    ) -> Result<BTreeSet<SubscriptionId>, PackageServiceError> {
        let resolver = Resolver::new(&self.directory, &self.criteria);
        Ok(resolver.resolve_value(Some(criteria), stream)?)
    }

    /// Recipients of a package: predicted for drafts, actual once sent.
    pub fn recipients(
        &self,
        id: PackageId,
    ) -> Result<BTreeSet<SubscriptionId>, PackageServiceError> {
        let package = self.get_package(id)?;
        match package.subscriptions_source() {
            SubscriptionsSource::Resolver => {
                let resolver = Resolver::new(&self.directory, &self.criteria);
                Ok(resolver
                    .resolve_value(package.delivery_criteria.as_ref(), package.data_stream_id)?)
            }
            SubscriptionsSource::Notifications => {
                Ok(self.packages.notification_subscription_ids(package.id)?)
            }
        }
    }

    /// Fires `acknowledge` on a transmitted package.
    pub fn acknowledge(&self, id: PackageId) -> Result<DataPackage, PackageServiceError> {
        let mut package = self.get_package(id)?;
        package.acknowledge(now_epoch_ms())?;

        let acknowledged_at = package.acknowledged_at.unwrap_or_else(now_epoch_ms);
        if !self.packages.mark_acknowledged(id, acknowledged_at)? {
            let current = self.get_package(id)?;
            return Err(PackageServiceError::Transition(TransitionError {
                event: PackageEvent::Acknowledge,
                from: current.state(),
                reason: TransitionFailure::NotTransmitted,
            }));
        }

        info!("event=package_acknowledge module=service status=ok package_id={id}");
        self.get_package(id)
    }

    /// Records that one recipient acknowledged its notification.
    pub fn acknowledge_notification(&self, id: NotificationId) -> Result<(), PackageServiceError> {
        self.packages.acknowledge_notification(id, now_epoch_ms())?;
        Ok(())
    }

    /// Deletes a package in `draft` or `acknowledged`.
    ///
    /// The delete is conditional on the state, so a transmission committed
    /// after the read still blocks it.
    pub fn destroy_package(&self, id: PackageId) -> Result<(), PackageServiceError> {
        let package = self.get_package(id)?;
        if package.can_be_destroyed() && self.packages.delete_package(id)? {
            info!("event=package_destroy module=service status=ok package_id={id}");
            return Ok(());
        }

        let state = self.get_package(id)?.state();
        warn!(
            "event=package_destroy module=service status=error package_id={id} error_code=not_destroyable state={state}"
        );
        Err(PackageServiceError::NotDestroyable { state })
    }
}

/// Builds `{stream}-{YYYYmmdd-HHMMSS}-{XXXX}` in UTC, capped to the title limit.
pub fn generate_title(stream_name: Option<&str>, now_ms: i64) -> String {
    let prefix = stream_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(TITLE_FALLBACK_PREFIX);

    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(TITLE_SUFFIX_LEN)
        .collect::<String>()
        .to_uppercase();
    let tail = format!("-{}-{suffix}", format_compact_utc(now_ms));

    let room = TITLE_MAX_CHARS.saturating_sub(tail.chars().count());
    let prefix: String = prefix.chars().take(room).collect();
    format!("{prefix}{tail}")
}

/// `YYYYmmdd-HHMMSS` for a Unix epoch in milliseconds; out-of-range input
/// formats as the epoch.
fn format_compact_utc(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or_default()
        .format("%Y%m%d-%H%M%S")
        .to_string()
}
