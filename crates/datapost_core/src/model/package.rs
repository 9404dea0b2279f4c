//! Data package model and delivery-state machine.
//!
//! # Responsibility
//! - Define the unit being distributed to subscribers.
//! - Govern lifecycle transitions `draft -> transmitted -> acknowledged`.
//!
//! # Invariants
//! - State progression is monotonic; nothing re-enters `draft` and nothing
//!   leaves `acknowledged`.
//! - `acknowledged_at` set implies `sent_at` set.
//! - A failed guard leaves the package untouched.
//! - A package is destroyable only while `draft` or `acknowledged`.

use super::organization::OrganizationId;
use super::stream::StreamId;
use super::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable data package identifier.
pub type PackageId = Uuid;

/// Maximum title length accepted by storage.
pub const TITLE_MAX_CHARS: usize = 255;

/// Package lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    /// Editable; criteria may still change.
    Draft,
    /// Notifications materialized and sent.
    Transmitted,
    /// Receipt confirmed. Terminal.
    Acknowledged,
}

impl PackageState {
    /// Stable storage/wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Transmitted => "transmitted",
            Self::Acknowledged => "acknowledged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "transmitted" => Some(Self::Transmitted),
            "acknowledged" => Some(Self::Acknowledged),
            _ => None,
        }
    }
}

impl Display for PackageState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event that moves a package between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageEvent {
    Send,
    Acknowledge,
}

impl PackageEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Acknowledge => "acknowledge",
        }
    }

    /// The only state this event may fire from.
    pub fn source(self) -> PackageState {
        match self {
            Self::Send => PackageState::Draft,
            Self::Acknowledge => PackageState::Transmitted,
        }
    }

    pub fn target(self) -> PackageState {
        match self {
            Self::Send => PackageState::Transmitted,
            Self::Acknowledge => PackageState::Acknowledged,
        }
    }
}

/// Why a guarded transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionFailure {
    /// `send` requires the package to be a draft.
    NotDraft,
    /// `send` requires completed attachments.
    IncompleteAttachments,
    /// `acknowledge` requires the package to be transmitted.
    NotTransmitted,
}

/// Domain error attached by a failed transition guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub event: PackageEvent,
    pub from: PackageState,
    pub reason: TransitionFailure,
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let detail = match self.reason {
            TransitionFailure::NotDraft => "must be draft",
            TransitionFailure::IncompleteAttachments => "attachments are not completed",
            TransitionFailure::NotTransmitted => "must be transmitted",
        };
        write!(
            f,
            "cannot {} package in state `{}`: {detail}",
            self.event.as_str(),
            self.from
        )
    }
}

impl Error for TransitionError {}

/// Where the recipient list of a package comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionsSource {
    /// Draft packages preview recipients through the criteria resolver.
    Resolver,
    /// Sent packages report the recipients that were actually notified.
    Notifications,
}

/// Attachment-completeness predicate supplied by the surrounding system.
pub trait AttachmentCheck {
    fn has_completed_attachments(&self, package: &DataPackage) -> bool;
}

impl<F> AttachmentCheck for F
where
    F: Fn(&DataPackage) -> bool,
{
    fn has_completed_attachments(&self, package: &DataPackage) -> bool {
        self(package)
    }
}

/// Fixed answer for every package, used until attachments are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAttachments(pub bool);

impl AttachmentCheck for StaticAttachments {
    fn has_completed_attachments(&self, _package: &DataPackage) -> bool {
        self.0
    }
}

/// Unit of data routed to subscribers selected by `delivery_criteria`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPackage {
    pub id: PackageId,
    pub data_stream_id: StreamId,
    pub sender_organization_id: OrganizationId,
    pub title: Option<String>,
    pub state: PackageState,
    /// Opaque criteria document; validated before every write.
    pub delivery_criteria: Option<Value>,
    pub sent_at: Option<i64>,
    pub acknowledged_at: Option<i64>,
}

impl DataPackage {
    /// Creates a draft package without criteria.
    pub fn new(data_stream_id: StreamId, sender_organization_id: OrganizationId) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_stream_id,
            sender_organization_id,
            title: None,
            state: PackageState::Draft,
            delivery_criteria: None,
            sent_at: None,
            acknowledged_at: None,
        }
    }

    pub fn with_criteria(mut self, criteria: Value) -> Self {
        self.delivery_criteria = Some(criteria);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn is_draft(&self) -> bool {
        self.state == PackageState::Draft
    }

    /// State-only check; ignores the attachment guard.
    pub fn may_fire(&self, event: PackageEvent) -> bool {
        self.state == event.source()
    }

    /// Events whose source state matches the current state.
    pub fn allowed_events(&self) -> Vec<PackageEvent> {
        [PackageEvent::Send, PackageEvent::Acknowledge]
            .into_iter()
            .filter(|event| self.may_fire(*event))
            .collect()
    }

    /// Evaluates the `send` guards without mutating the package.
    pub fn check_send<A>(&self, attachments: &A) -> Result<(), TransitionError>
    where
        A: AttachmentCheck + ?Sized,
    {
        if !self.is_draft() {
            return Err(self.refuse(PackageEvent::Send, TransitionFailure::NotDraft));
        }
        if !attachments.has_completed_attachments(self) {
            return Err(self.refuse(
                PackageEvent::Send,
                TransitionFailure::IncompleteAttachments,
            ));
        }
        Ok(())
    }

    /// Fires `send`: `draft -> transmitted`, stamping `sent_at`.
    pub fn send<A>(&mut self, attachments: &A, now_ms: i64) -> Result<(), TransitionError>
    where
        A: AttachmentCheck + ?Sized,
    {
        self.check_send(attachments)?;
        self.state = PackageState::Transmitted;
        self.sent_at = Some(now_ms);
        Ok(())
    }

    /// Fires `acknowledge`: `transmitted -> acknowledged`, stamping
    /// `acknowledged_at`.
    pub fn acknowledge(&mut self, now_ms: i64) -> Result<(), TransitionError> {
        if !self.may_fire(PackageEvent::Acknowledge) {
            return Err(self.refuse(
                PackageEvent::Acknowledge,
                TransitionFailure::NotTransmitted,
            ));
        }
        self.state = PackageState::Acknowledged;
        self.acknowledged_at = Some(now_ms);
        Ok(())
    }

    /// An in-flight transmission must never vanish.
    pub fn can_be_destroyed(&self) -> bool {
        matches!(
            self.state,
            PackageState::Draft | PackageState::Acknowledged
        )
    }

    pub fn subscriptions_source(&self) -> SubscriptionsSource {
        if self.is_draft() {
            SubscriptionsSource::Resolver
        } else {
            SubscriptionsSource::Notifications
        }
    }

    /// Checks record-level invariants. Criteria shape is validated separately
    /// by `criteria::validate_criteria` because it depends on configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = self.title.as_deref() {
            let len = title.chars().count();
            if len > TITLE_MAX_CHARS {
                return Err(ValidationError::TitleTooLong {
                    len,
                    max: TITLE_MAX_CHARS,
                });
            }
        }

        if self.acknowledged_at.is_some() && self.sent_at.is_none() {
            return Err(ValidationError::AcknowledgedWithoutSent);
        }

        let consistent = match self.state {
            PackageState::Draft => self.sent_at.is_none() && self.acknowledged_at.is_none(),
            PackageState::Transmitted => self.sent_at.is_some() && self.acknowledged_at.is_none(),
            PackageState::Acknowledged => self.acknowledged_at.is_some(),
        };
        if !consistent {
            return Err(ValidationError::StateTimestampMismatch(self.state.as_str()));
        }

        Ok(())
    }

    fn refuse(&self, event: PackageEvent, reason: TransitionFailure) -> TransitionError {
        TransitionError {
            event,
            from: self.state,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DataPackage, PackageEvent, PackageState, StaticAttachments, SubscriptionsSource,
        TransitionFailure,
    };
    use crate::model::ValidationError;
    use uuid::Uuid;

    fn draft() -> DataPackage {
        DataPackage::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn send_moves_draft_to_transmitted_and_stamps_sent_at() {
        let mut package = draft();
        package.send(&StaticAttachments(true), 1_000).unwrap();

        assert_eq!(package.state(), PackageState::Transmitted);
        assert_eq!(package.sent_at, Some(1_000));
        assert!(package.validate().is_ok());
    }

    #[test]
    fn send_guard_failure_leaves_package_unchanged() {
        let mut package = draft();
        let before = package.clone();

        let err = package.send(&StaticAttachments(false), 1_000).unwrap_err();
        assert_eq!(err.reason, TransitionFailure::IncompleteAttachments);
        assert_eq!(err.from, PackageState::Draft);
        assert_eq!(package, before);
    }

    #[test]
    fn send_from_transmitted_is_refused_as_not_draft() {
        let mut package = draft();
        package.send(&|_: &DataPackage| true, 1).unwrap();

        let err = package.send(&StaticAttachments(true), 2).unwrap_err();
        assert_eq!(err.reason, TransitionFailure::NotDraft);
        assert_eq!(package.sent_at, Some(1));
    }

    #[test]
    fn acknowledge_requires_transmitted() {
        let mut package = draft();
        let err = package.acknowledge(5).unwrap_err();
        assert_eq!(err.reason, TransitionFailure::NotTransmitted);
        assert!(err.to_string().contains("must be transmitted"));

        package.send(&StaticAttachments(true), 1).unwrap();
        package.acknowledge(5).unwrap();
        assert_eq!(package.state(), PackageState::Acknowledged);
        assert_eq!(package.acknowledged_at, Some(5));
        assert!(package.allowed_events().is_empty());
        assert!(package.acknowledge(6).is_err());
    }

    #[test]
    fn destroyable_only_in_draft_or_acknowledged() {
        let mut package = draft();
        assert!(package.can_be_destroyed());
        assert_eq!(package.allowed_events(), vec![PackageEvent::Send]);

        package.send(&StaticAttachments(true), 1).unwrap();
        assert!(!package.can_be_destroyed());
        assert_eq!(
            package.subscriptions_source(),
            SubscriptionsSource::Notifications
        );

        package.acknowledge(2).unwrap();
        assert!(package.can_be_destroyed());
    }

    #[test]
    fn validate_rejects_inconsistent_timestamps() {
        let mut package = draft();
        package.acknowledged_at = Some(3);
        assert_eq!(
            package.validate(),
            Err(ValidationError::AcknowledgedWithoutSent)
        );

        let mut package = draft();
        package.sent_at = Some(3);
        assert_eq!(
            package.validate(),
            Err(ValidationError::StateTimestampMismatch("draft"))
        );
    }

    #[test]
    fn validate_caps_title_length() {
        let package = draft().with_title("x".repeat(256));
        assert!(matches!(
            package.validate(),
            Err(ValidationError::TitleTooLong { len: 256, max: 255 })
        ));
    }
}
