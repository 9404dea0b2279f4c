//! Package transmission use-case.
//!
//! # Responsibility
//! - Run the four-step transmission saga: validate preconditions, resolve
//!   recipients, materialize notifications, transition to `transmitted`.
//!
//! # Invariants
//! - One attempt runs inside one `BEGIN IMMEDIATE` transaction; concurrent
//!   attempts on the same database are serialized and the loser observes
//!   `NotDraft`.
//! - A failed attempt is rolled back: notifications and state are exactly
//!   as they were before the call.
//! - Notification materialization is idempotent per `(package, subscription)`.

use crate::criteria::{CriteriaConfig, CriteriaError, ResolveError, Resolver};
use crate::model::notification::Notification;
use crate::model::now_epoch_ms;
use crate::model::package::{
    AttachmentCheck, DataPackage, PackageId, TransitionError, TransitionFailure,
};
use crate::model::subscription::SubscriptionId;
use crate::repo::{PackageRepository, RepoError, SqliteDirectory, SqlitePackageRepository};
use crate::service::saga::{Saga, SagaStep};
use log::{error, info};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub const STEP_VALIDATE_PRECONDITIONS: &str = "validate_preconditions";
pub const STEP_RESOLVE_RECIPIENTS: &str = "resolve_recipients";
pub const STEP_MATERIALIZE_NOTIFICATIONS: &str = "materialize_notifications";
pub const STEP_TRANSITION_TO_TRANSMITTED: &str = "transition_to_transmitted";

/// Transmission failure.
#[derive(Debug)]
pub enum TransmitError {
    /// Package is not in `draft`.
    NotDraft,
    /// Attachments are not all completed.
    IncompleteAttachments,
    /// Criteria resolved to no recipient.
    NoRecipients,
    PackageNotFound(PackageId),
    /// Stored criteria no longer pass the active profile.
    Criteria(CriteriaError),
    Repo(RepoError),
}

impl TransmitError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotDraft => "not_draft",
            Self::IncompleteAttachments => "no_completed_attachments",
            Self::NoRecipients => "no_recipients",
            Self::PackageNotFound(_) => "package_not_found",
            Self::Criteria(_) => "invalid_criteria",
            Self::Repo(_) => "storage_error",
        }
    }
}

impl Display for TransmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDraft => write!(f, "package must be draft to be transmitted"),
            Self::IncompleteAttachments => write!(f, "package has no completed attachments"),
            Self::NoRecipients => write!(f, "delivery criteria match no recipient"),
            Self::PackageNotFound(id) => write!(f, "data package not found: {id}"),
            Self::Criteria(err) => write!(f, "invalid criteria: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransmitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Criteria(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TransmitError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for TransmitError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<TransitionError> for TransmitError {
    fn from(value: TransitionError) -> Self {
        match value.reason {
            TransitionFailure::IncompleteAttachments => Self::IncompleteAttachments,
            TransitionFailure::NotDraft | TransitionFailure::NotTransmitted => Self::NotDraft,
        }
    }
}

impl From<ResolveError> for TransmitError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::Criteria(err) => Self::Criteria(err),
            ResolveError::Repo(err) => Self::Repo(err),
            ResolveError::StreamNotFound(id) => Self::Repo(RepoError::not_found("data stream", id)),
        }
    }
}

/// State shared by the transmission steps of one attempt.
#[derive(Debug)]
struct TransmitContext {
    package_id: PackageId,
    package: Option<DataPackage>,
    recipients: BTreeSet<SubscriptionId>,
    created_notifications: usize,
}

impl TransmitContext {
    fn package(&self) -> Result<&DataPackage, TransmitError> {
        self.package
            .as_ref()
            .ok_or(TransmitError::PackageNotFound(self.package_id))
    }
}

/// Transmission use-case over an attachment predicate.
pub struct TransmissionService<A: AttachmentCheck> {
    attachments: A,
    criteria: CriteriaConfig,
}

impl<A: AttachmentCheck> TransmissionService<A> {
    pub fn new(attachments: A, criteria: CriteriaConfig) -> Self {
        Self {
            attachments,
            criteria,
        }
    }

    /// Transmits `package` and returns its persisted `transmitted` form.
    ///
    /// The package is re-read inside the transaction; the caller's copy is
    /// only used for its id.
    pub fn transmit(
        &self,
        conn: &mut Connection,
        package: &DataPackage,
    ) -> Result<DataPackage, TransmitError> {
        let started_at = Instant::now();
        let package_id = package.id;
        info!("event=package_transmit module=service status=start package_id={package_id}");

        let result = self.transmit_in_transaction(conn, package_id);
        match &result {
            Ok(package) => info!(
                "event=package_transmit module=service status=ok package_id={package_id} sent_at={} duration_ms={}",
                package.sent_at.unwrap_or_default(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=package_transmit module=service status=error package_id={package_id} error_code={} duration_ms={}",
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    fn transmit_in_transaction(
        &self,
        conn: &mut Connection,
        package_id: PackageId,
    ) -> Result<DataPackage, TransmitError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut context = TransmitContext {
            package_id,
            package: None,
            recipients: BTreeSet::new(),
            created_notifications: 0,
        };

        let outcome = {
            let packages = SqlitePackageRepository::new(&tx);
            let directory = SqliteDirectory::new(&tx);
            let saga = self.saga(&packages, &directory);
            saga.run(&mut context)
        };

        match outcome {
            Ok(()) => {
                tx.commit()?;
                info!(
                    "event=package_transmit module=service status=committed package_id={package_id} recipients={} notifications_created={}",
                    context.recipients.len(),
                    context.created_notifications
                );
                context
                    .package
                    .ok_or(TransmitError::PackageNotFound(package_id))
            }
            Err(failure) => {
                // Compensations only unwind completed steps; the rollback also
                // discards partial writes of the failing step.
                tx.rollback()?;
                if !failure.fully_compensated() {
                    error!(
                        "event=package_transmit module=service status=rolled_back package_id={package_id} failed_step={} compensation_errors={}",
                        failure.step,
                        failure.compensation_errors.len()
                    );
                }
                Err(failure.error)
            }
        }
    }

    fn saga<'s>(
        &'s self,
        packages: &'s SqlitePackageRepository<'s>,
        directory: &'s SqliteDirectory<'s>,
    ) -> Saga<'s, TransmitContext, TransmitError> {
        Saga::new("transmit")
            .step(SagaStep::new(STEP_VALIDATE_PRECONDITIONS, move |ctx: &mut TransmitContext| {
                self.validate_preconditions(packages, ctx)
            }))
            .step(SagaStep::new(STEP_RESOLVE_RECIPIENTS, move |ctx: &mut TransmitContext| {
                self.resolve_recipients(directory, ctx)
            }))
            .step(
                SagaStep::new(STEP_MATERIALIZE_NOTIFICATIONS, move |ctx: &mut TransmitContext| {
                    materialize_notifications(packages, ctx)
                })
                .with_compensation(move |ctx: &mut TransmitContext| {
                    packages.delete_notifications(ctx.package_id)?;
                    ctx.created_notifications = 0;
                    Ok(())
                }),
            )
            .step(SagaStep::new(STEP_TRANSITION_TO_TRANSMITTED, move |ctx: &mut TransmitContext| {
                self.transition_to_transmitted(packages, ctx)
            }))
    }

    fn validate_preconditions(
        &self,
        packages: &SqlitePackageRepository<'_>,
        ctx: &mut TransmitContext,
    ) -> Result<(), TransmitError> {
        let package = packages
            .get_package(ctx.package_id)?
            .ok_or(TransmitError::PackageNotFound(ctx.package_id))?;
        package.check_send(&self.attachments)?;
        ctx.package = Some(package);
        Ok(())
    }

    fn resolve_recipients(
        &self,
        directory: &SqliteDirectory<'_>,
        ctx: &mut TransmitContext,
    ) -> Result<(), TransmitError> {
        let package = ctx.package()?;
        let resolver = Resolver::new(directory, &self.criteria);
        let recipients =
            resolver.resolve_value(package.delivery_criteria.as_ref(), package.data_stream_id)?;
        if recipients.is_empty() {
            return Err(TransmitError::NoRecipients);
        }
        ctx.recipients = recipients;
        Ok(())
    }

    fn transition_to_transmitted(
        &self,
        packages: &SqlitePackageRepository<'_>,
        ctx: &mut TransmitContext,
    ) -> Result<(), TransmitError> {
        let mut package = ctx.package()?.clone();
        package.send(&self.attachments, now_epoch_ms())?;

        let sent_at = package.sent_at.unwrap_or_else(now_epoch_ms);
        if !packages.mark_transmitted(package.id, sent_at)? {
            return Err(TransmitError::NotDraft);
        }
        ctx.package = Some(package);
        Ok(())
    }
}

fn materialize_notifications(
    packages: &SqlitePackageRepository<'_>,
    ctx: &mut TransmitContext,
) -> Result<(), TransmitError> {
    let existing = packages.notification_subscription_ids(ctx.package_id)?;
    let mut created = 0;
    for subscription_id in ctx.recipients.difference(&existing) {
        packages.insert_notification(&Notification::new(ctx.package_id, *subscription_id))?;
        created += 1;
    }
    ctx.created_notifications = created;
    Ok(())
}
