//! Subscription model.
//!
//! # Invariants
//! - At least one of `can_read` / `can_write` is true.
//! - Unique per `(data_stream_id, organization_id)`, enforced by storage.
//! - Only `can_read` subscriptions are ever targeted by delivery criteria.

use super::organization::OrganizationId;
use super::stream::StreamId;
use super::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable subscription identifier.
pub type SubscriptionId = Uuid;

/// Grants one organization read and/or write access to one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub data_stream_id: StreamId,
    pub organization_id: OrganizationId,
    pub can_read: bool,
    pub can_write: bool,
}

impl Subscription {
    /// Creates a read-only subscription.
    pub fn reader(data_stream_id: StreamId, organization_id: OrganizationId) -> Self {
        Self::with_permissions(data_stream_id, organization_id, true, false)
    }

    pub fn with_permissions(
        data_stream_id: StreamId,
        organization_id: OrganizationId,
        can_read: bool,
        can_write: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_stream_id,
            organization_id,
            can_read,
            can_write,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.can_read && !self.can_write {
            return Err(ValidationError::NoPermission);
        }
        Ok(())
    }
}
