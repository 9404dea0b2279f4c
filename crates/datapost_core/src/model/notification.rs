//! Notification model.
//!
//! A notification is the durable record that one subscription was targeted
//! by one package transmission.
//!
//! # Invariants
//! - Unique per `(data_package_id, subscription_id)`.
//! - Created only by the transmission saga.

use super::package::PackageId;
use super::subscription::SubscriptionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable notification identifier.
pub type NotificationId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub data_package_id: PackageId,
    pub subscription_id: SubscriptionId,
    /// Set once the recipient acknowledged reception.
    pub acknowledged_at: Option<i64>,
}

impl Notification {
    pub fn new(data_package_id: PackageId, subscription_id: SubscriptionId) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_package_id,
            subscription_id,
            acknowledged_at: None,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}
