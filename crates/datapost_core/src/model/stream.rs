//! Data stream model.

use super::organization::OrganizationId;
use super::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable data stream identifier.
pub type StreamId = Uuid;

/// Default retention applied to newly created streams.
pub const DEFAULT_RETENTION_DAYS: i64 = 365;

/// A named channel that packages are published on and organizations subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStream {
    pub id: StreamId,
    pub name: String,
    pub description: Option<String>,
    pub owner_organization_id: OrganizationId,
    pub retention_days: Option<i64>,
}

impl DataStream {
    pub fn new(name: impl Into<String>, owner_organization_id: OrganizationId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            owner_organization_id,
            retention_days: Some(DEFAULT_RETENTION_DAYS),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }
        match self.retention_days {
            Some(days) if days <= 0 => Err(ValidationError::InvalidRetentionDays(days)),
            _ => Ok(()),
        }
    }
}
