//! Organization model.
//!
//! # Invariants
//! - `siret` is exactly 14 ASCII digits and unique across organizations.
//! - `name` is never blank.

use super::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable organization identifier.
pub type OrganizationId = Uuid;

static SIRET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{14}$").expect("valid siret regex"));

/// Returns whether `value` is a well-formed SIRET (14 ASCII digits).
pub fn is_valid_siret(value: &str) -> bool {
    SIRET_RE.is_match(value)
}

/// An organization that can own streams and hold subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// French establishment tax identifier.
    pub siret: String,
}

impl Organization {
    pub fn new(name: impl Into<String>, siret: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            siret: siret.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }
        if !is_valid_siret(&self.siret) {
            return Err(ValidationError::InvalidSiret(self.siret.clone()));
        }
        Ok(())
    }
}
