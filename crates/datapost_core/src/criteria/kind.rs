//! Recognized criterion types and operator keys.

use serde::{Deserialize, Serialize};

/// Key prefix reserved for boolean operators.
pub const OPERATOR_PREFIX: char = '_';
/// Union operator key.
pub const OPERATOR_OR: &str = "_or";
/// Intersection operator key.
pub const OPERATOR_AND: &str = "_and";

/// Criteria document key for SIRET matching.
pub const CRITERION_SIRET: &str = "siret";
/// Criteria document key for direct organization matching.
pub const CRITERION_ORGANIZATION_ID: &str = "organization_id";
/// Criteria document key for direct subscription matching.
pub const CRITERION_SUBSCRIPTION_ID: &str = "subscription_id";

/// Closed set of leaf criterion types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    /// Organization tax identifier (14 digits).
    Siret,
    /// Organization UUID.
    OrganizationId,
    /// Subscription UUID.
    SubscriptionId,
}

impl CriterionKind {
    pub const ALL: [CriterionKind; 3] = [
        CriterionKind::Siret,
        CriterionKind::OrganizationId,
        CriterionKind::SubscriptionId,
    ];

    /// Stable key used in criteria documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Siret => CRITERION_SIRET,
            Self::OrganizationId => CRITERION_ORGANIZATION_ID,
            Self::SubscriptionId => CRITERION_SUBSCRIPTION_ID,
        }
    }

    /// Parses a document key. Matching is exact and case-sensitive.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            CRITERION_SIRET => Some(Self::Siret),
            CRITERION_ORGANIZATION_ID => Some(Self::OrganizationId),
            CRITERION_SUBSCRIPTION_ID => Some(Self::SubscriptionId),
            _ => None,
        }
    }
}

/// Returns whether `key` uses the operator prefix.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_PREFIX)
}
