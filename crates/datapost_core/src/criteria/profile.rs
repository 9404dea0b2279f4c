//! Versioned criteria capabilities.
//!
//! Two generations of the criteria grammar are supported side by side. The
//! active one is chosen through configuration, never inferred from input.

use super::kind::CriterionKind;
use serde::{Deserialize, Serialize};

/// Default maximum operator nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 2;
/// Default maximum number of leaf key/value pairs across one document.
pub const DEFAULT_MAX_CRITERIA: usize = 20;
/// Maximum SIRET list length accepted by the legacy profile.
pub const LEGACY_MAX_SIRETS: usize = 100;

/// Grammar generation accepted by the validator and resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaProfile {
    /// All criterion kinds, `_or`/`_and` operators, implicit AND in leaves.
    #[default]
    Current,
    /// Single `siret` key only; strict 14-digit values; no operators.
    LegacySiretOnly,
}

impl CriteriaProfile {
    pub fn supported_kinds(self) -> &'static [CriterionKind] {
        match self {
            Self::Current => &CriterionKind::ALL,
            Self::LegacySiretOnly => &[CriterionKind::Siret],
        }
    }

    pub fn allows_operators(self) -> bool {
        matches!(self, Self::Current)
    }

    pub fn allows_implicit_and(self) -> bool {
        matches!(self, Self::Current)
    }

    /// Whether leaf values are checked for emptiness and format.
    pub fn strict_values(self) -> bool {
        matches!(self, Self::LegacySiretOnly)
    }
}

/// Criteria engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaConfig {
    pub profile: CriteriaProfile,
    pub max_depth: usize,
    pub max_criteria: usize,
    /// Upper bound on values per criterion key; `None` disables the check.
    pub max_values_per_criterion: Option<usize>,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            profile: CriteriaProfile::Current,
            max_depth: DEFAULT_MAX_DEPTH,
            max_criteria: DEFAULT_MAX_CRITERIA,
            max_values_per_criterion: None,
        }
    }
}

impl CriteriaConfig {
    /// First-generation grammar: `{"siret": [...]}` only.
    pub fn legacy_siret_only() -> Self {
        Self {
            profile: CriteriaProfile::LegacySiretOnly,
            max_values_per_criterion: Some(LEGACY_MAX_SIRETS),
            ..Self::default()
        }
    }

    pub fn supports(&self, kind: CriterionKind) -> bool {
        self.profile.supported_kinds().contains(&kind)
    }
}
