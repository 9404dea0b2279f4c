//! Structural criteria errors shared by the validator and the resolver.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// First violation found in a criteria document or expression.
///
/// `path` values locate the offending node, e.g. `_or[1]._and[0]`; the root
/// node has an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    NotAHash { path: String },
    ExceedsMaxDepth { max: usize },
    OperatorMustBeArray { operator: String, path: String },
    OperatorMustNotBeEmpty { operator: String, path: String },
    UnknownOperator(String),
    UnsupportedCriterion(String),
    /// More than one criterion in a leaf while implicit AND is disabled.
    ImplicitAndDisabled { path: String },
    TooManyCriteria { max: usize },
    InvalidValue { criterion: String, index: usize },
    EmptyValues { criterion: String },
    TooManyValues { criterion: String, max: usize },
}

impl CriteriaError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAHash { .. } => "not_a_hash",
            Self::ExceedsMaxDepth { .. } => "exceeds_max_depth",
            Self::OperatorMustBeArray { .. } => "operator_must_be_array",
            Self::OperatorMustNotBeEmpty { .. } => "operator_must_not_be_empty",
            Self::UnknownOperator(_) => "unknown_operator",
            Self::UnsupportedCriterion(_) => "unsupported_criterion",
            Self::ImplicitAndDisabled { .. } => "implicit_and_disabled",
            Self::TooManyCriteria { .. } => "too_many_criteria",
            Self::InvalidValue { .. } => "invalid_value",
            Self::EmptyValues { .. } => "empty_values",
            Self::TooManyValues { .. } => "too_many_values",
        }
    }
}

fn located(path: &str) -> &str {
    if path.is_empty() {
        "criteria"
    } else {
        path
    }
}

impl Display for CriteriaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAHash { path } => write!(f, "{} must be a hash", located(path)),
            Self::ExceedsMaxDepth { max } => {
                write!(f, "exceeds maximum nesting depth of {max}")
            }
            Self::OperatorMustBeArray { operator, path } => {
                write!(f, "{} must contain an array", join(path, operator))
            }
            Self::OperatorMustNotBeEmpty { operator, path } => {
                write!(f, "{} must not be empty", join(path, operator))
            }
            Self::UnknownOperator(key) => write!(f, "unknown operator: {key}"),
            Self::UnsupportedCriterion(key) => write!(f, "unsupported criterion: {key}"),
            Self::ImplicitAndDisabled { path } => {
                write!(f, "{} must contain a single criterion", located(path))
            }
            Self::TooManyCriteria { max } => write!(f, "exceeds maximum of {max} criteria"),
            Self::InvalidValue { criterion, index } => {
                write!(f, "{criterion}[{index}] is not a valid value")
            }
            Self::EmptyValues { criterion } => write!(f, "{criterion} must not be empty"),
            Self::TooManyValues { criterion, max } => {
                write!(f, "{criterion} list exceeds maximum of {max}")
            }
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

impl Error for CriteriaError {}
