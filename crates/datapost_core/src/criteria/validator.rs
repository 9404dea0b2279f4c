//! Write-time structural validation of criteria documents.
//!
//! # Responsibility
//! - Reject malformed documents before they are stored on a package.
//! - Re-check typed expressions built in code against the active config.
//!
//! # Invariants
//! - Fail-fast: the returned error list holds exactly the first violation.
//! - Blank documents are valid and select nobody.

use super::error::CriteriaError;
use super::expr::CriteriaExpr;
use super::kind::{OPERATOR_AND, OPERATOR_OR};
use super::profile::CriteriaConfig;
use log::debug;
use serde_json::Value;

/// Validates a raw criteria document.
///
/// Returns every violation found; the engine stops at the first one, so the
/// list has exactly one entry on failure.
pub fn validate_criteria(value: &Value, config: &CriteriaConfig) -> Result<(), Vec<CriteriaError>> {
    match CriteriaExpr::parse(value, config) {
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(
                "event=criteria_validate module=criteria status=error error_code={}",
                err.code()
            );
            Err(vec![err])
        }
    }
}

/// Checks a typed expression against the limits of `config`.
///
/// Expressions produced by `CriteriaExpr::parse` under the same config always
/// pass; this guards expressions assembled by hand or parsed under a looser
/// config.
pub fn check_expr(expr: &CriteriaExpr, config: &CriteriaConfig) -> Result<(), CriteriaError> {
    let mut seen = 0;
    check_node(expr, config, 0, "", &mut seen)
}

fn check_node(
    expr: &CriteriaExpr,
    config: &CriteriaConfig,
    depth: usize,
    path: &str,
    seen: &mut usize,
) -> Result<(), CriteriaError> {
    if depth > config.max_depth {
        return Err(CriteriaError::ExceedsMaxDepth {
            max: config.max_depth,
        });
    }

    let (operator, children) = match expr {
        CriteriaExpr::Leaf(criteria) => {
            *seen += criteria.len();
            if *seen > config.max_criteria {
                return Err(CriteriaError::TooManyCriteria {
                    max: config.max_criteria,
                });
            }
            if let Some(kind) = criteria.keys().find(|kind| !config.supports(**kind)) {
                return Err(CriteriaError::UnsupportedCriterion(kind.as_str().to_string()));
            }
            if criteria.len() > 1 && !config.profile.allows_implicit_and() {
                return Err(CriteriaError::ImplicitAndDisabled {
                    path: path.to_string(),
                });
            }
            if let Some(max) = config.max_values_per_criterion {
                if let Some((kind, _)) = criteria.iter().find(|(_, values)| values.len() > max) {
                    return Err(CriteriaError::TooManyValues {
                        criterion: kind.as_str().to_string(),
                        max,
                    });
                }
            }
            return Ok(());
        }
        CriteriaExpr::And(children) => (OPERATOR_AND, children),
        CriteriaExpr::Or(children) => (OPERATOR_OR, children),
    };

    if !config.profile.allows_operators() {
        return Err(CriteriaError::UnknownOperator(operator.to_string()));
    }
    if children.is_empty() {
        return Err(CriteriaError::OperatorMustNotBeEmpty {
            operator: operator.to_string(),
            path: path.to_string(),
        });
    }

    for (index, child) in children.iter().enumerate() {
        let child_path = if path.is_empty() {
            format!("{operator}[{index}]")
        } else {
            format!("{path}.{operator}[{index}]")
        };
        check_node(child, config, depth + 1, &child_path, seen)?;
    }
    Ok(())
}
