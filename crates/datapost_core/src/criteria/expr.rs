//! Typed criteria expression tree and its parser.
//!
//! # Responsibility
//! - Convert a stored criteria document (`serde_json::Value`) into
//!   `CriteriaExpr` exactly once, enforcing grammar and limits on the way.
//!
//! # Invariants
//! - The depth check runs before descending into a node.
//! - The leaf criteria counter is global to one document.
//! - Blank documents (`null`, `{}`, `[]`, `""`) parse to `None`.
//! - An operator node is read by key precedence: `_or`, then `_and`.

use super::error::CriteriaError;
use super::kind::{is_operator_key, CriterionKind, OPERATOR_AND, OPERATOR_OR};
use super::profile::CriteriaConfig;
use crate::model::organization::is_valid_siret;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Delivery-criteria expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaExpr {
    /// Criterion kind to accepted values; multiple keys combine with AND.
    Leaf(BTreeMap<CriterionKind, Vec<String>>),
    /// Intersection of sub-expressions.
    And(Vec<CriteriaExpr>),
    /// Union of sub-expressions.
    Or(Vec<CriteriaExpr>),
}

impl CriteriaExpr {
    /// Builds a single-criterion leaf.
    pub fn leaf<I, S>(kind: CriterionKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut criteria = BTreeMap::new();
        criteria.insert(kind, values.into_iter().map(Into::into).collect());
        Self::Leaf(criteria)
    }

    /// Parses a criteria document under `config`.
    ///
    /// Returns `Ok(None)` for blank documents, which select no recipients.
    pub fn parse(value: &Value, config: &CriteriaConfig) -> Result<Option<Self>, CriteriaError> {
        if is_blank(value) {
            return Ok(None);
        }

        let mut parser = Parser {
            config,
            criteria_seen: 0,
        };
        parser.node(value, 0, "").map(Some)
    }

    /// Nesting depth; a bare leaf has depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// Total number of leaf key/value pairs.
    pub fn criteria_count(&self) -> usize {
        match self {
            Self::Leaf(criteria) => criteria.len(),
            Self::And(children) | Self::Or(children) => {
                children.iter().map(Self::criteria_count).sum()
            }
        }
    }
}

/// Blank documents are treated as "no criteria".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

struct Parser<'c> {
    config: &'c CriteriaConfig,
    criteria_seen: usize,
}

impl Parser<'_> {
    fn node(
        &mut self,
        value: &Value,
        depth: usize,
        path: &str,
    ) -> Result<CriteriaExpr, CriteriaError> {
        if depth > self.config.max_depth {
            return Err(CriteriaError::ExceedsMaxDepth {
                max: self.config.max_depth,
            });
        }

        let Value::Object(map) = value else {
            return Err(CriteriaError::NotAHash {
                path: path.to_string(),
            });
        };

        // `_or` wins over `_and`; sibling keys of an operator are ignored.
        let operator = [OPERATOR_OR, OPERATOR_AND]
            .into_iter()
            .find(|operator| map.contains_key(*operator));

        match operator {
            Some(operator) => self.operator(operator, map, depth, path),
            None => self.leaf(map, path),
        }
    }

    fn operator(
        &mut self,
        operator: &'static str,
        map: &Map<String, Value>,
        depth: usize,
        path: &str,
    ) -> Result<CriteriaExpr, CriteriaError> {
        if !self.config.profile.allows_operators() {
            return Err(CriteriaError::UnknownOperator(operator.to_string()));
        }
        let Some(Value::Array(items)) = map.get(operator) else {
            return Err(CriteriaError::OperatorMustBeArray {
                operator: operator.to_string(),
                path: path.to_string(),
            });
        };
        if items.is_empty() {
            return Err(CriteriaError::OperatorMustNotBeEmpty {
                operator: operator.to_string(),
                path: path.to_string(),
            });
        }

        let mut children = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let child_path = if path.is_empty() {
                format!("{operator}[{index}]")
            } else {
                format!("{path}.{operator}[{index}]")
            };
            children.push(self.node(item, depth + 1, &child_path)?);
        }

        Ok(if operator == OPERATOR_OR {
            CriteriaExpr::Or(children)
        } else {
            CriteriaExpr::And(children)
        })
    }

    fn leaf(
        &mut self,
        map: &Map<String, Value>,
        path: &str,
    ) -> Result<CriteriaExpr, CriteriaError> {
        self.criteria_seen += map.len();
        if self.criteria_seen > self.config.max_criteria {
            return Err(CriteriaError::TooManyCriteria {
                max: self.config.max_criteria,
            });
        }

        let mut criteria = BTreeMap::new();
        for (key, raw) in map {
            if is_operator_key(key) {
                return Err(CriteriaError::UnknownOperator(key.clone()));
            }
            let kind = CriterionKind::parse(key)
                .filter(|kind| self.config.supports(*kind))
                .ok_or_else(|| CriteriaError::UnsupportedCriterion(key.clone()))?;
            criteria.insert(kind, raw);
        }

        if criteria.len() > 1 && !self.config.profile.allows_implicit_and() {
            return Err(CriteriaError::ImplicitAndDisabled {
                path: path.to_string(),
            });
        }

        let mut leaf = BTreeMap::new();
        for (kind, raw) in criteria {
            leaf.insert(kind, self.values(kind, raw)?);
        }
        Ok(CriteriaExpr::Leaf(leaf))
    }

    fn values(&self, kind: CriterionKind, raw: &Value) -> Result<Vec<String>, CriteriaError> {
        let invalid = |index| CriteriaError::InvalidValue {
            criterion: kind.as_str().to_string(),
            index,
        };

        let values = match raw {
            Value::Null => Vec::new(),
            Value::String(value) => vec![value.clone()],
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::String(value) => Ok(value.clone()),
                    _ => Err(invalid(index)),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(invalid(0)),
        };

        if let Some(max) = self.config.max_values_per_criterion {
            if values.len() > max {
                return Err(CriteriaError::TooManyValues {
                    criterion: kind.as_str().to_string(),
                    max,
                });
            }
        }

        if self.config.profile.strict_values() {
            if values.is_empty() {
                return Err(CriteriaError::EmptyValues {
                    criterion: kind.as_str().to_string(),
                });
            }
            if kind == CriterionKind::Siret {
                if let Some(index) = values.iter().position(|value| !is_valid_siret(value)) {
                    return Err(invalid(index));
                }
            }
        }

        Ok(values)
    }
}
