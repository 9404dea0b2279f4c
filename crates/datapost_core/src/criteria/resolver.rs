//! Criteria resolution to recipient subscriptions.
//!
//! # Responsibility
//! - Turn a criteria document or expression into the set of readable
//!   subscriptions on one stream.
//!
//! # Invariants
//! - Read-only; no storage writes.
//! - Result is always a subset of the stream's readable subscriptions.
//! - Blank criteria resolve to the empty set without touching storage.

use super::error::CriteriaError;
use super::expr::CriteriaExpr;
use super::profile::CriteriaConfig;
use super::validator::check_expr;
use crate::model::stream::StreamId;
use crate::model::subscription::SubscriptionId;
use crate::repo::directory_repo::SubscriptionDirectory;
use crate::repo::RepoError;
use log::{error, info};
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Resolution failure.
#[derive(Debug)]
pub enum ResolveError {
    Criteria(CriteriaError),
    Repo(RepoError),
    StreamNotFound(StreamId),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Criteria(err) => write!(f, "invalid criteria: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::StreamNotFound(id) => write!(f, "data stream not found: {id}"),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Criteria(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::StreamNotFound(_) => None,
        }
    }
}

impl From<CriteriaError> for ResolveError {
    fn from(value: CriteriaError) -> Self {
        Self::Criteria(value)
    }
}

impl From<RepoError> for ResolveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Resolves criteria against a subscription directory.
pub struct Resolver<'a, D: SubscriptionDirectory + ?Sized> {
    directory: &'a D,
    config: &'a CriteriaConfig,
}

impl<'a, D: SubscriptionDirectory + ?Sized> Resolver<'a, D> {
    pub fn new(directory: &'a D, config: &'a CriteriaConfig) -> Self {
        Self { directory, config }
    }

    /// Resolves a stored criteria document.
    ///
    /// `None` and blank documents yield the empty set.
    pub fn resolve_value(
        &self,
        criteria: Option<&Value>,
        stream: StreamId,
    ) -> Result<BTreeSet<SubscriptionId>, ResolveError> {
        let Some(value) = criteria else {
            return Ok(BTreeSet::new());
        };
        match CriteriaExpr::parse(value, self.config) {
            Ok(Some(expr)) => self.resolve(&expr, stream),
            Ok(None) => Ok(BTreeSet::new()),
            Err(err) => {
                error!(
                    "event=criteria_resolve module=criteria status=error stream_id={stream} error_code={}",
                    err.code()
                );
                Err(err.into())
            }
        }
    }

    /// Resolves a typed expression.
    pub fn resolve(
        &self,
        expr: &CriteriaExpr,
        stream: StreamId,
    ) -> Result<BTreeSet<SubscriptionId>, ResolveError> {
        let started_at = Instant::now();
        check_expr(expr, self.config)?;

        if self.directory.find_stream(stream)?.is_none() {
            return Err(ResolveError::StreamNotFound(stream));
        }

        let recipients = self.evaluate(expr, stream)?;
        info!(
            "event=criteria_resolve module=criteria status=ok stream_id={stream} depth={} criteria={} recipients={} duration_ms={}",
            expr.depth(),
            expr.criteria_count(),
            recipients.len(),
            started_at.elapsed().as_millis()
        );
        Ok(recipients)
    }

    fn evaluate(
        &self,
        expr: &CriteriaExpr,
        stream: StreamId,
    ) -> Result<BTreeSet<SubscriptionId>, ResolveError> {
        match expr {
            CriteriaExpr::Or(children) => {
                let mut union = BTreeSet::new();
                for child in children {
                    union.extend(self.evaluate(child, stream)?);
                }
                Ok(union)
            }
            CriteriaExpr::And(children) => {
                let mut sets = children.iter();
                let Some(first) = sets.next() else {
                    return Ok(BTreeSet::new());
                };
                let mut acc = self.evaluate(first, stream)?;
                for child in sets {
                    if acc.is_empty() {
                        break;
                    }
                    let next = self.evaluate(child, stream)?;
                    acc.retain(|id| next.contains(id));
                }
                Ok(acc)
            }
            CriteriaExpr::Leaf(criteria) => {
                let mut acc: Option<BTreeSet<SubscriptionId>> = None;
                for (kind, values) in criteria {
                    let matched = kind.evaluate(values, stream, self.directory)?;
                    acc = Some(match acc {
                        None => matched,
                        Some(mut current) => {
                            current.retain(|id| matched.contains(id));
                            current
                        }
                    });
                    if acc.as_ref().is_some_and(BTreeSet::is_empty) {
                        break;
                    }
                }
                Ok(acc.unwrap_or_default())
            }
        }
    }
}
