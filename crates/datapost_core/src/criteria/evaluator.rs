//! Per-kind criterion evaluation.
//!
//! Every evaluator maps a value list to read-permitted subscriptions of one
//! stream. Write-only subscriptions never appear in a result.

use super::kind::CriterionKind;
use crate::model::stream::StreamId;
use crate::model::subscription::SubscriptionId;
use crate::repo::directory_repo::SubscriptionDirectory;
use crate::repo::RepoResult;
use std::collections::BTreeSet;
use uuid::Uuid;

impl CriterionKind {
    /// Selects the readable subscriptions of `stream` matching `values`.
    pub fn evaluate<D>(
        self,
        values: &[String],
        stream: StreamId,
        directory: &D,
    ) -> RepoResult<BTreeSet<SubscriptionId>>
    where
        D: SubscriptionDirectory + ?Sized,
    {
        if values.is_empty() {
            return Ok(BTreeSet::new());
        }

        match self {
            Self::Siret => {
                let organizations = directory.organization_ids_by_siret(values)?;
                if organizations.is_empty() {
                    return Ok(BTreeSet::new());
                }
                directory.readable_subscriptions_for_organizations(stream, &organizations)
            }
            Self::OrganizationId => {
                let organizations = parse_uuids(values);
                if organizations.is_empty() {
                    return Ok(BTreeSet::new());
                }
                directory.readable_subscriptions_for_organizations(stream, &organizations)
            }
            Self::SubscriptionId => {
                let subscriptions = parse_uuids(values);
                if subscriptions.is_empty() {
                    return Ok(BTreeSet::new());
                }
                directory.readable_subscriptions_by_id(stream, &subscriptions)
            }
        }
    }
}

/// Keeps values that parse as UUIDs; anything else matches nothing.
fn parse_uuids(values: &[String]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = values
        .iter()
        .filter_map(|value| Uuid::parse_str(value.trim()).ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
