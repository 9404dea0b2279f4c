//! Organization, stream and subscription storage.
//!
//! # Responsibility
//! - Expose the read-only lookups the criteria evaluators depend on
//!   (`SubscriptionDirectory`).
//! - Provide CRUD helpers for directory records.
//!
//! # Invariants
//! - Lookups used for delivery only return subscriptions with `can_read = 1`
//!   on the requested stream.
//! - A subscription referenced by notifications is never deleted.

use super::{bool_to_int, int_to_bool, parse_uuid_column, placeholders, RepoError, RepoResult};
use crate::model::organization::{Organization, OrganizationId};
use crate::model::stream::{DataStream, StreamId};
use crate::model::subscription::{Subscription, SubscriptionId};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Read-only directory lookups used by criterion evaluators.
pub trait SubscriptionDirectory {
    fn find_stream(&self, id: StreamId) -> RepoResult<Option<DataStream>>;
    /// Organizations whose SIRET exactly matches one of `sirets`.
    fn organization_ids_by_siret(&self, sirets: &[String]) -> RepoResult<Vec<OrganizationId>>;
    /// Readable subscriptions on `stream` held by any of `organizations`.
    fn readable_subscriptions_for_organizations(
        &self,
        stream: StreamId,
        organizations: &[OrganizationId],
    ) -> RepoResult<BTreeSet<SubscriptionId>>;
    /// Readable subscriptions on `stream` among `subscriptions`.
    fn readable_subscriptions_by_id(
        &self,
        stream: StreamId,
        subscriptions: &[SubscriptionId],
    ) -> RepoResult<BTreeSet<SubscriptionId>>;
}

/// SQLite-backed directory.
///
/// Accepts a plain connection or a transaction through deref.
pub struct SqliteDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectory<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn create_organization(&self, organization: &Organization) -> RepoResult<OrganizationId> {
        organization.validate()?;
        self.conn
            .execute(
                "INSERT INTO organizations (id, name, siret) VALUES (?1, ?2, ?3);",
                params![
                    organization.id.to_string(),
                    organization.name.as_str(),
                    organization.siret.as_str(),
                ],
            )
            .map_err(|err| RepoError::from_write("organization", err))?;
        Ok(organization.id)
    }

    pub fn get_organization(&self, id: OrganizationId) -> RepoResult<Option<Organization>> {
        self.conn
            .query_row(
                "SELECT id, name, siret FROM organizations WHERE id = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>("id")?,
                        row.get::<_, String>("name")?,
                        row.get::<_, String>("siret")?,
                    ))
                },
            )
            .optional()?
            .map(|(id, name, siret)| {
                Ok(Organization {
                    id: parse_uuid_column(&id, "organizations.id")?,
                    name,
                    siret,
                })
            })
            .transpose()
    }

    pub fn create_stream(&self, stream: &DataStream) -> RepoResult<StreamId> {
        stream.validate()?;
        self.conn
            .execute(
                "INSERT INTO data_streams (
                    id,
                    name,
                    description,
                    owner_organization_id,
                    retention_days
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    stream.id.to_string(),
                    stream.name.as_str(),
                    stream.description.as_deref(),
                    stream.owner_organization_id.to_string(),
                    stream.retention_days,
                ],
            )
            .map_err(|err| RepoError::from_write("data stream", err))?;
        Ok(stream.id)
    }

    pub fn create_subscription(&self, subscription: &Subscription) -> RepoResult<SubscriptionId> {
        subscription.validate()?;
        self.conn
            .execute(
                "INSERT INTO subscriptions (
                    id,
                    data_stream_id,
                    organization_id,
                    can_read,
                    can_write
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    subscription.id.to_string(),
                    subscription.data_stream_id.to_string(),
                    subscription.organization_id.to_string(),
                    bool_to_int(subscription.can_read),
                    bool_to_int(subscription.can_write),
                ],
            )
            .map_err(|err| RepoError::from_write("subscription", err))?;
        Ok(subscription.id)
    }

    pub fn get_subscription(&self, id: SubscriptionId) -> RepoResult<Option<Subscription>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, data_stream_id, organization_id, can_read, can_write
             FROM subscriptions
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let subscription = parse_subscription_row(row)?;
        Ok(Some(subscription))
    }

    /// Lists subscriptions by id, ordered by organization for stable output.
    pub fn list_subscriptions(&self, ids: &[SubscriptionId]) -> RepoResult<Vec<Subscription>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, data_stream_id, organization_id, can_read, can_write
             FROM subscriptions
             WHERE id IN ({})
             ORDER BY organization_id ASC, id ASC;",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(ids.iter().map(|id| id.to_string())))?;
        let mut subscriptions = Vec::with_capacity(ids.len());
        while let Some(row) = rows.next()? {
            subscriptions.push(parse_subscription_row(row)?);
        }
        Ok(subscriptions)
    }

    /// Deletes a subscription that has never been notified.
    ///
    /// # Errors
    /// - `SubscriptionHasNotifications` when delivery history references it.
    /// - `NotFound` when no row matches.
    pub fn delete_subscription(&self, id: SubscriptionId) -> RepoResult<()> {
        let notifications: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE subscription_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if notifications > 0 {
            return Err(RepoError::SubscriptionHasNotifications {
                subscription_id: id,
                notifications: notifications.unsigned_abs(),
            });
        }

        let changed = self
            .conn
            .execute("DELETE FROM subscriptions WHERE id = ?1;", [id.to_string()])
            .map_err(|err| RepoError::from_write("subscription", err))?;
        if changed == 0 {
            return Err(RepoError::not_found("subscription", id));
        }

        info!("event=subscription_delete module=repo status=ok subscription_id={id}");
        Ok(())
    }

    fn readable_subscriptions_where(
        &self,
        stream: StreamId,
        column: &str,
        ids: &[Uuid],
    ) -> RepoResult<BTreeSet<SubscriptionId>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let sql = format!(
            "SELECT id
             FROM subscriptions
             WHERE data_stream_id = ?
               AND can_read = 1
               AND {column} IN ({});",
            placeholders(ids.len())
        );
        let mut bind_values = Vec::with_capacity(ids.len() + 1);
        bind_values.push(Value::Text(stream.to_string()));
        bind_values.extend(ids.iter().map(|id| Value::Text(id.to_string())));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut found = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            found.insert(parse_uuid_column(&id, "subscriptions.id")?);
        }
        Ok(found)
    }
}

impl SubscriptionDirectory for SqliteDirectory<'_> {
    fn find_stream(&self, id: StreamId) -> RepoResult<Option<DataStream>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, owner_organization_id, retention_days
             FROM data_streams
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let id: String = row.get("id")?;
        let owner: String = row.get("owner_organization_id")?;
        Ok(Some(DataStream {
            id: parse_uuid_column(&id, "data_streams.id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            owner_organization_id: parse_uuid_column(&owner, "data_streams.owner_organization_id")?,
            retention_days: row.get("retention_days")?,
        }))
    }

    fn organization_ids_by_siret(&self, sirets: &[String]) -> RepoResult<Vec<OrganizationId>> {
        if sirets.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id FROM organizations WHERE siret IN ({}) ORDER BY id ASC;",
            placeholders(sirets.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(sirets.iter()))?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            ids.push(parse_uuid_column(&id, "organizations.id")?);
        }
        Ok(ids)
    }

    fn readable_subscriptions_for_organizations(
        &self,
        stream: StreamId,
        organizations: &[OrganizationId],
    ) -> RepoResult<BTreeSet<SubscriptionId>> {
        self.readable_subscriptions_where(stream, "organization_id", organizations)
    }

    fn readable_subscriptions_by_id(
        &self,
        stream: StreamId,
        subscriptions: &[SubscriptionId],
    ) -> RepoResult<BTreeSet<SubscriptionId>> {
        self.readable_subscriptions_where(stream, "id", subscriptions)
    }
}

fn parse_subscription_row(row: &Row<'_>) -> RepoResult<Subscription> {
    let id: String = row.get("id")?;
    let stream: String = row.get("data_stream_id")?;
    let organization: String = row.get("organization_id")?;
    let subscription = Subscription {
        id: parse_uuid_column(&id, "subscriptions.id")?,
        data_stream_id: parse_uuid_column(&stream, "subscriptions.data_stream_id")?,
        organization_id: parse_uuid_column(&organization, "subscriptions.organization_id")?,
        can_read: int_to_bool(row.get("can_read")?, "subscriptions.can_read")?,
        can_write: int_to_bool(row.get("can_write")?, "subscriptions.can_write")?,
    };
    subscription.validate()?;
    Ok(subscription)
}
