//! Data package and notification storage.
//!
//! # Responsibility
//! - Persist packages and their lifecycle transitions.
//! - Persist the notifications materialized by a transmission.
//!
//! # Invariants
//! - State transitions and deletes are conditional on the expected state;
//!   a `false` return means another writer got there first.
//! - A duplicate `(package, subscription)` notification is reported as
//!   `DuplicateNotification`, never ignored.

use super::{parse_uuid_column, RepoError, RepoResult};
use crate::db::ConstraintKind;
use crate::model::notification::{Notification, NotificationId};
use crate::model::package::{DataPackage, PackageId, PackageState};
use crate::model::subscription::SubscriptionId;
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::collections::BTreeSet;

const PACKAGE_SELECT_SQL: &str = "SELECT
    id,
    data_stream_id,
    sender_organization_id,
    title,
    state,
    delivery_criteria,
    sent_at,
    acknowledged_at
FROM data_packages";

/// Repository interface for packages and their notifications.
pub trait PackageRepository {
    fn create_package(&self, package: &DataPackage) -> RepoResult<PackageId>;
    fn get_package(&self, id: PackageId) -> RepoResult<Option<DataPackage>>;
    /// Replaces criteria on a draft. Returns `false` when the package is not
    /// a draft (or does not exist).
    fn update_criteria(&self, id: PackageId, criteria: Option<&Value>) -> RepoResult<bool>;
    /// `draft -> transmitted`. Returns `false` if the package was not a draft.
    fn mark_transmitted(&self, id: PackageId, sent_at: i64) -> RepoResult<bool>;
    /// `transmitted -> acknowledged`. Returns `false` if the package was not
    /// transmitted.
    fn mark_acknowledged(&self, id: PackageId, acknowledged_at: i64) -> RepoResult<bool>;
    /// Deletes a `draft` or `acknowledged` package; its notifications
    /// cascade. Returns `false` when no such package exists.
    fn delete_package(&self, id: PackageId) -> RepoResult<bool>;
    fn insert_notification(&self, notification: &Notification) -> RepoResult<()>;
    fn notification_subscription_ids(
        &self,
        package_id: PackageId,
    ) -> RepoResult<BTreeSet<SubscriptionId>>;
    fn list_notifications(&self, package_id: PackageId) -> RepoResult<Vec<Notification>>;
    /// Deletes every notification of a package; returns the removed count.
    fn delete_notifications(&self, package_id: PackageId) -> RepoResult<usize>;
    /// Stamps `acknowledged_at` once; later calls keep the first timestamp.
    fn acknowledge_notification(&self, id: NotificationId, acknowledged_at: i64) -> RepoResult<()>;
}

/// SQLite-backed package repository.
pub struct SqlitePackageRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePackageRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PackageRepository for SqlitePackageRepository<'_> {
    fn create_package(&self, package: &DataPackage) -> RepoResult<PackageId> {
        package.validate()?;

        self.conn
            .execute(
                "INSERT INTO data_packages (
                    id,
                    data_stream_id,
                    sender_organization_id,
                    title,
                    state,
                    delivery_criteria,
                    sent_at,
                    acknowledged_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    package.id.to_string(),
                    package.data_stream_id.to_string(),
                    package.sender_organization_id.to_string(),
                    package.title.as_deref(),
                    package.state.as_str(),
                    criteria_to_db(package.delivery_criteria.as_ref()),
                    package.sent_at,
                    package.acknowledged_at,
                ],
            )
            .map_err(|err| RepoError::from_write("data package", err))?;

        Ok(package.id)
    }

    fn get_package(&self, id: PackageId) -> RepoResult<Option<DataPackage>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PACKAGE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let package = parse_package_row(row)?;
        Ok(Some(package))
    }

    fn update_criteria(&self, id: PackageId, criteria: Option<&Value>) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE data_packages
             SET
                delivery_criteria = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND state = 'draft';",
            params![id.to_string(), criteria_to_db(criteria)],
        )?;
        Ok(changed == 1)
    }

    fn mark_transmitted(&self, id: PackageId, sent_at: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE data_packages
             SET
                state = 'transmitted',
                sent_at = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND state = 'draft';",
            params![id.to_string(), sent_at],
        )?;
        Ok(changed == 1)
    }

    fn mark_acknowledged(&self, id: PackageId, acknowledged_at: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE data_packages
             SET
                state = 'acknowledged',
                acknowledged_at = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND state = 'transmitted';",
            params![id.to_string(), acknowledged_at],
        )?;
        Ok(changed == 1)
    }

    fn delete_package(&self, id: PackageId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM data_packages
                 WHERE id = ?1
                   AND state IN ('draft', 'acknowledged');",
                [id.to_string()],
            )
            .map_err(|err| RepoError::from_write("data package", err))?;
        Ok(changed == 1)
    }

    fn insert_notification(&self, notification: &Notification) -> RepoResult<()> {
        let inserted = self.conn.execute(
            "INSERT INTO notifications (
                id,
                data_package_id,
                subscription_id,
                acknowledged_at
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                notification.id.to_string(),
                notification.data_package_id.to_string(),
                notification.subscription_id.to_string(),
                notification.acknowledged_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(err) => match RepoError::from_write("notification", err) {
                RepoError::ConstraintViolation {
                    kind: ConstraintKind::Unique,
                    ..
                } => Err(RepoError::DuplicateNotification {
                    package_id: notification.data_package_id,
                    subscription_id: notification.subscription_id,
                }),
                other => Err(other),
            },
        }
    }

    fn notification_subscription_ids(
        &self,
        package_id: PackageId,
    ) -> RepoResult<BTreeSet<SubscriptionId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT subscription_id FROM notifications WHERE data_package_id = ?1;")?;
        let mut rows = stmt.query([package_id.to_string()])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            ids.insert(parse_uuid_column(&id, "notifications.subscription_id")?);
        }
        Ok(ids)
    }

    fn list_notifications(&self, package_id: PackageId) -> RepoResult<Vec<Notification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, data_package_id, subscription_id, acknowledged_at
             FROM notifications
             WHERE data_package_id = ?1
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([package_id.to_string()])?;
        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    fn delete_notifications(&self, package_id: PackageId) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM notifications WHERE data_package_id = ?1;",
            [package_id.to_string()],
        )?;
        Ok(removed)
    }

    fn acknowledge_notification(&self, id: NotificationId, acknowledged_at: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE notifications
             SET
                acknowledged_at = COALESCE(acknowledged_at, ?2),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), acknowledged_at],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("notification", id));
        }
        Ok(())
    }
}

fn criteria_to_db(criteria: Option<&Value>) -> Option<String> {
    criteria.map(Value::to_string)
}

fn parse_package_row(row: &Row<'_>) -> RepoResult<DataPackage> {
    let id: String = row.get("id")?;
    let stream: String = row.get("data_stream_id")?;
    let sender: String = row.get("sender_organization_id")?;

    let state_text: String = row.get("state")?;
    let state = PackageState::parse(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid package state `{state_text}` in data_packages.state"
        ))
    })?;

    let delivery_criteria = match row.get::<_, Option<String>>("delivery_criteria")? {
        Some(text) => Some(serde_json::from_str::<Value>(&text).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid json in data_packages.delivery_criteria: {err}"
            ))
        })?),
        None => None,
    };

    let package = DataPackage {
        id: parse_uuid_column(&id, "data_packages.id")?,
        data_stream_id: parse_uuid_column(&stream, "data_packages.data_stream_id")?,
        sender_organization_id: parse_uuid_column(&sender, "data_packages.sender_organization_id")?,
        title: row.get("title")?,
        state,
        delivery_criteria,
        sent_at: row.get("sent_at")?,
        acknowledged_at: row.get("acknowledged_at")?,
    };
    package.validate()?;
    Ok(package)
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let id: String = row.get("id")?;
    let package: String = row.get("data_package_id")?;
    let subscription: String = row.get("subscription_id")?;
    Ok(Notification {
        id: parse_uuid_column(&id, "notifications.id")?,
        data_package_id: parse_uuid_column(&package, "notifications.data_package_id")?,
        subscription_id: parse_uuid_column(&subscription, "notifications.subscription_id")?,
        acknowledged_at: row.get("acknowledged_at")?,
    })
}
