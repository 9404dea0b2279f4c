use datapost_core::db::{open_db_in_memory, ConstraintKind};
use datapost_core::model::organization::Organization;
use datapost_core::model::package::TransitionFailure;
use datapost_core::model::stream::DataStream;
use datapost_core::model::subscription::Subscription;
use datapost_core::model::notification::{Notification, NotificationId};
use datapost_core::model::package::PackageId;
use datapost_core::model::subscription::SubscriptionId;
use datapost_core::model::ValidationError;
use datapost_core::{
    CriteriaConfig, CriteriaError, DataPackage, NewPackage, PackageRepository, PackageService,
    PackageServiceError, PackageState, RepoError, SqliteDirectory, SqlitePackageRepository,
    StaticAttachments, TransmissionService,
};
use datapost_core::repo::RepoResult;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use uuid::Uuid;

const SIRET: &str = "13002526500013";
const OTHER_SIRET: &str = "55210055400013";

struct Fixture {
    stream: Uuid,
    sender: Uuid,
    subscription: Uuid,
}

fn seed(conn: &Connection) -> Fixture {
    let directory = SqliteDirectory::new(conn);
    let sender = Organization::new("Sender", "34495448100022");
    let recipient = Organization::new("Recipient", SIRET);
    directory.create_organization(&sender).unwrap();
    directory.create_organization(&recipient).unwrap();

    let stream = DataStream::new("Budget", sender.id);
    directory.create_stream(&stream).unwrap();
    let subscription = Subscription::reader(stream.id, recipient.id);
    directory.create_subscription(&subscription).unwrap();

    Fixture {
        stream: stream.id,
        sender: sender.id,
        subscription: subscription.id,
    }
}

fn service(conn: &Connection) -> PackageService<SqlitePackageRepository<'_>, SqliteDirectory<'_>> {
    PackageService::new(
        SqlitePackageRepository::new(conn),
        SqliteDirectory::new(conn),
        CriteriaConfig::default(),
    )
}

fn new_package(fx: &Fixture, criteria: Option<Value>) -> NewPackage {
    NewPackage {
        data_stream_id: fx.stream,
        sender_organization_id: fx.sender,
        title: None,
        delivery_criteria: criteria,
    }
}

fn transmit(conn: &mut Connection, package: &DataPackage) -> DataPackage {
    TransmissionService::new(StaticAttachments(true), CriteriaConfig::default())
        .transmit(conn, package)
        .unwrap()
}

#[test]
fn create_package_generates_title_from_stream_name() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let package = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();

    assert_eq!(package.state(), PackageState::Draft);
    let title = package.title.unwrap();
    assert!(title.starts_with("Budget-"), "{title}");
    assert_eq!(title.split('-').count(), 4);
}

#[test]
fn create_package_keeps_explicit_title() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let mut input = new_package(&fx, None);
    input.title = Some("Q3 report".to_string());

    let package = service(&conn).create_package(input).unwrap();
    assert_eq!(package.title.as_deref(), Some("Q3 report"));
    assert_eq!(package.delivery_criteria, None);
}

#[test]
fn create_package_rejects_invalid_criteria_before_insert() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);

    let err = service(&conn)
        .create_package(new_package(&fx, Some(json!({"_or": []}))))
        .unwrap_err();

    match err {
        PackageServiceError::InvalidCriteria(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(
                errors[0],
                CriteriaError::OperatorMustNotBeEmpty { .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM data_packages;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn create_package_requires_existing_stream() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let mut input = new_package(&fx, None);
    input.data_stream_id = Uuid::new_v4();

    let err = service(&conn).create_package(input).unwrap_err();
    assert!(matches!(
        err,
        PackageServiceError::NotFound {
            entity: "data stream",
            ..
        }
    ));
}

#[test]
fn criteria_are_editable_only_while_draft() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, None))
        .unwrap();

    let updated = service(&conn)
        .update_criteria(package.id, Some(json!({"siret": [SIRET]})))
        .unwrap();
    assert_eq!(updated.delivery_criteria, Some(json!({"siret": [SIRET]})));

    let err = service(&conn)
        .update_criteria(package.id, Some(json!({"bogus": []})))
        .unwrap_err();
    assert!(matches!(err, PackageServiceError::InvalidCriteria(_)));

    transmit(&mut conn, &updated);
    let err = service(&conn)
        .update_criteria(package.id, None)
        .unwrap_err();
    assert!(matches!(
        err,
        PackageServiceError::CriteriaLocked {
            state: PackageState::Transmitted
        }
    ));
}

#[test]
fn recipients_come_from_resolver_then_from_notifications() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(
            &fx,
            Some(json!({"siret": [SIRET, OTHER_SIRET]})),
        ))
        .unwrap();
    assert_eq!(
        service(&conn).recipients(package.id).unwrap(),
        [fx.subscription].into_iter().collect()
    );

    transmit(&mut conn, &package);

    // A later matching subscriber is predicted by the resolver but was never notified.
    let directory = SqliteDirectory::new(&conn);
    let late = Organization::new("Late", OTHER_SIRET);
    directory.create_organization(&late).unwrap();
    directory
        .create_subscription(&Subscription::reader(fx.stream, late.id))
        .unwrap();

    assert_eq!(
        service(&conn).recipients(package.id).unwrap(),
        [fx.subscription].into_iter().collect()
    );
    assert_eq!(
        service(&conn)
            .preview_recipients(fx.stream, &json!({"siret": [SIRET, OTHER_SIRET]}))
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn acknowledge_requires_transmitted_package() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();

    match service(&conn).acknowledge(package.id).unwrap_err() {
        PackageServiceError::Transition(err) => {
            assert_eq!(err.reason, TransitionFailure::NotTransmitted);
            assert_eq!(err.from, PackageState::Draft);
        }
        other => panic!("unexpected error: {other}"),
    }

    transmit(&mut conn, &package);
    let acknowledged = service(&conn).acknowledge(package.id).unwrap();
    assert_eq!(acknowledged.state(), PackageState::Acknowledged);
    assert!(acknowledged.acknowledged_at.is_some());
    assert!(acknowledged.allowed_events().is_empty());

    assert!(matches!(
        service(&conn).acknowledge(package.id),
        Err(PackageServiceError::Transition(_))
    ));
}

#[test]
fn notification_acknowledgement_keeps_first_timestamp() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();
    transmit(&mut conn, &package);

    let repo = SqlitePackageRepository::new(&conn);
    let notification = repo.list_notifications(package.id).unwrap().remove(0);
    repo.acknowledge_notification(notification.id, 10).unwrap();
    repo.acknowledge_notification(notification.id, 20).unwrap();
    assert_eq!(
        repo.list_notifications(package.id).unwrap()[0].acknowledged_at,
        Some(10)
    );

    assert!(matches!(
        service(&conn).acknowledge_notification(Uuid::new_v4()),
        Err(PackageServiceError::NotFound {
            entity: "notification",
            ..
        })
    ));
}

#[test]
fn destroy_is_refused_while_transmitted() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();
    transmit(&mut conn, &package);

    let err = service(&conn).destroy_package(package.id).unwrap_err();
    assert!(matches!(
        err,
        PackageServiceError::NotDestroyable {
            state: PackageState::Transmitted
        }
    ));
    assert!(service(&conn).get_package(package.id).is_ok());

    service(&conn).acknowledge(package.id).unwrap();
    service(&conn).destroy_package(package.id).unwrap();
    assert!(matches!(
        service(&conn).get_package(package.id),
        Err(PackageServiceError::NotFound { .. })
    ));

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM notifications;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

/// Serves one stale snapshot on the first read, as if another writer
/// committed between the read and the write.
struct StaleFirstRead<'conn> {
    inner: SqlitePackageRepository<'conn>,
    stale: RefCell<Option<DataPackage>>,
}

impl PackageRepository for StaleFirstRead<'_> {
    fn create_package(&self, package: &DataPackage) -> RepoResult<PackageId> {
        self.inner.create_package(package)
    }

    fn get_package(&self, id: PackageId) -> RepoResult<Option<DataPackage>> {
        match self.stale.borrow_mut().take() {
            Some(package) => Ok(Some(package)),
            None => self.inner.get_package(id),
        }
    }

    fn update_criteria(&self, id: PackageId, criteria: Option<&Value>) -> RepoResult<bool> {
        self.inner.update_criteria(id, criteria)
    }

    fn mark_transmitted(&self, id: PackageId, sent_at: i64) -> RepoResult<bool> {
        self.inner.mark_transmitted(id, sent_at)
    }

    fn mark_acknowledged(&self, id: PackageId, acknowledged_at: i64) -> RepoResult<bool> {
        self.inner.mark_acknowledged(id, acknowledged_at)
    }

    fn delete_package(&self, id: PackageId) -> RepoResult<bool> {
        self.inner.delete_package(id)
    }

    fn insert_notification(&self, notification: &Notification) -> RepoResult<()> {
        self.inner.insert_notification(notification)
    }

    fn notification_subscription_ids(
        &self,
        package_id: PackageId,
    ) -> RepoResult<BTreeSet<SubscriptionId>> {
        self.inner.notification_subscription_ids(package_id)
    }

    fn list_notifications(&self, package_id: PackageId) -> RepoResult<Vec<Notification>> {
        self.inner.list_notifications(package_id)
    }

    fn delete_notifications(&self, package_id: PackageId) -> RepoResult<usize> {
        self.inner.delete_notifications(package_id)
    }

    fn acknowledge_notification(&self, id: NotificationId, acknowledged_at: i64) -> RepoResult<()> {
        self.inner.acknowledge_notification(id, acknowledged_at)
    }
}

#[test]
fn destroy_is_refused_when_transmission_lands_after_the_read() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let draft = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();
    transmit(&mut conn, &draft);

    let racing = PackageService::new(
        StaleFirstRead {
            inner: SqlitePackageRepository::new(&conn),
            stale: RefCell::new(Some(draft.clone())),
        },
        SqliteDirectory::new(&conn),
        CriteriaConfig::default(),
    );
    let err = racing.destroy_package(draft.id).unwrap_err();

    assert!(matches!(
        err,
        PackageServiceError::NotDestroyable {
            state: PackageState::Transmitted
        }
    ));
    let repo = SqlitePackageRepository::new(&conn);
    assert!(repo.get_package(draft.id).unwrap().is_some());
    assert_eq!(repo.list_notifications(draft.id).unwrap().len(), 1);
}

#[test]
fn repository_delete_skips_transmitted_package() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();
    transmit(&mut conn, &package);

    let repo = SqlitePackageRepository::new(&conn);
    assert!(!repo.delete_package(package.id).unwrap());
    assert!(!repo.delete_package(Uuid::new_v4()).unwrap());
    assert!(repo.get_package(package.id).unwrap().is_some());
}

#[test]
fn draft_can_be_destroyed() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, None))
        .unwrap();

    service(&conn).destroy_package(package.id).unwrap();
    assert!(SqlitePackageRepository::new(&conn)
        .get_package(package.id)
        .unwrap()
        .is_none());
}

#[test]
fn subscription_with_delivery_history_cannot_be_deleted() {
    let mut conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let package = service(&conn)
        .create_package(new_package(&fx, Some(json!({"siret": [SIRET]}))))
        .unwrap();
    transmit(&mut conn, &package);

    let directory = SqliteDirectory::new(&conn);
    match directory.delete_subscription(fx.subscription).unwrap_err() {
        RepoError::SubscriptionHasNotifications {
            subscription_id,
            notifications,
        } => {
            assert_eq!(subscription_id, fx.subscription);
            assert_eq!(notifications, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(directory.get_subscription(fx.subscription).unwrap().is_some());
}

#[test]
fn unused_subscription_can_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let directory = SqliteDirectory::new(&conn);

    directory.delete_subscription(fx.subscription).unwrap();
    assert!(directory.get_subscription(fx.subscription).unwrap().is_none());
    assert!(matches!(
        directory.delete_subscription(fx.subscription),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn directory_writes_surface_validation_and_constraints() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let directory = SqliteDirectory::new(&conn);

    let duplicate = Organization::new("Copycat", SIRET);
    match directory.create_organization(&duplicate).unwrap_err() {
        RepoError::ConstraintViolation { kind, .. } => assert_eq!(kind, ConstraintKind::Unique),
        other => panic!("unexpected error: {other}"),
    }

    let bad_siret = Organization::new("Typo", "1300252650001");
    assert!(matches!(
        directory.create_organization(&bad_siret),
        Err(RepoError::Validation(ValidationError::InvalidSiret(_)))
    ));

    let no_permission = Subscription::with_permissions(fx.stream, fx.sender, false, false);
    assert!(matches!(
        directory.create_subscription(&no_permission),
        Err(RepoError::Validation(ValidationError::NoPermission))
    ));

    let organization = directory.get_organization(fx.sender).unwrap().unwrap();
    let twice = Subscription::reader(fx.stream, organization.id);
    directory.create_subscription(&twice).unwrap();
    assert!(matches!(
        directory.create_subscription(&Subscription::reader(fx.stream, organization.id)),
        Err(RepoError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            ..
        })
    ));
}
