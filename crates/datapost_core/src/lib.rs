//! Core domain logic for datapost.
//! Delivery-criteria routing, package lifecycle and the transmission saga.

pub mod config;
pub mod criteria;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, ConfigError, CoreConfig};
pub use criteria::{
    validate_criteria, CriteriaConfig, CriteriaError, CriteriaExpr, CriteriaProfile,
    CriterionKind, ResolveError, Resolver,
};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_cli_logging, init_logging, logging_status, LoggingError};
pub use model::package::{
    AttachmentCheck, DataPackage, PackageEvent, PackageState, StaticAttachments,
    TransitionError,
};
pub use repo::{
    PackageRepository, RepoError, RepoResult, SqliteDirectory, SqlitePackageRepository,
    SubscriptionDirectory,
};
pub use service::{
    NewPackage, PackageService, PackageServiceError, TransmissionService, TransmitError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
