//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and criteria calls into use-case level APIs.
//! - Keep the CLI decoupled from storage details.

pub mod package_service;
pub mod saga;
pub mod transmit_service;

pub use package_service::{generate_title, NewPackage, PackageService, PackageServiceError};
pub use saga::{Saga, SagaFailure, SagaStep};
pub use transmit_service::{TransmissionService, TransmitError};
