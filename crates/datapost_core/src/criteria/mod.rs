//! Delivery-criteria engine.
//!
//! # Responsibility
//! - Parse criteria documents into a typed expression tree (`CriteriaExpr`).
//! - Validate documents at write time against the active profile.
//! - Resolve expressions to the set of read-permitted subscriptions on a stream.
//!
//! # Invariants
//! - Validation and resolution accept exactly the same grammar and report
//!   the same error kinds.
//! - Resolution never mutates storage.
//! - Fail-fast: the first violation aborts; no partial result is returned.

pub mod error;
pub mod evaluator;
pub mod expr;
pub mod kind;
pub mod profile;
pub mod resolver;
pub mod validator;

pub use error::CriteriaError;
pub use expr::CriteriaExpr;
pub use kind::CriterionKind;
pub use profile::{CriteriaConfig, CriteriaProfile};
pub use resolver::{ResolveError, Resolver};
pub use validator::{check_expr, validate_criteria};
