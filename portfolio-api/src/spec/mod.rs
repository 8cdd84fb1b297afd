//! GraphQL document handling: parsing, operation limits and the field catalog.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub(crate) mod operation_limits;
mod query;
mod schema;

use displaydoc::Display;
pub use query::Query;
pub use schema::FieldCatalog;
pub use schema::FieldClassification;
pub use schema::PORTFOLIO_SCHEMA;
use thiserror::Error;

/// GraphQL document errors.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpecError {
    /// parsing error: {0}
    ParsingError(String),
    /// schema error: {0}
    SchemaError(String),
}
