//! Admission control and batched association loading for the portfolio GraphQL API.
//!
//! Operations are sanitized and costed by the [`services::AdmissionLayer`] before they reach an
//! executor. Resolvers of the customer and order associations go through the request-scoped
//! loaders of a [`context::RequestContext`], so that a list of parents costs one repository call
//! per resolution tick.

pub mod batching;
mod compute_job;
pub mod configuration;
pub mod context;
pub mod demand_control;
pub mod domain;
pub mod error;
mod executable;
pub mod fetchers;
pub mod graphql;
pub mod json_ext;
pub mod repository;
pub mod sanitizer;
pub mod services;
mod spec;

pub use compute_job::set_thread_pool_size;
pub use configuration::Configuration;
pub use context::RequestContext;
pub use executable::main;
pub use spec::FieldCatalog;
pub use spec::FieldClassification;
pub use spec::PORTFOLIO_SCHEMA;
pub use spec::Query;
pub use spec::SpecError;
