//! Implementation of the various steps in the request pipeline.

pub mod admission;

pub use admission::AdmissionGuard;
pub use admission::AdmissionLayer;
pub use admission::AdmissionService;
pub use admission::Admitted;
