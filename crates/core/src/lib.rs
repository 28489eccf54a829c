//! Core business logic for the GradeBook push delivery service.

pub mod services;

pub use services::*;
