//! Bootstrap stages, in the order `main` runs them.

pub mod readiness_service;
pub mod bucket_service;
pub mod catalog_service;
pub mod idle_service;
