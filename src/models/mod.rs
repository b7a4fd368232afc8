//! Value types rendered into requests against the external services.

pub mod catalog;
