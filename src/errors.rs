//! Error kinds surfaced by the bootstrap sequence.
//!
//! Every variant is fatal: `main` propagates it, the message lands on
//! stderr and the process exits non-zero.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    /// A setting is missing, empty, or cannot be parsed.
    #[error("configuration error: `{variable}` {reason}")]
    Configuration {
        variable: &'static str,
        reason: String,
    },

    /// A dependency did not become reachable before the deadline.
    #[error("{service} did not become ready within {waited:?}")]
    ReadinessTimeout {
        service: &'static str,
        waited: Duration,
    },

    /// Bucket or catalog setup failed.
    #[error("setup failed while {step}: {message}")]
    Setup { step: &'static str, message: String },
}

pub type InitResult<T> = Result<T, InitError>;

impl InitError {
    /// Shortcut for a required variable that is absent or blank.
    pub fn missing(variable: &'static str) -> Self {
        Self::Configuration {
            variable,
            reason: "must be set to a non-empty value".into(),
        }
    }

    pub fn setup(step: &'static str, message: impl Into<String>) -> Self {
        Self::Setup {
            step,
            message: message.into(),
        }
    }
}
