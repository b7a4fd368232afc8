//! Readiness probes for the catalog database and the object store.
//!
//! Both probes share one bounded, fixed-interval polling loop. Every
//! failure cause (refused, auth not ready, DNS, non-200, per-attempt
//! timeout) is treated the same: log it and try again until the deadline.

use crate::{
    config::AppConfig,
    errors::{InitError, InitResult},
};
use sqlx::{Connection, postgres::PgConnectOptions, postgres::PgConnection};
use std::{future::Future, time::Duration};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info};

/// Sub-path MinIO serves its unauthenticated liveness check on.
pub const STORAGE_HEALTH_PATH: &str = "/minio/health/live";

/// Timing for a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Overall deadline, measured from the first attempt.
    pub timeout: Duration,
    /// Fixed pause after a failed attempt.
    pub interval: Duration,
    /// Upper bound for one attempt.
    pub attempt_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

/// Poll `probe` until it succeeds or `policy.timeout` elapses.
///
/// Returns the number of attempts made. The pause between attempts is
/// clamped to the remaining time, so exhaustion is reported at the deadline.
pub async fn wait_until_ready<F, Fut>(
    service: &'static str,
    policy: &ReadinessPolicy,
    mut probe: F,
) -> InitResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let started = Instant::now();
    let deadline = started
        .checked_add(policy.timeout)
        .ok_or_else(|| InitError::Configuration {
            variable: "INIT_READY_TIMEOUT_SECS",
            reason: format!("{:?} is too large to schedule", policy.timeout),
        })?;
    let mut attempts = 0u32;

    while Instant::now() < deadline {
        attempts += 1;
        // Never let one attempt run past the deadline.
        let budget = policy
            .attempt_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let outcome = match timeout(budget, probe()).await {
            Ok(result) => result,
            Err(_) => Err(format!("attempt timed out after {:?}", budget)),
        };

        match outcome {
            Ok(()) => {
                info!(service, attempts, elapsed = ?started.elapsed(), "dependency is ready");
                return Ok(attempts);
            }
            Err(cause) => debug!(service, attempt = attempts, %cause, "not ready yet"),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(policy.interval.min(remaining)).await;
    }

    Err(InitError::ReadinessTimeout {
        service,
        waited: policy.timeout,
    })
}

/// Block until PostgreSQL accepts a connection with the configured credentials.
pub async fn wait_for_postgres(cfg: &AppConfig, policy: &ReadinessPolicy) -> InitResult<()> {
    let options = PgConnectOptions::new()
        .host(&cfg.postgres_host)
        .port(cfg.postgres_port)
        .username(&cfg.postgres_user)
        .password(&cfg.postgres_password)
        .database(&cfg.postgres_db);

    info!(
        host = %cfg.postgres_host,
        port = cfg.postgres_port,
        database = %cfg.postgres_db,
        "waiting for postgres"
    );

    wait_until_ready("postgres", policy, || {
        let options = options.clone();
        async move {
            let conn = PgConnection::connect_with(&options)
                .await
                .map_err(|e| e.to_string())?;
            conn.close().await.map_err(|e| e.to_string())
        }
    })
    .await
    .map(|_| ())
}

/// Block until the object store's health endpoint answers `200 OK`.
pub async fn wait_for_storage(cfg: &AppConfig, policy: &ReadinessPolicy) -> InitResult<()> {
    let url = format!("{}{}", cfg.endpoint(), STORAGE_HEALTH_PATH);
    let client = reqwest::Client::builder()
        .timeout(policy.attempt_timeout)
        .build()
        .map_err(|e| InitError::setup("building the health-check client", e.to_string()))?;

    info!(%url, "waiting for object storage");

    wait_until_ready("storage", policy, || {
        let request = client.head(&url);
        async move {
            let resp = request.send().await.map_err(|e| e.to_string())?;
            if resp.status() == reqwest::StatusCode::OK {
                Ok(())
            } else {
                Err(format!("health endpoint returned {}", resp.status()))
            }
        }
    })
    .await
    .map(|_| ())
}
