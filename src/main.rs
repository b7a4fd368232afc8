use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

use config::AppConfig;
use errors::InitResult;
use models::catalog::{CatalogSpec, S3SecretSpec};
use services::{
    bucket_service::{self, BucketStore, S3BucketStore},
    catalog_service::{self, SqlEngine},
    idle_service::{self, IdleKeeper},
    readiness_service,
};

const COMPLETION_MESSAGE: &str = "DuckLake init complete; container is now running.";

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Config: fails before any network I/O ---
    let (cfg, args) = AppConfig::from_env_and_args()?;
    tracing::info!("Starting ducklake-init with config: {:?}", cfg);

    // --- Wait for dependencies ---
    let policy = args.readiness_policy();
    readiness_service::wait_for_postgres(&cfg, &policy).await?;
    readiness_service::wait_for_storage(&cfg, &policy).await?;

    // --- Bucket + catalog ---
    let store = S3BucketStore::connect(&cfg).await;
    let engine = catalog_service::open_engine()?;
    provision(&cfg, &store, &engine, args.with_s3_secret).await?;

    println!("{}", COMPLETION_MESSAGE);

    if args.once {
        tracing::info!("--once given, exiting after setup");
        return Ok(());
    }

    // `engine` stays alive for as long as we idle.
    IdleKeeper::default()
        .run_until(idle_service::shutdown_signal())
        .await;
    drop(engine);

    Ok(())
}

/// Ensure the bucket, then attach the catalog on `engine`.
async fn provision<S, E>(
    cfg: &AppConfig,
    store: &S,
    engine: &E,
    with_s3_secret: bool,
) -> InitResult<()>
where
    S: BucketStore,
    E: SqlEngine,
{
    bucket_service::ensure_bucket(store, &cfg.bucket).await?;

    let secret = if with_s3_secret {
        Some(S3SecretSpec::from_config(cfg)?)
    } else {
        None
    };

    // DuckDB runs synchronously on this thread, INSTALL included. Nothing
    // else is in flight at this point, so the runtime is not starved.
    catalog_service::attach_catalog(engine, &CatalogSpec::from_config(cfg), secret.as_ref())
}
