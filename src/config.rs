use crate::errors::{InitError, InitResult};
use crate::services::readiness_service::ReadinessPolicy;
use clap::Parser;
use std::{env, fmt, time::Duration};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_POSTGRES_HOST: &str = "postgres";
const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Connection settings for the catalog database and the object store.
///
/// Loaded once at startup and handed to each stage; nothing downstream
/// reads the environment itself.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub aws_region: String,
    pub aws_endpoint_url: String,
    pub bucket: String,
}

/// Command-line knobs. All optional; the binary normally runs without arguments.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Bootstrap a DuckLake catalog on PostgreSQL + S3")]
pub struct Args {
    /// Overall seconds to wait for each dependency
    #[arg(
        long,
        env = "INIT_READY_TIMEOUT_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=86_400)
    )]
    pub ready_timeout: u64,

    /// Milliseconds between readiness attempts
    #[arg(
        long,
        env = "INIT_POLL_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..=3_600_000)
    )]
    pub poll_interval: u64,

    /// Seconds allowed for a single readiness attempt
    #[arg(
        long,
        env = "INIT_PROBE_TIMEOUT_SECS",
        default_value_t = 2,
        value_parser = clap::value_parser!(u64).range(1..=3_600)
    )]
    pub probe_timeout: u64,

    /// Register a DuckDB S3 secret built from the storage credentials
    #[arg(long)]
    pub with_s3_secret: bool,

    /// Exit after setup instead of idling
    #[arg(long)]
    pub once: bool,
}

impl Args {
    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_secs(self.ready_timeout),
            interval: Duration::from_millis(self.poll_interval),
            attempt_timeout: Duration::from_secs(self.probe_timeout),
        }
    }
}

impl AppConfig {
    /// Parse CLI args, then read the connection settings from the process environment.
    pub fn from_env_and_args() -> InitResult<(Self, Args)> {
        let args = Args::parse();
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;
        Ok((cfg, args))
    }

    /// Build the config from any key/value source.
    ///
    /// Required values that are absent or blank fail with
    /// [`InitError::Configuration`] naming the first offending variable.
    pub fn from_lookup<F>(lookup: F) -> InitResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> InitResult<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| InitError::missing(key))
        };
        let optional = |key: &'static str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let postgres_user = required("POSTGRES_USER")?;
        let postgres_password = required("POSTGRES_PASSWORD")?;
        let postgres_db = required("POSTGRES_DB")?;
        let aws_access_key_id = required("AWS_ACCESS_KEY_ID")?;
        let aws_secret_access_key = required("AWS_SECRET_ACCESS_KEY")?;
        let aws_endpoint_url = required("AWS_ENDPOINT_URL")?;
        let bucket = required("BUCKET")?;

        let postgres_port = match lookup("POSTGRES_PORT").filter(|v| !v.trim().is_empty()) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|err| InitError::Configuration {
                    variable: "POSTGRES_PORT",
                    reason: format!("value `{}` is not a port: {}", value, err),
                })?,
            None => DEFAULT_POSTGRES_PORT,
        };

        Ok(Self {
            postgres_user,
            postgres_password,
            postgres_db,
            postgres_host: optional("POSTGRES_HOST", DEFAULT_POSTGRES_HOST),
            postgres_port,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region: optional("AWS_REGION", DEFAULT_REGION),
            aws_endpoint_url,
            bucket,
        })
    }

    /// Storage endpoint without a trailing slash, ready for path joins.
    pub fn endpoint(&self) -> &str {
        self.aws_endpoint_url.trim_end_matches('/')
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("postgres_user", &self.postgres_user)
            .field("postgres_password", &"<redacted>")
            .field("postgres_db", &self.postgres_db)
            .field("postgres_host", &self.postgres_host)
            .field("postgres_port", &self.postgres_port)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .field("aws_region", &self.aws_region)
            .field("aws_endpoint_url", &self.aws_endpoint_url)
            .field("bucket", &self.bucket)
            .finish()
    }
}
