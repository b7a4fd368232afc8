//! Description of the DuckLake catalog to attach, and the SQL that attaches it.

use crate::{
    config::AppConfig,
    errors::{InitError, InitResult},
};
use url::Url;

/// Name the catalog is attached under.
pub const CATALOG_NAME: &str = "the_ducklake";

/// Name of the optional DuckDB S3 secret.
pub const S3_SECRET_NAME: &str = "ducklake_s3";

/// Extensions installed before attaching.
pub const REQUIRED_EXTENSIONS: [&str; 2] = ["ducklake", "postgres"];

/// Everything needed to render the attach statement.
///
/// Metadata lives in PostgreSQL; table data lives under `data_path`.
#[derive(Clone)]
pub struct CatalogSpec {
    pub name: String,
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_db: String,
    pub pg_user: String,
    pub pg_password: String,
    pub data_path: String,
}

/// Storage credentials rendered into `CREATE SECRET`.
#[derive(Clone)]
pub struct S3SecretSpec {
    pub key_id: String,
    pub secret: String,
    pub region: String,
    /// `host[:port]`, no scheme.
    pub endpoint: String,
    pub use_ssl: bool,
}

impl CatalogSpec {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            name: CATALOG_NAME.to_string(),
            pg_host: cfg.postgres_host.clone(),
            pg_port: cfg.postgres_port,
            pg_db: cfg.postgres_db.clone(),
            pg_user: cfg.postgres_user.clone(),
            pg_password: cfg.postgres_password.clone(),
            data_path: format!("s3://{}/lake/", cfg.bucket),
        }
    }

    /// libpq keyword/value string for the metadata database.
    ///
    /// The port is left out when it is the PostgreSQL default.
    pub fn metadata_dsn(&self) -> String {
        let mut parts = vec![
            format!("dbname={}", libpq_value(&self.pg_db)),
            format!("host={}", libpq_value(&self.pg_host)),
        ];
        if self.pg_port != 5432 {
            parts.push(format!("port={}", self.pg_port));
        }
        parts.push(format!("user={}", libpq_value(&self.pg_user)));
        parts.push(format!("password={}", libpq_value(&self.pg_password)));
        parts.join(" ")
    }

    pub fn attach_statement(&self) -> String {
        format!(
            "ATTACH IF NOT EXISTS {} AS {} (DATA_PATH {});",
            sql_literal(&format!("ducklake:postgres:{}", self.metadata_dsn())),
            self.name,
            sql_literal(&self.data_path),
        )
    }

    pub fn use_statement(&self) -> String {
        format!("USE {};", self.name)
    }
}

impl S3SecretSpec {
    /// Derive the secret from the storage settings.
    ///
    /// Fails when `AWS_ENDPOINT_URL` is not an absolute URL with a host.
    pub fn from_config(cfg: &AppConfig) -> InitResult<Self> {
        let invalid = |reason: String| InitError::Configuration {
            variable: "AWS_ENDPOINT_URL",
            reason,
        };
        let url = Url::parse(cfg.endpoint())
            .map_err(|e| invalid(format!("`{}` is not a URL: {}", cfg.aws_endpoint_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid(format!("`{}` has no host", cfg.aws_endpoint_url)))?;
        let endpoint = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            key_id: cfg.aws_access_key_id.clone(),
            secret: cfg.aws_secret_access_key.clone(),
            region: cfg.aws_region.clone(),
            endpoint,
            use_ssl: url.scheme() == "https",
        })
    }

    pub fn create_statement(&self) -> String {
        format!(
            "CREATE OR REPLACE SECRET {} (TYPE s3, KEY_ID {}, SECRET {}, REGION {}, ENDPOINT {}, URL_STYLE 'path', USE_SSL {});",
            S3_SECRET_NAME,
            sql_literal(&self.key_id),
            sql_literal(&self.secret),
            sql_literal(&self.region),
            sql_literal(&self.endpoint),
            self.use_ssl,
        )
    }
}

/// Quote a string as a SQL literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a libpq connection-string value when it would otherwise split or
/// terminate early.
pub fn libpq_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
