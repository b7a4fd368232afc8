//! Catalog attacher: installs the DuckLake extensions on an embedded DuckDB
//! connection and attaches the PostgreSQL-backed catalog.

use crate::{
    errors::{InitError, InitResult},
    models::catalog::{CatalogSpec, REQUIRED_EXTENSIONS, S3SecretSpec},
};
use tracing::{debug, info};

/// Something that can run a SQL statement to completion.
pub trait SqlEngine {
    fn run(&self, statement: &str) -> InitResult<()>;
}

impl SqlEngine for duckdb::Connection {
    fn run(&self, statement: &str) -> InitResult<()> {
        self.execute_batch(statement)
            .map_err(|e| InitError::setup("attaching the catalog", e.to_string()))
    }
}

/// Open the in-memory DuckDB connection the catalog is attached to.
///
/// The connection must outlive the attach for the catalog to stay attached.
pub fn open_engine() -> InitResult<duckdb::Connection> {
    duckdb::Connection::open_in_memory()
        .map_err(|e| InitError::setup("opening the embedded engine", e.to_string()))
}

/// Install extensions, optionally register the S3 secret, attach, then `USE`.
///
/// Stops at the first failing statement.
pub fn attach_catalog<E: SqlEngine>(
    engine: &E,
    spec: &CatalogSpec,
    secret: Option<&S3SecretSpec>,
) -> InitResult<()> {
    for extension in REQUIRED_EXTENSIONS {
        debug!(extension, "installing extension");
        engine.run(&format!("INSTALL {};", extension))?;
    }

    if let Some(secret) = secret {
        engine.run("INSTALL httpfs;")?;
        engine.run(&secret.create_statement())?;
        info!(endpoint = %secret.endpoint, "registered s3 secret");
    }

    info!(
        catalog = %spec.name,
        database = %spec.pg_db,
        host = %spec.pg_host,
        data_path = %spec.data_path,
        "attaching catalog"
    );
    engine.run(&spec.attach_statement())?;
    engine.run(&spec.use_statement())?;

    info!(catalog = %spec.name, "catalog attached and active");
    Ok(())
}
