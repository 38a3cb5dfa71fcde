//! Persistence layer: libSQL-backed tenant store for companies, invoices,
//! suppliers and notifications.

pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;

use std::path::Path;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;

/// Open the configured database (remote or local file), migrated.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Database>, DatabaseError> {
    let backend = if config.is_remote() {
        LibSqlBackend::new_remote(&config.url, config.auth_token.as_ref()).await?
    } else {
        LibSqlBackend::new_local(Path::new(&config.url)).await?
    };
    Ok(Arc::new(backend))
}
