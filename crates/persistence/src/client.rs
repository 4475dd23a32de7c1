//! SurrealDB client for credential persistence.
//!
//! Provides connection management and schema setup.

use std::path::Path;
use std::sync::Arc;

use provider_core::StoreSettings;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::debug;

use super::error::{PersistenceError, PersistenceResult, from_surrealdb_error};

const SURREALKV_SCHEME: &str = "surrealkv://";

const SCHEMA: &str = "
DEFINE TABLE IF NOT EXISTS credential SCHEMALESS;
DEFINE INDEX IF NOT EXISTS credential_username ON credential FIELDS username UNIQUE;
";

/// Configuration for the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Connection URL (e.g., "mem://", "surrealkv://path")
    pub url: String,
    /// Namespace to use
    pub namespace: String,
    /// Database to use
    pub database: String,
}

impl StoreConfig {
    /// Create an in-memory configuration for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".to_string(),
            namespace: "mysql_provider".to_string(),
            database: "test".to_string(),
        }
    }

    /// Create an on-disk configuration rooted at `path`.
    #[must_use]
    pub fn surrealkv(path: &Path) -> Self {
        Self {
            url: format!("{SURREALKV_SCHEME}{}", path.display()),
            namespace: "mysql_provider".to_string(),
            database: "credentials".to_string(),
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Local directory backing the store, for on-disk engines.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        self.url.strip_prefix(SURREALKV_SCHEME).map(Path::new)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl From<&StoreSettings> for StoreConfig {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            url: settings.url.clone(),
            namespace: settings.namespace.clone(),
            database: settings.database.clone(),
        }
    }
}

/// Connection to the credential database.
#[derive(Debug, Clone)]
pub struct CredentialDb {
    db: Arc<Surreal<Any>>,
    config: StoreConfig,
}

impl CredentialDb {
    /// Connect to the database and make sure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be created, or if the
    /// connection or schema setup fails.
    pub async fn connect(config: StoreConfig) -> PersistenceResult<Self> {
        if let Some(parent) = config.local_path().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PersistenceError::connection_failed(e.to_string()))?;
            }
        }

        let db = Surreal::<Any>::init();

        db.connect(config.url.as_str())
            .await
            .map_err(from_surrealdb_error)?;

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(from_surrealdb_error)?;

        let store = Self {
            db: Arc::new(db),
            config,
        };
        store.initialize_schema().await?;
        debug!(url = %store.config.url, "Connected to credential store");
        Ok(store)
    }

    /// Get a reference to the underlying database client.
    #[must_use]
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Get the store configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn initialize_schema(&self) -> PersistenceResult<()> {
        self.db
            .query(SCHEMA)
            .await
            .map_err(|e| PersistenceError::schema_error(e.to_string()))?
            .check()
            .map_err(|e| PersistenceError::schema_error(e.to_string()))?;
        Ok(())
    }

    /// Check if the database is healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails.
    pub async fn health_check(&self) -> PersistenceResult<()> {
        self.db
            .query("INFO FOR DB")
            .await
            .map_err(from_surrealdb_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_in_memory() {
        let config = StoreConfig::in_memory();
        assert_eq!(config.url, "mem://");
        assert!(config.local_path().is_none());
    }

    #[test]
    fn test_store_config_surrealkv() {
        let config = StoreConfig::surrealkv(Path::new("/var/lib/provider/creds"));
        assert_eq!(config.url, "surrealkv:///var/lib/provider/creds");
        assert_eq!(config.local_path(), Some(Path::new("/var/lib/provider/creds")));
    }

    #[test]
    fn test_store_config_from_settings() {
        let settings = StoreSettings::default();
        let config = StoreConfig::from(&settings).with_database("other");
        assert_eq!(config.url, settings.url);
        assert_eq!(config.namespace, settings.namespace);
        assert_eq!(config.database, "other");
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let store = CredentialDb::connect(StoreConfig::in_memory()).await;
        assert!(store.is_ok());
        if let Ok(store) = store {
            assert!(store.health_check().await.is_ok());
        }
    }
}
