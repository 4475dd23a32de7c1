//! MySQL implementation of the backend gateway.

use std::collections::BTreeSet;

use async_trait::async_trait;
use provider_core::MysqlConfig;
use provider_reconciler::{BackendGateway, Credential};
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use tracing::{debug, info, warn};

use crate::error::{MysqlError, Result};
use crate::statements;

/// Gateway to one MySQL server through a lazily connected pool.
///
/// Construction never touches the network; the first query opens a
/// connection, so an unready server surfaces as `is_ready() == false`.
#[derive(Debug, Clone)]
pub struct MysqlGateway {
    pool: MySqlPool,
}

impl MysqlGateway {
    /// Build a gateway from connection settings.
    #[must_use]
    pub fn new(config: &MysqlConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user);
        let options = match &config.root_password {
            Some(password) => options.password(password),
            None => options,
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_lazy_with(options);

        Self { pool }
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn execute(&self, operation: &str, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MysqlError::query(operation, &e))?;
        Ok(())
    }

    /// Server version string.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be queried.
    pub async fn version(&self) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MysqlError::query("version", &e))
    }

    /// All user databases on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_databases(&self) -> Result<BTreeSet<String>> {
        let names = sqlx::query_scalar::<_, String>("SHOW DATABASES")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MysqlError::query("databases", &e))?;

        Ok(names
            .into_iter()
            .filter(|name| !statements::is_system_schema(name))
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error if the username is invalid or the query fails.
    pub async fn user_exists(&self, username: &str) -> Result<bool> {
        statements::validate_identifier("user", username)?;
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mysql.user WHERE user = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MysqlError::query("user_exists", &e))?;
        Ok(count > 0)
    }

    /// # Errors
    ///
    /// Returns an error if the name is invalid or the query fails.
    pub async fn database_exists(&self, database: &str) -> Result<bool> {
        statements::validate_identifier("database", database)?;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
        )
        .bind(database)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MysqlError::query("database_exists", &e))?;
        Ok(count > 0)
    }

    /// Create a superuser with grant option.
    ///
    /// # Errors
    ///
    /// Returns `UserExists` if the user is already present.
    pub async fn new_super_user(&self, username: &str, password: &str) -> Result<()> {
        if self.user_exists(username).await? {
            return Err(MysqlError::UserExists {
                username: username.to_string(),
            });
        }
        self.execute("create_user", &statements::create_super_user(username, password)?)
            .await?;
        info!(username = %username, "Created superuser");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UserNotFound` if the user is absent.
    pub async fn set_user_password(&self, username: &str, password: &str) -> Result<()> {
        if !self.user_exists(username).await? {
            return Err(MysqlError::UserNotFound {
                username: username.to_string(),
            });
        }
        self.execute("set_password", &statements::set_password(username, password)?)
            .await?;
        info!(username = %username, "Changed user password");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UserNotFound` if the user is absent.
    pub async fn delete_user(&self, username: &str) -> Result<()> {
        if !self.user_exists(username).await? {
            return Err(MysqlError::UserNotFound {
                username: username.to_string(),
            });
        }
        self.execute("delete_user", &statements::drop_user_strict(username)?)
            .await?;
        info!(username = %username, "Deleted user");
        Ok(())
    }

    /// Create a database that must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseExists` if the database is already present.
    pub async fn create_database(&self, database: &str) -> Result<()> {
        if self.database_exists(database).await? {
            return Err(MysqlError::DatabaseExists {
                database: database.to_string(),
            });
        }
        self.execute("create_database", &statements::create_database_strict(database)?)
            .await?;
        info!(database = %database, "Created database");
        Ok(())
    }
}

#[async_trait]
impl BackendGateway for MysqlGateway {
    async fn is_ready(&self) -> bool {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "MySQL not ready");
                false
            }
        }
    }

    async fn databases(&self) -> provider_reconciler::Result<BTreeSet<String>> {
        if !self.is_ready().await {
            return Ok(BTreeSet::new());
        }
        Ok(self.list_databases().await?)
    }

    async fn new_database(&self, name: &str) -> provider_reconciler::Result<()> {
        self.execute("new_database", &statements::create_database(name)?)
            .await?;
        debug!(database = %name, "Ensured database");
        Ok(())
    }

    async fn new_user(&self, credential: &Credential) -> provider_reconciler::Result<()> {
        let sql = statements::create_user(&credential.username, &credential.password)?;
        self.execute("new_user", &sql).await?;
        debug!(username = %credential.username, "Ensured user");
        Ok(())
    }

    async fn drop_user(&self, username: &str) -> provider_reconciler::Result<()> {
        self.execute("drop_user", &statements::drop_user(username)?)
            .await?;
        debug!(username = %username, "Dropped user");
        Ok(())
    }

    async fn drop_databases(&self, names: &BTreeSet<String>) -> provider_reconciler::Result<()> {
        let sql = statements::drop_databases(names)?;
        if sql.is_empty() {
            warn!("No droppable databases given");
            return Ok(());
        }
        self.execute("drop_databases", &sql).await?;
        debug!(count = names.len(), "Dropped databases");
        Ok(())
    }

    async fn grant(&self, credential: &Credential, database: &str) -> provider_reconciler::Result<()> {
        self.execute("grant", &statements::grant_all(&credential.username, database)?)
            .await?;
        debug!(username = %credential.username, database = %database, "Granted privileges");
        Ok(())
    }
}
