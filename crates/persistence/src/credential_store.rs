//! Credential persistence operations.
//!
//! One record per relation in the `credential` table, keyed by relation id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use provider_reconciler::{Credential, CredentialStore};
use provider_relation::RelationId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::client::{CredentialDb, StoreConfig};
use super::error::{PersistenceError, PersistenceResult, from_surrealdb_error};

const TABLE: &str = "credential";

/// Credential record stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    relation: String,
    username: String,
    password: String,
    updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    fn new(relation: RelationId, credential: &Credential) -> Self {
        Self {
            relation: relation.to_string(),
            username: credential.username.clone(),
            password: credential.password.clone(),
            updated_at: Utc::now(),
        }
    }

    fn relation_id(&self) -> PersistenceResult<RelationId> {
        self.relation
            .parse::<u64>()
            .map(RelationId::new)
            .map_err(|e| {
                PersistenceError::corrupt_record(format!("{TABLE}:{}", self.relation), e.to_string())
            })
    }

    fn into_credential(self) -> Credential {
        Credential::new(self.username, self.password)
    }
}

/// [`CredentialStore`] backed by SurrealDB.
///
/// Addresses are not persisted; the reconciler attaches the current one on
/// every pass.
#[derive(Debug, Clone)]
pub struct SurrealCredentialStore {
    db: CredentialDb,
}

impl SurrealCredentialStore {
    /// Open the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema setup fails.
    pub async fn connect(config: StoreConfig) -> PersistenceResult<Self> {
        let db = CredentialDb::connect(config).await?;
        Ok(Self { db })
    }

    /// Wrap an existing connection.
    #[must_use]
    pub const fn from_db(db: CredentialDb) -> Self {
        Self { db }
    }

    /// Check if the database is healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails.
    pub async fn health_check(&self) -> PersistenceResult<()> {
        self.db.health_check().await
    }

    /// Number of stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> PersistenceResult<usize> {
        self.fetch_all().await.map(|records| records.len())
    }

    /// Load a relation's credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load(&self, relation: RelationId) -> PersistenceResult<Option<Credential>> {
        let key = relation.to_string();
        let record: Option<CredentialRecord> = self
            .db
            .db()
            .select((TABLE, key.as_str()))
            .await
            .map_err(from_surrealdb_error)?;

        Ok(record.map(CredentialRecord::into_credential))
    }

    /// Save a relation's credential, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save(&self, relation: RelationId, credential: &Credential) -> PersistenceResult<()> {
        let key = relation.to_string();
        let record: Option<CredentialRecord> = self
            .db
            .db()
            .upsert((TABLE, key.as_str()))
            .content(CredentialRecord::new(relation, credential))
            .await
            .map_err(from_surrealdb_error)?;

        if record.is_none() {
            return Err(PersistenceError::query_failed("failed to save credential"));
        }
        debug!(relation = %relation, username = %credential.username, "Saved credential");
        Ok(())
    }

    /// Remove a relation's credential. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove(&self, relation: RelationId) -> PersistenceResult<bool> {
        let key = relation.to_string();
        let record: Option<CredentialRecord> = self
            .db
            .db()
            .delete((TABLE, key.as_str()))
            .await
            .map_err(from_surrealdb_error)?;

        Ok(record.is_some())
    }

    /// All stored credentials, ordered by relation id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub async fn all(&self) -> PersistenceResult<Vec<(RelationId, Credential)>> {
        let mut entries = self
            .fetch_all()
            .await?
            .into_iter()
            .map(|record| record.relation_id().map(|id| (id, record.into_credential())))
            .collect::<PersistenceResult<Vec<_>>>()
            .inspect_err(|e| warn!(error = %e, "Corrupt credential record"))?;

        entries.sort_by_key(|(id, _)| *id);
        Ok(entries)
    }

    async fn fetch_all(&self) -> PersistenceResult<Vec<CredentialRecord>> {
        self.db
            .db()
            .select(TABLE)
            .await
            .map_err(from_surrealdb_error)
    }
}

#[async_trait]
impl CredentialStore for SurrealCredentialStore {
    async fn get(&self, relation: RelationId) -> provider_reconciler::Result<Option<Credential>> {
        Ok(self.load(relation).await?)
    }

    async fn put(&self, relation: RelationId, credential: &Credential) -> provider_reconciler::Result<()> {
        Ok(self.save(relation, credential).await?)
    }

    async fn delete(&self, relation: RelationId) -> provider_reconciler::Result<bool> {
        Ok(self.remove(relation).await?)
    }

    async fn list(&self) -> provider_reconciler::Result<Vec<(RelationId, Credential)>> {
        Ok(self.all().await?)
    }
}
