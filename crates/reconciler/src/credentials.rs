//! Per-relation credentials and their store.

use std::collections::HashMap;

use async_trait::async_trait;
use provider_relation::RelationId;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// Length of generated relation passwords.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Database login issued to one relation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
    /// Address of the provider unit, refreshed on every pass. Published as
    /// an empty string when the unit has none.
    #[serde(default, with = "address_field")]
    pub address: Option<String>,
}

mod address_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(address.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let address = Option::<String>::deserialize(deserializer)?;
        Ok(address.filter(|a| !a.is_empty()))
    }
}

impl Credential {
    /// Create a credential without an address.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            address: None,
        }
    }

    /// Set the provider address.
    #[must_use]
    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

/// Username for a relation. Distinct relations always get distinct names.
#[must_use]
pub fn username_for(relation: RelationId) -> String {
    format!("user_{relation}")
}

/// Random alphanumeric password drawn from the OS generator.
#[must_use]
pub fn generate_password(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Durable mapping from relation to its credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get the credential for a relation, if one was issued.
    async fn get(&self, relation: RelationId) -> Result<Option<Credential>>;

    /// Store the credential for a relation, replacing any previous one.
    async fn put(&self, relation: RelationId, credential: &Credential) -> Result<()>;

    /// Forget a relation's credential. Returns whether one existed.
    async fn delete(&self, relation: RelationId) -> Result<bool>;

    /// All stored credentials, ordered by relation.
    async fn list(&self) -> Result<Vec<(RelationId, Credential)>>;
}

/// Credential store kept in process memory.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<RelationId, Credential>>,
}

impl InMemoryCredentialStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, relation: RelationId) -> Result<Option<Credential>> {
        Ok(self.entries.read().await.get(&relation).cloned())
    }

    async fn put(&self, relation: RelationId, credential: &Credential) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(relation, credential.clone());
        Ok(())
    }

    async fn delete(&self, relation: RelationId) -> Result<bool> {
        Ok(self.entries.write().await.remove(&relation).is_some())
    }

    async fn list(&self) -> Result<Vec<(RelationId, Credential)>> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, c)| (*id, c.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_username_for() {
        assert_eq!(username_for(RelationId::new(7)), "user_7");
    }

    #[test]
    fn test_generate_password_lengths() {
        assert_eq!(generate_password(DEFAULT_PASSWORD_LENGTH).len(), 16);
        assert_eq!(generate_password(50).len(), 50);
        assert_eq!(generate_password(0), "");
    }

    #[test]
    fn test_generate_password_alphanumeric() {
        let password = generate_password(64);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_debug_redacts_password() {
        let credential = Credential::new("user_1", "s3cr3tPassw0rd");
        let printed = format!("{credential:?}");
        assert!(printed.contains("user_1"));
        assert!(!printed.contains("s3cr3tPassw0rd"));
    }

    #[test]
    fn test_missing_address_is_published_empty() -> std::result::Result<(), serde_json::Error> {
        let credential = Credential::new("user_1", "pw");
        let encoded = serde_json::to_string(&credential)?;
        assert_eq!(encoded, r#"{"username":"user_1","password":"pw","address":""}"#);
        assert_eq!(serde_json::from_str::<Credential>(&encoded)?.address, None);

        let credential = credential.with_address(Some("10.0.0.4".to_string()));
        assert!(serde_json::to_string(&credential)?.contains(r#""address":"10.0.0.4""#));

        let legacy: Credential = serde_json::from_str(r#"{"username":"user_1","password":"pw"}"#)?;
        assert_eq!(legacy.address, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trip() -> Result<()> {
        let store = InMemoryCredentialStore::new();
        let id = RelationId::new(3);
        assert!(store.get(id).await?.is_none());

        store.put(id, &Credential::new("user_3", "pw")).await?;
        store.put(RelationId::new(1), &Credential::new("user_1", "pw")).await?;

        assert_eq!(store.get(id).await?.map(|c| c.username), Some("user_3".to_string()));
        let ids: Vec<_> = store.list().await?.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![RelationId::new(1), id]);

        assert!(store.delete(id).await?);
        assert!(!store.delete(id).await?);
        assert!(store.get(id).await?.is_none());
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_usernames_are_injective(a in any::<u64>(), b in any::<u64>()) {
            prop_assume!(a != b);
            prop_assert_ne!(username_for(RelationId::new(a)), username_for(RelationId::new(b)));
        }
    }
}
