//! Backend gateway port.
//!
//! Every operation must be safe to call again with the same arguments.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::credentials::{Credential, DEFAULT_PASSWORD_LENGTH, generate_password};
use crate::error::Result;

/// Operations the reconciler needs from the database server.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Whether the server accepts connections right now.
    async fn is_ready(&self) -> bool;

    /// Names of the user databases currently on the server.
    async fn databases(&self) -> Result<BTreeSet<String>>;

    /// Create a database if it does not exist.
    async fn new_database(&self, name: &str) -> Result<()>;

    /// Create a login for the credential if it does not exist.
    async fn new_user(&self, credential: &Credential) -> Result<()>;

    /// Remove a login if it exists.
    async fn drop_user(&self, username: &str) -> Result<()>;

    /// Drop every named database that exists.
    async fn drop_databases(&self, names: &BTreeSet<String>) -> Result<()>;

    /// Grant the credential's user all privileges on one database.
    async fn grant(&self, credential: &Credential, database: &str) -> Result<()>;

    /// Fresh secret for a new credential.
    fn new_password(&self) -> String {
        generate_password(DEFAULT_PASSWORD_LENGTH)
    }
}
