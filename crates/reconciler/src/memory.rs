//! In-memory backend.
//!
//! Simulates a database server well enough to drive the reconciler without
//! one: tracks databases, users and grants, records every call, and can be
//! scripted to be unready or to fail a given operation.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::credentials::Credential;
use crate::error::{Error, Result};
use crate::gateway::BackendGateway;

/// A call made against the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    IsReady,
    Databases,
    NewDatabase(String),
    NewUser(String),
    DropUser(String),
    DropDatabases(Vec<String>),
    Grant { username: String, database: String },
}

impl GatewayCall {
    /// Whether the call changes backend state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::IsReady | Self::Databases)
    }
}

#[derive(Debug, Default)]
struct BackendState {
    ready: bool,
    scripted_readiness: VecDeque<bool>,
    databases: BTreeSet<String>,
    users: BTreeMap<String, String>,
    grants: BTreeSet<(String, String)>,
    failing: HashSet<&'static str>,
    calls: Vec<GatewayCall>,
}

impl BackendState {
    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.contains(operation) {
            return Err(Error::backend_failed(operation, "injected failure"));
        }
        if !self.ready {
            return Err(Error::NotReady);
        }
        Ok(())
    }
}

/// Backend gateway that keeps all state in memory.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: RwLock<BackendState>,
}

impl InMemoryGateway {
    /// Create a ready backend with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BackendState {
                ready: true,
                ..BackendState::default()
            }),
        }
    }

    /// Create a ready backend that already holds `names`.
    #[must_use]
    pub fn with_databases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: RwLock::new(BackendState {
                ready: true,
                databases: names.into_iter().map(Into::into).collect(),
                ..BackendState::default()
            }),
        }
    }

    /// Set readiness for all future checks.
    pub async fn set_ready(&self, ready: bool) {
        let mut state = self.state.write().await;
        state.scripted_readiness.clear();
        state.ready = ready;
    }

    /// Answer the next readiness checks from `answers`, in order. The last
    /// answer sticks once the script runs out.
    pub async fn script_readiness(&self, answers: impl IntoIterator<Item = bool>) {
        self.state.write().await.scripted_readiness = answers.into_iter().collect();
    }

    /// Make every future call of `operation` fail.
    pub async fn fail_operation(&self, operation: &'static str) {
        self.state.write().await.failing.insert(operation);
    }

    /// Let `operation` succeed again.
    pub async fn heal_operation(&self, operation: &'static str) {
        self.state.write().await.failing.remove(operation);
    }

    /// Every call made so far.
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.read().await.calls.clone()
    }

    /// The state-changing calls made so far.
    pub async fn mutations(&self) -> Vec<GatewayCall> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget the recorded calls.
    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Databases currently present.
    pub async fn database_names(&self) -> BTreeSet<String> {
        self.state.read().await.databases.clone()
    }

    /// Whether a login exists.
    pub async fn has_user(&self, username: &str) -> bool {
        self.state.read().await.users.contains_key(username)
    }

    /// Password currently set for a login.
    pub async fn password_of(&self, username: &str) -> Option<String> {
        self.state.read().await.users.get(username).cloned()
    }

    /// Databases a login has been granted.
    pub async fn grants_of(&self, username: &str) -> BTreeSet<String> {
        self.state
            .read()
            .await
            .grants
            .iter()
            .filter(|(user, _)| user == username)
            .map(|(_, db)| db.clone())
            .collect()
    }
}

#[async_trait]
impl BackendGateway for InMemoryGateway {
    async fn is_ready(&self) -> bool {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::IsReady);
        if let Some(answer) = state.scripted_readiness.pop_front() {
            state.ready = answer;
        }
        state.ready
    }

    async fn databases(&self) -> Result<BTreeSet<String>> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::Databases);
        state.check("databases")?;
        Ok(state.databases.clone())
    }

    async fn new_database(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::NewDatabase(name.to_string()));
        state.check("new_database")?;
        state.databases.insert(name.to_string());
        Ok(())
    }

    async fn new_user(&self, credential: &Credential) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .calls
            .push(GatewayCall::NewUser(credential.username.clone()));
        state.check("new_user")?;
        state
            .users
            .entry(credential.username.clone())
            .or_insert_with(|| credential.password.clone());
        Ok(())
    }

    async fn drop_user(&self, username: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::DropUser(username.to_string()));
        state.check("drop_user")?;
        state.users.remove(username);
        state.grants.retain(|(user, _)| user != username);
        Ok(())
    }

    async fn drop_databases(&self, names: &BTreeSet<String>) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .calls
            .push(GatewayCall::DropDatabases(names.iter().cloned().collect()));
        state.check("drop_databases")?;
        state.databases.retain(|db| !names.contains(db));
        state.grants.retain(|(_, db)| !names.contains(db));
        Ok(())
    }

    async fn grant(&self, credential: &Credential, database: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(GatewayCall::Grant {
            username: credential.username.clone(),
            database: database.to_string(),
        });
        state.check("grant")?;
        state
            .grants
            .insert((credential.username.clone(), database.to_string()));
        Ok(())
    }
}
