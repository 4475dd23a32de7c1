//! Core types for the reconciler.

use std::collections::BTreeSet;
use std::time::Duration;

use itertools::Itertools;
use provider_relation::RelationId;
use serde::{Deserialize, Serialize};

use crate::credentials::Credential;

/// What one reconciliation pass has to create.
///
/// `missing` is always a subset of `requested`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionPlan {
    /// Databases the consumer asked for.
    pub requested: BTreeSet<String>,
    /// Requested databases absent from the backend.
    pub missing: BTreeSet<String>,
}

impl ProvisionPlan {
    /// Compare the requested databases against the existing ones.
    ///
    /// An empty `existing` set means every requested database is missing.
    #[must_use]
    pub fn compute(requested: &BTreeSet<String>, existing: &BTreeSet<String>) -> Self {
        Self {
            requested: requested.clone(),
            missing: requested.difference(existing).cloned().collect(),
        }
    }

    /// The requested databases as a sorted list, as published to the consumer.
    #[must_use]
    pub fn confirmed(&self) -> Vec<String> {
        self.requested.iter().cloned().collect_vec()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
    }
}

/// Actions a pass performs, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileAction {
    /// Create a database that did not exist.
    CreateDatabase { name: String },
    /// Ensure the relation's login exists.
    EnsureUser { username: String },
    /// Grant the login access to one database.
    GrantPrivileges { username: String, database: String },
    /// Write confirmed databases and credentials back to the relation.
    Publish { databases: Vec<String> },
    /// Revoke the relation's login.
    DropUser { username: String },
    /// Remove the relation's entry from the credential store.
    ForgetCredential { relation: RelationId },
    /// Drop the relation's databases.
    DropDatabases { names: Vec<String> },
}

impl ReconcileAction {
    /// Get a description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateDatabase { name } => format!("create database {name}"),
            Self::EnsureUser { username } => format!("ensure user {username}"),
            Self::GrantPrivileges { username, database } => {
                format!("grant {username} on {database}")
            }
            Self::Publish { databases } => {
                format!("publish {} database(s)", databases.len())
            }
            Self::DropUser { username } => format!("drop user {username}"),
            Self::ForgetCredential { relation } => {
                format!("forget credential of relation {relation}")
            }
            Self::DropDatabases { names } => format!("drop databases {}", names.join(", ")),
        }
    }

    /// Whether the action changes backend state.
    #[must_use]
    pub const fn touches_backend(&self) -> bool {
        matches!(
            self,
            Self::CreateDatabase { .. }
                | Self::EnsureUser { .. }
                | Self::GrantPrivileges { .. }
                | Self::DropUser { .. }
                | Self::DropDatabases { .. }
        )
    }
}

/// Record of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub relation: RelationId,
    pub actions: Vec<ReconcileAction>,
}

impl PassReport {
    /// Create an empty report for a relation.
    #[must_use]
    pub const fn new(relation: RelationId) -> Self {
        Self {
            relation,
            actions: Vec::new(),
        }
    }

    /// Append an action.
    pub fn record(&mut self, action: ReconcileAction) {
        self.actions.push(action);
    }

    /// Databases created during the pass.
    #[must_use]
    pub fn created_databases(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                ReconcileAction::CreateDatabase { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// How handling one event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// This unit is not the leader; nothing was done.
    NotLeader,
    /// The consumer asked for no databases; nothing was done.
    NothingRequested,
    /// The backend was not ready; check again after the delay.
    AwaitingBackend { recheck_after: Duration },
    /// The backend was still not ready after the grace period.
    Deferred,
    /// Databases, login and grants are in place and published.
    Reconciled(PassReport),
    /// The relation's login is gone, and its databases if autodelete is on.
    TornDown(PassReport),
    /// The relation was already torn down.
    Ignored,
}

impl PassOutcome {
    /// Whether the event is fully handled and need not be seen again.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::AwaitingBackend { .. } | Self::Deferred)
    }

    /// Whether the pass did work against the backend.
    #[must_use]
    pub const fn did_work(&self) -> bool {
        matches!(self, Self::Reconciled(_) | Self::TornDown(_))
    }
}

/// Provider `data` payload published to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderData {
    pub credentials: Credential,
}
