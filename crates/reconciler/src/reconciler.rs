//! Reconciler implementation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use provider_core::{GenericResultExt, ProviderConfig};
use provider_relation::{
    DATA_KEY, DATABASES_KEY, DataBag, RelationEvent, RelationId, RelationTransport, Route,
};
use tracing::{debug, error, info};

use crate::credentials::{Credential, CredentialStore, InMemoryCredentialStore, username_for};
use crate::error::{Error, Result};
use crate::gateway::BackendGateway;
use crate::readiness::{Gate, ReadinessGate};
use crate::types::{PassOutcome, PassReport, ProviderData, ProvisionPlan, ReconcileAction};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Drop a relation's databases when it is torn down.
    pub autodelete: bool,
    /// Grace period given to an unready backend.
    pub grace_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            autodelete: false,
            grace_delay: Duration::from_secs(20),
        }
    }
}

impl From<&ProviderConfig> for ReconcilerConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            autodelete: config.autodelete,
            grace_delay: config.readiness.grace_delay,
        }
    }
}

/// Provisions databases and credentials for relations, and removes them
/// again when relations are torn down.
pub struct Reconciler {
    gateway: Arc<dyn BackendGateway>,
    store: Arc<dyn CredentialStore>,
    gate: ReadinessGate,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        store: Arc<dyn CredentialStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            gate: ReadinessGate::new(config.grace_delay),
            config,
        }
    }

    /// Handle one event along the route chosen by the relation lifecycle.
    ///
    /// # Errors
    ///
    /// Returns the error of the reconcile or teardown pass.
    pub async fn handle(
        &self,
        transport: &dyn RelationTransport,
        event: &RelationEvent,
        route: Route,
    ) -> Result<PassOutcome> {
        match route {
            Route::Reconcile => self.reconcile(transport, event).await,
            Route::Teardown => self.teardown(transport, event).await,
            Route::Ignore => {
                debug!(
                    relation = %event.relation_id,
                    kind = %event.kind,
                    "Relation already torn down, ignoring event"
                );
                Ok(PassOutcome::Ignored)
            }
        }
    }

    /// Bring the backend in line with the consumer's request and publish
    /// the result.
    ///
    /// Runs only on the leader. Nothing is published unless every backend
    /// operation of the pass succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend, store or publish operation fails.
    pub async fn reconcile(
        &self,
        transport: &dyn RelationTransport,
        event: &RelationEvent,
    ) -> Result<PassOutcome> {
        let relation = event.relation_id;
        if !transport.is_leader() {
            debug!(relation = %relation, "Not the leader, skipping reconciliation");
            return Ok(PassOutcome::NotLeader);
        }

        let requested = requested_databases(event);
        if requested.is_empty() {
            debug!(relation = %relation, "No databases requested, nothing to do");
            return Ok(PassOutcome::NothingRequested);
        }

        let ready = self.gateway.is_ready().await;
        match self.gate.evaluate(ready, event.delivery) {
            Gate::Open => {}
            Gate::Recheck(delay) => {
                info!(
                    relation = %relation,
                    delay_secs = delay.as_secs(),
                    "Backend not ready, checking again after grace period"
                );
                return Ok(PassOutcome::AwaitingBackend {
                    recheck_after: delay,
                });
            }
            Gate::Defer => {
                info!(relation = %relation, "Backend still not ready, deferring event");
                return Ok(PassOutcome::Deferred);
            }
        }

        let existing = self
            .gateway
            .databases()
            .await
            .ok_logged("Could not list databases, treating every request as missing")
            .unwrap_or_default();
        let plan = ProvisionPlan::compute(&requested, &existing);
        debug!(
            relation = %relation,
            requested = plan.requested.len(),
            missing = plan.missing.len(),
            "Computed provision plan"
        );

        let mut report = PassReport::new(relation);

        for name in &plan.missing {
            self.gateway.new_database(name).await?;
            debug!(relation = %relation, database = %name, "Created database");
            report.record(ReconcileAction::CreateDatabase { name: name.clone() });
        }

        let credential = self
            .credentials(relation)
            .await?
            .with_address(transport.unit_address());

        self.gateway.new_user(&credential).await?;
        report.record(ReconcileAction::EnsureUser {
            username: credential.username.clone(),
        });

        for database in &plan.requested {
            self.gateway.grant(&credential, database).await?;
            debug!(
                relation = %relation,
                username = %credential.username,
                database = %database,
                "Granted privileges"
            );
            report.record(ReconcileAction::GrantPrivileges {
                username: credential.username.clone(),
                database: database.clone(),
            });
        }

        let confirmed = plan.confirmed();
        let mut bag = DataBag::new();
        bag.set_json(DATABASES_KEY, &confirmed)?;
        bag.set_json(DATA_KEY, &ProviderData { credentials: credential })?;
        transport.publish(relation, bag).await?;
        report.record(ReconcileAction::Publish {
            databases: confirmed,
        });

        info!(
            relation = %relation,
            created = plan.missing.len(),
            granted = plan.requested.len(),
            "Relation reconciled"
        );
        Ok(PassOutcome::Reconciled(report))
    }

    /// Revoke a relation's login and, with autodelete, drop its databases.
    ///
    /// The databases to drop come from this provider's own published data.
    /// The login is revoked before the credential is forgotten, so a failed
    /// revoke can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InconsistentState`] if no readable confirmed database
    /// list was published, before anything is changed. Backend and store
    /// failures are returned as they happen.
    pub async fn teardown(
        &self,
        transport: &dyn RelationTransport,
        event: &RelationEvent,
    ) -> Result<PassOutcome> {
        let relation = event.relation_id;
        if !transport.is_leader() {
            debug!(relation = %relation, "Not the leader, skipping teardown");
            return Ok(PassOutcome::NotLeader);
        }

        let confirmed = confirmed_databases(event).tap_err(|e| {
            error!(relation = %relation, error = %e, "Cannot tear down relation");
        })?;

        let mut report = PassReport::new(relation);

        if let Some(credential) = self.store.get(relation).await? {
            self.gateway.drop_user(&credential.username).await?;
            report.record(ReconcileAction::DropUser {
                username: credential.username.clone(),
            });

            self.store.delete(relation).await?;
            report.record(ReconcileAction::ForgetCredential { relation });
            debug!(relation = %relation, username = %credential.username, "Revoked login");
        }

        if self.config.autodelete && !confirmed.is_empty() {
            self.gateway.drop_databases(&confirmed).await?;
            info!(
                relation = %relation,
                databases = confirmed.len(),
                "Dropped relation databases"
            );
            report.record(ReconcileAction::DropDatabases {
                names: confirmed.into_iter().collect(),
            });
        }

        info!(relation = %relation, "Relation torn down");
        Ok(PassOutcome::TornDown(report))
    }

    /// The relation's credential, issuing and storing a new one on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store fails.
    pub async fn credentials(&self, relation: RelationId) -> Result<Credential> {
        if let Some(existing) = self.store.get(relation).await? {
            return Ok(existing);
        }

        let credential = Credential::new(username_for(relation), self.gateway.new_password());
        self.store.put(relation, &credential).await?;
        debug!(relation = %relation, username = %credential.username, "Issued credential");
        Ok(credential)
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Get the credential store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}

/// Databases the consumer asked for. An absent, blank or unreadable value
/// is an empty request.
fn requested_databases(event: &RelationEvent) -> BTreeSet<String> {
    match event.consumer.get(DATABASES_KEY) {
        None => BTreeSet::new(),
        Some(raw) if raw.trim().is_empty() => BTreeSet::new(),
        Some(_) => event
            .consumer
            .get_json::<Vec<String>>(DATABASES_KEY)
            .ok_logged("Unreadable database request, treating it as empty")
            .flatten()
            .map(|names| names.into_iter().collect())
            .unwrap_or_default(),
    }
}

/// Databases this provider last confirmed on the relation.
fn confirmed_databases(event: &RelationEvent) -> Result<BTreeSet<String>> {
    let relation = event.relation_id;
    event
        .provider
        .get_json::<Vec<String>>(DATABASES_KEY)
        .map_err(|e| Error::inconsistent_state(relation, e.to_string()))?
        .map(|names| names.into_iter().collect())
        .ok_or_else(|| Error::inconsistent_state(relation, "no confirmed databases published"))
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    gateway: Option<Arc<dyn BackendGateway>>,
    store: Option<Arc<dyn CredentialStore>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gateway: None,
            store: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the backend gateway.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn BackendGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Set the credential store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable autodelete.
    #[must_use]
    pub const fn autodelete(mut self, enabled: bool) -> Self {
        self.config.autodelete = enabled;
        self
    }

    /// Set the readiness grace period.
    #[must_use]
    pub const fn grace_delay(mut self, delay: Duration) -> Self {
        self.config.grace_delay = delay;
        self
    }

    /// Build the reconciler.
    ///
    /// Without a store, credentials are kept in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if no gateway was set.
    pub fn build(self) -> Result<Reconciler> {
        let gateway = self
            .gateway
            .ok_or_else(|| Error::invalid_config("Backend gateway is required"))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new()));

        Ok(Reconciler::new(gateway, store, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
