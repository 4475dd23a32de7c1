//! Event-driven controller loop.
//!
//! Pulls relation events from the transport one at a time, routes them
//! through the relation lifecycle to the reconciler, and reacts to the
//! outcome: schedules readiness rechecks, defers events, redelivers
//! deferred events, and reports unit status.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use provider_core::ProviderConfig;
use provider_relation::{
    RelationEvent, RelationId, RelationLifecycle, RelationTransport, Route,
};
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::status::UnitStatus;
use crate::types::PassOutcome;

/// Configuration for the controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How often deferred events are handed back for another pass.
    pub redelivery_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            redelivery_interval: Duration::from_secs(60),
        }
    }
}

impl From<&ProviderConfig> for ControllerConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            redelivery_interval: config.redelivery.interval,
        }
    }
}

/// Serial event loop for one provider unit.
///
/// Events are handled to completion one at a time. While a readiness
/// recheck is pending for a relation, newer events for that relation are
/// held back and released after the recheck, in arrival order.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    transport: Arc<dyn RelationTransport>,
    config: ControllerConfig,
    lifecycle: RelationLifecycle,
    /// Relations with a pending recheck, and the events held back for them.
    held: HashMap<RelationId, VecDeque<RelationEvent>>,
    status_tx: watch::Sender<UnitStatus>,
    stop_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
}

impl Controller {
    /// Create a new controller.
    pub fn new(
        reconciler: Arc<Reconciler>,
        transport: Arc<dyn RelationTransport>,
        config: ControllerConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(UnitStatus::Active);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            transport,
            config,
            lifecycle: RelationLifecycle::new(),
            held: HashMap::new(),
            status_tx,
            stop_rx,
            stop_tx,
        }
    }

    /// Run until the transport closes or the controller is stopped.
    ///
    /// # Errors
    ///
    /// Pass failures never end the loop; they are reported through the unit
    /// status. The `Result` is kept for callers that compose the loop with
    /// other fallible startup steps.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            redelivery_secs = self.config.redelivery_interval.as_secs(),
            "Starting controller"
        );

        let period = self.config.redelivery_interval;
        let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
        let mut redelivery = interval_at(start, period);

        loop {
            tokio::select! {
                event = self.transport.next_event() => {
                    match event {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            info!("Transport closed, stopping controller");
                            return Ok(());
                        }
                    }
                }
                _ = redelivery.tick() => {
                    let redelivered = self.transport.redeliver_deferred().await;
                    if redelivered > 0 {
                        debug!(count = redelivered, "Redelivered deferred events");
                    }
                }
                _ = self.stop_rx.changed() => {
                    if *self.stop_rx.borrow() {
                        info!("Controller stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Route one event, holding it back if its relation awaits a recheck.
    pub async fn dispatch(&mut self, event: RelationEvent) {
        let relation = event.relation_id;

        if !event.is_grace_recheck() {
            if let Some(queue) = self.held.get_mut(&relation) {
                debug!(relation = %relation, kind = %event.kind, "Recheck pending, holding event");
                queue.push_back(event);
                return;
            }
        }

        let is_recheck = event.is_grace_recheck();
        let awaiting = self.process(event).await;

        if is_recheck && !awaiting {
            self.release(relation).await;
        }
    }

    /// Handle one event. Returns whether a recheck was scheduled.
    async fn process(&mut self, event: RelationEvent) -> bool {
        let relation = event.relation_id;
        let kind = event.kind;
        let route = self.lifecycle.route(relation, kind);

        if route == Route::Teardown {
            self.lifecycle.depart(relation);
            let dropped = self.transport.discard_deferred(relation).await;
            if dropped > 0 {
                debug!(relation = %relation, count = dropped, "Dropped deferred events of a broken relation");
            }
        }

        let result = self
            .reconciler
            .handle(self.transport.as_ref(), &event, route)
            .await;

        match result {
            Ok(PassOutcome::AwaitingBackend { recheck_after }) => {
                self.schedule_recheck(event, recheck_after);
                return true;
            }
            Ok(PassOutcome::Deferred) => {
                self.transport.defer(event).await;
            }
            Ok(outcome) => {
                self.lifecycle.advance(relation, kind);
                if outcome.did_work() {
                    self.set_status(UnitStatus::Active);
                    let redelivered = self.transport.redeliver_deferred().await;
                    if redelivered > 0 {
                        debug!(count = redelivered, "Redelivered deferred events after successful pass");
                    }
                } else if outcome == PassOutcome::NothingRequested {
                    self.set_status(UnitStatus::Active);
                }
            }
            Err(e) => {
                error!(relation = %relation, kind = %kind, error = %e, "Relation event failed");
                self.set_status(UnitStatus::Blocked(format!("relation {relation}: {e}")));
                if e.is_retryable() {
                    self.transport.defer(event).await;
                } else if route == Route::Teardown {
                    self.lifecycle.retire(relation);
                }
            }
        }
        false
    }

    fn schedule_recheck(&mut self, event: RelationEvent, delay: Duration) {
        let relation = event.relation_id;
        self.held.entry(relation).or_default();

        let transport = Arc::clone(&self.transport);
        let recheck = event.grace_recheck();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = transport.requeue(recheck).await {
                warn!(relation = %relation, error = %e, "Could not requeue readiness recheck");
            }
        });
    }

    async fn release(&mut self, relation: RelationId) {
        let Some(queue) = self.held.remove(&relation) else {
            return;
        };
        if !queue.is_empty() {
            debug!(relation = %relation, count = queue.len(), "Releasing held events");
        }
        for event in queue {
            if let Err(e) = self.transport.requeue(event).await {
                warn!(relation = %relation, error = %e, "Could not release held event");
            }
        }
    }

    fn set_status(&self, status: UnitStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Subscribe to unit status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<UnitStatus> {
        self.status_tx.subscribe()
    }

    /// Whether a readiness recheck is pending for a relation.
    #[must_use]
    pub fn recheck_pending(&self, relation: RelationId) -> bool {
        self.held.contains_key(&relation)
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    #[must_use]
    pub fn stopper(&self) -> ControllerStopper {
        ControllerStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a controller.
#[derive(Clone)]
pub struct ControllerStopper {
    stop_tx: watch::Sender<bool>,
}

impl ControllerStopper {
    /// Stop the controller.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
