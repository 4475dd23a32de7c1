//! Relation transport port and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{RelationEvent, RelationEventKind};
use crate::types::{DataBag, RelationId};

const PUBLICATION_CAPACITY: usize = 256;

/// Delivers relation events to the provider and carries its answers back.
#[async_trait]
pub trait RelationTransport: Send + Sync {
    /// Wait for the next event. Returns `None` once the transport is closed
    /// and drained.
    async fn next_event(&self) -> Option<RelationEvent>;

    /// Merge `bag` into the provider side data of `relation`.
    async fn publish(&self, relation: RelationId, bag: DataBag) -> Result<()>;

    /// Keep an event for a later redelivery.
    async fn defer(&self, event: RelationEvent);

    /// Hand every deferred event back to the delivery queue.
    ///
    /// Returns the number of events redelivered.
    async fn redeliver_deferred(&self) -> usize;

    /// Drop every deferred event of `relation`.
    ///
    /// Returns the number of events dropped.
    async fn discard_deferred(&self, relation: RelationId) -> usize;

    /// Put an event back on the delivery queue as is.
    async fn requeue(&self, event: RelationEvent) -> Result<()>;

    /// Whether this unit is the elected leader.
    fn is_leader(&self) -> bool;

    /// Network address consumers should use to reach this unit.
    fn unit_address(&self) -> Option<String>;
}

/// A provider side data bag written to a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub relation_id: RelationId,
    pub bag: DataBag,
}

#[derive(Debug, Clone, Default)]
struct RelationRecord {
    app: Option<String>,
    consumer: DataBag,
    provider: DataBag,
}

/// In-process transport backed by channels.
///
/// Keeps the current data of every live relation and refreshes an event's
/// bags from it at delivery time, so a redelivered event sees current data.
/// Relation data is never locked across an await, so `next_event` stays
/// cancel safe.
pub struct InMemoryTransport {
    sender: Mutex<Option<mpsc::UnboundedSender<RelationEvent>>>,
    receiver: Mutex<mpsc::UnboundedReceiver<RelationEvent>>,
    relations: RwLock<HashMap<RelationId, RelationRecord>>,
    deferred: Mutex<VecDeque<RelationEvent>>,
    publications: broadcast::Sender<Publication>,
    leader: AtomicBool,
    address: String,
}

impl InMemoryTransport {
    /// Create a new transport for a unit at `address`.
    #[must_use]
    pub fn new(address: impl Into<String>, leader: bool) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (publications, _) = broadcast::channel(PUBLICATION_CAPACITY);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
            relations: RwLock::new(HashMap::new()),
            deferred: Mutex::new(VecDeque::new()),
            publications,
            leader: AtomicBool::new(leader),
            address: address.into(),
        }
    }

    /// Subscribe to provider side publications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Publication> {
        self.publications.subscribe()
    }

    /// Change leadership of this unit.
    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    /// A consumer joined with its initial data.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed.
    pub async fn join(&self, relation: RelationId, app: Option<&str>, consumer: DataBag) -> Result<()> {
        let record = RelationRecord {
            app: app.map(str::to_string),
            consumer: consumer.clone(),
            provider: DataBag::new(),
        };
        self.relations_mut().insert(relation, record);

        let mut event = RelationEvent::joined(relation, consumer);
        event.app = app.map(str::to_string);
        self.send(event).await
    }

    /// The consumer changed its data. `consumer` is merged into the
    /// existing consumer bag. A relation the transport has not seen is
    /// registered with `consumer` as its data.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed.
    pub async fn change(&self, relation: RelationId, consumer: DataBag) -> Result<()> {
        let event = {
            let mut relations = self.relations_mut();
            let record = relations.entry(relation).or_insert_with(|| {
                debug!(relation = %relation, "Registering relation on change");
                RelationRecord::default()
            });
            record.consumer.merge(consumer);
            let mut event = RelationEvent::changed(relation, record.consumer.clone());
            event.app.clone_from(&record.app);
            event
        };
        self.send(event).await
    }

    /// Register a relation that already exists on the consumer side, such as
    /// one provisioned before this unit restarted. No event is sent.
    ///
    /// Returns `false` and leaves the data alone if the relation is known.
    pub fn restore(
        &self,
        relation: RelationId,
        app: Option<&str>,
        consumer: DataBag,
        provider: DataBag,
    ) -> bool {
        let mut relations = self.relations_mut();
        if relations.contains_key(&relation) {
            return false;
        }
        debug!(relation = %relation, "Restoring relation");
        relations.insert(
            relation,
            RelationRecord {
                app: app.map(str::to_string),
                consumer,
                provider,
            },
        );
        true
    }

    /// The relation is going away.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation is unknown or the transport is closed.
    pub async fn break_relation(&self, relation: RelationId) -> Result<()> {
        let event = {
            let relations = self.relations();
            let record = relations
                .get(&relation)
                .ok_or(Error::relation_not_found(relation))?;
            let mut event =
                RelationEvent::broken(relation, record.consumer.clone(), record.provider.clone());
            event.app.clone_from(&record.app);
            event
        };
        self.send(event).await
    }

    /// Current provider side data of a relation.
    pub async fn provider_data(&self, relation: RelationId) -> Option<DataBag> {
        self.relations().get(&relation).map(|r| r.provider.clone())
    }

    /// Number of events waiting for redelivery.
    pub async fn deferred_count(&self) -> usize {
        self.deferred.lock().await.len()
    }

    /// Stop accepting new events. Queued events are still delivered.
    pub async fn close(&self) {
        self.sender.lock().await.take();
    }

    async fn send(&self, event: RelationEvent) -> Result<()> {
        let guard = self.sender.lock().await;
        let sender = guard.as_ref().ok_or(Error::ChannelClosed)?;
        sender.send(event).map_err(|_| Error::ChannelClosed)
    }

    fn relations(&self) -> RwLockReadGuard<'_, HashMap<RelationId, RelationRecord>> {
        self.relations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn relations_mut(&self) -> RwLockWriteGuard<'_, HashMap<RelationId, RelationRecord>> {
        self.relations.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, mut event: RelationEvent) -> RelationEvent {
        let mut relations = self.relations_mut();
        let record = if event.kind == RelationEventKind::Broken {
            relations.remove(&event.relation_id)
        } else {
            relations.get(&event.relation_id).cloned()
        };

        if let Some(record) = record {
            event.consumer = record.consumer;
            event.provider = record.provider;
            if event.app.is_none() {
                event.app = record.app;
            }
        }
        event
    }
}

#[async_trait]
impl RelationTransport for InMemoryTransport {
    async fn next_event(&self) -> Option<RelationEvent> {
        let event = self.receiver.lock().await.recv().await?;
        Some(self.refresh(event))
    }

    async fn publish(&self, relation: RelationId, bag: DataBag) -> Result<()> {
        {
            let mut relations = self.relations_mut();
            let record = relations
                .get_mut(&relation)
                .ok_or(Error::relation_not_found(relation))?;
            record.provider.merge(bag.clone());
        }

        // No subscribers is fine.
        let _ = self.publications.send(Publication {
            relation_id: relation,
            bag,
        });
        Ok(())
    }

    async fn defer(&self, event: RelationEvent) {
        debug!(relation = %event.relation_id, kind = %event.kind, "Deferring event");
        self.deferred.lock().await.push_back(event);
    }

    async fn redeliver_deferred(&self) -> usize {
        let pending: Vec<RelationEvent> = self.deferred.lock().await.drain(..).collect();
        let mut delivered = 0usize;
        for event in pending {
            let event = event.redelivered();
            if let Err(e) = self.send(event.clone()).await {
                debug!(relation = %event.relation_id, error = %e, "Redelivery failed, keeping deferred");
                self.deferred.lock().await.push_back(event);
            } else {
                delivered = delivered.saturating_add(1);
            }
        }
        delivered
    }

    async fn discard_deferred(&self, relation: RelationId) -> usize {
        let mut deferred = self.deferred.lock().await;
        let before = deferred.len();
        deferred.retain(|event| event.relation_id != relation);
        let dropped = before.saturating_sub(deferred.len());
        if dropped > 0 {
            debug!(relation = %relation, count = dropped, "Dropped deferred events");
        }
        dropped
    }

    async fn requeue(&self, event: RelationEvent) -> Result<()> {
        self.send(event).await
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn unit_address(&self) -> Option<String> {
        Some(self.address.clone()).filter(|a| !a.is_empty())
    }
}
