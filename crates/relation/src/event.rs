//! Relation event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DataBag, EventId, RelationId};

/// What happened to a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationEventKind {
    /// A consumer attached.
    Joined,
    /// The consumer's data bag changed.
    Changed,
    /// The relation is being torn down.
    Broken,
}

impl RelationEventKind {
    /// Get the kind as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Changed => "changed",
            Self::Broken => "broken",
        }
    }
}

impl std::fmt::Display for RelationEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an event reached the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// First delivery from the transport.
    #[default]
    Fresh,
    /// Re-enqueued after the readiness grace period elapsed.
    GraceRecheck,
    /// Handed back after having been deferred.
    Redelivered,
}

/// A notification about one relation, carrying both sides' data bags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEvent {
    pub event_id: EventId,
    pub kind: RelationEventKind,
    pub relation_id: RelationId,
    /// Name of the remote application, when known.
    pub app: Option<String>,
    /// Data written by the consumer.
    pub consumer: DataBag,
    /// Data previously written by this provider.
    pub provider: DataBag,
    #[serde(default)]
    pub delivery: Delivery,
    pub timestamp: DateTime<Utc>,
}

impl RelationEvent {
    /// Create a new event of the given kind.
    #[must_use]
    pub fn new(kind: RelationEventKind, relation_id: RelationId, consumer: DataBag) -> Self {
        Self {
            event_id: EventId::new(),
            kind,
            relation_id,
            app: None,
            consumer,
            provider: DataBag::new(),
            delivery: Delivery::Fresh,
            timestamp: Utc::now(),
        }
    }

    /// Create a new Joined event.
    #[must_use]
    pub fn joined(relation_id: RelationId, consumer: DataBag) -> Self {
        Self::new(RelationEventKind::Joined, relation_id, consumer)
    }

    /// Create a new Changed event.
    #[must_use]
    pub fn changed(relation_id: RelationId, consumer: DataBag) -> Self {
        Self::new(RelationEventKind::Changed, relation_id, consumer)
    }

    /// Create a new Broken event.
    #[must_use]
    pub fn broken(relation_id: RelationId, consumer: DataBag, provider: DataBag) -> Self {
        Self::new(RelationEventKind::Broken, relation_id, consumer).with_provider(provider)
    }

    /// Set the remote application name.
    #[must_use]
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Set the provider-side data bag.
    #[must_use]
    pub fn with_provider(mut self, provider: DataBag) -> Self {
        self.provider = provider;
        self
    }

    /// The same event, marked for its readiness recheck.
    #[must_use]
    pub fn grace_recheck(mut self) -> Self {
        self.delivery = Delivery::GraceRecheck;
        self
    }

    /// The same event, marked as handed back after a deferral.
    #[must_use]
    pub fn redelivered(mut self) -> Self {
        self.delivery = Delivery::Redelivered;
        self
    }

    /// Check whether this is the grace period recheck of an earlier delivery.
    #[must_use]
    pub fn is_grace_recheck(&self) -> bool {
        self.delivery == Delivery::GraceRecheck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_kind() {
        let id = RelationId::new(3);
        assert_eq!(RelationEvent::joined(id, DataBag::new()).kind, RelationEventKind::Joined);
        assert_eq!(RelationEvent::changed(id, DataBag::new()).kind, RelationEventKind::Changed);

        let provider: DataBag = [("databases", "[]")].into_iter().collect();
        let broken = RelationEvent::broken(id, DataBag::new(), provider.clone());
        assert_eq!(broken.kind, RelationEventKind::Broken);
        assert_eq!(broken.provider, provider);
    }

    #[test]
    fn test_delivery_markers_keep_identity() {
        let event = RelationEvent::joined(RelationId::new(1), DataBag::new()).with_app("wordpress");
        let id = event.event_id;

        let recheck = event.clone().grace_recheck();
        assert!(recheck.is_grace_recheck());
        assert_eq!(recheck.event_id, id);
        assert_eq!(recheck.app.as_deref(), Some("wordpress"));

        let again = event.redelivered();
        assert_eq!(again.delivery, Delivery::Redelivered);
        assert!(!again.is_grace_recheck());
    }

    #[test]
    fn test_kind_serializes_snake_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&RelationEventKind::Broken)?, "\"broken\"");
        let kind: RelationEventKind = serde_json::from_str("\"changed\"")?;
        assert_eq!(kind, RelationEventKind::Changed);
        Ok(())
    }
}
