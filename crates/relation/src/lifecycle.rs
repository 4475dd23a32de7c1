//! Per-relation lifecycle.
//!
//! A relation is `Active` from its first event. Once its broken event is
//! handled it is `Departing`: reconcile events are ignored and only the
//! teardown may run again. A teardown that completes, or fails for good,
//! makes it `Terminal`, after which every further event is ignored.
//!
//! Only departing and terminal relations are tracked. Terminal relations
//! are remembered up to a retention limit, oldest forgotten first.

use std::collections::{HashMap, VecDeque};

use crate::event::RelationEventKind;
use crate::types::RelationId;

/// How many terminal relations are remembered by default.
pub const DEFAULT_TERMINAL_RETENTION: usize = 1024;

/// Lifecycle phase of one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RelationPhase {
    #[default]
    Active,
    Departing,
    Terminal,
}

/// Which handler an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Reconcile,
    Teardown,
    Ignore,
}

/// Tracks the phase of every relation that is going away.
#[derive(Debug)]
pub struct RelationLifecycle {
    phases: HashMap<RelationId, RelationPhase>,
    retired: VecDeque<RelationId>,
    retention: usize,
}

impl Default for RelationLifecycle {
    fn default() -> Self {
        Self::with_retention(DEFAULT_TERMINAL_RETENTION)
    }
}

impl RelationLifecycle {
    /// Create a new lifecycle tracker with no known relations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that remembers at most `retention` terminal
    /// relations.
    #[must_use]
    pub fn with_retention(retention: usize) -> Self {
        Self {
            phases: HashMap::new(),
            retired: VecDeque::new(),
            retention: retention.max(1),
        }
    }

    /// Current phase of a relation. Unknown relations are `Active`.
    #[must_use]
    pub fn phase(&self, relation: RelationId) -> RelationPhase {
        self.phases.get(&relation).copied().unwrap_or_default()
    }

    /// Decide where an event of `kind` for `relation` should go.
    #[must_use]
    pub fn route(&self, relation: RelationId, kind: RelationEventKind) -> Route {
        match (self.phase(relation), kind) {
            (RelationPhase::Terminal, _) => Route::Ignore,
            (RelationPhase::Departing, RelationEventKind::Joined | RelationEventKind::Changed) => {
                Route::Ignore
            }
            (RelationPhase::Active, RelationEventKind::Joined | RelationEventKind::Changed) => {
                Route::Reconcile
            }
            (RelationPhase::Active | RelationPhase::Departing, RelationEventKind::Broken) => {
                Route::Teardown
            }
        }
    }

    /// Record that the broken event of `relation` is being handled.
    pub fn depart(&mut self, relation: RelationId) {
        if self.phase(relation) == RelationPhase::Active {
            self.phases.insert(relation, RelationPhase::Departing);
        }
    }

    /// Record that an event of `kind` was handled successfully.
    ///
    /// Only a completed teardown moves the relation forward.
    pub fn advance(&mut self, relation: RelationId, kind: RelationEventKind) {
        if kind == RelationEventKind::Broken {
            self.retire(relation);
        }
    }

    /// Make `relation` terminal, forgetting the oldest terminal relation
    /// once the retention limit is exceeded.
    pub fn retire(&mut self, relation: RelationId) {
        if self.phases.insert(relation, RelationPhase::Terminal) == Some(RelationPhase::Terminal) {
            return;
        }
        self.retired.push_back(relation);
        while self.retired.len() > self.retention {
            if let Some(oldest) = self.retired.pop_front() {
                self.phases.remove(&oldest);
            }
        }
    }

    /// Number of relations that have reached the terminal phase and are
    /// still remembered.
    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.retired.len()
    }

    /// Number of relations currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.phases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_relation_is_active() {
        let lifecycle = RelationLifecycle::new();
        let id = RelationId::new(5);
        assert_eq!(lifecycle.phase(id), RelationPhase::Active);
        assert_eq!(lifecycle.route(id, RelationEventKind::Joined), Route::Reconcile);
        assert_eq!(lifecycle.route(id, RelationEventKind::Changed), Route::Reconcile);
        assert_eq!(lifecycle.route(id, RelationEventKind::Broken), Route::Teardown);
    }

    #[test]
    fn test_reconcile_keeps_relation_active_and_untracked() {
        let mut lifecycle = RelationLifecycle::new();
        let id = RelationId::new(5);
        lifecycle.advance(id, RelationEventKind::Joined);
        lifecycle.advance(id, RelationEventKind::Changed);
        assert_eq!(lifecycle.phase(id), RelationPhase::Active);
        assert_eq!(lifecycle.tracked(), 0);
    }

    #[test]
    fn test_departing_relation_only_tears_down() {
        let mut lifecycle = RelationLifecycle::new();
        let id = RelationId::new(5);
        lifecycle.depart(id);

        assert_eq!(lifecycle.phase(id), RelationPhase::Departing);
        assert_eq!(lifecycle.route(id, RelationEventKind::Joined), Route::Ignore);
        assert_eq!(lifecycle.route(id, RelationEventKind::Changed), Route::Ignore);
        assert_eq!(lifecycle.route(id, RelationEventKind::Broken), Route::Teardown);
    }

    #[test]
    fn test_teardown_is_terminal() {
        let mut lifecycle = RelationLifecycle::new();
        let id = RelationId::new(5);
        lifecycle.depart(id);
        lifecycle.advance(id, RelationEventKind::Broken);

        assert_eq!(lifecycle.phase(id), RelationPhase::Terminal);
        assert_eq!(lifecycle.route(id, RelationEventKind::Changed), Route::Ignore);
        assert_eq!(lifecycle.route(id, RelationEventKind::Broken), Route::Ignore);

        lifecycle.depart(id);
        lifecycle.advance(id, RelationEventKind::Changed);
        assert_eq!(lifecycle.phase(id), RelationPhase::Terminal);
        assert_eq!(lifecycle.terminal_count(), 1);
    }

    #[test]
    fn test_relations_are_independent() {
        let mut lifecycle = RelationLifecycle::new();
        lifecycle.advance(RelationId::new(1), RelationEventKind::Broken);
        assert_eq!(
            lifecycle.route(RelationId::new(2), RelationEventKind::Joined),
            Route::Reconcile
        );
    }

    #[test]
    fn test_terminal_relations_are_bounded() {
        let mut lifecycle = RelationLifecycle::with_retention(2);
        for id in 1..=3 {
            lifecycle.retire(RelationId::new(id));
        }
        lifecycle.retire(RelationId::new(3));

        assert_eq!(lifecycle.terminal_count(), 2);
        assert_eq!(lifecycle.tracked(), 2);
        assert_eq!(lifecycle.phase(RelationId::new(1)), RelationPhase::Active);
        assert_eq!(lifecycle.phase(RelationId::new(2)), RelationPhase::Terminal);
        assert_eq!(lifecycle.phase(RelationId::new(3)), RelationPhase::Terminal);
    }
}
