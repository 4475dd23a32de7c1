//! Readiness gate.
//!
//! A backend that is not ready gets one grace period: the event is checked
//! again after `grace_delay`, and deferred if the backend is still not ready
//! at that point.

use std::time::Duration;

use provider_relation::Delivery;

/// Decision of the readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Backend is ready, proceed.
    Open,
    /// Check again after the delay.
    Recheck(Duration),
    /// Give up on this delivery and defer the event.
    Defer,
}

/// Maps a readiness check result to a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessGate {
    grace_delay: Duration,
}

impl ReadinessGate {
    /// Create a new gate with the given grace period.
    #[must_use]
    pub const fn new(grace_delay: Duration) -> Self {
        Self { grace_delay }
    }

    /// The grace period.
    #[must_use]
    pub const fn grace_delay(&self) -> Duration {
        self.grace_delay
    }

    /// Decide what to do with an event delivered as `delivery`.
    #[must_use]
    pub const fn evaluate(&self, ready: bool, delivery: Delivery) -> Gate {
        match (ready, delivery) {
            (true, _) => Gate::Open,
            (false, Delivery::GraceRecheck) => Gate::Defer,
            (false, Delivery::Fresh | Delivery::Redelivered) => Gate::Recheck(self.grace_delay),
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_is_open() {
        let gate = ReadinessGate::default();
        assert_eq!(gate.evaluate(true, Delivery::Fresh), Gate::Open);
        assert_eq!(gate.evaluate(true, Delivery::GraceRecheck), Gate::Open);
    }

    #[test]
    fn test_first_miss_rechecks() {
        let gate = ReadinessGate::new(Duration::from_secs(5));
        assert_eq!(
            gate.evaluate(false, Delivery::Fresh),
            Gate::Recheck(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_redelivery_gets_fresh_grace() {
        let gate = ReadinessGate::default();
        assert_eq!(
            gate.evaluate(false, Delivery::Redelivered),
            Gate::Recheck(gate.grace_delay())
        );
    }

    #[test]
    fn test_second_miss_defers() {
        let gate = ReadinessGate::default();
        assert_eq!(gate.evaluate(false, Delivery::GraceRecheck), Gate::Defer);
    }
}
