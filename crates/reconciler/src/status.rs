//! Unit status reported to operators.

use serde::{Deserialize, Serialize};

/// Operator-visible status of this provider unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Active,
    Waiting(String),
    Blocked(String),
    Maintenance(String),
}

impl UnitStatus {
    /// Status name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Waiting(_) => "waiting",
            Self::Blocked(_) => "blocked",
            Self::Maintenance(_) => "maintenance",
        }
    }

    /// Status message, empty for `Active`.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Active => "",
            Self::Waiting(m) | Self::Blocked(m) | Self::Maintenance(m) => m,
        }
    }

    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            other => write!(f, "{}: {}", other.name(), other.message()),
        }
    }
}
