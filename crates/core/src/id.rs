//! Identifiers used by the bus.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a rerunner registration.
///
/// Rerunners are compared by id rather than by callback identity, so the
/// caller that registered one can remove it later without keeping the
/// callback around. Hosts usually pick a meaningful string; [`RerunnerId::new`]
/// generates a unique one when no natural key exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RerunnerId(String);

impl RerunnerId {
    /// Create a new, unique identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing ids explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RerunnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RerunnerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RerunnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RerunnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for RerunnerId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}
