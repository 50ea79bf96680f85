use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical vehicle key: uppercase, no whitespace, single hyphens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    /// Canonicalize a raw vehicle identifier. Total and idempotent; empty
    /// input yields an empty id.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let mut canonical = String::with_capacity(raw.len());

        for ch in raw.trim().to_uppercase().chars() {
            if ch.is_whitespace() {
                continue;
            }
            if ch == '-' && canonical.ends_with('-') {
                continue;
            }
            canonical.push(ch);
        }

        Self(canonical)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VehicleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VehicleId {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}
