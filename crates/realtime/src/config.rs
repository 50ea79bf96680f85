use std::env;

/// Collection names in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    /// One live-location record per vehicle.
    pub vehicles: String,
    /// One record per tracking session.
    pub sessions: String,
    /// Child rows holding session events.
    pub events: String,
}

impl Collections {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            vehicles: env_or("VEHICLES_COLLECTION", "vehicleLocations"),
            sessions: env_or("SESSIONS_COLLECTION", "tripSessions"),
            events: env_or("EVENTS_COLLECTION", "events"),
        }
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Read an environment variable, falling back to `default` when unset.
#[must_use]
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        tracing::trace!("{key} not set, using default: {default}");
        default.to_string()
    })
}

/// Read and parse an environment variable, falling back to `default` when
/// unset or unparseable.
#[must_use]
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|value| value.trim().parse::<T>().ok()).unwrap_or_else(|| {
        tracing::trace!("{key} not set or invalid, using default");
        default
    })
}
