use realtime::{Collections, env_or, env_parse};

/// Tuning for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Samples closer than this to the last accepted one may be dropped.
    pub min_distance_meters: f64,
    /// Samples arriving sooner than this after the last accepted one may be dropped.
    pub min_interval_ms: i64,
    /// Terminated-session memory is pruned once it holds more than this.
    pub terminated_capacity: usize,
    /// Number of most recent terminated sessions kept after pruning.
    pub terminated_retain: usize,
    /// Driver name written when tracking starts without one.
    pub default_driver_name: String,
    pub collections: Collections,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            min_distance_meters: env_parse("THROTTLE_MIN_DISTANCE_METERS", 20.0),
            min_interval_ms: env_parse("THROTTLE_MIN_INTERVAL_MS", 4_000),
            terminated_capacity: env_parse("TERMINATED_SESSION_CAPACITY", 1_000),
            terminated_retain: env_parse("TERMINATED_SESSION_RETAIN", 500),
            default_driver_name: env_or("DEFAULT_DRIVER_NAME", "Driver"),
            collections: Collections::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
