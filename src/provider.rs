use std::sync::Arc;

use live_location::{Config, LocationProcessor};
use realtime::{MemoryStore, SystemClock};
use trip_session::TripSessionLifecycle;

pub type Locations = LocationProcessor<MemoryStore, SystemClock>;
pub type Sessions = TripSessionLifecycle<MemoryStore, SystemClock>;

/// Shared handles to the tracking core, cloned into every request.
#[derive(Clone)]
pub struct Provider {
    pub locations: Arc<Locations>,
    pub sessions: Arc<Sessions>,
}

impl Provider {
    #[must_use]
    pub fn new(config: &Config, store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let clock = Arc::new(SystemClock);

        let locations = LocationProcessor::new(config, Arc::clone(&store), Arc::clone(&clock));
        let sessions = TripSessionLifecycle::new(store, clock, config.collections.clone());

        Self { locations: Arc::new(locations), sessions: Arc::new(sessions) }
    }

    /// Provider over a fresh in-process store, configured from the
    /// environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(&Config::from_env(), MemoryStore::new())
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::from_env()
    }
}
