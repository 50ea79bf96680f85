use std::sync::Arc;

use realtime::{Clock, DocumentStore, Error, Result, bad_request};
use tracing::{debug, info};

use crate::config::Config;
use crate::fanout::{Subscription, SubscriptionFanout};
use crate::identifier::VehicleId;
use crate::key_locker::VehicleLocks;
use crate::models::{LiveLocationRecord, LocationUpdate, SkipReason, UpdateOutcome};
use crate::session::{ActiveSession, SessionRegistry, Verdict};
use crate::sync::LocationSync;
use crate::throttle::ThrottleGate;

/// Entry point for driver location reports and viewer subscriptions.
///
/// Each report is normalized, checked against the vehicle's session state,
/// throttled, and persisted, all while holding that vehicle's lock.
pub struct LocationProcessor<S, C> {
    clock: Arc<C>,
    locks: VehicleLocks,
    sessions: SessionRegistry,
    throttle: ThrottleGate,
    sync: LocationSync<S, C>,
    fanout: SubscriptionFanout<S>,
}

impl<S: DocumentStore, C: Clock> LocationProcessor<S, C> {
    pub fn new(config: &Config, store: Arc<S>, clock: Arc<C>) -> Self {
        let sync = LocationSync::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.collections.clone(),
            config.default_driver_name.clone(),
        );
        let fanout = SubscriptionFanout::new(store, config.collections.clone());

        Self {
            clock,
            locks: VehicleLocks::new(),
            sessions: SessionRegistry::new(config.terminated_capacity, config.terminated_retain),
            throttle: ThrottleGate::new(config.min_distance_meters, config.min_interval_ms),
            sync,
            fanout,
        }
    }

    /// Handle one location report from a driver client.
    ///
    /// Skips and storage failures are reported through [`UpdateOutcome`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when the vehicle id is blank or a
    /// tracking report lacks finite coordinates. No state is touched.
    pub async fn update_location(
        &self, vehicle_id: &str, update: LocationUpdate,
    ) -> Result<UpdateOutcome> {
        let vehicle = VehicleId::normalize(vehicle_id);
        if vehicle.is_empty() {
            return Err(bad_request!("vehicle id is required"));
        }
        let sample = update.into_sample(self.clock.now_ms())?;

        let _guard = self.locks.lock(&vehicle).await;
        let now = self.clock.now_ms();

        if let Verdict::Reject(reason) =
            self.sessions.accept(&vehicle, sample.session_id.as_deref(), sample.is_tracking)
        {
            return Ok(skipped(&vehicle, reason));
        }

        if !self.throttle.should_accept(&vehicle, &sample, now) {
            return Ok(skipped(&vehicle, SkipReason::Throttled));
        }

        let starting = sample.is_tracking && !self.throttle.is_tracked(&vehicle);
        let persisted = self.sync.persist(&vehicle, &sample, starting).await;

        if !sample.is_tracking {
            self.throttle.clear(&vehicle);
        }

        match persisted {
            Ok(()) => {
                if sample.is_tracking {
                    self.throttle.record_accepted(&vehicle, &sample, now);
                }
                info!(
                    monotonic_counter.location_persisted = 1,
                    vehicle = %vehicle,
                    tracking = sample.is_tracking,
                    session = sample.session_id.as_deref().unwrap_or_default(),
                    "location persisted"
                );
                Ok(UpdateOutcome::Persisted)
            }
            Err(err) => Ok(UpdateOutcome::Failed(err)),
        }
    }

    /// Report that `vehicle_id` stopped tracking under `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when the vehicle id is blank.
    pub async fn stop_tracking(
        &self, vehicle_id: &str, session_id: Option<&str>,
    ) -> Result<UpdateOutcome> {
        let mut update = LocationUpdate::stopped();
        update.session_id = session_id.map(ToString::to_string);
        self.update_location(vehicle_id, update).await
    }

    /// Current record for one vehicle.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn vehicle_location(&self, vehicle_id: &str) -> Result<Option<LiveLocationRecord>> {
        let vehicle = VehicleId::normalize(vehicle_id);
        if vehicle.is_empty() {
            return Err(bad_request!("vehicle id is required"));
        }
        self.sync.fetch(&vehicle).await
    }

    /// Current records for every vehicle.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn all_vehicle_locations(&self) -> Result<Vec<LiveLocationRecord>> {
        self.sync.fetch_all().await
    }

    pub fn subscribe_vehicle<U, E>(
        &self, vehicle_id: &str, on_update: U, on_error: E,
    ) -> Subscription
    where
        U: FnMut(Option<LiveLocationRecord>) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.fanout.subscribe_vehicle(vehicle_id, on_update, on_error)
    }

    pub fn subscribe_all_vehicles<U, E>(&self, on_update: U, on_error: E) -> Subscription
    where
        U: FnMut(Vec<LiveLocationRecord>) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.fanout.subscribe_all_vehicles(on_update, on_error)
    }

    #[must_use]
    pub fn active_session(&self, vehicle_id: &str) -> Option<ActiveSession> {
        self.sessions.active_session(&VehicleId::normalize(vehicle_id))
    }

    #[must_use]
    pub fn is_terminated(&self, session_id: &str) -> bool {
        self.sessions.is_terminated(session_id)
    }
}

fn skipped(vehicle: &VehicleId, reason: SkipReason) -> UpdateOutcome {
    debug!(
        monotonic_counter.location_skipped = 1,
        vehicle = %vehicle,
        reason = reason.as_str(),
        "location skipped"
    );
    UpdateOutcome::Skipped(reason)
}
