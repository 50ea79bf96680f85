//! Per-vehicle redundancy suppression.
//!
//! A tracking sample is dropped only when it is both close to and soon after
//! the last accepted sample for the same vehicle. Stop samples and the first
//! tracking sample after a stop always pass.

use dashmap::DashMap;

use crate::identifier::VehicleId;
use crate::models::{Coordinate, LocationSample};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ThrottleState {
    last: Coordinate,
    accepted_at: i64,
}

#[derive(Debug)]
pub struct ThrottleGate {
    min_distance_meters: f64,
    min_interval_ms: i64,
    states: DashMap<VehicleId, ThrottleState>,
}

impl ThrottleGate {
    #[must_use]
    pub fn new(min_distance_meters: f64, min_interval_ms: i64) -> Self {
        Self { min_distance_meters, min_interval_ms, states: DashMap::new() }
    }

    /// Should `sample` be forwarded downstream?
    #[must_use]
    pub fn should_accept(&self, vehicle: &VehicleId, sample: &LocationSample, now: i64) -> bool {
        if !sample.is_tracking {
            return true;
        }
        let (Some(state), Some(coordinate)) = (self.states.get(vehicle), sample.coordinate) else {
            return true;
        };

        let distance = haversine_meters(state.last, coordinate);
        let elapsed = now - state.accepted_at;
        let redundant = distance < self.min_distance_meters && elapsed < self.min_interval_ms;

        if redundant {
            tracing::debug!(vehicle = %vehicle, distance, elapsed, "sample throttled");
        }
        !redundant
    }

    /// Remember an accepted tracking sample as the new reference point.
    pub fn record_accepted(&self, vehicle: &VehicleId, sample: &LocationSample, now: i64) {
        if let Some(last) = sample.coordinate {
            self.states.insert(vehicle.clone(), ThrottleState { last, accepted_at: now });
        }
    }

    /// Forget the vehicle so its next tracking sample passes as a first sample.
    pub fn clear(&self, vehicle: &VehicleId) {
        self.states.remove(vehicle);
    }

    #[must_use]
    pub fn is_tracked(&self, vehicle: &VehicleId) -> bool {
        self.states.contains_key(vehicle)
    }
}

/// Great-circle distance between two coordinates.
#[must_use]
pub fn haversine_meters(from: Coordinate, to: Coordinate) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationUpdate;

    fn sample(latitude: f64, longitude: f64) -> LocationSample {
        LocationUpdate::tracking(latitude, longitude).into_sample(0).expect("valid sample")
    }

    fn stop() -> LocationSample {
        LocationUpdate::stopped().into_sample(0).expect("valid sample")
    }

    #[test]
    fn haversine_small_offset() {
        let d = haversine_meters(
            Coordinate { latitude: 11.0, longitude: 77.0 },
            Coordinate { latitude: 11.000_05, longitude: 77.000_05 },
        );
        assert!((7.0..9.0).contains(&d), "got {d}");
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_meters(
            Coordinate { latitude: 0.0, longitude: 0.0 },
            Coordinate { latitude: 1.0, longitude: 0.0 },
        );
        assert!((111_000.0..111_400.0).contains(&d), "got {d}");
    }

    #[test]
    fn drops_only_when_near_and_recent() {
        let gate = ThrottleGate::new(20.0, 4_000);
        let bus = VehicleId::normalize("bus-01");

        let first = sample(11.0, 77.0);
        assert!(gate.should_accept(&bus, &first, 0));
        gate.record_accepted(&bus, &first, 0);

        let near = sample(11.000_05, 77.000_05);
        assert!(!gate.should_accept(&bus, &near, 2_000));
        assert!(gate.should_accept(&bus, &near, 5_000));

        let far = sample(11.001, 77.0);
        assert!(gate.should_accept(&bus, &far, 1));
    }

    #[test]
    fn stop_bypasses_and_clears() {
        let gate = ThrottleGate::new(20.0, 4_000);
        let bus = VehicleId::normalize("bus-01");
        let first = sample(11.0, 77.0);
        gate.record_accepted(&bus, &first, 0);

        assert!(gate.should_accept(&bus, &stop(), 1));
        gate.clear(&bus);
        assert!(!gate.is_tracked(&bus));

        // restart at the same spot straight away still passes
        assert!(gate.should_accept(&bus, &first, 2));
    }

    #[test]
    fn vehicles_are_independent() {
        let gate = ThrottleGate::new(20.0, 4_000);
        let a = VehicleId::normalize("A");
        let b = VehicleId::normalize("B");
        let s = sample(11.0, 77.0);
        gate.record_accepted(&a, &s, 0);

        assert!(!gate.should_accept(&a, &s, 10));
        assert!(gate.should_accept(&b, &s, 10));
    }
}
