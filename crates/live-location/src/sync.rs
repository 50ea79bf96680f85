//! Projects accepted samples onto the vehicle's live-location record and,
//! when the sample carries a session, onto that session's record.
//!
//! The two writes are independent. Each is a re-projection of the same
//! sample stream, so the next accepted sample repairs any divergence left by
//! a failed write.

use std::sync::Arc;

use anyhow::Context as _;
use realtime::{Clock, Collections, Document, DocumentStore, Result};
use serde::Serialize;
use serde_json::Value;

use crate::identifier::VehicleId;
use crate::models::{Coordinate, LiveLocationRecord, LocationSample};

// Fields written on every accepted sample. `driverName` is omitted unless
// supplied or tracking is just starting, so a stored name is never replaced
// by the placeholder.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VehicleWrite<'a> {
    vehicle_id: &'a VehicleId,
    location: Option<Coordinate>,
    speed: f64,
    heading: f64,
    accuracy: f64,
    is_tracking: bool,
    active_session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    driver_name: Option<&'a str>,
    captured_at: i64,
    last_update_timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionLocation {
    latitude: f64,
    longitude: f64,
    speed: f64,
    heading: f64,
    accuracy: f64,
    captured_at: i64,
    recorded_at: i64,
}

pub struct LocationSync<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    collections: Collections,
    default_driver_name: String,
}

impl<S: DocumentStore, C: Clock> LocationSync<S, C> {
    pub fn new(
        store: Arc<S>, clock: Arc<C>, collections: Collections, default_driver_name: String,
    ) -> Self {
        Self { store, clock, collections, default_driver_name }
    }

    /// Write `sample` to the vehicle record and, if attached, its session.
    /// `starting` marks the first tracking sample since the vehicle was last
    /// stopped; only then is a missing driver name defaulted.
    ///
    /// # Errors
    ///
    /// Returns [`realtime::Error::Storage`] when the vehicle record write
    /// fails. A failed session write is logged and does not fail the call.
    pub async fn persist(
        &self, vehicle: &VehicleId, sample: &LocationSample, starting: bool,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        let fields = self.vehicle_fields(vehicle, sample, starting, now)?;

        let primary = self
            .store
            .merge(&self.collections.vehicles, vehicle.as_str(), fields)
            .await
            .with_context(|| format!("writing live location for {vehicle}"));

        if let Err(err) = &primary {
            tracing::error!(
                monotonic_counter.location_write_errors = 1,
                vehicle = %vehicle,
                error = %err,
                "vehicle record write failed"
            );
        }

        if sample.is_tracking
            && let Some(session_id) = sample.session_id.as_deref()
            && let Err(err) = self.write_session(session_id, sample, now).await
        {
            tracing::warn!(
                monotonic_counter.session_location_write_errors = 1,
                vehicle = %vehicle,
                session = session_id,
                error = %err,
                "session location write failed"
            );
        }

        primary?;
        Ok(())
    }

    /// Read the current record for one vehicle.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails or the record is malformed.
    pub async fn fetch(&self, vehicle: &VehicleId) -> Result<Option<LiveLocationRecord>> {
        let doc = self
            .store
            .get(&self.collections.vehicles, vehicle.as_str())
            .await
            .with_context(|| format!("reading live location for {vehicle}"))?;
        doc.map(|doc| decode_record(vehicle.as_str(), doc)).transpose()
    }

    /// Read every vehicle record, skipping malformed ones.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn fetch_all(&self) -> Result<Vec<LiveLocationRecord>> {
        let snapshots = self
            .store
            .query(&self.collections.vehicles, &realtime::Query::default())
            .await
            .context("reading live locations")?;
        Ok(decode_records(snapshots))
    }

    fn vehicle_fields(
        &self, vehicle: &VehicleId, sample: &LocationSample, starting: bool, now: i64,
    ) -> Result<Document> {
        let tracking = sample.is_tracking;
        let driver_name = match sample.driver_name.as_deref() {
            Some(name) => Some(name),
            None if tracking && starting => Some(self.default_driver_name.as_str()),
            None => None,
        };

        let write = VehicleWrite {
            vehicle_id: vehicle,
            location: sample.coordinate.filter(|_| tracking),
            speed: if tracking { sample.speed } else { 0.0 },
            heading: if tracking { sample.heading } else { 0.0 },
            accuracy: if tracking { sample.accuracy } else { 0.0 },
            is_tracking: tracking,
            active_session_id: sample.session_id.as_deref().filter(|_| tracking),
            driver_name,
            captured_at: sample.captured_at,
            last_update_timestamp: now,
        };
        to_document(&write)
    }

    async fn write_session(
        &self, session_id: &str, sample: &LocationSample, now: i64,
    ) -> Result<()> {
        let Some(coordinate) = sample.coordinate else {
            return Ok(());
        };
        let last_location = SessionLocation {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            speed: sample.speed,
            heading: sample.heading,
            accuracy: sample.accuracy,
            captured_at: sample.captured_at,
            recorded_at: now,
        };

        let mut fields = Document::new();
        fields.insert("lastLocation".to_string(), serde_json::to_value(&last_location)?);
        fields.insert("updatedAt".to_string(), Value::from(now));

        self.store
            .update(&self.collections.sessions, session_id, fields)
            .await
            .with_context(|| format!("writing last location for session {session_id}"))?;
        Ok(())
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(doc) => Ok(doc),
        other => Err(realtime::Error::Internal(format!("expected an object, got {other}"))),
    }
}

/// Decode a stored record, defaulting the vehicle id to the record key.
///
/// # Errors
///
/// Returns [`realtime::Error::Internal`] when the document does not match
/// the record shape.
pub fn decode_record(key: &str, doc: Document) -> Result<LiveLocationRecord> {
    let mut record: LiveLocationRecord = serde_json::from_value(Value::Object(doc))?;
    if record.vehicle_id.is_empty() {
        record.vehicle_id = VehicleId::normalize(key);
    }
    Ok(record)
}

pub(crate) fn decode_records(snapshots: Vec<realtime::Snapshot>) -> Vec<LiveLocationRecord> {
    snapshots
        .into_iter()
        .filter_map(|snap| match decode_record(&snap.id, snap.data) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(vehicle = %snap.id, error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}
