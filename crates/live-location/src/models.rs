use realtime::{Error, Result, bad_request};
use serde::{Deserialize, Serialize};

use crate::identifier::VehicleId;

/// A location report as sent by the driver client.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub is_tracking: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    /// Device capture time in epoch milliseconds.
    #[serde(default)]
    pub captured_at: Option<i64>,
}

impl LocationUpdate {
    /// A tracking sample at the given coordinate.
    #[must_use]
    pub fn tracking(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            is_tracking: true,
            ..Self::default()
        }
    }

    /// A "tracking stopped" marker.
    #[must_use]
    pub fn stopped() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_driver(mut self, driver_name: impl Into<String>) -> Self {
        self.driver_name = Some(driver_name.into());
        self
    }

    /// Validate the report into a [`LocationSample`]. Nothing is applied when
    /// this fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] when tracking without finite coordinates.
    pub fn into_sample(self, received_at: i64) -> Result<LocationSample> {
        let coordinate = if self.is_tracking {
            let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
                return Err(bad_request!("latitude and longitude are required while tracking"));
            };
            if !latitude.is_finite() || !longitude.is_finite() {
                return Err(bad_request!(
                    "latitude and longitude must be finite, got ({}, {})",
                    latitude,
                    longitude
                ));
            }
            Some(Coordinate { latitude, longitude })
        } else {
            None
        };

        Ok(LocationSample {
            coordinate,
            speed: finite_or_zero(self.speed),
            heading: finite_or_zero(self.heading),
            accuracy: finite_or_zero(self.accuracy),
            is_tracking: self.is_tracking,
            session_id: non_empty(self.session_id),
            driver_name: non_empty(self.driver_name),
            captured_at: self.captured_at.unwrap_or(received_at),
        })
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// A validated location sample. `coordinate` is always present while tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub coordinate: Option<Coordinate>,
    pub speed: f64,
    pub heading: f64,
    pub accuracy: f64,
    pub is_tracking: bool,
    pub session_id: Option<String>,
    pub driver_name: Option<String>,
    pub captured_at: i64,
}

/// Latest known position and tracking status of one vehicle.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveLocationRecord {
    pub vehicle_id: VehicleId,
    pub location: Option<Coordinate>,
    pub speed: f64,
    pub heading: f64,
    pub accuracy: f64,
    pub is_tracking: bool,
    pub active_session_id: Option<String>,
    pub driver_name: Option<String>,
    pub captured_at: Option<i64>,
    pub last_update_timestamp: i64,
}

/// Why a sample was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The sample belongs to a session the client already stopped.
    TerminatedSession,
    /// The sample is redundant with the last accepted one.
    Throttled,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TerminatedSession => "terminated-session",
            Self::Throttled => "throttled",
        }
    }
}

/// Result of one `update_location` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Persisted,
    Skipped(SkipReason),
    Failed(Error),
}

impl UpdateOutcome {
    #[must_use]
    pub fn reply(&self) -> UpdateReply {
        match self {
            Self::Persisted => UpdateReply { success: true, ..UpdateReply::default() },
            Self::Skipped(reason) => UpdateReply {
                success: true,
                skipped: Some(true),
                reason: Some(reason.as_str().to_string()),
                error: None,
            },
            Self::Failed(err) => UpdateReply {
                success: false,
                error: Some(err.to_string()),
                ..UpdateReply::default()
            },
        }
    }
}

/// Wire shape of an [`UpdateOutcome`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn tracking_requires_coordinates() {
        let missing = LocationUpdate { is_tracking: true, ..LocationUpdate::default() };
        assert!(matches!(missing.into_sample(0), Err(Error::BadRequest(_))));

        let infinite = LocationUpdate::tracking(f64::NAN, 77.0);
        assert!(matches!(infinite.into_sample(0), Err(Error::BadRequest(_))));
    }

    #[test]
    fn stop_needs_no_coordinates() -> Result<()> {
        let sample = LocationUpdate { speed: Some(3.0), ..LocationUpdate::stopped() }
            .with_session("S1")
            .into_sample(1_000)?;

        assert_eq!(sample.coordinate, None);
        assert_eq!(sample.session_id.as_deref(), Some("S1"));
        assert_eq!(sample.captured_at, 1_000);
        Ok(())
    }

    #[test]
    fn blank_strings_are_absent() -> Result<()> {
        let sample =
            LocationUpdate::tracking(11.0, 77.0).with_session(" ").with_driver("").into_sample(0)?;
        assert_eq!(sample.session_id, None);
        assert_eq!(sample.driver_name, None);
        Ok(())
    }

    #[test]
    fn deserializes_wire_shape() -> anyhow::Result<()> {
        let update: LocationUpdate = serde_json::from_value(json!({
            "latitude": 11.0,
            "longitude": 77.0,
            "speed": 8.2,
            "isTracking": true,
            "sessionId": "S1",
            "driverName": "Asha"
        }))?;

        assert_eq!(update.session_id.as_deref(), Some("S1"));
        assert_eq!(update.heading, None);
        assert!(update.is_tracking);
        Ok(())
    }

    #[test]
    fn reply_shapes() -> anyhow::Result<()> {
        let skipped = UpdateOutcome::Skipped(SkipReason::TerminatedSession).reply();
        assert_eq!(
            serde_json::to_value(&skipped)?,
            json!({"success": true, "skipped": true, "reason": "terminated-session"})
        );

        let persisted = UpdateOutcome::Persisted.reply();
        assert_eq!(serde_json::to_value(&persisted)?, json!({"success": true}));

        let failed = UpdateOutcome::Failed(Error::Storage("offline".into())).reply();
        assert!(!failed.success);
        assert!(failed.error.is_some());
        Ok(())
    }
}
