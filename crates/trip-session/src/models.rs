use live_location::VehicleId;
use realtime::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a tracking session. `Completed` is terminal.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// Last accepted position written by the location pipeline.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LastLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub accuracy: f64,
    pub captured_at: i64,
    pub recorded_at: i64,
}

/// A stored tracking session.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TripSession {
    pub session_id: String,
    pub vehicle_id: VehicleId,
    pub driver_id: String,
    pub driver_name: String,
    pub status: SessionStatus,
    pub started_at: i64,
    pub updated_at: i64,
    pub ended_at: Option<i64>,
    pub last_event_at: Option<i64>,
    pub last_location: Option<LastLocation>,
    pub metadata: Document,
    /// Caller-supplied data recorded by `complete_session`.
    pub completion: Option<Value>,
    pub seen_by: Vec<String>,
}

/// Request to open, or re-open, a tracking session.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub session_id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub driver_id: String,
    #[serde(default)]
    pub driver_name: String,
    #[serde(default)]
    pub metadata: Document,
}

/// Event to append under a session.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub payload: Value,
}

impl NewEvent {
    #[must_use]
    pub fn new(event_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), title: title.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// An appended session event. Never mutated after creation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionEvent {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub title: String,
    pub body: String,
    pub payload: Value,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn session_reads_stored_shape() {
        let stored = json!({
            "sessionId": "S1",
            "vehicleId": "BUS-01",
            "driverName": "Asha",
            "status": "paused",
            "startedAt": 10,
            "lastLocation": {"latitude": 11.0, "longitude": 77.0},
            "seenBy": ["v1"],
        });
        let session: TripSession = serde_json::from_value(stored).unwrap();

        assert_eq!(session.vehicle_id.as_str(), "BUS-01");
        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(session.ended_at, None);
        assert_eq!(session.last_location.map(|l| l.longitude), Some(77.0));
        assert_eq!(session.seen_by, vec!["v1".to_string()]);
    }

    #[test]
    fn event_uses_type_key() {
        let event: NewEvent =
            serde_json::from_value(json!({"type": "arrived", "title": "At stop"})).unwrap();
        assert_eq!(event, NewEvent::new("arrived", "At stop"));
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], json!("arrived"));
    }
}
