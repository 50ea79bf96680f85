//! Create, transition, and annotate tracking sessions.
//!
//! Session records are written with partial merges so the location
//! pipeline's `lastLocation` writes and lifecycle writes never clobber one
//! another.

use std::sync::Arc;

use anyhow::Context as _;
use live_location::{Subscription, VehicleId};
use realtime::{
    Clock, Collections, Direction, Document, DocumentStore, Error, Query, Result, bad_request,
    not_found,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::models::{NewEvent, SessionEvent, SessionStatus, StartSession, TripSession};

pub struct TripSessionLifecycle<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    collections: Collections,
}

impl<S: DocumentStore, C: Clock> TripSessionLifecycle<S, C> {
    pub const fn new(store: Arc<S>, clock: Arc<C>, collections: Collections) -> Self {
        Self { store, clock, collections }
    }

    /// Create the session, or merge into it when it already exists.
    ///
    /// Repeated starts keep the original `startedAt`. A completed session is
    /// left as is. Starts for one session are not serialized against each
    /// other: a session belongs to a single driver client, so two racing
    /// first starts at worst both stamp `startedAt` with near-equal times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for a blank session or vehicle id, or a
    /// storage error when the write fails.
    pub async fn start_session(&self, request: StartSession) -> Result<String> {
        let session_id = request.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(bad_request!("session id is required"));
        }
        let vehicle = VehicleId::normalize(&request.vehicle_id);
        if vehicle.is_empty() {
            return Err(bad_request!("vehicle id is required"));
        }

        let existing = self.get_session(&session_id).await?;
        if let Some(session) = &existing
            && session.status == SessionStatus::Completed
        {
            warn!(session = %session_id, "start ignored for completed session");
            return Ok(session_id);
        }

        let now = self.clock.now_ms();
        let mut fields = to_document(json!({
            "sessionId": session_id,
            "vehicleId": vehicle,
            "driverId": request.driver_id,
            "driverName": request.driver_name,
            "status": SessionStatus::Active,
            "updatedAt": now,
            "metadata": request.metadata,
        }));
        if existing.is_none() {
            fields.insert("startedAt".to_string(), Value::from(now));
            fields.insert("seenBy".to_string(), Value::Array(Vec::new()));
        }

        self.store
            .merge(&self.collections.sessions, &session_id, fields)
            .await
            .with_context(|| format!("starting session {session_id}"))?;

        info!(
            monotonic_counter.sessions_started = 1,
            session = %session_id,
            vehicle = %vehicle,
            "session started"
        );
        Ok(session_id)
    }

    /// Mark the session completed and record `extra` as completion data.
    /// Completing again re-stamps `endedAt` and keeps earlier completion
    /// data unless new data is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the session was never started.
    pub async fn complete_session(&self, session_id: &str, extra: Option<Value>) -> Result<()> {
        let now = self.clock.now_ms();
        let mut fields = to_document(json!({
            "status": SessionStatus::Completed,
            "endedAt": now,
            "updatedAt": now,
        }));
        if let Some(extra) = extra {
            fields.insert("completion".to_string(), extra);
        }

        self.store
            .update(&self.collections.sessions, session_id, fields)
            .await
            .with_context(|| format!("completing session {session_id}"))?;

        info!(monotonic_counter.sessions_completed = 1, session = %session_id, "session completed");
        Ok(())
    }

    /// Suspend an active session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown session and
    /// [`Error::BadRequest`] for a completed one.
    pub async fn pause_session(&self, session_id: &str) -> Result<()> {
        self.transition(session_id, SessionStatus::Paused).await
    }

    /// Return a paused session to active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown session and
    /// [`Error::BadRequest`] for a completed one.
    pub async fn resume_session(&self, session_id: &str) -> Result<()> {
        self.transition(session_id, SessionStatus::Active).await
    }

    async fn transition(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let Some(session) = self.get_session(session_id).await? else {
            return Err(not_found!("session {session_id}"));
        };
        if session.status == SessionStatus::Completed {
            return Err(bad_request!("session {session_id} is completed"));
        }

        let fields = to_document(json!({"status": status, "updatedAt": self.clock.now_ms()}));
        self.store
            .update(&self.collections.sessions, session_id, fields)
            .await
            .with_context(|| format!("setting session {session_id} {}", status.as_str()))?;

        debug!(session = %session_id, status = status.as_str(), "session status changed");
        Ok(())
    }

    /// Append an event under the session and return its id. Events may be
    /// appended after completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the session was never started.
    pub async fn append_event(&self, session_id: &str, event: NewEvent) -> Result<String> {
        if event.event_type.trim().is_empty() {
            return Err(bad_request!("event type is required"));
        }

        let now = self.clock.now_ms();
        let fields = to_document(json!({
            "type": event.event_type,
            "title": event.title,
            "body": event.body,
            "payload": event.payload,
            "createdAt": now,
        }));

        let event_id = self
            .store
            .append(&self.collections.sessions, session_id, &self.collections.events, fields)
            .await
            .with_context(|| format!("appending event to session {session_id}"))?;

        let touched = to_document(json!({"updatedAt": now, "lastEventAt": now}));
        if let Err(err) = self.store.update(&self.collections.sessions, session_id, touched).await {
            warn!(session = %session_id, error = %err, "event timestamps not updated");
        }

        debug!(session = %session_id, event = %event_id, "event appended");
        Ok(event_id)
    }

    /// Record that `viewer_id` has seen the session. Repeats are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the session was never started.
    pub async fn mark_seen(&self, session_id: &str, viewer_id: &str) -> Result<()> {
        let viewer_id = viewer_id.trim();
        if viewer_id.is_empty() {
            return Err(bad_request!("viewer id is required"));
        }

        self.store
            .add_to_set(&self.collections.sessions, session_id, "seenBy", Value::from(viewer_id))
            .await
            .with_context(|| format!("marking session {session_id} seen"))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error when the store read fails or the record is malformed.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<TripSession>> {
        let doc = self
            .store
            .get(&self.collections.sessions, session_id)
            .await
            .with_context(|| format!("reading session {session_id}"))?;
        doc.map(|doc| decode_session(session_id, doc)).transpose()
    }

    /// Events of a session in the order they were appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the session was never started.
    pub async fn list_events(&self, session_id: &str) -> Result<Vec<SessionEvent>> {
        if self.get_session(session_id).await?.is_none() {
            return Err(not_found!("session {session_id}"));
        }

        let rows = self
            .store
            .children(&self.collections.sessions, session_id, &self.collections.events)
            .await
            .with_context(|| format!("reading events of session {session_id}"))?;

        rows.into_iter()
            .map(|row| -> Result<SessionEvent> {
                let mut event: SessionEvent = serde_json::from_value(Value::Object(row.data))?;
                event.event_id = row.id;
                Ok(event)
            })
            .collect()
    }

    /// Most recently started active session for a vehicle.
    ///
    /// # Errors
    ///
    /// Returns an error when the store query fails.
    pub async fn get_latest_active_session(&self, vehicle_id: &str) -> Result<Option<TripSession>> {
        let vehicle = VehicleId::normalize(vehicle_id);
        let snapshots = self
            .store
            .query(&self.collections.sessions, &active_query(&vehicle))
            .await
            .with_context(|| format!("querying active session for {vehicle}"))?;

        snapshots.into_iter().next().map(|snap| decode_session(&snap.id, snap.data)).transpose()
    }

    /// Follow the most recently started active session for a vehicle.
    /// `on_session` receives `None` while there is none.
    pub fn subscribe_active_session<U, E>(
        &self, vehicle_id: &str, mut on_session: U, on_error: E,
    ) -> Subscription
    where
        U: FnMut(Option<TripSession>) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let vehicle = VehicleId::normalize(vehicle_id);
        let store = Arc::clone(&self.store);
        let collection = self.collections.sessions.clone();

        Subscription::spawn(async move {
            let mut feed = match store.watch_query(&collection, active_query(&vehicle)).await {
                Ok(feed) => feed,
                Err(err) => return fail(&vehicle, on_error, err.into()),
            };

            while let Some(next) = feed.next().await {
                let latest = match next {
                    Ok(snapshots) => snapshots
                        .into_iter()
                        .next()
                        .map(|snap| decode_session(&snap.id, snap.data))
                        .transpose(),
                    Err(err) => Err(err.into()),
                };
                match latest {
                    Ok(session) => on_session(session),
                    Err(err) => return fail(&vehicle, on_error, err),
                }
            }
        })
    }
}

fn active_query(vehicle: &VehicleId) -> Query {
    Query::new()
        .where_eq("vehicleId", vehicle.as_str())
        .where_eq("status", SessionStatus::Active.as_str())
        .order_by("startedAt", Direction::Descending)
        .limit(1)
}

fn decode_session(key: &str, doc: Document) -> Result<TripSession> {
    let mut session: TripSession = serde_json::from_value(Value::Object(doc))?;
    if session.session_id.is_empty() {
        session.session_id = key.to_string();
    }
    Ok(session)
}

fn to_document(value: Value) -> Document {
    match value {
        Value::Object(doc) => doc,
        _ => Document::new(),
    }
}

fn fail(vehicle: &VehicleId, on_error: impl FnOnce(Error), err: Error) {
    warn!(
        monotonic_counter.subscription_errors = 1,
        vehicle = %vehicle,
        error = %err,
        "active session subscription closed"
    );
    on_error(err);
}
