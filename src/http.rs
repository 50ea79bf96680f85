use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use http::StatusCode;
use live_location::{LiveLocationRecord, LocationUpdate, Subscription, UpdateOutcome, UpdateReply};
use realtime::{HttpResult, bad_request, not_found};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use trip_session::{NewEvent, SessionEvent, StartSession, TripSession};

use crate::provider::Provider;

pub fn router(provider: Provider) -> Router {
    Router::new()
        .route("/vehicles/stream", get(all_vehicles_stream))
        .route("/vehicles/{vehicle_id}", get(vehicle))
        .route("/vehicles/{vehicle_id}/location", post(update_location))
        .route("/vehicles/{vehicle_id}/stream", get(vehicle_stream))
        .route("/vehicles/{vehicle_id}/session", get(active_session))
        .route("/vehicles/{vehicle_id}/session/stream", get(active_session_stream))
        .route("/sessions", post(start_session))
        .route("/sessions/{session_id}", get(session))
        .route("/sessions/{session_id}/complete", post(complete_session))
        .route("/sessions/{session_id}/pause", post(pause_session))
        .route("/sessions/{session_id}/resume", post(resume_session))
        .route("/sessions/{session_id}/events", get(session_events).post(append_event))
        .route("/sessions/{session_id}/seen/{viewer_id}", post(mark_seen))
        .with_state(provider)
}

// validation errors use the same reply shape as storage failures
#[axum::debug_handler]
async fn update_location(
    State(provider): State<Provider>, Path(vehicle_id): Path<String>,
    Json(update): Json<LocationUpdate>,
) -> (StatusCode, Json<UpdateReply>) {
    let outcome = provider
        .locations
        .update_location(&vehicle_id, update)
        .await
        .unwrap_or_else(UpdateOutcome::Failed);
    let status = match &outcome {
        UpdateOutcome::Failed(err) => err.code(),
        UpdateOutcome::Persisted | UpdateOutcome::Skipped(_) => StatusCode::OK,
    };
    (status, Json(outcome.reply()))
}

#[axum::debug_handler]
async fn vehicle(
    State(provider): State<Provider>, Path(vehicle_id): Path<String>,
) -> HttpResult<Json<LiveLocationRecord>> {
    let Some(record) = provider.locations.vehicle_location(&vehicle_id).await? else {
        return Err(not_found!("vehicle {vehicle_id}").into());
    };
    Ok(Json(record))
}

#[axum::debug_handler]
async fn vehicle_stream(
    State(provider): State<Provider>, Path(vehicle_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let updates = tx.clone();
    let subscription = provider.locations.subscribe_vehicle(
        &vehicle_id,
        move |record| send(&updates, "location", &record),
        move |err| send(&tx, "error", &err.to_string()),
    );
    event_stream(rx, subscription)
}

#[axum::debug_handler]
async fn all_vehicles_stream(
    State(provider): State<Provider>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let updates = tx.clone();
    let subscription = provider.locations.subscribe_all_vehicles(
        move |records| send(&updates, "locations", &records),
        move |err| send(&tx, "error", &err.to_string()),
    );
    event_stream(rx, subscription)
}

#[axum::debug_handler]
async fn active_session(
    State(provider): State<Provider>, Path(vehicle_id): Path<String>,
) -> HttpResult<Json<Option<TripSession>>> {
    Ok(Json(provider.sessions.get_latest_active_session(&vehicle_id).await?))
}

#[axum::debug_handler]
async fn active_session_stream(
    State(provider): State<Provider>, Path(vehicle_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let updates = tx.clone();
    let subscription = provider.sessions.subscribe_active_session(
        &vehicle_id,
        move |session| send(&updates, "session", &session),
        move |err| send(&tx, "error", &err.to_string()),
    );
    event_stream(rx, subscription)
}

#[axum::debug_handler]
async fn start_session(
    State(provider): State<Provider>, Json(request): Json<StartSession>,
) -> HttpResult<(StatusCode, Json<Value>)> {
    let session_id = provider.sessions.start_session(request).await?;
    Ok((StatusCode::CREATED, Json(json!({"sessionId": session_id}))))
}

#[axum::debug_handler]
async fn session(
    State(provider): State<Provider>, Path(session_id): Path<String>,
) -> HttpResult<Json<TripSession>> {
    let Some(session) = provider.sessions.get_session(&session_id).await? else {
        return Err(not_found!("session {session_id}").into());
    };
    Ok(Json(session))
}

// the completion body is optional
#[axum::debug_handler]
async fn complete_session(
    State(provider): State<Provider>, Path(session_id): Path<String>, body: Bytes,
) -> HttpResult<StatusCode> {
    let extra = if body.is_empty() {
        None
    } else {
        let value = serde_json::from_slice::<Value>(&body)
            .map_err(|e| bad_request!("invalid completion body: {e}"))?;
        Some(value)
    };
    provider.sessions.complete_session(&session_id, extra).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn pause_session(
    State(provider): State<Provider>, Path(session_id): Path<String>,
) -> HttpResult<StatusCode> {
    provider.sessions.pause_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn resume_session(
    State(provider): State<Provider>, Path(session_id): Path<String>,
) -> HttpResult<StatusCode> {
    provider.sessions.resume_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn append_event(
    State(provider): State<Provider>, Path(session_id): Path<String>,
    Json(event): Json<NewEvent>,
) -> HttpResult<(StatusCode, Json<Value>)> {
    let event_id = provider.sessions.append_event(&session_id, event).await?;
    Ok((StatusCode::CREATED, Json(json!({"eventId": event_id}))))
}

#[axum::debug_handler]
async fn session_events(
    State(provider): State<Provider>, Path(session_id): Path<String>,
) -> HttpResult<Json<Vec<SessionEvent>>> {
    Ok(Json(provider.sessions.list_events(&session_id).await?))
}

#[axum::debug_handler]
async fn mark_seen(
    State(provider): State<Provider>, Path((session_id, viewer_id)): Path<(String, String)>,
) -> HttpResult<StatusCode> {
    provider.sessions.mark_seen(&session_id, &viewer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve subscription events as a server-sent event stream. The
/// subscription lives as long as the stream, so a client disconnect cancels
/// it.
fn event_stream(
    rx: UnboundedReceiver<Event>, subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let event = rx.recv().await?;
        Some((Ok(event), (rx, subscription)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn send<T: Serialize>(tx: &UnboundedSender<Event>, name: &str, data: &T) {
    match Event::default().event(name).json_data(data) {
        Ok(event) => {
            let _ = tx.send(event);
        }
        Err(err) => tracing::warn!(event = name, error = %err, "dropping unserializable event"),
    }
}
