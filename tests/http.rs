#![allow(missing_docs)]

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use live_location::Config;
use pretty_assertions::assert_eq;
use realtime::MemoryStore;
use serde_json::{Value, json};
use shuttle::{Provider, router};
use tower::ServiceExt;

fn app() -> Router {
    router(Provider::new(&Config::default(), MemoryStore::new()))
}

async fn call(
    app: &Router, method: &str, uri: &str, body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    Ok((status, value))
}

#[tokio::test]
async fn location_report_round_trip() -> Result<()> {
    let app = app();

    let report = json!({"latitude": 11.0, "longitude": 77.0, "speed": 4.5, "isTracking": true});
    let (status, reply) = call(&app, "POST", "/vehicles/bus--01/location", Some(report)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"success": true}));

    let (status, record) = call(&app, "GET", "/vehicles/BUS-01", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["vehicleId"], json!("BUS-01"));
    assert_eq!(record["location"], json!({"latitude": 11.0, "longitude": 77.0}));
    assert_eq!(record["driverName"], json!("Driver"));
    Ok(())
}

#[tokio::test]
async fn tracking_without_coordinates_is_rejected() -> Result<()> {
    let app = app();

    let (status, reply) =
        call(&app, "POST", "/vehicles/BUS-01/location", Some(json!({"isTracking": true}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["success"], json!(false));
    assert!(reply["error"].is_string());

    let (status, _) = call(&app, "GET", "/vehicles/BUS-01", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn straggler_reply_is_a_skip() -> Result<()> {
    let app = app();
    let tracking =
        json!({"latitude": 11.0, "longitude": 77.0, "isTracking": true, "sessionId": "S1"});

    call(&app, "POST", "/vehicles/BUS-01/location", Some(tracking.clone())).await?;
    let stop = json!({"isTracking": false, "sessionId": "S1"});
    let (_, reply) = call(&app, "POST", "/vehicles/BUS-01/location", Some(stop)).await?;
    assert_eq!(reply, json!({"success": true}));

    let (status, reply) = call(&app, "POST", "/vehicles/BUS-01/location", Some(tracking)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"success": true, "skipped": true, "reason": "terminated-session"}));
    Ok(())
}

#[tokio::test]
async fn session_lifecycle_over_http() -> Result<()> {
    let app = app();

    let start = json!({
        "sessionId": "S1",
        "vehicleId": "bus-01",
        "driverId": "d-1",
        "driverName": "Asha",
    });
    let (status, reply) = call(&app, "POST", "/sessions", Some(start)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply, json!({"sessionId": "S1"}));

    let (status, active) = call(&app, "GET", "/vehicles/BUS-01/session", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["sessionId"], json!("S1"));

    let event = json!({"type": "boarded", "title": "Rider boarded", "payload": {"seat": 3}});
    let (status, reply) = call(&app, "POST", "/sessions/S1/events", Some(event)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert!(reply["eventId"].is_string());

    let (status, _) = call(&app, "POST", "/sessions/S1/seen/parent-1", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, "POST", "/sessions/S1/complete", None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) =
        call(&app, "POST", "/sessions/S1/complete", Some(json!({"reason": "done"}))).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, session) = call(&app, "GET", "/sessions/S1", None).await?;
    assert_eq!(session["status"], json!("completed"));
    assert_eq!(session["completion"], json!({"reason": "done"}));
    assert_eq!(session["seenBy"], json!(["parent-1"]));

    let (_, events) = call(&app, "GET", "/sessions/S1/events", None).await?;
    assert_eq!(events.as_array().map(Vec::len), Some(1));
    assert_eq!(events[0]["payload"], json!({"seat": 3}));

    let (_, active) = call(&app, "GET", "/vehicles/BUS-01/session", None).await?;
    assert_eq!(active, Value::Null);
    Ok(())
}

#[tokio::test]
async fn unknown_sessions_are_not_found() -> Result<()> {
    let app = app();

    for uri in ["/sessions/nope/complete", "/sessions/nope/pause", "/sessions/nope/seen/v1"] {
        let (status, _) = call(&app, "POST", uri, None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let (status, _) = call(&app, "GET", "/sessions/nope", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn vehicle_stream_starts_with_null() -> Result<()> {
    let app = app();

    let request = Request::builder().uri("/vehicles/BUS-99/stream").body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(1), body.frame()).await?;
    let data = frame.and_then(Result::ok).and_then(|f| f.into_data().ok()).unwrap_or_default();
    assert_eq!(String::from_utf8_lossy(&data), "event: location\ndata: null\n\n");
    Ok(())
}
