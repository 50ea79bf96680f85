//! Viewer-side live subscriptions backed by the store's change feeds.

use std::sync::Arc;

use realtime::{Collections, DocumentStore, Error, Query, bad_request};
use tokio::task::JoinHandle;

use crate::identifier::VehicleId;
use crate::models::LiveLocationRecord;
use crate::sync::{decode_record, decode_records};

/// Handle to a running subscription. Dropping it, or calling
/// [`Subscription::unsubscribe`], stops delivery.
#[must_use = "dropping a Subscription cancels it"]
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Run `delivery` until it completes or the subscription is dropped.
    pub fn spawn<F>(delivery: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { task: tokio::spawn(delivery) }
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }

    /// True once the feed has ended, either after an error or on unsubscribe.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct SubscriptionFanout<S> {
    store: Arc<S>,
    collections: Collections,
}

impl<S: DocumentStore> SubscriptionFanout<S> {
    pub const fn new(store: Arc<S>, collections: Collections) -> Self {
        Self { store, collections }
    }

    /// Follow one vehicle's record. `on_update` receives `None` while the
    /// record does not exist. `on_error` fires at most once, after which the
    /// subscription is closed.
    pub fn subscribe_vehicle<U, E>(
        &self, vehicle_id: &str, mut on_update: U, on_error: E,
    ) -> Subscription
    where
        U: FnMut(Option<LiveLocationRecord>) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let vehicle = VehicleId::normalize(vehicle_id);
        let store = Arc::clone(&self.store);
        let collection = self.collections.vehicles.clone();

        Subscription::spawn(async move {
            if vehicle.is_empty() {
                on_error(bad_request!("vehicle id is required"));
                return;
            }

            let mut feed = match store.watch_document(&collection, vehicle.as_str()).await {
                Ok(feed) => feed,
                Err(err) => return fail(&vehicle, on_error, err.into()),
            };
            tracing::debug!(vehicle = %vehicle, "vehicle subscription opened");

            while let Some(next) = feed.next().await {
                let doc = match next {
                    Ok(doc) => doc,
                    Err(err) => return fail(&vehicle, on_error, err.into()),
                };
                match doc.map(|doc| decode_record(vehicle.as_str(), doc)).transpose() {
                    Ok(record) => on_update(record),
                    Err(err) => return fail(&vehicle, on_error, err),
                }
            }
        })
    }

    /// Follow every vehicle record. Each change delivers the full set.
    pub fn subscribe_all_vehicles<U, E>(&self, mut on_update: U, on_error: E) -> Subscription
    where
        U: FnMut(Vec<LiveLocationRecord>) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let collection = self.collections.vehicles.clone();

        Subscription::spawn(async move {
            let mut feed = match store.watch_query(&collection, Query::default()).await {
                Ok(feed) => feed,
                Err(err) => return fail("*", on_error, err.into()),
            };

            while let Some(next) = feed.next().await {
                match next {
                    Ok(snapshots) => on_update(decode_records(snapshots)),
                    Err(err) => return fail("*", on_error, err.into()),
                }
            }
        })
    }
}

fn fail(scope: impl std::fmt::Display, on_error: impl FnOnce(Error), err: Error) {
    tracing::warn!(
        monotonic_counter.subscription_errors = 1,
        vehicle = %scope,
        error = %err,
        "subscription closed"
    );
    on_error(err);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use realtime::{Document, MemoryStore};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;

    fn fanout(store: &MemoryStore) -> SubscriptionFanout<MemoryStore> {
        let collections =
            Collections { vehicles: "vehicles".into(), sessions: "s".into(), events: "e".into() };
        SubscriptionFanout::new(Arc::new(store.clone()), collections)
    }

    fn record(vehicle: &str, speed: f64) -> Document {
        json!({"vehicleId": vehicle, "speed": speed, "isTracking": true})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn absent_vehicle_yields_none_once() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = fanout(&store).subscribe_vehicle(
            "bus-99",
            move |r| {
                let _ = tx.send(r);
            },
            |_| {},
        );

        let first = timeout(Duration::from_secs(1), rx.recv()).await?;
        assert_eq!(first, Some(None));
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());

        store.merge("vehicles", "BUS-99", record("BUS-99", 3.0)).await?;
        let next = timeout(Duration::from_secs(1), rx.recv()).await?.flatten();
        assert_eq!(next.map(|r| r.speed), Some(3.0));
        Ok(())
    }

    #[tokio::test]
    async fn independent_subscribers() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let fanout = fanout(&store);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let sub_a = fanout.subscribe_vehicle(
            "BUS-01",
            move |r| {
                let _ = tx_a.send(r);
            },
            |_| {},
        );
        let _sub_b = fanout.subscribe_all_vehicles(
            move |r| {
                let _ = tx_b.send(r);
            },
            |_| {},
        );

        assert_eq!(timeout(Duration::from_secs(1), rx_a.recv()).await?, Some(None));
        assert_eq!(timeout(Duration::from_secs(1), rx_b.recv()).await?, Some(vec![]));

        sub_a.unsubscribe();
        store.merge("vehicles", "BUS-01", record("BUS-01", 1.0)).await?;

        let all = timeout(Duration::from_secs(1), rx_b.recv()).await?.unwrap_or_default();
        assert_eq!(all.len(), 1);
        // the cancelled subscriber's sender is gone
        assert_eq!(timeout(Duration::from_secs(1), rx_a.recv()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn error_is_delivered_once() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = fanout(&store).subscribe_all_vehicles(
            |_| {},
            move |e| {
                let _ = tx.send(e);
            },
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.disconnect();
        let err = timeout(Duration::from_secs(1), rx.recv()).await?;
        assert!(matches!(err, Some(Error::Storage(_))));
        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await?, None);
        assert!(sub.is_closed());
        Ok(())
    }
}
