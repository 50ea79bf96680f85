//! In-process implementation of [`DocumentStore`].
//!
//! Records live behind a `tokio` lock and every write is announced on a
//! broadcast bus that watchers filter. Watchers that lag simply re-read the
//! current snapshot, which is sufficient for last-write-wins records.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use crate::provider::{ChangeFeed, Document, DocumentStore, Query, Snapshot};
use crate::{not_found, storage};

const CHANGE_BUS_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
enum Change {
    Write { collection: String, id: String },
    Disconnected,
}

#[derive(Default)]
struct State {
    records: HashMap<String, BTreeMap<String, Document>>,
    children: HashMap<(String, String, String), Vec<Snapshot>>,
}

struct Inner {
    state: RwLock<State>,
    changes: broadcast::Sender<Change>,
    offline: AtomicBool,
}

/// A `DocumentStore` held entirely in process memory.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                changes,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate losing the connection: every operation fails and open
    /// watchers receive one error before their feed ends.
    pub fn disconnect(&self) {
        self.inner.offline.store(true, Ordering::SeqCst);
        let _ = self.inner.changes.send(Change::Disconnected);
    }

    pub fn reconnect(&self) {
        self.inner.offline.store(false, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(storage!("store unavailable").into());
        }
        Ok(())
    }

    fn announce(&self, collection: &str, id: &str) {
        // no receivers is not an error
        let _ = self
            .inner
            .changes
            .send(Change::Write { collection: collection.to_string(), id: id.to_string() });
    }

    async fn read(&self, collection: &str, id: &str) -> Option<Document> {
        let state = self.inner.state.read().await;
        state.records.get(collection).and_then(|records| records.get(id)).cloned()
    }

    async fn read_all(&self, collection: &str) -> Vec<Snapshot> {
        let state = self.inner.state.read().await;
        state
            .records
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, data)| Snapshot { id: id.clone(), data: data.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.ensure_online()?;
        Ok(self.read(collection, id).await)
    }

    async fn merge(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        self.ensure_online()?;
        {
            let mut state = self.inner.state.write().await;
            let record = state
                .records
                .entry(collection.to_string())
                .or_default()
                .entry(id.to_string())
                .or_default();
            record.extend(fields);
        }
        self.announce(collection, id);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        self.ensure_online()?;
        {
            let mut state = self.inner.state.write().await;
            let Some(record) = state.records.get_mut(collection).and_then(|r| r.get_mut(id))
            else {
                return Err(not_found!("{collection}/{id}").into());
            };
            record.extend(fields);
        }
        self.announce(collection, id);
        Ok(())
    }

    async fn add_to_set(
        &self, collection: &str, id: &str, field: &str, member: Value,
    ) -> Result<()> {
        self.ensure_online()?;
        {
            let mut state = self.inner.state.write().await;
            let Some(record) = state.records.get_mut(collection).and_then(|r| r.get_mut(id))
            else {
                return Err(not_found!("{collection}/{id}").into());
            };
            match record.get_mut(field) {
                Some(Value::Array(members)) => {
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }
                _ => {
                    record.insert(field.to_string(), Value::Array(vec![member]));
                }
            }
        }
        self.announce(collection, id);
        Ok(())
    }

    async fn append(
        &self, collection: &str, id: &str, child: &str, fields: Document,
    ) -> Result<String> {
        self.ensure_online()?;
        let child_id = Uuid::new_v4().to_string();
        let mut state = self.inner.state.write().await;
        if !state.records.get(collection).is_some_and(|r| r.contains_key(id)) {
            return Err(not_found!("{collection}/{id}").into());
        }
        state
            .children
            .entry((collection.to_string(), id.to_string(), child.to_string()))
            .or_default()
            .push(Snapshot { id: child_id.clone(), data: fields });
        drop(state);
        Ok(child_id)
    }

    async fn children(&self, collection: &str, id: &str, child: &str) -> Result<Vec<Snapshot>> {
        self.ensure_online()?;
        let state = self.inner.state.read().await;
        let key = (collection.to_string(), id.to_string(), child.to_string());
        Ok(state.children.get(&key).cloned().unwrap_or_default())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Snapshot>> {
        self.ensure_online()?;
        Ok(query.apply(self.read_all(collection).await))
    }

    async fn watch_document(
        &self, collection: &str, id: &str,
    ) -> Result<ChangeFeed<Option<Document>>> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded_channel();

        // subscribe before the first read so no write slips between the two
        let mut changes = self.inner.changes.subscribe();
        let _ = tx.send(Ok(self.read(collection, id).await));

        let store = self.clone();
        let collection = collection.to_string();
        let id = id.to_string();

        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    () = tx.closed() => break,
                    change = changes.recv() => change,
                };
                match change {
                    Ok(Change::Write { collection: c, id: i }) if c == collection && i == id => {}
                    Ok(Change::Write { .. }) => continue,
                    Ok(Change::Disconnected) => {
                        let _ = tx.send(Err(storage!("watch on {collection}/{id} lost").into()));
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "document watcher lagged, re-reading");
                    }
                    Err(RecvError::Closed) => break,
                }
                if tx.send(Ok(store.read(&collection, &id).await)).is_err() {
                    break;
                }
            }
        });

        Ok(ChangeFeed::new(rx))
    }

    async fn watch_query(
        &self, collection: &str, query: Query,
    ) -> Result<ChangeFeed<Vec<Snapshot>>> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut changes = self.inner.changes.subscribe();
        let _ = tx.send(Ok(query.apply(self.read_all(collection).await)));

        let store = self.clone();
        let collection = collection.to_string();

        tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    () = tx.closed() => break,
                    change = changes.recv() => change,
                };
                match change {
                    Ok(Change::Write { collection: c, .. }) if c == collection => {}
                    Ok(Change::Write { .. }) => continue,
                    Ok(Change::Disconnected) => {
                        let _ = tx.send(Err(storage!("watch on {collection} lost").into()));
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "query watcher lagged, re-reading");
                    }
                    Err(RecvError::Closed) => break,
                }
                let snapshot = query.apply(store.read_all(&collection).await);
                if tx.send(Ok(snapshot)).is_err() {
                    break;
                }
            }
        });

        Ok(ChangeFeed::new(rx))
    }
}
