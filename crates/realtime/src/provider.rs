//! # Provider
//!
//! Provider defines external data interfaces for the crate: the document
//! store the tracking core persists to and the change feeds it reads back.

use std::cmp::Ordering;

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A schemaless document: top-level field name to JSON value.
pub type Document = Map<String, Value>;

/// A document paired with its key within a collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub data: Document,
}

/// Sort direction for [`Query::order_by`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filters with an optional ordering and limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when every filter matches the document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|(field, value)| doc.get(field) == Some(value))
    }

    /// Filter, order, and truncate a set of snapshots.
    #[must_use]
    pub fn apply(&self, snapshots: impl IntoIterator<Item = Snapshot>) -> Vec<Snapshot> {
        let mut matched: Vec<Snapshot> =
            snapshots.into_iter().filter(|snap| self.matches(&snap.data)).collect();

        if let Some((field, direction)) = &self.order_by {
            matched.sort_by(|a, b| {
                let ord = compare(a.data.get(field), b.data.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

// Missing fields sort first, numbers numerically, strings lexically.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A push-based stream of snapshots produced by the backing store.
///
/// The first item is always the current state; each later item follows a
/// write that touched the watched record(s). An `Err` item ends the feed.
#[derive(Debug)]
pub struct ChangeFeed<T> {
    rx: mpsc::UnboundedReceiver<Result<T>>,
}

impl<T> ChangeFeed<T> {
    #[must_use]
    pub const fn new(rx: mpsc::UnboundedReceiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Wait for the next snapshot. `None` once the store closes the feed.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }
}

/// The `DocumentStore` trait defines the behaviour of the document-oriented
/// backing store: keyed records grouped in collections, partial writes, and
/// native change notification.
pub trait DocumentStore: Send + Sync + 'static {
    /// Read one record.
    fn get(&self, collection: &str, id: &str)
    -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Partial upsert: listed fields overwrite, all others are left untouched.
    fn merge(
        &self, collection: &str, id: &str, fields: Document,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Partial update of an existing record. Fails with `NotFound` when absent.
    fn update(
        &self, collection: &str, id: &str, fields: Document,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Add `member` to the array held in `field` unless already present.
    /// Fails with `NotFound` when the record is absent.
    fn add_to_set(
        &self, collection: &str, id: &str, field: &str, member: Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Append an immutable child row under an existing record, returning the
    /// new row's key. Fails with `NotFound` when the parent is absent.
    fn append(
        &self, collection: &str, id: &str, child: &str, fields: Document,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Child rows of a record in insertion order.
    fn children(
        &self, collection: &str, id: &str, child: &str,
    ) -> impl Future<Output = Result<Vec<Snapshot>>> + Send;

    /// Run a query over one collection.
    fn query(
        &self, collection: &str, query: &Query,
    ) -> impl Future<Output = Result<Vec<Snapshot>>> + Send;

    /// Watch a single record. Yields `None` while the record does not exist.
    fn watch_document(
        &self, collection: &str, id: &str,
    ) -> impl Future<Output = Result<ChangeFeed<Option<Document>>>> + Send;

    /// Watch the result set of a query (use `Query::default()` for the whole
    /// collection).
    fn watch_query(
        &self, collection: &str, query: Query,
    ) -> impl Future<Output = Result<ChangeFeed<Vec<Snapshot>>>> + Send;
}
