pub mod memory;
pub mod phoenix;
pub mod realtime;
pub mod rest;

use async_trait::async_trait;
use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::BackendError;

pub use memory::MemoryBackend;
pub use rest::SupabaseBackend;

/// Row access and change notifications of the hosted backend.
///
/// One instance is built at startup and handed to every component as
/// `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, table: &str, order: Order) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Inserts one row and returns it as stored (with generated columns).
    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<serde_json::Value, BackendError>;

    async fn delete(&self, table: &str, id: i64) -> Result<(), BackendError>;

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream, BackendError>;
}

/// Reads a table and decodes every row into `T`.
pub async fn fetch_rows<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: &str,
    order: Order,
) -> Result<Vec<T>, BackendError> {
    let rows = backend.select(table, order).await?;
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| BackendError::Decode {
            table: table.to_string(),
            source,
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }

    /// PostgREST `order=` value.
    pub fn to_query(&self) -> String {
        format!("{}.{}", self.column, if self.ascending { "asc" } else { "desc" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// Which row changes a subscription should deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    /// `None` watches every table of the schema.
    pub table: Option<String>,
    pub kinds: Vec<ChangeKind>,
}

impl ChangeFilter {
    pub fn all() -> Self {
        Self {
            table: None,
            kinds: ChangeKind::ALL.to_vec(),
        }
    }

    pub fn table(table: &str, kinds: &[ChangeKind]) -> Self {
        Self {
            table: Some(table.to_string()),
            kinds: kinds.to_vec(),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let table_ok = match (&self.table, &event.table) {
            (None, _) => true,
            (Some(want), Some(got)) => want == got,
            (Some(_), None) => false,
        };
        table_ok && self.kinds.contains(&event.kind)
    }

    pub fn watches_everything(&self) -> bool {
        ChangeKind::ALL.iter().all(|k| self.kinds.contains(k))
    }

    /// Channel name used on the realtime socket.
    pub fn channel(&self) -> String {
        match &self.table {
            Some(table) => format!("{}_changes", table),
            None => "db_changes".to_string(),
        }
    }
}

/// A row change. Only used as a "something changed" trigger; the record
/// payload is kept for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: Option<String>,
    pub record: Option<serde_json::Value>,
}

/// Live change notifications for one subscription.
///
/// The backend slot is released exactly once: on `unsubscribe()` or on drop,
/// whichever comes first.
pub struct ChangeStream {
    inner: ReceiverStream<ChangeEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeStream {
    pub fn new<F>(rx: mpsc::Receiver<ChangeEvent>, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: ReceiverStream::new(rx),
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Stream for ChangeStream {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.release_slot();
    }
}
