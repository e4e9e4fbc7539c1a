use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{Backend, ChangeEvent, ChangeFilter, ChangeKind, ChangeStream, Order};
use crate::error::BackendError;

/// In-process backend: tables of JSON rows, per-table failure injection and
/// call counters. Writes publish change events like the hosted service does.
pub struct MemoryBackend {
    state: Mutex<State>,
    changes: broadcast::Sender<ChangeEvent>,
    live_subscriptions: Arc<AtomicUsize>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    select_calls: HashMap<String, usize>,
    subscriptions_fail: bool,
    latency: Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(128);
        Self {
            state: Mutex::new(State::default()),
            changes,
            live_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.set_rows(table, rows);
        self
    }

    pub fn set_rows(&self, table: &str, rows: Vec<Value>) {
        self.state.lock().tables.insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Every request against `table` fails until `heal` is called.
    pub fn fail(&self, table: &str) {
        self.state.lock().failing.insert(table.to_string());
    }

    pub fn heal(&self, table: &str) {
        self.state.lock().failing.remove(table);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.state.lock().subscriptions_fail = fail;
    }

    /// Delay applied to every `select`, to keep loads in flight.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn select_calls(&self, table: &str) -> usize {
        self.state.lock().select_calls.get(table).copied().unwrap_or(0)
    }

    pub fn live_subscriptions(&self) -> usize {
        self.live_subscriptions.load(Ordering::SeqCst)
    }

    /// Publishes a change as if another client had written a row.
    pub fn emit(&self, kind: ChangeKind, table: &str) {
        let _ = self.changes.send(ChangeEvent {
            kind,
            table: Some(table.to_string()),
            record: None,
        });
    }

    fn check(&self, table: &str) -> Result<(), BackendError> {
        if self.state.lock().failing.contains(table) {
            return Err(unavailable(table));
        }
        Ok(())
    }
}

fn unavailable(table: &str) -> BackendError {
    BackendError::Status {
        status: 503,
        body: format!("{} unavailable", table),
    }
}

fn compare(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Greater,
        (_, Value::Null) => CmpOrdering::Less,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, table: &str, order: Order) -> Result<Vec<Value>, BackendError> {
        // The read reflects the table as it was when the query was issued.
        let (latency, outcome) = {
            let mut state = self.state.lock();
            *state.select_calls.entry(table.to_string()).or_default() += 1;
            let outcome = if state.failing.contains(table) {
                Err(unavailable(table))
            } else {
                Ok(state.tables.get(table).cloned().unwrap_or_default())
            };
            (state.latency, outcome)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut rows = outcome?;
        rows.sort_by(|a, b| {
            let ord = compare(&a[order.column.as_str()], &b[order.column.as_str()]);
            if order.ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Value) -> Result<Value, BackendError> {
        self.check(table)?;
        {
            let mut state = self.state.lock();
            let rows = state.tables.entry(table.to_string()).or_default();
            if row["id"].is_null() {
                let next_id = rows.iter().filter_map(|r| r["id"].as_i64()).max().unwrap_or(0) + 1;
                row["id"] = Value::from(next_id);
            }
            if row["created_at"].is_null() {
                row["created_at"] = Value::from(chrono::Utc::now().to_rfc3339());
            }
            rows.push(row.clone());
        }
        let _ = self.changes.send(ChangeEvent {
            kind: ChangeKind::Insert,
            table: Some(table.to_string()),
            record: Some(row.clone()),
        });
        Ok(row)
    }

    async fn delete(&self, table: &str, id: i64) -> Result<(), BackendError> {
        self.check(table)?;
        let removed = {
            let mut state = self.state.lock();
            let rows = state.tables.entry(table.to_string()).or_default();
            let before = rows.len();
            rows.retain(|r| r["id"].as_i64() != Some(id));
            before != rows.len()
        };
        if removed {
            self.emit(ChangeKind::Delete, table);
        }
        Ok(())
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream, BackendError> {
        if self.state.lock().subscriptions_fail {
            return Err(BackendError::Realtime("subscriptions unavailable".to_string()));
        }

        let mut source = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        self.live_subscriptions.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    received = source.recv() => match received {
                        Ok(event) if filter.matches(&event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let live = self.live_subscriptions.clone();
        Ok(ChangeStream::new(rx, move || {
            live.fetch_sub(1, Ordering::SeqCst);
            let _ = stop_tx.send(());
        }))
    }
}
