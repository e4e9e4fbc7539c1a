use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{decode_leads, Lead, LeadCache, LeadForm, LEADS_TABLE};
use crate::backend::{Backend, ChangeFilter, ChangeKind, Order};
use crate::error::{BackendError, LeadError};

/// Lead admin view: the displayed list plus the operations on it.
pub struct LeadBoard {
    backend: Arc<dyn Backend>,
    cache: Arc<LeadCache>,
    state: Mutex<BoardState>,
    issued: AtomicU64,
}

#[derive(Default)]
struct BoardState {
    leads: Vec<Lead>,
    applied: u64,
    is_loading: bool,
}

impl LeadBoard {
    pub fn new(backend: Arc<dyn Backend>, cache: Arc<LeadCache>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            cache,
            state: Mutex::new(BoardState::default()),
            issued: AtomicU64::new(0),
        })
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.state.lock().leads.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    /// Newest first. Falls back to the cached listing when the backend cannot
    /// be read; never fails. A listing that finishes after a newer one has
    /// been applied is returned but not displayed.
    pub async fn list_leads(&self) -> Vec<Lead> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.lock().is_loading = true;

        let fetched = self.backend.select(LEADS_TABLE, Order::desc("created_at")).await;
        let (leads, from_backend) = match fetched {
            Ok(rows) => (decode_leads(rows), true),
            Err(e) => {
                log::error!("Error fetching leads, showing cached copy: {}", e);
                let cached = self.cache.load_leads().unwrap_or_else(|e| {
                    log::warn!("Lead cache unreadable: {}", e);
                    Vec::new()
                });
                (cached, false)
            }
        };

        let mut state = self.state.lock();
        if seq > state.applied {
            state.applied = seq;
            state.leads = leads.clone();
            state.is_loading = seq < self.issued.load(Ordering::SeqCst);
            if from_backend {
                if let Err(e) = self.cache.store_leads(&leads) {
                    log::warn!("Could not cache leads: {}", e);
                }
            }
        } else {
            log::debug!("Discarding stale lead listing #{}", seq);
        }
        leads
    }

    /// Deletes on the backend, then drops the lead from the displayed list.
    /// On failure the list is left exactly as it was.
    pub async fn delete_lead(&self, id: i64) -> Result<(), LeadError> {
        if let Err(e) = self.backend.delete(LEADS_TABLE, id).await {
            log::error!("Failed to delete lead {}: {}", id, e);
            return Err(e.into());
        }

        let remaining = {
            let mut state = self.state.lock();
            state.leads.retain(|lead| lead.id != id);
            state.leads.clone()
        };
        if let Err(e) = self.cache.store_leads(&remaining) {
            log::warn!("Could not cache leads: {}", e);
        }
        log::info!("Lead {} deleted", id);
        Ok(())
    }

    /// Deletes only when `confirm` agrees.
    pub async fn delete_lead_confirmed<F>(&self, id: i64, confirm: F) -> Result<(), LeadError>
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            return Err(LeadError::Cancelled);
        }
        self.delete_lead(id).await
    }

    pub async fn submit(&self, form: LeadForm) -> Result<Lead, LeadError> {
        let need = form.validate()?;
        let stored = self.backend.insert(LEADS_TABLE, form.to_row()).await.map_err(|e| {
            log::error!("Failed to submit lead: {}", e);
            e
        })?;
        let lead: Lead = serde_json::from_value(stored).map_err(|source| BackendError::Decode {
            table: LEADS_TABLE.to_string(),
            source,
        })?;
        log::info!("New lead #{} from {} ({})", lead.id, lead.name, need.label());
        Ok(lead)
    }

    /// Re-lists leads whenever a new one is inserted.
    pub async fn watch_inserts(self: &Arc<Self>) -> Result<LeadWatch, BackendError> {
        let mut stream = self
            .backend
            .subscribe(ChangeFilter::table(LEADS_TABLE, &[ChangeKind::Insert]))
            .await?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let board = Arc::clone(self);

        let listener = tokio::spawn(async move {
            let stopped = loop {
                tokio::select! {
                    _ = &mut stop_rx => break true,
                    event = stream.next() => match event {
                        Some(_) => {
                            log::info!("New lead received");
                            board.list_leads().await;
                        }
                        None => break false,
                    },
                }
            };
            if stopped {
                stream.unsubscribe();
            }
        });

        Ok(LeadWatch {
            stop: Some(stop_tx),
            listener: Some(listener),
        })
    }
}

/// Insert subscription of a mounted lead view.
pub struct LeadWatch {
    stop: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
}

impl LeadWatch {
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
    }
}

impl Drop for LeadWatch {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    fn row(id: i64, day: u32) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("Klien {}", id),
            "company": "PT Contoh",
            "email": format!("k{}@contoh.id", id),
            "phone": "0812",
            "needs": "hardware",
            "details": "",
            "created_at": format!("2025-04-{:02}T08:00:00+00:00", day),
            "status": "new"
        })
    }

    fn board_with(backend: &Arc<MemoryBackend>) -> Arc<LeadBoard> {
        LeadBoard::new(backend.clone(), Arc::new(LeadCache::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn lists_newest_first_and_caches() {
        let backend = Arc::new(MemoryBackend::new().with_rows("leads", vec![row(1, 1), row(2, 9), row(3, 5)]));
        let board = board_with(&backend);

        let ids: Vec<i64> = board.list_leads().await.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(!board.is_loading());

        backend.fail("leads");
        let cached: Vec<i64> = board.list_leads().await.iter().map(|l| l.id).collect();
        assert_eq!(cached, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn slower_older_listing_is_not_displayed() {
        let backend = Arc::new(MemoryBackend::new().with_rows("leads", vec![row(1, 1)]));
        let board = board_with(&backend);

        backend.set_latency(Duration::from_millis(100));
        let older = {
            let board = Arc::clone(&board);
            tokio::spawn(async move { board.list_leads().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        backend.set_latency(Duration::ZERO);
        backend.set_rows("leads", vec![row(1, 1), row(2, 2)]);
        let newer: Vec<i64> = board.list_leads().await.iter().map(|l| l.id).collect();
        assert_eq!(newer, vec![2, 1]);

        let stale = older.await.unwrap();
        assert_eq!(stale.len(), 1);
        let shown: Vec<i64> = board.leads().iter().map(|l| l.id).collect();
        assert_eq!(shown, vec![2, 1]);
        assert!(!board.is_loading());

        backend.fail("leads");
        assert_eq!(board.list_leads().await.len(), 2);
    }

    #[tokio::test]
    async fn partly_malformed_listing_is_still_shown() {
        let mut null_phone = row(2, 2);
        null_phone["phone"] = serde_json::Value::Null;
        let mut naive_time = row(3, 3);
        naive_time["created_at"] = json!("2025-04-03T08:00:00.123456");
        let backend = Arc::new(
            MemoryBackend::new().with_rows("leads", vec![row(1, 1), null_phone, naive_time, json!({"id": null})]),
        );
        let board = board_with(&backend);

        let ids: Vec<i64> = board.list_leads().await.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(board.leads()[1].phone, "");
    }

    #[tokio::test]
    async fn failed_delete_keeps_list() {
        let backend = Arc::new(MemoryBackend::new().with_rows("leads", vec![row(1, 1), row(2, 2)]));
        let board = board_with(&backend);
        board.list_leads().await;
        let before = board.leads();

        backend.fail("leads");
        assert!(board.delete_lead(1).await.is_err());
        assert_eq!(board.leads(), before);
    }

    #[tokio::test]
    async fn declined_confirmation_skips_backend() {
        let backend = Arc::new(MemoryBackend::new().with_rows("leads", vec![row(1, 1)]));
        let board = board_with(&backend);
        board.list_leads().await;

        let outcome = board.delete_lead_confirmed(1, || false).await;
        assert!(matches!(outcome, Err(LeadError::Cancelled)));
        assert_eq!(backend.rows("leads").len(), 1);
        assert_eq!(board.leads().len(), 1);
    }

    #[tokio::test]
    async fn submit_validates_before_writing() {
        let backend = Arc::new(MemoryBackend::new());
        let board = board_with(&backend);
        let outcome = board.submit(LeadForm::default()).await;
        assert!(matches!(outcome, Err(LeadError::Invalid("name"))));
        assert!(backend.rows("leads").is_empty());
    }

    #[tokio::test]
    async fn insert_notification_relists() {
        let backend = Arc::new(MemoryBackend::new());
        let board = board_with(&backend);
        let watch = board.watch_inserts().await.unwrap();

        let lead = board
            .submit(LeadForm {
                name: "Rudi".to_string(),
                company: "Toko Rudi".to_string(),
                email: "rudi@toko.id".to_string(),
                phone: "0813".to_string(),
                needs: "maintenance".to_string(),
                details: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(lead.status, "new");

        for _ in 0..50 {
            if !board.leads().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(board.leads(), vec![lead]);

        watch.stop().await;
        assert_eq!(backend.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn delete_notifications_are_not_watched() {
        let backend = Arc::new(MemoryBackend::new().with_rows("leads", vec![row(1, 1)]));
        let board = board_with(&backend);
        let _watch = board.watch_inserts().await.unwrap();

        backend.emit(ChangeKind::Delete, "leads");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.select_calls("leads"), 0);
    }
}
