use futures_util::future::try_join3;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::LoadResult;
use crate::backend::{fetch_rows, Backend, Order};
use crate::catalog::{CatalogRecord, Product, ServiceItem, Testimonial};
use crate::config::ConnectionConfig;
use crate::error::BackendError;

/// Loads the three catalog collections and publishes the latest snapshot.
///
/// Reloads are single-flight: while one is running, further requests only
/// mark it pending, and one extra load runs after it for all of them.
pub struct DataLoader {
    backend: Arc<dyn Backend>,
    connection: ConnectionConfig,
    snapshot: watch::Sender<LoadResult>,
    flight: Mutex<Flight>,
}

#[derive(Default)]
struct Flight {
    running: bool,
    pending: bool,
}

/// Claim on the single flight. Dropping it unfinished (task aborted) frees the
/// flight and settles the published snapshot.
struct FlightGuard {
    loader: Arc<DataLoader>,
    finished: bool,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.finished {
            {
                let mut flight = self.loader.flight.lock();
                flight.running = false;
                flight.pending = false;
            }
            self.loader.snapshot.send_if_modified(|current| {
                let was_loading = current.is_loading;
                current.is_loading = false;
                was_loading
            });
            log::debug!("Catalog reload cancelled");
        }
    }
}

impl DataLoader {
    pub fn new(backend: Arc<dyn Backend>, connection: ConnectionConfig) -> Arc<Self> {
        let (snapshot, _) = watch::channel(LoadResult::initial());
        Arc::new(Self {
            backend,
            connection,
            snapshot,
            flight: Mutex::new(Flight::default()),
        })
    }

    pub fn snapshot(&self) -> LoadResult {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadResult> {
        self.snapshot.subscribe()
    }

    /// One full load cycle. Never fails: any backend error yields the bundled
    /// templates for all three collections.
    pub async fn load(&self) -> LoadResult {
        match self.fetch_all().await {
            Ok((services, products, testimonials)) => {
                LoadResult::from_rows(services, products, testimonials, self.connection.is_custom())
            }
            Err(e) => {
                log::warn!("Could not reach the backend, using fallback data: {}", e);
                LoadResult::fallback()
            }
        }
    }

    async fn fetch_all(
        &self,
    ) -> Result<(Vec<ServiceItem>, Vec<Product>, Vec<Testimonial>), BackendError> {
        try_join3(
            self.fetch::<ServiceItem>(),
            self.fetch::<Product>(),
            self.fetch::<Testimonial>(),
        )
        .await
    }

    async fn fetch<T: CatalogRecord>(&self) -> Result<Vec<T>, BackendError> {
        fetch_rows(self.backend.as_ref(), T::TABLE, Order::asc("id")).await
    }

    fn claim(self: &Arc<Self>) -> Option<FlightGuard> {
        let mut flight = self.flight.lock();
        if flight.running {
            flight.pending = true;
            return None;
        }
        flight.running = true;
        Some(FlightGuard {
            loader: Arc::clone(self),
            finished: false,
        })
    }

    /// Runs a load and publishes it. Returns `false` when the request was
    /// folded into a refresh that is already running.
    pub async fn refresh(self: &Arc<Self>) -> bool {
        match self.claim() {
            Some(guard) => {
                self.fly(guard).await;
                true
            }
            None => false,
        }
    }

    /// Starts a background refresh unless one is already running, in which
    /// case the request is coalesced into it. The flight is claimed before
    /// the task is spawned.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let Some(guard) = self.claim() else {
            log::debug!("Reload already in flight, coalescing");
            return None;
        };
        let loader = Arc::clone(self);
        Some(tokio::spawn(async move {
            loader.fly(guard).await;
        }))
    }

    async fn fly(&self, mut guard: FlightGuard) {
        loop {
            self.snapshot.send_modify(|current| current.is_loading = true);
            let result = self.load().await;
            log::info!(
                "Catalog loaded: {} services, {} products, {} testimonials (fallback: {})",
                result.services.len(),
                result.products.len(),
                result.testimonials.len(),
                result.is_using_fallback
            );
            self.snapshot.send_replace(result);

            let mut flight = self.flight.lock();
            if flight.pending {
                flight.pending = false;
            } else {
                flight.running = false;
                guard.finished = true;
                break;
            }
        }
    }
}
