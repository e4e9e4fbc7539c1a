pub mod live_sync;
pub mod loader;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::Backend;
use crate::catalog::{CatalogRecord, Product, ServiceItem, Testimonial};
use crate::config::ConnectionConfig;

pub use live_sync::LiveSync;
pub use loader::DataLoader;

/// Everything the showcase sections render, replaced as a whole on every load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    pub services: Vec<ServiceItem>,
    pub products: Vec<Product>,
    pub testimonials: Vec<Testimonial>,
    pub is_loading: bool,
    pub is_using_fallback: bool,
}

impl LoadResult {
    /// State before the first load settles.
    pub fn initial() -> Self {
        Self {
            services: Vec::new(),
            products: Vec::new(),
            testimonials: Vec::new(),
            is_loading: true,
            is_using_fallback: false,
        }
    }

    /// Bundled content for every section.
    pub fn fallback() -> Self {
        Self {
            services: ServiceItem::templates(),
            products: Product::templates(),
            testimonials: Testimonial::templates(),
            is_loading: false,
            is_using_fallback: true,
        }
    }

    /// Builds the result of a successful fetch. Empty collections are swapped
    /// for their templates one by one; the fallback flag only looks at
    /// services and products.
    pub fn from_rows(
        services: Vec<ServiceItem>,
        products: Vec<Product>,
        testimonials: Vec<Testimonial>,
        is_custom: bool,
    ) -> Self {
        let is_using_fallback = !is_custom || (services.is_empty() && products.is_empty());
        Self {
            services: or_templates(services),
            products: or_templates(products),
            testimonials: or_templates(testimonials),
            is_loading: false,
            is_using_fallback,
        }
    }
}

fn or_templates<T: CatalogRecord>(rows: Vec<T>) -> Vec<T> {
    if rows.is_empty() {
        T::templates()
    } else {
        rows
    }
}

/// The catalog data source of one mounted view: an initial load plus live
/// reloads for as long as it stays mounted.
pub struct CatalogProvider {
    loader: Arc<DataLoader>,
    live: Option<LiveSync>,
}

impl CatalogProvider {
    pub async fn mount(backend: Arc<dyn Backend>, connection: ConnectionConfig) -> Self {
        let loader = DataLoader::new(backend.clone(), connection);
        loader.trigger();

        let live = match LiveSync::start(backend, loader.clone()).await {
            Ok(live) => Some(live),
            Err(e) => {
                log::warn!("Live updates unavailable, serving static snapshot: {}", e);
                None
            }
        };

        Self { loader, live }
    }

    pub fn snapshot(&self) -> LoadResult {
        self.loader.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadResult> {
        self.loader.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub async fn unmount(self) {
        if let Some(live) = self.live {
            live.stop().await;
        }
    }
}
