pub mod backend;
pub mod catalog;
pub mod config;
pub mod data;
pub mod error;
pub mod leads;

use std::sync::Arc;

use backend::{Backend, SupabaseBackend};
use data::CatalogProvider;
use leads::{LeadBoard, LeadCache};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    // ─── Configuration ───────────────────────────────────────────────
    let app_data = config::app_data_dir();
    std::fs::create_dir_all(&app_data).ok();

    let app_config = config::AppConfig::load(&app_data);
    let connection = app_config.connection();

    // ─── Backend & cache ─────────────────────────────────────────────
    let backend: Arc<dyn Backend> = Arc::new(SupabaseBackend::new(&connection, &app_config)?);
    let cache = Arc::new(LeadCache::open(&app_config.cache_path(&app_data))?);

    // ─── Views ───────────────────────────────────────────────────────
    let catalog = CatalogProvider::mount(backend.clone(), connection.clone()).await;

    let board = LeadBoard::new(backend.clone(), cache);
    let leads = board.list_leads().await;
    log::info!("{} lead(s) in the admin view", leads.len());

    let lead_watch = match board.watch_inserts().await {
        Ok(watch) => Some(watch),
        Err(e) => {
            log::warn!("Lead notifications unavailable: {}", e);
            None
        }
    };

    log::info!(
        "Mitrafix data layer running (custom backend: {}, live: {}). Press Ctrl-C to stop.",
        connection.is_custom(),
        catalog.is_live()
    );

    let mut snapshots = catalog.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.is_loading {
                    log::info!(
                        "Showing {} services, {} products, {} testimonials{}",
                        snapshot.services.len(),
                        snapshot.products.len(),
                        snapshot.testimonials.len(),
                        if snapshot.is_using_fallback { " (fallback data)" } else { "" }
                    );
                }
            }
        }
    }

    log::info!("Shutting down");
    if let Some(watch) = lead_watch {
        watch.stop().await;
    }
    catalog.unmount().await;
    Ok(())
}
