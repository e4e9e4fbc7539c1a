use std::sync::Arc;
use std::time::Duration;

use mitrafix_lib::backend::{Backend, ChangeKind, MemoryBackend};
use mitrafix_lib::catalog::{CatalogRecord, Product, ServiceItem, Testimonial};
use mitrafix_lib::config::ConnectionConfig;
use mitrafix_lib::data::{CatalogProvider, DataLoader, LoadResult};
use mitrafix_lib::leads::{LeadBoard, LeadCache};
use serde_json::json;

fn custom() -> ConnectionConfig {
    ConnectionConfig::resolve(Some("https://mitrafix.supabase.co"), Some("anon-key"))
}

fn lead_row(id: i64, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Klien {}", id),
        "company": "PT Contoh",
        "email": format!("klien{}@contoh.id", id),
        "phone": "+62 811 000",
        "needs": "printer",
        "details": "Refill toner",
        "created_at": created_at,
        "status": "new"
    })
}

#[tokio::test]
async fn empty_backend_shows_templates() {
    let loader = DataLoader::new(Arc::new(MemoryBackend::new()), custom());
    let result = loader.load().await;

    assert_eq!(result.services, ServiceItem::templates());
    assert_eq!(result.products, Product::templates());
    assert_eq!(result.testimonials, Testimonial::templates());
    assert!(result.is_using_fallback);
    assert!(!result.is_loading);
}

#[tokio::test]
async fn rows_are_returned_unmodified() {
    let services = vec![
        json!({"id": 1, "title": "Servis Laptop", "description": "Ganti LCD", "icon": "laptop", "features": ["Garansi"]}),
        json!({"id": 4, "title": "Backup Data", "description": "NAS kantor", "icon": "database", "features": []}),
    ];
    let backend = MemoryBackend::new()
        .with_rows("services", services.clone())
        .with_rows("products", vec![json!({"id": 2, "name": "Toner", "category": "Printer"})])
        .with_rows("testimonials", vec![json!({"id": 9, "name": "Yanti", "content": "Responsif"})]);
    let result = DataLoader::new(Arc::new(backend), custom()).load().await;

    let expected: Vec<ServiceItem> = services
        .into_iter()
        .map(|row| serde_json::from_value(row).unwrap())
        .collect();
    assert_eq!(result.services, expected);
    assert_eq!(result.products.len(), 1);
    assert_eq!(result.testimonials[0].id, 9);
    assert!(!result.is_using_fallback);
}

#[tokio::test]
async fn partial_emptiness_uses_templates_per_collection() {
    let backend = MemoryBackend::new()
        .with_rows("products", vec![json!({"id": 1, "name": "Toner", "category": "Printer"})])
        .with_rows("testimonials", vec![json!({"id": 1, "name": "Yanti", "content": "Responsif"})]);
    let result = DataLoader::new(Arc::new(backend), custom()).load().await;

    assert_eq!(result.services, ServiceItem::templates());
    assert_eq!(result.products[0].name, "Toner");
    assert_eq!(result.testimonials[0].name, "Yanti");
    assert!(!result.is_using_fallback);
}

#[tokio::test]
async fn demo_mode_is_always_flagged() {
    let backend = MemoryBackend::new()
        .with_rows("services", vec![json!({"id": 1, "title": "A", "description": "B"})])
        .with_rows("products", vec![json!({"id": 1, "name": "C", "category": "D"})]);
    let result = DataLoader::new(Arc::new(backend), ConnectionConfig::fallback()).load().await;
    assert!(result.is_using_fallback);
}

#[tokio::test]
async fn any_failed_read_discards_everything() {
    for failing in ["services", "products", "testimonials"] {
        let backend = MemoryBackend::new()
            .with_rows("services", vec![json!({"id": 1, "title": "A", "description": "B"})])
            .with_rows("products", vec![json!({"id": 1, "name": "C", "category": "D"})])
            .with_rows("testimonials", vec![json!({"id": 1, "name": "E", "content": "F"})]);
        backend.fail(failing);
        let result = DataLoader::new(Arc::new(backend), custom()).load().await;
        assert_eq!(result, LoadResult::fallback(), "failing table: {}", failing);
    }
}

#[tokio::test]
async fn mounted_provider_follows_changes_until_unmounted() {
    let backend = Arc::new(MemoryBackend::new());
    let provider = CatalogProvider::mount(backend.clone(), custom()).await;
    assert!(provider.is_live());

    let mut snapshots = provider.subscribe();
    snapshots.wait_for(|s| !s.is_loading).await.unwrap();
    assert!(provider.snapshot().is_using_fallback);

    backend.set_rows("products", vec![json!({"id": 3, "name": "CCTV 8CH", "category": "CCTV"})]);
    backend.emit(ChangeKind::Insert, "products");
    tokio::time::timeout(
        Duration::from_secs(2),
        snapshots.wait_for(|s| !s.is_loading && s.products.len() == 1),
    )
    .await
    .expect("reload after change")
    .unwrap();
    assert!(!provider.snapshot().is_using_fallback);

    provider.unmount().await;
    assert_eq!(backend.live_subscriptions(), 0);
}

#[tokio::test]
async fn provider_without_realtime_still_loads() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_subscriptions(true);
    let provider = CatalogProvider::mount(backend.clone(), custom()).await;
    assert!(!provider.is_live());

    let mut snapshots = provider.subscribe();
    snapshots.wait_for(|s| !s.is_loading).await.unwrap();
    assert_eq!(provider.snapshot().services, ServiceItem::templates());
}

#[tokio::test]
async fn unreachable_backend_serves_cached_leads() {
    let cache = Arc::new(LeadCache::in_memory().unwrap());
    let seed_backend = Arc::new(MemoryBackend::new().with_rows(
        "leads",
        vec![
            lead_row(1, "2025-05-01T10:00:00+00:00"),
            lead_row(2, "2025-05-02T10:00:00+00:00"),
        ],
    ));
    let cached = LeadBoard::new(seed_backend, cache.clone()).list_leads().await;
    assert_eq!(cached.len(), 2);

    let offline = Arc::new(MemoryBackend::new());
    offline.fail("leads");
    let board = LeadBoard::new(offline as Arc<dyn Backend>, cache);
    let leads = board.list_leads().await;
    assert_eq!(leads, cached);
    assert_eq!(board.leads(), cached);
}

#[tokio::test]
async fn unreachable_backend_without_cache_shows_nothing() {
    let offline = Arc::new(MemoryBackend::new());
    offline.fail("leads");
    let board = LeadBoard::new(offline, Arc::new(LeadCache::in_memory().unwrap()));
    assert!(board.list_leads().await.is_empty());
}

#[tokio::test]
async fn delete_removes_exactly_one_lead_in_place() {
    let backend = Arc::new(MemoryBackend::new().with_rows(
        "leads",
        vec![
            lead_row(1, "2025-05-01T10:00:00+00:00"),
            lead_row(2, "2025-05-03T10:00:00+00:00"),
            lead_row(3, "2025-05-02T10:00:00+00:00"),
        ],
    ));
    let board = LeadBoard::new(backend.clone(), Arc::new(LeadCache::in_memory().unwrap()));
    board.list_leads().await;

    board.delete_lead(3).await.unwrap();
    let ids: Vec<i64> = board.leads().iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(backend.rows("leads").len(), 2);
}
