pub mod templates;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A row of one of the showcase collections. Each collection ships a bundled
/// template set shown whenever the backend has nothing usable.
pub trait CatalogRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> i64;

    fn templates() -> Vec<Self>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub company: String,
    pub content: String,
    #[serde(default = "default_rating")]
    pub rating: u8,
}

fn default_rating() -> u8 {
    5
}

impl CatalogRecord for ServiceItem {
    const TABLE: &'static str = "services";

    fn id(&self) -> i64 {
        self.id
    }

    fn templates() -> Vec<Self> {
        templates::services()
    }
}

impl CatalogRecord for Product {
    const TABLE: &'static str = "products";

    fn id(&self) -> i64 {
        self.id
    }

    fn templates() -> Vec<Self> {
        templates::products()
    }
}

impl CatalogRecord for Testimonial {
    const TABLE: &'static str = "testimonials";

    fn id(&self) -> i64 {
        self.id
    }

    fn templates() -> Vec<Self> {
        templates::testimonials()
    }
}
