use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use std::time::Duration;

use super::realtime::RealtimeClient;
use super::{Backend, ChangeFilter, ChangeStream, Order};
use crate::config::{AppConfig, ConnectionConfig};
use crate::error::BackendError;

/// Hosted backend reached over its PostgREST API, with change notifications
/// from the realtime socket.
pub struct SupabaseBackend {
    client: Client,
    rest_base: Url,
    access_key: String,
    realtime: RealtimeClient,
}

impl SupabaseBackend {
    pub fn new(connection: &ConnectionConfig, config: &AppConfig) -> Result<Self, BackendError> {
        let mut endpoint = Url::parse(connection.endpoint())
            .map_err(|_| BackendError::InvalidEndpoint(connection.endpoint().to_string()))?;
        if endpoint.cannot_be_a_base() || endpoint.host_str().is_none() {
            return Err(BackendError::InvalidEndpoint(connection.endpoint().to_string()));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let rest_base = endpoint
            .join("rest/v1/")
            .map_err(|_| BackendError::InvalidEndpoint(connection.endpoint().to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let realtime = RealtimeClient::new(
            &endpoint,
            connection.access_key(),
            Duration::from_secs(config.heartbeat_interval_secs),
        )?;

        Ok(Self {
            client,
            rest_base,
            access_key: connection.access_key().to_string(),
            realtime,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, BackendError> {
        self.rest_base
            .join(table)
            .map_err(|_| BackendError::InvalidEndpoint(format!("{}{}", self.rest_base, table)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.access_key)
            .header("Authorization", format!("Bearer {}", self.access_key))
            .header("Accept", "application/json")
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn select(&self, table: &str, order: Order) -> Result<Vec<serde_json::Value>, BackendError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", &order.to_query());

        let response = self.request(reqwest::Method::GET, url).send().await?;
        let rows = check_status(response).await?.json::<Vec<serde_json::Value>>().await?;
        log::debug!("Fetched {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<serde_json::Value, BackendError> {
        let url = self.table_url(table)?;
        let response = self
            .request(reqwest::Method::POST, url)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        let mut stored = check_status(response).await?.json::<Vec<serde_json::Value>>().await?;
        if stored.is_empty() {
            return Err(BackendError::Status {
                status: 200,
                body: format!("insert into {} returned no row", table),
            });
        }
        Ok(stored.swap_remove(0))
    }

    async fn delete(&self, table: &str, id: i64) -> Result<(), BackendError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));

        let response = self.request(reqwest::Method::DELETE, url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream, BackendError> {
        self.realtime.subscribe(filter).await
    }
}
