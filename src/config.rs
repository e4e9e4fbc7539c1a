use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Marker left in `.env` templates; any value containing it counts as unset.
pub const PLACEHOLDER_MARKER: &str = "your-project-url";

/// Demo endpoint used when no real project is configured.
pub const FALLBACK_ENDPOINT: &str = "https://placeholder.supabase.co";
pub const FALLBACK_ACCESS_KEY: &str = "placeholder";

const URL_VARS: [&str; 2] = ["SUPABASE_URL", "VITE_SUPABASE_URL"];
const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub backend_anon_key: String,
    pub request_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub cache_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            backend_anon_key: String::new(),
            request_timeout_secs: 15,
            heartbeat_interval_secs: 25,
            cache_file: "cache.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(app_data: &Path) -> Self {
        let config_path = app_data.join("config.json");
        let mut config = if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
                Err(_) => Self::default(),
            }
        } else {
            let c = Self::default();
            c.save(app_data);
            c
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.clamp_intervals();
        config
    }

    /// Zero intervals would disable the request timeout and panic the
    /// heartbeat timer; both are raised to one second.
    fn clamp_intervals(&mut self) {
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self.heartbeat_interval_secs = self.heartbeat_interval_secs.max(1);
    }

    pub fn save(&self, app_data: &Path) {
        let config_path = app_data.join("config.json");
        if let Ok(content) = serde_json::to_string_pretty(self) {
            std::fs::write(config_path, content).ok();
        }
    }

    /// Override the backend pair from the environment. Credentials belong in
    /// `.env`, not in the persisted config file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.is_empty())
        };

        if let Some(url) = first_set(&URL_VARS[..]) {
            self.backend_url = url;
        }
        if let Some(key) = first_set(&KEY_VARS[..]) {
            self.backend_anon_key = key;
        }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::resolve(Some(&self.backend_url), Some(&self.backend_anon_key))
    }

    pub fn cache_path(&self, app_data: &Path) -> PathBuf {
        app_data.join(&self.cache_file)
    }
}

/// Where the app keeps `config.json` and the lead cache.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mitrafix")
}

/// Resolved backend endpoint. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    endpoint: String,
    access_key: String,
    is_custom: bool,
}

impl ConnectionConfig {
    /// Picks the supplied pair when both values are usable, otherwise the demo
    /// pair. Never fails.
    pub fn resolve(endpoint: Option<&str>, access_key: Option<&str>) -> Self {
        match (usable(endpoint), usable(access_key)) {
            (Some(endpoint), Some(access_key)) => Self {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                access_key: access_key.to_string(),
                is_custom: true,
            },
            _ => {
                log::warn!("Backend URL or key not set. Running in offline/fallback mode.");
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        Self {
            endpoint: FALLBACK_ENDPOINT.to_string(),
            access_key: FALLBACK_ACCESS_KEY.to_string(),
            is_custom: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn is_custom(&self) -> bool {
        self.is_custom
    }
}

fn usable(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.contains(PLACEHOLDER_MARKER))
}
