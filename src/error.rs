use thiserror::Error;

/// Failures talking to the hosted backend (REST or realtime).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode {table} rows: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("realtime channel error: {0}")]
    Realtime(String),

    #[error("change stream closed")]
    Closed,
}

/// Failures of the local key/value cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to the lead admin view. Reads never produce these.
#[derive(Debug, Error)]
pub enum LeadError {
    #[error("field '{0}' is missing or invalid")]
    Invalid(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("deletion cancelled")]
    Cancelled,
}
