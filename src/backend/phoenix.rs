//! Frames of the realtime socket (Phoenix channel protocol, `vsn=1.0.0`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ChangeEvent, ChangeFilter, ChangeKind};

pub const SCHEMA: &str = "public";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    pub fn encode(&self) -> String {
        // A Frame is always representable as JSON.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

pub fn topic(filter: &ChangeFilter) -> String {
    format!("realtime:{}:{}", SCHEMA, filter.channel())
}

/// One `postgres_changes` binding per event kind, or a single `*` binding when
/// every kind is watched.
pub fn bindings(filter: &ChangeFilter) -> Vec<Value> {
    let events: Vec<&str> = if filter.watches_everything() {
        vec!["*"]
    } else {
        filter.kinds.iter().map(ChangeKind::as_str).collect()
    };

    events
        .into_iter()
        .map(|event| {
            let mut binding = json!({ "event": event, "schema": SCHEMA });
            if let Some(table) = &filter.table {
                binding["table"] = json!(table);
            }
            binding
        })
        .collect()
}

pub fn join(filter: &ChangeFilter, access_key: &str, reference: &str) -> Frame {
    Frame {
        topic: topic(filter),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": bindings(filter),
            },
            "access_token": access_key,
        }),
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

pub fn leave(filter: &ChangeFilter, reference: &str) -> Frame {
    Frame {
        topic: topic(filter),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

pub fn heartbeat(reference: &str) -> Frame {
    Frame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

#[derive(Debug, PartialEq)]
pub enum Incoming {
    Change(ChangeEvent),
    JoinOk,
    JoinError(String),
    ChannelError(String),
    Other,
}

/// Interprets a frame received on `topic`. Frames for other topics, replies to
/// heartbeats and presence/system traffic come back as `Other`.
pub fn classify(frame: &Frame, topic: &str, join_ref: &str) -> Incoming {
    if frame.topic != topic {
        return Incoming::Other;
    }

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let kind = data["type"]
                .as_str()
                .or_else(|| data["eventType"].as_str())
                .and_then(ChangeKind::parse);
            match kind {
                Some(kind) => Incoming::Change(ChangeEvent {
                    kind,
                    table: data["table"].as_str().map(str::to_string),
                    record: data.get("record").cloned(),
                }),
                None => Incoming::Other,
            }
        }
        "phx_reply" if frame.reference.as_deref() == Some(join_ref) => {
            if frame.payload["status"] == "ok" {
                Incoming::JoinOk
            } else {
                Incoming::JoinError(frame.payload["response"].to_string())
            }
        }
        "phx_error" | "phx_close" => Incoming::ChannelError(frame.event.clone()),
        _ => Incoming::Other,
    }
}
