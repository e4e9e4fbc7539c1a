use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::phoenix::{self, Frame, Incoming};
use super::{ChangeEvent, ChangeFilter, ChangeStream};
use crate::error::BackendError;

type Socket = WebSocketStream<ConnectStream>;

const EVENT_BUFFER: usize = 64;
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Opens change subscriptions on the backend's realtime socket. Every
/// subscription gets its own connection and channel.
pub struct RealtimeClient {
    socket_url: Url,
    access_key: String,
    heartbeat: Duration,
}

impl RealtimeClient {
    pub fn new(endpoint: &Url, access_key: &str, heartbeat: Duration) -> Result<Self, BackendError> {
        let invalid = || BackendError::InvalidEndpoint(endpoint.to_string());

        let scheme = match endpoint.scheme() {
            "https" => "wss",
            "http" => "ws",
            _ => return Err(invalid()),
        };
        let mut socket_url = endpoint.join("realtime/v1/websocket").map_err(|_| invalid())?;
        socket_url.set_scheme(scheme).map_err(|_| invalid())?;
        socket_url
            .query_pairs_mut()
            .append_pair("apikey", access_key)
            .append_pair("vsn", "1.0.0");

        Ok(Self {
            socket_url,
            access_key: access_key.to_string(),
            heartbeat: heartbeat.max(MIN_HEARTBEAT),
        })
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }

    /// Connects and joins before returning, so a refused or unreachable
    /// channel is reported to the caller. Later drops reconnect on their own.
    pub async fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeStream, BackendError> {
        let mut session = Session {
            url: self.socket_url.clone(),
            topic: phoenix::topic(&filter),
            filter,
            access_key: self.access_key.clone(),
            heartbeat: self.heartbeat,
            join_ref: String::new(),
            next_ref: 0,
        };
        let socket = session.connect().await?;
        log::info!("Subscribed to {}", session.topic);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(session.run(socket, tx, stop_rx));

        Ok(ChangeStream::new(rx, move || {
            let _ = stop_tx.send(());
        }))
    }
}

enum Exit {
    Stopped,
    ConsumerGone,
    Disconnected(String),
}

struct Session {
    url: Url,
    filter: ChangeFilter,
    topic: String,
    access_key: String,
    heartbeat: Duration,
    join_ref: String,
    next_ref: u64,
}

impl Session {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn connect(&mut self) -> Result<Socket, BackendError> {
        let (mut socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BackendError::Realtime(e.to_string()))?;

        let reference = self.next_ref();
        let join = phoenix::join(&self.filter, &self.access_key, &reference);
        socket
            .send(Message::text(join.encode()))
            .await
            .map_err(|e| BackendError::Realtime(e.to_string()))?;
        self.join_ref = reference;

        let topic = &self.topic;
        let join_ref = &self.join_ref;
        let joined = tokio::time::timeout(JOIN_TIMEOUT, async {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(frame) = Frame::decode(text.as_str()) else {
                            continue;
                        };
                        match phoenix::classify(&frame, topic, join_ref) {
                            Incoming::JoinOk => return Ok(()),
                            Incoming::JoinError(reason) => {
                                return Err(BackendError::Realtime(format!("join refused: {}", reason)))
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(BackendError::Realtime(e.to_string())),
                    None => return Err(BackendError::Closed),
                }
            }
        })
        .await;

        match joined {
            Ok(Ok(())) => Ok(socket),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BackendError::Realtime(format!("join of {} timed out", self.topic))),
        }
    }

    async fn run(
        mut self,
        mut socket: Socket,
        events: mpsc::Sender<ChangeEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            match self.pump(&mut socket, &events, &mut stop).await {
                Exit::Stopped | Exit::ConsumerGone => {
                    self.leave(&mut socket).await;
                    log::info!("Unsubscribed from {}", self.topic);
                    return;
                }
                Exit::Disconnected(reason) => {
                    log::warn!("Realtime channel {} dropped: {}", self.topic, reason);
                    match self.reconnect(&mut stop).await {
                        Some(fresh) => socket = fresh,
                        None => return,
                    }
                }
            }
        }
    }

    async fn pump(
        &mut self,
        socket: &mut Socket,
        events: &mpsc::Sender<ChangeEvent>,
        stop: &mut oneshot::Receiver<()>,
    ) -> Exit {
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = &mut *stop => return Exit::Stopped,
                _ = heartbeat.tick() => {
                    let frame = phoenix::heartbeat(&self.next_ref());
                    if let Err(e) = socket.send(Message::text(frame.encode())).await {
                        return Exit::Disconnected(e.to_string());
                    }
                    log::debug!("Heartbeat sent on {}", self.topic);
                }
                message = socket.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match Frame::decode(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                log::debug!("Ignoring undecodable realtime frame: {}", e);
                                continue;
                            }
                        };
                        match phoenix::classify(&frame, &self.topic, &self.join_ref) {
                            Incoming::Change(event) => {
                                log::debug!("Change on {:?}: {:?}", event.table, event.kind);
                                if events.send(event).await.is_err() {
                                    return Exit::ConsumerGone;
                                }
                            }
                            Incoming::ChannelError(reason) => return Exit::Disconnected(reason),
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Exit::Disconnected("socket closed".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Disconnected(e.to_string()),
                },
            }
        }
    }

    /// Returns `None` when the subscription was released while waiting.
    async fn reconnect(&mut self, stop: &mut oneshot::Receiver<()>) -> Option<Socket> {
        let mut attempt = 0;
        loop {
            let delay = RECONNECT_BACKOFF[attempt.min(RECONNECT_BACKOFF.len() - 1)];
            attempt += 1;

            tokio::select! {
                _ = &mut *stop => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            tokio::select! {
                _ = &mut *stop => return None,
                result = self.connect() => match result {
                    Ok(socket) => {
                        log::info!("Rejoined {} after {} attempt(s)", self.topic, attempt);
                        return Some(socket);
                    }
                    Err(e) => log::warn!("Reconnect to {} failed: {}", self.topic, e),
                },
            }
        }
    }

    fn leave_frame(&mut self) -> Frame {
        let reference = self.next_ref();
        phoenix::leave(&self.filter, &reference)
    }

    async fn leave(&mut self, socket: &mut Socket) {
        let frame = self.leave_frame();
        if let Err(e) = socket.send(Message::text(frame.encode())).await {
            log::debug!("Could not send leave for {}: {}", self.topic, e);
        }
        let _ = socket.close(None).await;
    }
}
