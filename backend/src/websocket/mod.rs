//! # WebSocket Module
//!
//! This module pushes complaint changes to connected dashboards.
//!
//! ## Topics
//!
//! - `all` - every complaint change
//! - a station name - changes to that station's complaints
//! - a wallet address - changes to that citizen's complaints
//!
//! ## Connection Flow
//!
//! ```text
//! 1. Client connects to /ws/:topic
//!              ↓
//! 2. Server registers the connection under the topic
//!              ↓
//! 3. Server sends a `connected` event
//!              ↓
//! 4. Events are pushed as they occur:
//!    - complaint_created
//!    - complaint_updated
//! ```
//!
//! ## Message Format
//!
//! All messages are JSON:
//!
//! ```json
//! {
//!     "event": "complaint_updated",
//!     "data": {
//!         "transactionHash": "0x9f2c...",
//!         "station": "Central",
//!         "walletAddress": "0x51ab...",
//!         "status": "in_progress",
//!         "updateCount": 2
//!     },
//!     "timestamp": "2024-01-15T12:00:00Z"
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::db::{ComplaintRecord, ComplaintStatus};
use crate::AppState;

/// Topic every change is published to.
pub const ALL_TOPIC: &str = "all";

/// WebSocket event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsEventType {
    /// A new complaint was recorded.
    ComplaintCreated,
    /// A complaint was patched.
    ComplaintUpdated,
    /// Sent once after the upgrade.
    Connected,
    /// Reply to a client text frame.
    Pong,
}

/// WebSocket message wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessage<T> {
    pub event: WsEventType,
    pub data: T,
    pub timestamp: chrono::DateTime<Utc>,
}

impl<T: Serialize> WsMessage<T> {
    pub fn new(event: WsEventType, data: T) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Payload of `complaint_created` and `complaint_updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintEventData {
    pub transaction_hash: String,
    pub station: String,
    pub wallet_address: String,
    pub status: ComplaintStatus,
    pub update_count: usize,
}

impl From<&ComplaintRecord> for ComplaintEventData {
    fn from(record: &ComplaintRecord) -> Self {
        Self {
            transaction_hash: record.transaction_hash.clone(),
            station: record.station.clone(),
            wallet_address: record.wallet_address.clone(),
            status: record.status,
            update_count: record.updates.len(),
        }
    }
}

/// WebSocket connection registry.
///
/// Tracks active sessions per topic. A topic may have many
/// connections (several dashboards watching one station).
#[derive(Clone)]
pub struct WsRegistry {
    /// Topic -> one sender per connection.
    sessions: Arc<Mutex<HashMap<String, Vec<broadcast::Sender<String>>>>>,
}

impl WsRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a connection under `topic` and return its message feed.
    pub async fn register(&self, topic: String) -> broadcast::Receiver<String> {
        let mut sessions = self.sessions.lock().await;
        let (tx, rx) = broadcast::channel(100);

        let senders = sessions.entry(topic.clone()).or_insert_with(Vec::new);
        senders.push(tx);

        info!(
            "Registered WebSocket for topic: {} (total connections: {})",
            topic,
            senders.len()
        );

        rx
    }

    /// Drop senders under `topic` whose receivers are gone.
    pub async fn unregister(&self, topic: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(senders) = sessions.get_mut(topic) {
            senders.retain(|tx| tx.receiver_count() > 0);

            if senders.is_empty() {
                sessions.remove(topic);
                info!("Unregistered all WebSocket connections for topic: {}", topic);
            } else {
                debug!(
                    "Unregistered one WebSocket connection for topic: {} (remaining: {})",
                    topic,
                    senders.len()
                );
            }
        }
    }

    /// Send one event to several topics, each connection at most once
    /// per distinct topic. Blank and repeated topics are skipped.
    pub async fn publish<T: Serialize>(
        &self,
        topics: &[&str],
        event: WsEventType,
        data: T,
    ) -> Result<usize, String> {
        let json = WsMessage::new(event, data)
            .to_json()
            .map_err(|e| format!("Failed to serialize message: {}", e))?;

        let mut sessions = self.sessions.lock().await;
        let mut seen: Vec<&str> = Vec::with_capacity(topics.len());
        let mut total = 0;

        for topic in topics.iter().map(|t| t.trim()) {
            if topic.is_empty() || seen.contains(&topic) {
                continue;
            }
            seen.push(topic);
            total += Self::deliver(&mut sessions, topic, &json);
        }

        Ok(total)
    }

    fn deliver(
        sessions: &mut HashMap<String, Vec<broadcast::Sender<String>>>,
        topic: &str,
        json: &str,
    ) -> usize {
        let Some(senders) = sessions.get_mut(topic) else {
            debug!("No active WebSocket connections for topic: {}", topic);
            return 0;
        };

        // A send only fails when the receiver was dropped.
        senders.retain(|sender| sender.send(json.to_string()).is_ok());
        let sent = senders.len();

        if senders.is_empty() {
            sessions.remove(topic);
        } else {
            debug!("Sent message to topic {} ({} connections)", topic, sent);
        }
        sent
    }

    /// Open connections across all topics, reported by `/health`.
    pub async fn total_connections(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
impl WsRegistry {
    pub async fn connection_count(&self, topic: &str) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.get(topic).map(|v| v.len()).unwrap_or(0)
    }
}

impl Default for WsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish a complaint change to `all`, its station and its wallet.
pub async fn publish_complaint_event(
    registry: &WsRegistry,
    event: WsEventType,
    record: &ComplaintRecord,
) -> Result<usize, String> {
    registry
        .publish(
            &[ALL_TOPIC, &record.station, &record.wallet_address],
            event,
            ComplaintEventData::from(record),
        )
        .await
}

/// Configure WebSocket routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws/{topic}", web::get().to(websocket_handler));
}

/// WebSocket connection handler.
///
/// ## Endpoint
///
/// `GET /ws/:topic`
///
/// ## Example (JavaScript)
///
/// ```javascript
/// const ws = new WebSocket('ws://localhost:5000/ws/Central');
///
/// ws.onmessage = (event) => {
///     const message = JSON.parse(event.data);
///     if (message.event === 'complaint_created') refreshTable();
/// };
/// ```
pub async fn websocket_handler(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, actix_web::Error> {
    let topic = path.into_inner();
    info!("WebSocket connection request for topic: {}", topic);

    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let ws_registry = state.ws_registry.clone();
    let mut rx = ws_registry.register(topic.clone()).await;

    actix_rt::spawn(async move {
        let welcome = WsMessage::new(
            WsEventType::Connected,
            serde_json::json!({
                "status": "connected",
                "topic": topic,
                "message": "You will receive complaint updates for this topic"
            }),
        );

        if let Ok(json) = welcome.to_json() {
            if let Err(e) = session.text(json).await {
                error!("Failed to send welcome message: {}", e);
            }
        }

        // One loop owns both the feed and the socket, so the receiver is
        // dropped as soon as the client goes away.
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(msg) => {
                        if let Err(e) = session.text(msg).await {
                            debug!("WebSocket session closed for {}: {}", topic, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client on {} lagged, {} events skipped", topic, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                incoming = msg_stream.next() => match incoming {
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received text on {}: {}", topic, text);
                        let reply = WsMessage::new(
                            WsEventType::Pong,
                            serde_json::json!({
                                "received": text.to_string(),
                                "message": "WebSocket is active and listening for events"
                            }),
                        );

                        if let Ok(json) = reply.to_json() {
                            if session.text(json).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Received unexpected binary message on {}", topic);
                    }
                    Some(Ok(Message::Close(reason))) => {
                        info!("WebSocket closed for {}: {:?}", topic, reason);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket protocol error on {}: {}", topic, e);
                        break;
                    }
                    None => break,
                },
            }
        }

        drop(rx);
        ws_registry.unregister(&topic).await;
        let _ = session.close(None).await;
        info!("WebSocket disconnected for topic: {}", topic);
    });

    Ok(response)
}
