//! Client Notification Channel.
//!
//! Outbound: one [`ClientMessage`] broadcast to every connected browser.
//! Delivery is fire-and-forget; a disconnected client is pruned, never
//! reported back to the caller.
//!
//! Inbound: browsers report log lines and failed component updates as
//! [`ClientEvent`]s. The serving layer hands them to [`InboundHandlers`],
//! which queue them for the ingestion loop so the store keeps one writer.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::dev::result::BuildDiagnostic;

/// Buffered messages per SSE client before new messages are dropped for it.
const CLIENT_BUFFER: usize = 64;

/// Custom event name for component template updates.
pub const COMPONENT_UPDATE_EVENT: &str = "component-update";

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Connected,
    /// Show the error overlay.
    Error { err: ErrorPayload },
    /// Hot-swap the listed resources. An empty list clears the overlay.
    Update { updates: Vec<UpdateEntry> },
    /// Reload pages whose path matches; `*` reloads everything.
    FullReload { path: String },
    Custom {
        event: String,
        data: serde_json::Value,
    },
}

impl ClientMessage {
    pub fn error(diagnostic: &BuildDiagnostic) -> Self {
        let location = diagnostic.location.as_ref().map(|loc| ErrorLocation {
            file: loc.file.clone(),
            line: loc.line,
            column: loc.column,
        });
        ClientMessage::Error {
            err: ErrorPayload {
                message: diagnostic.text.clone(),
                stack: String::new(),
                location,
                frame: diagnostic
                    .location
                    .as_ref()
                    .and_then(|loc| loc.line_text.clone()),
            },
        }
    }

    pub fn full_reload() -> Self {
        ClientMessage::FullReload { path: "*".into() }
    }

    /// The update that dismisses a visible error overlay.
    pub fn clear_overlay() -> Self {
        ClientMessage::Update {
            updates: Vec::new(),
        }
    }

    pub fn component_update(component_id: &str, timestamp: i64) -> Self {
        ClientMessage::Custom {
            event: COMPONENT_UPDATE_EVENT.into(),
            data: serde_json::json!({ "id": component_id, "timestamp": timestamp }),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub stack: String,
    #[serde(rename = "loc", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub path: String,
    pub accepted_path: String,
    pub timestamp: i64,
}

impl UpdateEntry {
    pub fn css(path: String, timestamp: i64) -> Self {
        Self {
            kind: UpdateKind::CssUpdate,
            accepted_path: path.clone(),
            path,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    CssUpdate,
}

/// Broadcast to every connected client.
#[async_trait]
pub trait ClientChannel: Send + Sync {
    async fn broadcast(&self, message: &ClientMessage);
}

/// Events reported by browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    Log {
        text: String,
        #[serde(default)]
        severity: LogSeverity,
    },
    /// A component update could not be applied in the browser.
    Invalidate {
        id: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Inbound handlers registered with the serving layer at bootstrap.
#[derive(Debug, Clone)]
pub struct InboundHandlers {
    tx: mpsc::Sender<ClientEvent>,
}

impl InboundHandlers {
    pub fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self { tx }
    }

    pub async fn on_client_log(&self, text: String, severity: LogSeverity) {
        self.dispatch(ClientEvent::Log { text, severity }).await;
    }

    pub async fn on_client_invalidate(&self, id: String, message: Option<String>, error: bool) {
        self.dispatch(ClientEvent::Invalidate { id, message, error })
            .await;
    }

    pub async fn dispatch(&self, event: ClientEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Client event dropped; the session has ended");
        }
    }
}

/// Registry of connected Server-Sent-Events clients.
#[derive(Debug, Default)]
pub struct ClientHub {
    clients: RwLock<HashMap<usize, mpsc::Sender<String>>>,
    next_client_id: RwLock<usize>,
}

impl ClientHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a client. Its stream starts with a `connected` message.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = {
            let mut next_id = self.next_client_id.write();
            let id = *next_id;
            *next_id += 1;
            id
        };

        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let _ = tx.try_send(ClientMessage::Connected.to_json());
        self.clients.write().insert(id, tx);

        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Drop every client; their event streams end.
    pub fn disconnect_all(&self) {
        self.clients.write().clear();
    }

    fn send_all(&self, json: &str) {
        let clients = self.clients.read().clone();
        let mut closed = Vec::new();

        for (id, tx) in clients {
            match tx.try_send(json.to_string()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Client {} is not keeping up; message dropped", id);
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            tracing::debug!("Client {} disconnected", id);
            self.unregister_client(id);
        }
    }
}

#[async_trait]
impl ClientChannel for ClientHub {
    async fn broadcast(&self, message: &ClientMessage) {
        self.send_all(&message.to_json());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps every broadcast for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingChannel {
        pub messages: Mutex<Vec<ClientMessage>>,
    }

    impl RecordingChannel {
        pub fn take(&self) -> Vec<ClientMessage> {
            std::mem::take(&mut *self.messages.lock())
        }
    }

    #[async_trait]
    impl ClientChannel for RecordingChannel {
        async fn broadcast(&self, message: &ClientMessage) {
            self.messages.lock().push(message.clone());
        }
    }
}
