use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use crate::transport::{ShutdownSignal, next_id};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Commands accepted by the transport actor.
#[derive(Debug)]
pub(crate) enum TransportMessage {
    /// A request command with a response sender.
    Request(Value, oneshot::Sender<Result<TransportResponse>>),
    /// Listener for the target message answering the given request id.
    ListenTargetMessage(u64, oneshot::Sender<Result<TransportResponse>>),
    /// One-shot listener for a session-scoped CDP event.
    ListenEvent {
        session_id: String,
        method: String,
        tx: oneshot::Sender<Value>,
    },
}

/// Responses produced by the transport actor.
#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// A top-level CDP response frame.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
    #[serde(default)]
    pub(crate) error: Option<Value>,
}

/// A `Target.receivedMessageFromTarget` notification frame.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

/// Owns the WebSocket halves and routes frames between Chrome and the
/// waiters registered through [`TransportMessage`].
pub(crate) struct TransportActor {
    pub(crate) pending_requests: HashMap<u64, oneshot::Sender<Result<TransportResponse>>>,
    pub(crate) event_listeners: HashMap<(String, String), Vec<oneshot::Sender<Value>>>,
    pub(crate) ws_sink: WsSink,
    pub(crate) command_rx: mpsc::Receiver<TransportMessage>,
    pub(crate) shutdown_rx: oneshot::Receiver<()>,
    pub(crate) shutdown_signal: Arc<ShutdownSignal>,
}

impl TransportActor {
    pub(crate) async fn run(mut self, mut ws_stream: WsStream) {
        loop {
            tokio::select! {
                Some(msg) = ws_stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => self.dispatch_incoming(&text),
                        Err(_) => break,
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => self.submit_request(cmd, tx).await,
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            self.pending_requests.insert(id, tx);
                        }
                        TransportMessage::ListenEvent { session_id, method, tx } => {
                            self.event_listeners
                                .entry((session_id, method))
                                .or_default()
                                .push(tx);
                        }
                    }
                }
                _ = &mut self.shutdown_rx => {
                    let goodbye = json!({
                        "id": next_id(),
                        "method": "Browser.close",
                        "params": {}
                    });
                    let _ = self.ws_sink.send(Message::Text(goodbye.to_string())).await;
                    let _ = self.ws_sink.close().await;
                    break;
                }
                else => break,
            }
        }

        // Whatever path ended the loop, wake anyone blocked in shutdown().
        self.shutdown_signal.signal_shutdown();
    }

    /// Routes one incoming frame to the waiter it answers.
    ///
    /// Frames arrive in three shapes: direct responses (`id` at the top
    /// level), target replies and target events (both wrapped in
    /// `Target.receivedMessageFromTarget` with the payload as a JSON string).
    fn dispatch_incoming(&mut self, text: &str) {
        if let Ok(response) = serde_json::from_str::<Response>(text) {
            if let Some(tx) = self.pending_requests.remove(&response.id) {
                let _ = tx.send(Ok(TransportResponse::Response(response)));
            }
            return;
        }

        let Ok(target_msg) = serde_json::from_str::<TargetMessage>(text) else {
            return;
        };
        let session_id = target_msg.params["sessionId"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let Some(inner_str) = target_msg.params.get("message").and_then(|v| v.as_str()) else {
            return;
        };
        let Ok(inner_json) = serde_json::from_str::<Value>(inner_str) else {
            return;
        };

        if let Some(id) = inner_json.get("id").and_then(|i| i.as_u64()) {
            if let Some(tx) = self.pending_requests.remove(&id) {
                let _ = tx.send(Ok(TransportResponse::Target(target_msg)));
            }
            return;
        }

        if let Some(method) = inner_json.get("method").and_then(|m| m.as_str())
            && let Some(waiters) = self.event_listeners.remove(&(session_id, method.to_string()))
        {
            let params = inner_json.get("params").cloned().unwrap_or(Value::Null);
            for tx in waiters {
                let _ = tx.send(params.clone());
            }
        }
    }

    async fn submit_request(&mut self, cmd: Value, tx: oneshot::Sender<Result<TransportResponse>>) {
        let Some(id) = cmd["id"].as_u64() else {
            let _ = tx.send(Err(anyhow!("Command has no id: {cmd}")));
            return;
        };
        let Ok(text) = serde_json::to_string(&cmd) else {
            let _ = tx.send(Err(anyhow!("Command is not serializable")));
            return;
        };

        if self.ws_sink.send(Message::Text(text)).await.is_ok() {
            self.pending_requests.insert(id, tx);
        } else {
            let _ = tx.send(Err(anyhow!("WebSocket send failed")));
        }
    }
}
