use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Global atomic ID counter for generating unique message IDs.
pub(crate) static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies a session-scoped CDP event such as `Page.loadEventFired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventKey {
    pub(crate) session_id: String,
    pub(crate) method: String,
}

/// Messages sent to the transport actor.
#[derive(Debug)]
pub(crate) enum TransportMessage {
    /// A request command with a response sender.
    Request(Value, oneshot::Sender<Result<TransportResponse>>),
    /// Listener for target messages with given ID.
    ListenTargetMessage(u64, oneshot::Sender<Result<TransportResponse>>),
    /// One-shot listener for the next matching event, resolved with its params.
    ListenEvent(EventKey, oneshot::Sender<Value>),
    /// Command to shut down the transport.
    Shutdown,
}

/// Responses produced by the transport actor.
#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// Represents a generic CDP response.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    pub(crate) result: Value,
}

/// Represents messages sent from targets (`Target.receivedMessageFromTarget`).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

type PendingRequests = HashMap<u64, oneshot::Sender<Result<TransportResponse>>>;

/// Drops entries whose caller stopped waiting, e.g. after a response timeout
/// or a failed send following `listen_target_msg`.
fn prune_abandoned(pending: &mut PendingRequests) {
    pending.retain(|_, tx| !tx.is_closed());
}

/// Internal transport actor managing WebSocket communication and request-response handling.
struct TransportActor {
    pending_requests: PendingRequests,
    event_listeners: Vec<(EventKey, oneshot::Sender<Value>)>,
    ws_sink: SplitSink<WsStream, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
}

impl TransportActor {
    async fn run(mut self, mut ws_stream: SplitStream<WsStream>) {
        loop {
            tokio::select! {
                Some(msg) = ws_stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => self.handle_incoming(&text),
                        Err(e) => {
                            log::debug!("CDP websocket closed: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => {
                            prune_abandoned(&mut self.pending_requests);
                            if let Some(id) = cmd["id"].as_u64()
                                && let Ok(text) = serde_json::to_string(&cmd) {
                                    if self.ws_sink.send(Message::Text(text)).await.is_ok() {
                                        self.pending_requests.insert(id, tx);
                                    } else {
                                        let _ = tx.send(Err(anyhow!("WebSocket send failed")));
                                    }
                                }
                        }
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            prune_abandoned(&mut self.pending_requests);
                            self.pending_requests.insert(id, tx);
                        }
                        TransportMessage::ListenEvent(key, tx) => {
                            self.event_listeners.retain(|(_, l)| !l.is_closed());
                            self.event_listeners.push((key, tx));
                        }
                        TransportMessage::Shutdown => {
                            let _ = self.ws_sink.send(Message::Text(json!({
                                "id": next_id(),
                                "method": "Browser.close",
                                "params": {}
                            }).to_string())).await;
                            let _ = self.ws_sink.close().await;
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        for (_, sender) in self.pending_requests.drain() {
            let _ = sender.send(Err(anyhow!("Transport closed")));
        }
    }

    fn handle_incoming(&mut self, text: &str) {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return;
        };

        // Browser-level reply to one of our own requests.
        if let Some(id) = value.get("id").and_then(|i| i.as_u64()) {
            if let Some(sender) = self.pending_requests.remove(&id) {
                let reply = match value.get("error") {
                    Some(err) => Err(anyhow!("CDP error: {}", err)),
                    None => Ok(TransportResponse::Response(Response {
                        id,
                        result: value.get("result").cloned().unwrap_or(Value::Null),
                    })),
                };
                let _ = sender.send(reply);
            }
            return;
        }

        if value.get("method").and_then(|m| m.as_str()) != Some("Target.receivedMessageFromTarget") {
            return;
        }
        let Some(params) = value.get("params") else {
            return;
        };
        let Some(inner) = params
            .get("message")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
        else {
            return;
        };

        if let Some(id) = inner.get("id").and_then(|i| i.as_u64()) {
            if let Some(sender) = self.pending_requests.remove(&id) {
                let _ = sender.send(Ok(TransportResponse::Target(TargetMessage {
                    params: params.clone(),
                })));
            }
        } else if let Some(method) = inner.get("method").and_then(|m| m.as_str()) {
            let session_id = params.get("sessionId").and_then(|s| s.as_str()).unwrap_or_default();
            if let Some(pos) = self
                .event_listeners
                .iter()
                .position(|(key, _)| key.method == method && key.session_id == session_id)
            {
                let (_, sender) = self.event_listeners.swap_remove(pos);
                let _ = sender.send(inner.get("params").cloned().unwrap_or(Value::Null));
            }
        }
    }
}

/// Asynchronous transport interface to the Chrome DevTools Protocol over WebSocket.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
}

impl Transport {
    /// Creates a new transport connected to the specified WebSocket URL.
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let actor = TransportActor {
                pending_requests: HashMap::new(),
                event_listeners: Vec::new(),
                ws_sink,
                command_rx: rx,
            };
            actor.run(ws_stream).await;
        });

        Ok(Self { tx })
    }

    /// Sends a command and awaits its response.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(RESPONSE_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for response"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Sends a browser-level command and returns its `result` object.
    pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value> {
        match self
            .send(json!({ "id": next_id(), "method": method, "params": params }))
            .await?
        {
            TransportResponse::Response(res) => Ok(res.result),
            other => Err(anyhow!("Unexpected response to {}: {:?}", method, other)),
        }
    }

    /// Registers interest in the target reply carrying `msg_id`.
    ///
    /// The listener is installed before the request goes out so a fast reply
    /// cannot slip past it.
    pub(crate) async fn listen_target_msg(
        &self,
        msg_id: usize,
    ) -> Result<oneshot::Receiver<Result<TransportResponse>>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenTargetMessage(msg_id as u64, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Awaits a reply obtained from [`Transport::listen_target_msg`].
    pub(crate) async fn await_target_msg(
        rx: oneshot::Receiver<Result<TransportResponse>>,
    ) -> Result<TransportResponse> {
        time::timeout(RESPONSE_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for target message"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Registers a listener for the next `method` event on `session_id`.
    ///
    /// Register before triggering the action that fires the event, otherwise
    /// the event may arrive first and be lost.
    pub(crate) async fn listen_for_event(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<oneshot::Receiver<Value>> {
        let (tx, rx) = oneshot::channel();
        let key = EventKey {
            session_id: session_id.to_string(),
            method: method.to_string(),
        };
        self.tx
            .send(TransportMessage::ListenEvent(key, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Initiates a graceful shutdown of the transport.
    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(TransportMessage::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }

    #[test]
    fn abandoned_requests_are_pruned() {
        let mut pending = PendingRequests::new();
        let (waiting_tx, _waiting_rx) = oneshot::channel();
        let (timed_out_tx, timed_out_rx) = oneshot::channel();
        pending.insert(1, waiting_tx);
        pending.insert(2, timed_out_tx);

        drop(timed_out_rx);
        prune_abandoned(&mut pending);

        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&1));
    }
}
