//! JSON-RPC multiplexing over a framed message stream.
//!
//! Outbound requests get monotonically increasing integer ids and park a
//! oneshot in the pending map until the matching response arrives. Inbound
//! frames are routed by shape: `method` + `id` is a request from the agent
//! (permission negotiation), `method` alone is a notification (session
//! updates), `id` alone is a response to one of ours. When the stream ends -
//! EOF, read error, or process death - every pending request is settled with
//! a connection-closed error instead of hanging.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{AcpError, Result};
use crate::transport::MessageStream;

/// A request initiated by the agent (e.g. permission negotiation).
#[derive(Debug)]
pub struct IncomingRequest {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

/// A notification from the agent (e.g. a session update).
#[derive(Debug)]
pub struct IncomingNotification {
    pub method: String,
    pub params: Value,
}

/// Receiving ends of the inbound traffic split.
pub struct InboundChannels {
    pub requests: mpsc::Receiver<IncomingRequest>,
    pub notifications: mpsc::Receiver<IncomingNotification>,
}

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value>>>>>;

/// One protocol connection to an agent process.
pub struct AcpConnection {
    stream: MessageStream,
    pending: PendingMap,
    next_id: AtomicI64,
}

impl AcpConnection {
    /// Build a connection over an arbitrary byte-stream pair.
    ///
    /// This is the seam the tests use; production wires up the child
    /// process's stdout/stdin here.
    pub fn new<R, W>(reader: R, writer: W) -> (Arc<Self>, InboundChannels)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (stream, inbound) = MessageStream::spawn(reader, writer);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (request_tx, request_rx) = mpsc::channel(64);
        let (notification_tx, notification_rx) = mpsc::channel(256);

        tokio::spawn(route_inbound(
            inbound,
            pending.clone(),
            request_tx,
            notification_tx,
        ));

        (
            Arc::new(Self {
                stream,
                pending,
                next_id: AtomicI64::new(1),
            }),
            InboundChannels {
                requests: request_rx,
                notifications: notification_rx,
            },
        )
    }

    /// Send a request and await its response's `result`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        if let Err(err) = self.stream.send(&frame).await {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(AcpError::ConnectionClosed),
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.stream.send(&frame).await
    }

    /// Answer a request the agent sent us.
    pub async fn respond(&self, id: Value, result: Value) -> Result<()> {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        });
        self.stream.send(&frame).await
    }

    /// Reject a request the agent sent us.
    pub async fn respond_error(&self, id: Value, code: i64, message: &str) -> Result<()> {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        });
        self.stream.send(&frame).await
    }

    /// Close the connection, settling all pending requests.
    pub fn close(&self) {
        self.stream.close();
        let mut pending = self.pending.lock();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(AcpError::ConnectionClosed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }
}

async fn route_inbound(
    mut inbound: mpsc::Receiver<Result<Value>>,
    pending: PendingMap,
    requests: mpsc::Sender<IncomingRequest>,
    notifications: mpsc::Sender<IncomingNotification>,
) {
    while let Some(message) = inbound.recv().await {
        let value = match message {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "inbound stream error");
                break;
            }
        };

        let method = value.get("method").and_then(Value::as_str);
        let id = value.get("id");

        match (method, id) {
            (Some(method), Some(id)) => {
                let incoming = IncomingRequest {
                    id: id.clone(),
                    method: method.to_string(),
                    params: value.get("params").cloned().unwrap_or(Value::Null),
                };
                if requests.send(incoming).await.is_err() {
                    break;
                }
            }
            (Some(method), None) => {
                let incoming = IncomingNotification {
                    method: method.to_string(),
                    params: value.get("params").cloned().unwrap_or(Value::Null),
                };
                if notifications.send(incoming).await.is_err() {
                    break;
                }
            }
            (None, Some(id)) => {
                let Some(id) = id.as_i64() else {
                    warn!(?id, "response with non-integer id");
                    continue;
                };
                let result = if let Some(error) = value.get("error") {
                    Err(AcpError::Rpc {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    })
                } else {
                    Ok(value.get("result").cloned().unwrap_or(Value::Null))
                };

                match pending.lock().remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => warn!(id, "response without a pending request"),
                }
            }
            (None, None) => {
                debug!("ignoring frame with neither method nor id");
            }
        }
    }

    // Stream over: settle everything still waiting.
    let mut pending = pending.lock();
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(AcpError::ConnectionClosed));
    }
    debug!("inbound router stopped");
}
