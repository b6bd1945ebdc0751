//! Newline-delimited JSON framing over arbitrary byte streams.
//!
//! Bridges a child process's stdin/stdout (or any `AsyncRead`/`AsyncWrite`
//! pair, which is what the tests use) into a duplex message channel:
//!
//! - the read side emits one `serde_json::Value` per completed line and
//!   completes when the underlying stream ends; lines that are not valid
//!   JSON are dropped with a warning
//! - the write side serializes each send through a bounded queue and resolves
//!   only once the frame has been flushed, so callers observe backpressure;
//!   sends after close fail immediately, and closing the channel settles
//!   every outstanding send instead of leaving it pending forever

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{AcpError, Result};

/// Outbound queue depth. Writers block (asynchronously) once this many
/// frames are waiting on the wire.
const WRITE_QUEUE_DEPTH: usize = 64;

enum Outbound {
    Frame {
        payload: String,
        ack: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Write half of the framed channel. Cheap to clone.
#[derive(Clone)]
pub struct MessageStream {
    outbound: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl MessageStream {
    /// Wrap a byte-stream pair into a framed duplex channel.
    ///
    /// Returns the write half and the inbound message receiver. The receiver
    /// yields `Ok` per parsed line and a final `Err` if the underlying read
    /// failed; it closes on EOF.
    pub fn spawn<R, W>(reader: R, writer: W) -> (Self, mpsc::Receiver<Result<Value>>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let closed = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        tokio::spawn(write_loop(writer, outbound_rx, closed.clone()));
        tokio::spawn(read_loop(reader, inbound_tx));

        (
            Self {
                outbound: outbound_tx,
                closed,
            },
            inbound_rx,
        )
    }

    /// Send one message as a single NDJSON frame.
    ///
    /// Resolves once the frame has been written and flushed. Fails
    /// immediately when the channel is already closed.
    pub async fn send(&self, message: &Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AcpError::ConnectionClosed);
        }
        let payload = serde_json::to_string(message)
            .map_err(|err| AcpError::Protocol(format!("failed to encode frame: {err}")))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Frame {
                payload,
                ack: ack_tx,
            })
            .await
            .map_err(|_| AcpError::ConnectionClosed)?;

        ack_rx.await.map_err(|_| AcpError::ConnectionClosed)?
    }

    /// Close the write side. Queued sends settle with
    /// [`AcpError::ConnectionClosed`]; later sends fail immediately.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Wake the writer even if the queue is idle.
            let _ = self.outbound.try_send(Outbound::Shutdown);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Outbound>,
    closed: Arc<AtomicBool>,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Shutdown => break,
            Outbound::Frame { payload, ack } => {
                if closed.load(Ordering::Acquire) {
                    let _ = ack.send(Err(AcpError::ConnectionClosed));
                    continue;
                }
                let result = write_frame(&mut writer, &payload).await;
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    closed.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Settle anything still queued so no sender hangs forever.
    outbound.close();
    while let Ok(message) = outbound.try_recv() {
        if let Outbound::Frame { ack, .. } = message {
            let _ = ack.send(Err(AcpError::ConnectionClosed));
        }
    }
    debug!("message stream writer stopped");
}

async fn write_frame<W>(writer: &mut W, payload: &str) -> Result<()>
where
    W: AsyncWrite + Send + Unpin,
{
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_loop<R>(reader: R, inbound: mpsc::Sender<Result<Value>>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => {
                        if inbound.send(Ok(value)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, line = %trimmed, "dropping unparseable frame");
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                let _ = inbound.send(Err(AcpError::Io(err))).await;
                break;
            }
        }
    }
    debug!("message stream reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn frames_are_emitted_per_completed_line() {
        let (_client_write, agent_read) = tokio::io::duplex(1024);
        let (agent_write, client_read) = tokio::io::duplex(1024);
        let (_stream, mut inbound) = MessageStream::spawn(client_read, _client_write);

        let mut agent_out = agent_write;
        agent_out
            .write_all(b"{\"a\":1}\n{\"b\":2}\n")
            .await
            .unwrap();
        drop(agent_read);

        assert_eq!(inbound.recv().await.unwrap().unwrap(), json!({"a": 1}));
        assert_eq!(inbound.recv().await.unwrap().unwrap(), json!({"b": 2}));
    }

    #[tokio::test]
    async fn unparseable_lines_are_dropped_not_fatal() {
        let (_client_write, _agent_read) = tokio::io::duplex(1024);
        let (agent_write, client_read) = tokio::io::duplex(1024);
        let (_stream, mut inbound) = MessageStream::spawn(client_read, _client_write);

        let mut agent_out = agent_write;
        agent_out
            .write_all(b"this is not json\n{\"ok\":true}\n")
            .await
            .unwrap();

        assert_eq!(inbound.recv().await.unwrap().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn channel_completes_when_the_stream_ends() {
        let (_client_write, _agent_read) = tokio::io::duplex(1024);
        let (agent_write, client_read) = tokio::io::duplex(1024);
        let (_stream, mut inbound) = MessageStream::spawn(client_read, _client_write);

        drop(agent_write); // EOF
        assert!(inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn sends_resolve_after_flush_and_are_framed() {
        let (client_write, agent_read) = tokio::io::duplex(1024);
        let (_agent_write, client_read) = tokio::io::duplex(1024);
        let (stream, _inbound) = MessageStream::spawn(client_read, client_write);

        stream.send(&json!({"method": "initialize"})).await.unwrap();

        let mut reader = BufReader::new(agent_read).lines();
        let line = reader.next_line().await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&line).unwrap(),
            json!({"method": "initialize"})
        );
    }

    #[tokio::test]
    async fn sends_after_close_fail_immediately() {
        let (client_write, _agent_read) = tokio::io::duplex(1024);
        let (_agent_write, client_read) = tokio::io::duplex(1024);
        let (stream, _inbound) = MessageStream::spawn(client_read, client_write);

        stream.close();
        let err = stream.send(&json!({"x": 1})).await.unwrap_err();
        assert!(matches!(err, AcpError::ConnectionClosed));
    }

    #[tokio::test]
    async fn peer_disappearing_settles_pending_sends() {
        // A tiny pipe that we stop draining: writes eventually error once the
        // peer half is dropped, and the pending send must settle.
        let (client_write, agent_read) = tokio::io::duplex(64);
        let (_agent_write, client_read) = tokio::io::duplex(64);
        let (stream, _inbound) = MessageStream::spawn(client_read, client_write);

        drop(agent_read);
        let big = "x".repeat(4096);
        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            stream.send(&json!({ "payload": big })),
        )
        .await
        .expect("send must settle, not hang")
        .unwrap_err();
        assert!(matches!(
            err,
            AcpError::ConnectionClosed | AcpError::Io(_)
        ));
    }

    #[tokio::test]
    async fn reads_tolerate_chunked_delivery() {
        let (_client_write, _agent_read) = tokio::io::duplex(1024);
        let (agent_write, client_read) = tokio::io::duplex(1024);
        let (_stream, mut inbound) = MessageStream::spawn(client_read, _client_write);

        let mut agent_out = agent_write;
        agent_out.write_all(b"{\"split\":").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        agent_out.write_all(b"\"frame\"}\n").await.unwrap();

        assert_eq!(
            inbound.recv().await.unwrap().unwrap(),
            json!({"split": "frame"})
        );
    }

    #[tokio::test]
    async fn send_reports_write_errors() {
        let (client_write, agent_read) = tokio::io::duplex(16);
        let (_agent_write, client_read) = tokio::io::duplex(16);
        let (stream, _inbound) = MessageStream::spawn(client_read, client_write);

        // First send may succeed into the pipe buffer; keep writing until the
        // broken pipe surfaces.
        drop(agent_read);
        let mut saw_error = false;
        for _ in 0..8 {
            if stream.send(&json!({"n": "0123456789abcdef"})).await.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error, "writes into a dead pipe must eventually fail");
        let _ = stream;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (client_write, _agent_read) = tokio::io::duplex(64);
        let (_agent_write, client_read) = tokio::io::duplex(64);
        let (stream, _inbound) = MessageStream::spawn(client_read, client_write);
        stream.close();
        stream.close();
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn read_side_survives_large_frames() {
        let (_client_write, _agent_read) = tokio::io::duplex(1 << 16);
        let (agent_write, client_read) = tokio::io::duplex(1 << 16);
        let (_stream, mut inbound) = MessageStream::spawn(client_read, _client_write);

        let big = "y".repeat(32 * 1024);
        let frame = format!("{}\n", json!({ "data": big }));
        let mut agent_out = agent_write;
        tokio::spawn(async move {
            let _ = agent_out.write_all(frame.as_bytes()).await;
        });

        let value = inbound.recv().await.unwrap().unwrap();
        assert_eq!(value["data"].as_str().unwrap().len(), 32 * 1024);
    }

    #[tokio::test]
    async fn writer_read_half_unused_is_fine() {
        // Sanity check on the duplex wiring used by the other tests.
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
