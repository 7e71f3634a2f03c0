//! Single-node handler: one self-healing connection, no topology.
//!
//! Round trips register a demultiplexer entry and write one frame. A
//! missing or dead connection triggers a reconnect before the send; a
//! timed-out request claims its entry, schedules a reconnect in the
//! background and reports a synthetic error result instead of a hard
//! failure.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::config::SingleConfig;
use crate::connection::Connection;
use crate::demux::{DemuxMap, PendingRequest};
use crate::error::{Result, RoomzinError};
use crate::protocol::{encode_frame, RawResult, STATUS_ERROR};

/// Callback invoked after the connection is lost, so the owner can
/// invalidate cached registry state.
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Handler for a non-clustered deployment.
pub struct SingleHandler {
    cfg: SingleConfig,
    demux: Arc<DemuxMap>,
    conn: tokio::sync::Mutex<Option<Arc<Connection>>>,
    next_id: AtomicU32,
    closed: AtomicBool,
    on_reconnect: Arc<Mutex<Option<ReconnectCallback>>>,
}

impl SingleHandler {
    /// Build the handler. Must be called within a tokio runtime; no
    /// connection is made until [`connect`](Self::connect) or the first
    /// round trip.
    pub fn new(cfg: SingleConfig) -> Arc<Self> {
        let demux = DemuxMap::new(cfg.request_timeout * 2);
        Arc::new(Self {
            cfg,
            demux,
            conn: tokio::sync::Mutex::new(None),
            next_id: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            on_reconnect: Arc::new(Mutex::new(None)),
        })
    }

    /// Register the reconnect callback.
    pub fn set_reconnect_callback(&self, cb: ReconnectCallback) {
        *lock(&self.on_reconnect) = Some(cb);
    }

    /// Dial and authenticate the connection.
    pub async fn connect(&self) -> Result<()> {
        self.reconnect().await
    }

    /// Next correlation id, a monotonically increasing sequence.
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Send one payload and wait for its response.
    ///
    /// Self-heals: a dead connection is rebuilt before the send, and a
    /// timeout claims the pending entry, schedules a reconnect and yields
    /// a synthetic `ERROR` result.
    pub async fn round_trip(self: &Arc<Self>, correlation_id: u32, payload: Bytes) -> Result<RawResult> {
        if self.is_closed() {
            return Err(RoomzinError::HandlerClosed);
        }

        let conn = self.live_connection().await?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.demux.store(correlation_id, PendingRequest::new(tx));

        if let Err(e) = conn.write(encode_frame(correlation_id, &payload)) {
            self.demux.load_remove(correlation_id);
            self.spawn_reconnect();
            return Err(e);
        }

        match tokio::time::timeout(self.cfg.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RoomzinError::ConnectionClosed),
            Err(_) => {
                // Claim the entry so a late reply is dropped, then heal.
                self.demux.load_remove(correlation_id);
                self.spawn_reconnect();
                Ok(RawResult {
                    status: STATUS_ERROR.to_string(),
                    fields: Vec::new(),
                })
            }
        }
    }

    /// Shut down: fail all pending requests once and close the connection.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.demux.destroy();
        if let Ok(mut guard) = self.conn.try_lock() {
            if let Some(conn) = guard.take() {
                conn.close();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current connection, rebuilding it when absent or dead.
    async fn live_connection(&self) -> Result<Arc<Connection>> {
        {
            let guard = self.conn.lock().await;
            if let Some(conn) = guard.as_ref() {
                if !conn.is_closed() {
                    return Ok(conn.clone());
                }
            }
        }
        self.reconnect().await?;
        self.conn
            .lock()
            .await
            .clone()
            .ok_or(RoomzinError::ConnectionClosed)
    }

    async fn reconnect(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if self.is_closed() {
            return Err(RoomzinError::HandlerClosed);
        }
        if let Some(old) = guard.take() {
            old.close();
        }

        // The close hook fails every pending request and tells the owner
        // to invalidate cached registry state.
        let demux = self.demux.clone();
        let on_reconnect = self.on_reconnect.clone();
        let conn = Connection::establish(
            &self.cfg.host,
            self.cfg.tcp_port,
            &self.cfg.auth_token,
            self.cfg.request_timeout,
            self.cfg.keep_alive,
            self.demux.clone(),
            Some(Box::new(move || {
                demux.fail_all();
                let cb = lock(&on_reconnect).clone();
                if let Some(cb) = cb {
                    cb();
                }
            })),
        )
        .await?;

        *guard = Some(conn);
        Ok(())
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let handler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.reconnect().await {
                tracing::warn!(error = %e, "reconnect failed");
            }
        });
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SingleConfigBuilder;
    use crate::protocol::login::build_login_payload;
    use crate::protocol::{read_frame, Field, STATUS_SUCCESS};
    use bytes::{BufMut, BytesMut};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(port: u16, timeout: Duration) -> SingleConfig {
        SingleConfigBuilder::new()
            .host("127.0.0.1")
            .tcp_port(port)
            .auth_token("test-token")
            .request_timeout(timeout)
            .build()
            .unwrap()
    }

    fn success_body(fields: &[Field]) -> Bytes {
        let encoded = crate::protocol::encode_fields(fields);
        let mut body = BytesMut::new();
        body.put_u8(STATUS_SUCCESS.len() as u8);
        body.put_slice(STATUS_SUCCESS.as_bytes());
        body.put_u16_le(fields.len() as u16);
        body.put_slice(&encoded);
        body.freeze()
    }

    /// Minimal mock node: accepts connections, acks the login, then echoes
    /// a SUCCESS response per frame. `answer` controls whether requests
    /// are answered at all.
    async fn spawn_mock_server(answer: bool) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    // Login frame, then plaintext ack.
                    let Ok((_, _payload)) = read_frame(&mut socket).await else {
                        return;
                    };
                    if socket.write_all(b"LOGIN OK").await.is_err() {
                        return;
                    }
                    loop {
                        let Ok((header, _)) = read_frame(&mut socket).await else {
                            return;
                        };
                        if !answer {
                            continue;
                        }
                        let frame = encode_frame(
                            header.correlation_id,
                            &success_body(&[Field::byte(1, 1)]),
                        );
                        if socket.write_all(&frame).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_round_trip_success() {
        let port = spawn_mock_server(true).await;
        let handler = SingleHandler::new(config(port, Duration::from_secs(1)));
        handler.connect().await.unwrap();

        let id = handler.next_id();
        let result = handler
            .round_trip(id, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert!(result.is_success());
        handler.close();
    }

    #[tokio::test]
    async fn test_round_trip_reconnects_when_unconnected() {
        let port = spawn_mock_server(true).await;
        // No explicit connect: the first round trip self-heals.
        let handler = SingleHandler::new(config(port, Duration::from_secs(1)));
        let result = handler
            .round_trip(handler.next_id(), Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert!(result.is_success());
        handler.close();
    }

    #[tokio::test]
    async fn test_timeout_yields_synthetic_error_and_heals() {
        let port = spawn_mock_server(false).await;
        let handler = SingleHandler::new(config(port, Duration::from_millis(150)));
        handler.connect().await.unwrap();

        let result = handler
            .round_trip(handler.next_id(), Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(result.status, STATUS_ERROR);
        assert!(result.fields.is_empty());
        assert_eq!(handler.demux.len(), 0);
        handler.close();
    }

    #[tokio::test]
    async fn test_round_trip_after_close_fails() {
        let port = spawn_mock_server(true).await;
        let handler = SingleHandler::new(config(port, Duration::from_secs(1)));
        handler.close();
        let err = handler
            .round_trip(1, Bytes::from_static(b"payload"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoomzinError::HandlerClosed));
    }

    #[tokio::test]
    async fn test_next_id_monotonic() {
        let handler = SingleHandler::new(config(1, Duration::from_secs(1)));
        assert_eq!(handler.next_id(), 1);
        assert_eq!(handler.next_id(), 2);
        assert_eq!(handler.next_id(), 3);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 9 + build_login_payload("test-token").len()];
            let _ = socket.read_exact(&mut buf).await;
            let _ = socket.write_all(b"LOGIN FAILED").await;
        });

        let handler = SingleHandler::new(config(port, Duration::from_secs(1)));
        let err = handler.connect().await.unwrap_err();
        assert!(matches!(err, RoomzinError::Login(_)));
    }
}
