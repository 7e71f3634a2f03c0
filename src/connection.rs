//! A single authenticated connection to a cache node.
//!
//! Each connection owns one socket, split into a dedicated reader task and
//! a dedicated writer task:
//!
//! ```text
//! Router ──► mpsc::Sender<Bytes> ──► Writer task ──► Socket
//!                                                      │
//! DemuxMap ◄── resolve(correlation id) ◄── Reader task ◄┘
//! ```
//!
//! The reader decodes one frame at a time, resolves the matching
//! demultiplexer entry, and keeps a rolling average of round-trip
//! latencies for follower selection. Certain server status codes make the
//! node non-viable and close the connection from the inside; any decode
//! failure does the same. A closed connection is terminal and never
//! reused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::demux::DemuxMap;
use crate::error::{Result, RoomzinError};
use crate::protocol::{
    decode_fields, decode_response_head, encode_frame, read_frame, RawResult, STATUS_ERROR,
};
use crate::protocol::login::{build_login_payload, parse_login_ack};

/// Number of round-trip samples in the rolling latency window.
const LATENCY_WINDOW: usize = 100;

/// Synthetic latency sample (ms) added when a node answers 429, so an
/// overloaded node loses follower selection without being closed.
const OVERLOAD_PENALTY_MS: f64 = 50.0;

/// Server status codes that make the node non-viable on this connection.
const FATAL_STATUS_CODES: [&str; 3] = ["308", "405", "503"];

/// Server status code signalling overload.
const OVERLOAD_STATUS_CODE: &str = "429";

/// Callback invoked exactly once when a connection closes.
pub(crate) type CloseHook = Box<dyn FnOnce() + Send>;

/// Fixed-window rolling average of round-trip latencies in milliseconds.
#[derive(Debug)]
pub(crate) struct RollingAverage {
    samples: Vec<f64>,
    idx: usize,
    count: usize,
    sum: f64,
}

impl RollingAverage {
    pub fn new(size: usize) -> Self {
        Self {
            samples: vec![0.0; size],
            idx: 0,
            count: 0,
            sum: 0.0,
        }
    }

    pub fn add(&mut self, v: f64) {
        if self.count < self.samples.len() {
            self.count += 1;
        } else {
            self.sum -= self.samples[self.idx];
        }
        self.samples[self.idx] = v;
        self.sum += v;
        self.idx = (self.idx + 1) % self.samples.len();
    }

    /// Average of the window, or 0.0 when unsampled.
    pub fn get(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// One socket to one node, alive until the first error or explicit close.
pub(crate) struct Connection {
    addr: String,
    demux: Arc<DemuxMap>,
    writer_tx: mpsc::UnboundedSender<Bytes>,
    latency: Mutex<RollingAverage>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    on_close: Mutex<Option<CloseHook>>,
}

impl Connection {
    /// Dial a node, perform the login handshake, and spawn the connection
    /// tasks.
    ///
    /// Send coalescing is disabled and TCP keep-alive enabled before the
    /// handshake. The connect and handshake phases are both bounded by
    /// `timeout`.
    pub async fn establish(
        host: &str,
        tcp_port: u16,
        auth_token: &str,
        timeout: Duration,
        keep_alive: Duration,
        demux: Arc<DemuxMap>,
        on_close: Option<CloseHook>,
    ) -> Result<Arc<Self>> {
        let target = format!("{}:{tcp_port}", host_only(host));
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| RoomzinError::Timeout)??;

        stream.set_nodelay(true)?;
        let keepalive = TcpKeepalive::new().with_time(keep_alive);
        SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

        // Login: correlation id 0, plaintext ack.
        let login = encode_frame(0, &build_login_payload(auth_token));
        stream.write_all(&login).await?;
        let mut ack = [0u8; 64];
        let n = tokio::time::timeout(timeout, stream.read(&mut ack))
            .await
            .map_err(|_| RoomzinError::Timeout)??;
        parse_login_ack(&ack[..n])?;

        Ok(Self::spawn(stream, target, demux, on_close))
    }

    /// Spawn reader and writer tasks over an already-connected stream.
    pub fn spawn<S>(
        stream: S,
        addr: String,
        demux: Arc<DemuxMap>,
        on_close: Option<CloseHook>,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let conn = Arc::new(Self {
            addr,
            demux,
            writer_tx,
            latency: Mutex::new(RollingAverage::new(LATENCY_WINDOW)),
            closed: AtomicBool::new(false),
            shutdown_tx,
            on_close: Mutex::new(on_close),
        });

        tokio::spawn(Self::run_writer(
            conn.clone(),
            writer,
            writer_rx,
            shutdown_rx.clone(),
        ));
        tokio::spawn(Self::run_reader(conn.clone(), reader, shutdown_rx));

        conn
    }

    /// Queue a frame for writing.
    pub fn write(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(RoomzinError::ConnectionClosed);
        }
        self.writer_tx
            .send(frame)
            .map_err(|_| RoomzinError::ConnectionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Rolling average round-trip latency in ms; 0.0 when unsampled.
    pub fn avg_latency(&self) -> f64 {
        self.lock_latency().get()
    }

    /// Close the connection. Idempotent and terminal.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let hook = self
            .on_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn lock_latency(&self) -> MutexGuard<'_, RollingAverage> {
        self.latency.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn add_latency_sample(&self, ms: f64) {
        self.lock_latency().add(ms);
    }

    async fn run_writer<W>(
        conn: Arc<Self>,
        mut writer: W,
        mut rx: mpsc::UnboundedReceiver<Bytes>,
        mut shutdown: watch::Receiver<bool>,
    ) where
        W: AsyncWrite + Send + Unpin,
    {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = writer.write_all(&frame).await {
                        tracing::error!(addr = %conn.addr, error = %e, "write error");
                        conn.close();
                        break;
                    }
                }
            }
        }
        let _ = writer.shutdown().await;
    }

    async fn run_reader<R>(conn: Arc<Self>, mut reader: R, mut shutdown: watch::Receiver<bool>)
    where
        R: AsyncRead + Send + Unpin,
    {
        tokio::select! {
            _ = shutdown.changed() => {}
            res = Self::read_loop(&conn, &mut reader) => {
                if let Err(e) = res {
                    tracing::error!(addr = %conn.addr, error = %e, "read loop error");
                }
            }
        }
        conn.close();
    }

    /// Read frames until the stream dies or a decode failure occurs.
    ///
    /// Frames are processed strictly in arrival order; every decode failure
    /// is fatal to the connection.
    async fn read_loop<R>(conn: &Connection, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let (header, payload) = read_frame(reader).await?;
            conn.handle_frame(header.correlation_id, &payload)?;
        }
    }

    /// Decode one response payload and resolve the waiting caller.
    fn handle_frame(&self, correlation_id: u32, payload: &Bytes) -> Result<()> {
        let head = decode_response_head(payload)?;
        let region = payload.slice(head.fields_at..);
        let fields = decode_fields(&region, head.field_count)?;

        let Some(pending) = self.demux.load_remove(correlation_id) else {
            // Timeouts can race with late replies; not an error.
            tracing::debug!(correlation_id, "dropping frame for unknown correlation id");
            return Ok(());
        };

        let latency_ms = pending.sent_at.elapsed().as_secs_f64() * 1000.0;
        self.lock_latency().add(latency_ms);

        if head.status == STATUS_ERROR {
            if let Some(code) = fields.first().map(|f| f.as_text()) {
                if FATAL_STATUS_CODES.contains(&code.as_str()) {
                    tracing::warn!(addr = %self.addr, code, "fatal server status, closing connection");
                    self.close();
                } else if code == OVERLOAD_STATUS_CODE {
                    self.lock_latency().add(OVERLOAD_PENALTY_MS);
                }
            }
        }

        let _ = pending.tx.send(Ok(RawResult {
            status: head.status,
            fields,
        }));
        Ok(())
    }
}

/// Strip a `:port` suffix from a host string, if present.
pub(crate) fn host_only(addr: &str) -> &str {
    match addr.split_once(':') {
        Some((host, _)) => host,
        None => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::PendingRequest;
    use crate::protocol::{encode_fields, Field, STATUS_SUCCESS};
    use bytes::{BufMut, BytesMut};
    use tokio::sync::oneshot;

    fn response_frame(correlation_id: u32, status: &str, fields: &[Field]) -> Bytes {
        let encoded = encode_fields(fields);
        let mut payload = BytesMut::new();
        payload.put_u8(status.len() as u8);
        payload.put_slice(status.as_bytes());
        payload.put_u16_le(fields.len() as u16);
        payload.put_slice(&encoded);
        encode_frame(correlation_id, &payload)
    }

    async fn connection_pair() -> (Arc<Connection>, tokio::io::DuplexStream, Arc<DemuxMap>) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let demux = DemuxMap::new(Duration::from_secs(5));
        let conn = Connection::spawn(local, "test:0".to_string(), demux.clone(), None);
        (conn, remote, demux)
    }

    #[tokio::test]
    async fn test_response_resolves_pending_and_samples_latency() {
        let (conn, mut remote, demux) = connection_pair().await;
        let (tx, rx) = oneshot::channel();
        demux.store(1, PendingRequest::new(tx));

        remote
            .write_all(&response_frame(1, STATUS_SUCCESS, &[Field::byte(1, 7)]))
            .await
            .unwrap();

        let result = rx.await.unwrap().unwrap();
        assert!(result.is_success());
        assert_eq!(result.fields[0].data[0], 7);
        assert!(conn.avg_latency() > 0.0);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_unknown_correlation_id_is_dropped() {
        let (conn, mut remote, demux) = connection_pair().await;
        remote
            .write_all(&response_frame(99, STATUS_SUCCESS, &[]))
            .await
            .unwrap();

        // A follow-up known id still resolves, proving the loop survived.
        let (tx, rx) = oneshot::channel();
        demux.store(2, PendingRequest::new(tx));
        remote
            .write_all(&response_frame(2, STATUS_SUCCESS, &[]))
            .await
            .unwrap();
        assert!(rx.await.unwrap().is_ok());
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_fatal_status_code_closes_connection() {
        let (conn, mut remote, demux) = connection_pair().await;
        let (tx, rx) = oneshot::channel();
        demux.store(1, PendingRequest::new(tx));

        remote
            .write_all(&response_frame(1, "ERROR", &[Field::string(1, "503")]))
            .await
            .unwrap();

        // The caller still receives the response.
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.status, "ERROR");
        // And the connection marked itself non-viable.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_overload_status_penalizes_without_closing() {
        let (conn, mut remote, demux) = connection_pair().await;
        let (tx, rx) = oneshot::channel();
        demux.store(1, PendingRequest::new(tx));

        remote
            .write_all(&response_frame(1, "ERROR", &[Field::string(1, "429")]))
            .await
            .unwrap();

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.status, "ERROR");
        assert!(!conn.is_closed());
        // Real sample plus the synthetic penalty, averaged.
        assert!(conn.avg_latency() >= OVERLOAD_PENALTY_MS / 2.0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal() {
        let (conn, mut remote, _demux) = connection_pair().await;
        // Valid header, but the payload claims one field and provides none.
        let mut payload = BytesMut::new();
        payload.put_u8(7);
        payload.put_slice(b"SUCCESS");
        payload.put_u16_le(1);
        remote
            .write_all(&encode_frame(1, &payload))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_bad_magic_is_fatal() {
        let (conn, mut remote, _demux) = connection_pair().await;
        remote.write_all(&[0x00; 9]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close_closes_connection() {
        let (conn, remote, _demux) = connection_pair().await;
        drop(remote);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.is_closed());
        assert!(conn.write(Bytes::from_static(b"x")).is_err());
    }

    #[tokio::test]
    async fn test_close_hook_runs_once() {
        let (local, _remote) = tokio::io::duplex(1024);
        let demux = DemuxMap::new(Duration::from_secs(5));
        let (hook_tx, mut hook_rx) = mpsc::unbounded_channel();
        let conn = Connection::spawn(
            local,
            "test:0".to_string(),
            demux,
            Some(Box::new(move || {
                let _ = hook_tx.send(());
            })),
        );

        conn.close();
        conn.close();
        assert!(hook_rx.recv().await.is_some());
        assert!(hook_rx.try_recv().is_err());
    }

    #[test]
    fn test_rolling_average_window() {
        let mut avg = RollingAverage::new(3);
        assert_eq!(avg.get(), 0.0);
        avg.add(10.0);
        avg.add(20.0);
        assert_eq!(avg.get(), 15.0);
        avg.add(30.0);
        assert_eq!(avg.get(), 20.0);
        // Fourth sample evicts the first.
        avg.add(70.0);
        assert_eq!(avg.get(), 40.0);
    }

    #[test]
    fn test_host_only() {
        assert_eq!(host_only("10.0.0.1:7777"), "10.0.0.1");
        assert_eq!(host_only("cache-1.internal"), "cache-1.internal");
    }
}
