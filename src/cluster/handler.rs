//! Cluster request router.
//!
//! Owns the leader connection and a pool of follower connections, refreshed
//! by the topology resolver. Requests enter a bounded FIFO queue; a single
//! drain task selects a transport per request (leader for writes, the
//! lowest-latency live follower for reads), assigns a correlation id,
//! frames the payload and registers the pending entry.
//!
//! ```text
//! execute() ─► bounded queue ─► drain task ─► leader / best follower
//!                                   │
//!              topology refresh ────┤ (single-writer over the conn map)
//!              close notifications ─┘
//! ```
//!
//! Writes and reads use independent correlation-id sequences and
//! independent demultiplexer maps.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ClusterConfig;
use crate::connection::Connection;
use crate::demux::{DemuxMap, PendingRequest};
use crate::error::{Result, RoomzinError, TRANSIENT_STATUS_CODES};
use crate::protocol::{encode_frame, RawResult};

use super::topology::{resolve_topology, ClusterProbe};

/// Total attempts `execute` makes for a transient server status.
const MAX_EXECUTE_ATTEMPTS: u32 = 5;

/// Linear backoff unit between transient retries.
const RETRY_BACKOFF_UNIT: Duration = Duration::from_millis(100);

/// Initial/maximum backoff while waiting for a viable transport.
const TRANSPORT_BACKOFF_START: Duration = Duration::from_millis(10);
const TRANSPORT_BACKOFF_CAP: Duration = Duration::from_millis(1000);

/// Initial/maximum backoff for the leader keeper.
const LEADER_BACKOFF_START: Duration = Duration::from_millis(100);
const LEADER_BACKOFF_CAP: Duration = Duration::from_millis(2000);

/// Cadence of the all-followers-down fast check.
const FOLLOWER_FAST_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Callback invoked whenever the leader connection is replaced.
pub type TopologyCallback = Arc<dyn Fn() + Send + Sync>;

/// One queued request travelling from `execute` to the drain task.
struct QueuedRequest {
    payload: Bytes,
    is_write: bool,
    tx: oneshot::Sender<Result<RawResult>>,
}

/// Mutable connection state, mutated only by the topology refresh pass and
/// by close notifications. A sorted map keeps follower iteration
/// deterministic.
#[derive(Default)]
struct ClusterState {
    leader: Option<Arc<Connection>>,
    followers: BTreeMap<String, Arc<Connection>>,
}

/// Router for a clustered deployment.
pub struct ClusterHandler {
    cfg: ClusterConfig,
    probe: ClusterProbe,
    leader_demux: Arc<DemuxMap>,
    follower_demux: Arc<DemuxMap>,
    state: Mutex<ClusterState>,
    /// Serializes leader reconnects and follower syncs against each other.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Taken on close so the drain task ends and late sends fail fast.
    req_tx: Mutex<Option<mpsc::Sender<QueuedRequest>>>,
    leader_seq: AtomicU32,
    follower_seq: AtomicU32,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    on_topology_change: Mutex<Option<TopologyCallback>>,
    /// Close hooks of follower connections post their address here; the
    /// removal task prunes them from the map.
    follower_closed_tx: mpsc::UnboundedSender<String>,
}

impl ClusterHandler {
    /// Build the router and start its background tasks.
    ///
    /// Must be called within a tokio runtime. The queue starts draining
    /// immediately; the leader keeper connects in the background, so early
    /// requests wait in transport selection rather than failing.
    pub fn new(cfg: ClusterConfig) -> Result<Arc<Self>> {
        let probe = ClusterProbe::new(cfg.api_port, &cfg.auth_token, cfg.http_timeout)?;
        let demux_age = cfg.request_timeout * 2;
        let (req_tx, req_rx) = mpsc::channel(cfg.max_queue_depth);
        let (shutdown_tx, _) = watch::channel(false);
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        let handler = Arc::new(Self {
            probe,
            leader_demux: DemuxMap::new(demux_age),
            follower_demux: DemuxMap::new(demux_age),
            state: Mutex::new(ClusterState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            req_tx: Mutex::new(Some(req_tx)),
            leader_seq: AtomicU32::new(0),
            follower_seq: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            shutdown_tx,
            on_topology_change: Mutex::new(None),
            follower_closed_tx: closed_tx,
            cfg,
        });

        tokio::spawn(Self::drain(handler.clone(), req_rx));
        tokio::spawn(Self::leader_keeper(handler.clone()));
        tokio::spawn(Self::follower_sync_loop(handler.clone()));
        tokio::spawn(Self::follower_fast_check(handler.clone()));
        tokio::spawn(Self::follower_removal(handler.clone(), closed_rx));

        Ok(handler)
    }

    /// Register the topology-changed callback, invoked whenever the leader
    /// connection is replaced (so callers can invalidate cached registry
    /// state).
    pub fn set_topology_callback(&self, cb: TopologyCallback) {
        *self.lock_callback() = Some(cb);
    }

    /// Execute one command payload against the cluster.
    ///
    /// Writes go to the leader and fail fast when no leader connection
    /// exists. Transient server statuses (`503`, `429`) are re-queued up to
    /// five attempts with linear backoff; every other `ERROR` status is
    /// returned to the caller verbatim.
    pub async fn execute(&self, is_write: bool, payload: Bytes) -> Result<RawResult> {
        if payload.is_empty() {
            return Err(RoomzinError::Validation("empty payload".to_string()));
        }
        if is_write && !self.has_leader() {
            return Err(RoomzinError::Topology("cluster has no leader".to_string()));
        }

        let mut result = self.enqueue(is_write, payload.clone()).await?;
        let mut attempt = 1u32;
        loop {
            if result.is_success() {
                return Ok(result);
            }
            let code = result
                .first_field_text()
                .unwrap_or_else(|| result.status.clone());
            if !TRANSIENT_STATUS_CODES.contains(&code.as_str()) {
                // Application error: surfaced verbatim, never retried.
                return Ok(result);
            }
            attempt += 1;
            if attempt > MAX_EXECUTE_ATTEMPTS {
                return Err(RoomzinError::Server {
                    code,
                    message: "max retries exceeded".to_string(),
                });
            }
            tokio::time::sleep(RETRY_BACKOFF_UNIT * attempt).await;
            result = self.enqueue(is_write, payload.clone()).await?;
        }
    }

    /// True while a leader connection reference exists.
    pub fn has_leader(&self) -> bool {
        self.lock_state().leader.is_some()
    }

    /// Shut the router down: fail all pending requests once and stop every
    /// background task. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        self.lock_req_tx().take();
        self.leader_demux.destroy();
        self.follower_demux.destroy();

        let (leader, followers) = {
            let mut st = self.lock_state();
            (st.leader.take(), std::mem::take(&mut st.followers))
        };
        if let Some(leader) = leader {
            leader.close();
        }
        for (_, conn) in followers {
            conn.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn enqueue(&self, is_write: bool, payload: Bytes) -> Result<RawResult> {
        let Some(sender) = self.lock_req_tx().clone() else {
            return Err(RoomzinError::HandlerClosed);
        };
        let (tx, rx) = oneshot::channel();
        sender
            .send(QueuedRequest {
                payload,
                is_write,
                tx,
            })
            .await
            .map_err(|_| RoomzinError::HandlerClosed)?;
        rx.await.map_err(|_| RoomzinError::HandlerClosed)?
    }

    fn lock_state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_req_tx(&self) -> MutexGuard<'_, Option<mpsc::Sender<QueuedRequest>>> {
        self.req_tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_callback(&self) -> MutexGuard<'_, Option<TopologyCallback>> {
        self.on_topology_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_transport(&self) -> Option<Arc<Connection>> {
        self.lock_state()
            .leader
            .clone()
            .filter(|c| !c.is_closed())
    }

    /// Reads prefer the best follower and degrade to the leader when no
    /// follower is live.
    fn read_transport(&self) -> Option<Arc<Connection>> {
        let (alive, leader) = {
            let st = self.lock_state();
            let alive: Vec<Arc<Connection>> = st
                .followers
                .values()
                .filter(|c| !c.is_closed())
                .cloned()
                .collect();
            (alive, st.leader.clone())
        };
        select_follower(&alive).or_else(|| leader.filter(|c| !c.is_closed()))
    }

    /// One drain pass: pick a transport (with capped backoff up to 3x the
    /// request timeout), frame, register the pending entry, send.
    async fn dispatch(self: &Arc<Self>, req: QueuedRequest) {
        let deadline = Instant::now() + self.cfg.request_timeout * 3;
        let mut backoff = TRANSPORT_BACKOFF_START;

        let conn = loop {
            let candidate = if req.is_write {
                self.write_transport()
            } else {
                self.read_transport()
            };
            if let Some(conn) = candidate {
                break Some(conn);
            }
            if Instant::now() >= deadline || self.is_closed() {
                break None;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(TRANSPORT_BACKOFF_CAP);
            if !req.is_write {
                self.sync_followers().await;
            }
        };

        let Some(conn) = conn else {
            let _ = req
                .tx
                .send(Err(RoomzinError::Topology("no healthy node".to_string())));
            return;
        };

        let (seq, demux) = if req.is_write {
            (&self.leader_seq, &self.leader_demux)
        } else {
            (&self.follower_seq, &self.follower_demux)
        };
        let correlation_id = seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        demux.store(correlation_id, PendingRequest::new(req.tx));
        let frame = encode_frame(correlation_id, &req.payload);
        if let Err(e) = conn.write(frame) {
            if let Some(pending) = demux.load_remove(correlation_id) {
                let _ = pending.tx.send(Err(e));
            }
            return;
        }

        // Per-request expiry; whoever removes the entry resolves it, so a
        // racing response cannot double-fire.
        let demux = demux.clone();
        let timeout = self.cfg.request_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(pending) = demux.load_remove(correlation_id) {
                let _ = pending.tx.send(Err(RoomzinError::Timeout));
            }
        });
    }

    /// Runs until every queue sender is gone; `close` drops the stored
    /// sender, so queued stragglers are failed rather than stranded.
    async fn drain(self: Arc<Self>, mut rx: mpsc::Receiver<QueuedRequest>) {
        while let Some(req) = rx.recv().await {
            if self.is_closed() {
                let _ = req.tx.send(Err(RoomzinError::HandlerClosed));
                continue;
            }
            self.dispatch(req).await;
        }
    }

    /// Keeps a live leader connection, reconnecting with capped backoff.
    async fn leader_keeper(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut backoff = LEADER_BACKOFF_START;
        loop {
            let needs_leader = {
                let st = self.lock_state();
                st.leader.as_ref().map_or(true, |c| c.is_closed())
            };
            if needs_leader {
                if let Err(e) = self.reconnect_leader().await {
                    tracing::warn!(error = %e, "leader reconnect failed");
                }
            }

            let pause = backoff + Duration::from_millis(time_jitter_ms(50));
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            backoff = (backoff * 2).min(LEADER_BACKOFF_CAP);
        }
    }

    async fn reconnect_leader(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        if self.is_closed() {
            return Ok(());
        }
        let topo = resolve_topology(&self.probe, &self.cfg.seed_hosts).await?;
        let conn = Connection::establish(
            &topo.leader,
            self.cfg.tcp_port,
            &self.cfg.auth_token,
            self.cfg.request_timeout,
            self.cfg.keep_alive,
            self.leader_demux.clone(),
            None,
        )
        .await?;

        tracing::debug!(leader = %topo.leader, "leader connection established");
        let old = {
            let mut st = self.lock_state();
            std::mem::replace(&mut st.leader, Some(conn))
        };
        if let Some(old) = old {
            old.close();
        }

        let cb = self.lock_callback().clone();
        if let Some(cb) = cb {
            cb();
        }
        Ok(())
    }

    /// Reconcile the follower map against the resolved topology.
    async fn sync_followers(&self) {
        let _guard = self.refresh_lock.lock().await;
        if self.is_closed() {
            return;
        }
        let topo = match resolve_topology(&self.probe, &self.cfg.seed_hosts).await {
            Ok(topo) => topo,
            Err(e) => {
                tracing::debug!(error = %e, "follower sync skipped");
                return;
            }
        };

        let wanted: Vec<String> = topo.followers;
        let stale: Vec<Arc<Connection>> = {
            let mut st = self.lock_state();
            let keep: std::collections::HashSet<&String> = wanted.iter().collect();
            let stale_addrs: Vec<String> = st
                .followers
                .keys()
                .filter(|addr| !keep.contains(addr))
                .cloned()
                .collect();
            stale_addrs
                .into_iter()
                .filter_map(|addr| st.followers.remove(&addr))
                .collect()
        };
        for conn in stale {
            conn.close();
        }

        for addr in wanted {
            if self.lock_state().followers.contains_key(&addr) {
                continue;
            }
            let notify = self.follower_closed_tx.clone();
            let notify_addr = addr.clone();
            let established = Connection::establish(
                &addr,
                self.cfg.tcp_port,
                &self.cfg.auth_token,
                self.cfg.request_timeout,
                self.cfg.keep_alive,
                self.follower_demux.clone(),
                Some(Box::new(move || {
                    let _ = notify.send(notify_addr);
                })),
            )
            .await;
            match established {
                Ok(conn) => {
                    self.lock_state().followers.insert(addr, conn);
                }
                Err(e) => tracing::debug!(follower = %addr, error = %e, "follower connect failed"),
            }
        }
    }

    async fn follower_sync_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.cfg.probe_interval) => {
                    self.sync_followers().await;
                }
            }
        }
    }

    /// Re-probe immediately when every follower is observed closed.
    async fn follower_fast_check(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(FOLLOWER_FAST_CHECK_INTERVAL) => {
                    let all_down = {
                        let st = self.lock_state();
                        !st.followers.is_empty()
                            && st.followers.values().all(|c| c.is_closed())
                    };
                    if all_down {
                        self.sync_followers().await;
                    }
                }
            }
        }
    }

    /// Removes closed followers from the map as their close hooks fire.
    async fn follower_removal(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<String>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                addr = rx.recv() => {
                    let Some(addr) = addr else { break };
                    let removed = self.lock_state().followers.remove(&addr);
                    if removed.is_some() {
                        tracing::debug!(follower = %addr, "removed closed follower");
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_leader(&self, conn: Arc<Connection>) {
        self.lock_state().leader = Some(conn);
    }

    #[cfg(test)]
    pub(crate) fn inject_follower(&self, addr: &str, conn: Arc<Connection>) {
        self.lock_state().followers.insert(addr.to_string(), conn);
    }

    #[cfg(test)]
    pub(crate) fn leader_demux(&self) -> Arc<DemuxMap> {
        self.leader_demux.clone()
    }

    #[cfg(test)]
    pub(crate) fn follower_demux(&self) -> Arc<DemuxMap> {
        self.follower_demux.clone()
    }
}

impl Drop for ClusterHandler {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pick the lowest-latency live follower.
///
/// Unsampled connections (average 0.0) lose to any sampled one; when
/// nothing is sampled the first live connection wins, which is
/// deterministic for a fixed input order.
fn select_follower(conns: &[Arc<Connection>]) -> Option<Arc<Connection>> {
    let best_sampled = conns
        .iter()
        .filter(|c| c.avg_latency() > 0.0)
        .min_by(|a, b| {
            a.avg_latency()
                .partial_cmp(&b.avg_latency())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    best_sampled.or_else(|| conns.first()).cloned()
}

/// Cheap jitter from the system clock, for desynchronizing reconnects.
fn time_jitter_ms(bound: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos.wrapping_mul(0x517cc1b727220a95) % bound
}
