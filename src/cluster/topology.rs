//! Cluster topology discovery and leader election.
//!
//! Every node exposes three HTTP endpoints:
//!
//! - `GET /healthz`: plaintext health, one of `active_leader`,
//!   `active_follower` or `unavailable`
//! - `GET /node-info`: JSON `{node_id, zone_id, shard_id, leader_id,
//!   leader_url}`
//! - `GET /peers`: JSON array of peer host strings
//!
//! Resolution probes every seed concurrently, probes newly discovered
//! peers in a second concurrent wave, then elects the leader by majority
//! vote among the reported leader URLs (ties broken by first seen). Nodes
//! reporting `unavailable` do not vote, but peer discovery still uses
//! them.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, RoomzinError};

/// Health state a node reports for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHealth {
    ActiveLeader,
    ActiveFollower,
    Unavailable,
}

impl NodeHealth {
    fn parse(s: &str) -> Self {
        match s.trim() {
            "active_leader" => NodeHealth::ActiveLeader,
            "active_follower" => NodeHealth::ActiveFollower,
            _ => NodeHealth::Unavailable,
        }
    }
}

/// Body of `GET /node-info`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub shard_id: String,
    #[serde(default)]
    pub leader_id: String,
    #[serde(default)]
    pub leader_url: String,
}

/// One successfully probed node.
#[derive(Debug, Clone)]
pub struct ProbedNode {
    pub host: String,
    pub health: NodeHealth,
    pub leader_url: String,
}

/// Resolved view of the cluster: one leader, zero or more followers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub leader: String,
    pub followers: Vec<String>,
}

/// HTTP prober for the discovery endpoints.
///
/// The probe timeout is enforced by the underlying HTTP client, so every
/// request is cancelable.
#[derive(Clone)]
pub(crate) struct ClusterProbe {
    http: reqwest::Client,
    api_port: u16,
    auth_token: String,
}

impl ClusterProbe {
    pub fn new(api_port: u16, auth_token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_port,
            auth_token: auth_token.to_string(),
        })
    }

    fn get(&self, host: &str, path: &str) -> reqwest::RequestBuilder {
        let url = format!("http://{host}:{}{path}", self.api_port);
        let req = self.http.get(url);
        if self.auth_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.auth_token)
        }
    }

    async fn health(&self, host: &str) -> Result<NodeHealth> {
        let resp = self.get(host, "/healthz").send().await?;
        if !resp.status().is_success() {
            return Err(RoomzinError::Topology(format!(
                "healthz {} from {host}",
                resp.status()
            )));
        }
        Ok(NodeHealth::parse(&resp.text().await?))
    }

    async fn node_info(&self, host: &str) -> Result<NodeInfo> {
        let resp = self.get(host, "/node-info").send().await?;
        if !resp.status().is_success() {
            return Err(RoomzinError::Topology(format!(
                "node-info {} from {host}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Peer list; probe failures read as no peers.
    async fn peers(&self, host: &str) -> Vec<String> {
        let resp = match self.get(host, "/peers").send().await {
            Ok(r) if r.status().is_success() => r,
            _ => return Vec::new(),
        };
        resp.json().await.unwrap_or_default()
    }

    /// Probe one host: health and node info for voting, plus its peer list.
    ///
    /// Dead or unavailable nodes yield no vote but may still reveal peers.
    async fn probe_host(&self, host: &str, discover_peers: bool) -> (Option<ProbedNode>, Vec<String>) {
        let node = match self.health(host).await {
            Ok(NodeHealth::Unavailable) => None,
            Ok(health) => match self.node_info(host).await {
                Ok(info) => Some(ProbedNode {
                    host: host.to_string(),
                    health,
                    leader_url: info.leader_url,
                }),
                Err(e) => {
                    tracing::debug!(host, error = %e, "node-info probe failed");
                    None
                }
            },
            Err(e) => {
                tracing::debug!(host, error = %e, "health probe failed");
                None
            }
        };

        let peers = if discover_peers {
            self.peers(host).await
        } else {
            Vec::new()
        };

        (node, peers)
    }
}

/// Probe the seed hosts (and any peers they reveal) and elect the leader.
pub(crate) async fn resolve_topology(
    probe: &ClusterProbe,
    seeds: &[String],
) -> Result<ClusterTopology> {
    // Phase one: all seeds concurrently, results kept in seed order so the
    // first-seen tie-break is deterministic.
    let handles: Vec<_> = seeds
        .iter()
        .map(|host| {
            let probe = probe.clone();
            let host = host.clone();
            tokio::spawn(async move { probe.probe_host(&host, true).await })
        })
        .collect();

    let mut nodes = Vec::new();
    let mut discovered = Vec::new();
    let known: HashSet<&String> = seeds.iter().collect();
    let mut seen = HashSet::new();

    for handle in handles {
        let Ok((node, peers)) = handle.await else {
            continue;
        };
        if let Some(node) = node {
            nodes.push(node);
        }
        for peer in peers {
            if !known.contains(&peer) && seen.insert(peer.clone()) {
                discovered.push(peer);
            }
        }
    }

    // Phase two: newly discovered peers, no further expansion.
    let handles: Vec<_> = discovered
        .into_iter()
        .map(|host| {
            let probe = probe.clone();
            tokio::spawn(async move { probe.probe_host(&host, false).await })
        })
        .collect();
    for handle in handles {
        if let Ok((Some(node), _)) = handle.await {
            nodes.push(node);
        }
    }

    elect(&nodes)
}

/// Elect the leader by majority vote among reported leader URLs.
///
/// Each node casts one vote for its `leader_url`; the URL with the most
/// votes wins, ties broken by first seen. The concrete leader is the
/// agreeing node whose own health is `active_leader`; agreeing
/// `active_follower` nodes form the follower set. Without an agreeing
/// active leader, resolution fails rather than returning a partial
/// topology.
pub(crate) fn elect(nodes: &[ProbedNode]) -> Result<ClusterTopology> {
    let mut winner: Option<&str> = None;
    let mut max_votes = 0usize;
    for node in nodes {
        if node.leader_url.is_empty() {
            continue;
        }
        let votes = nodes
            .iter()
            .filter(|n| n.leader_url == node.leader_url)
            .count();
        if votes > max_votes {
            max_votes = votes;
            winner = Some(&node.leader_url);
        }
    }

    let Some(winner) = winner else {
        return Err(RoomzinError::Topology("no leader available".to_string()));
    };

    let mut leader = None;
    let mut followers = Vec::new();
    for node in nodes {
        if node.leader_url != winner {
            continue;
        }
        match node.health {
            NodeHealth::ActiveLeader if leader.is_none() => leader = Some(node.host.clone()),
            NodeHealth::ActiveFollower => followers.push(node.host.clone()),
            _ => {}
        }
    }

    match leader {
        Some(leader) => Ok(ClusterTopology { leader, followers }),
        None => Err(RoomzinError::Topology("no leader available".to_string())),
    }
}
