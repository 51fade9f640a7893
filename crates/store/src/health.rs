//! Peer health monitoring.
//!
//! A periodic sweep probes every configured peer's liveness endpoint and
//! toggles ring membership on the result. The configured list itself never
//! shrinks: a peer can leave and rejoin the ring any number of times.

use crate::peer_client::PeerClient;
use quorumkv_ring::RingManager;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Periodically probes configured peers and edits the ring's active set.
pub struct HealthMonitor<C: PeerClient> {
    peers: Vec<String>,
    ring: Arc<RwLock<RingManager>>,
    client: Arc<C>,
    interval: Duration,
}

impl<C: PeerClient> HealthMonitor<C> {
    pub fn new(
        peers: Vec<String>,
        ring: Arc<RwLock<RingManager>>,
        client: Arc<C>,
        interval: Duration,
    ) -> Self {
        Self {
            peers,
            ring,
            client,
            interval,
        }
    }

    /// Launch the sweep loop on the runtime. The first sweep happens one
    /// full interval after startup.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // An interval's first tick completes immediately; consume it so
        // probing starts one full period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// Probe every configured peer concurrently and apply the outcomes.
    /// Probe failures are logged, never propagated.
    pub async fn sweep(&self) {
        futures::future::join_all(self.peers.iter().map(|peer| self.check_peer(peer))).await;
    }

    async fn check_peer(&self, peer: &str) {
        if peer.is_empty() {
            tracing::debug!("no peer specified, skipping health check");
            return;
        }

        match self.client.probe(peer).await {
            Ok(()) => {
                let mut ring = self.ring.write().await;
                if !ring.has_peer(peer) {
                    ring.add_peer(peer);
                    tracing::info!(peer, "peer recovered, added back to the ring");
                } else {
                    tracing::debug!(peer, "peer is up");
                }
            }
            Err(cause) => {
                self.ring.write().await.remove_peer(peer);
                tracing::warn!(peer, error = %cause, "peer is down, removed from the ring");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
