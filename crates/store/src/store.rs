//! The replicated store: local data map plus quorum fan-out.
//!
//! A client mutation is applied locally first (under the exclusive lock,
//! released before any I/O), then forwarded to the replica peers the ring
//! selects for the key. The write succeeds iff the number of peer acks
//! reaches the write quorum. Mutations arriving with the replication
//! marker are applied locally only.

use crate::peer_client::{Mutation, PeerClient, PeerError};
use quorumkv_ring::{RingError, RingManager};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Replication factor and quorums, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationParams {
    /// Number of distinct ring-adjacent peers a mutation is sent to.
    pub replication_factor: usize,
    /// Peer acks required for a client write to succeed.
    pub write_quorum: usize,
    /// Reserved: reads are served from the local map only.
    pub read_quorum: usize,
}

impl ReplicationParams {
    /// Derive quorums for a cluster of `peer_count` configured peers:
    /// `⌊N/2⌋ + 1`, with a single-peer cluster collapsing to local-only
    /// writes (both quorums 1, replication factor 0).
    pub fn for_cluster(peer_count: usize, replication_factor: usize) -> Self {
        let quorum = peer_count / 2 + 1;
        if peer_count == 1 {
            Self {
                replication_factor: 0,
                write_quorum: 1,
                read_quorum: 1,
            }
        } else {
            Self {
                replication_factor,
                write_quorum: quorum,
                read_quorum: quorum,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Empty key (any mutation) or empty value (set), rejected before any
    /// state change.
    #[error("{0}")]
    EmptyInput(&'static str),

    #[error(transparent)]
    Ring(#[from] RingError),

    /// Fan-out completed but fewer than `needed` peers acked. Carries one
    /// cause per failed peer.
    #[error("write quorum not met ({acks}/{needed} acks): {}", join_failures(.failures))]
    QuorumNotMet {
        acks: usize,
        needed: usize,
        failures: Vec<(String, PeerError)>,
    },
}

fn join_failures(failures: &[(String, PeerError)]) -> String {
    failures
        .iter()
        .map(|(peer, cause)| format!("failed to replicate to {}: {}", peer, cause))
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The node-local store with replication fan-out.
///
/// Generic over `C: PeerClient` for testability; production wires the
/// HTTP client from `quorumkv-net`.
pub struct Store<C: PeerClient> {
    data: RwLock<HashMap<String, String>>,
    ring: Arc<RwLock<RingManager>>,
    client: Arc<C>,
    params: ReplicationParams,
}

impl<C: PeerClient> std::fmt::Debug for Store<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<C: PeerClient> Store<C> {
    pub fn new(ring: Arc<RwLock<RingManager>>, client: Arc<C>, params: ReplicationParams) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            ring,
            client,
            params,
        }
    }

    pub fn params(&self) -> &ReplicationParams {
        &self.params
    }

    /// Read a key from the local map.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.data.read().await.get(key).cloned()
    }

    /// Write a key-value pair. The local map is updated before fan-out, so
    /// local readers observe the write even if replication later fails.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        skip_replication: bool,
    ) -> Result<(), StoreError> {
        if key.is_empty() || value.is_empty() {
            return Err(StoreError::EmptyInput("key or value cannot be empty"));
        }

        {
            let mut data = self.data.write().await;
            data.insert(key.to_string(), value.to_string());
        }

        if skip_replication || self.params.replication_factor == 0 {
            return Ok(());
        }
        self.replicate(Mutation::Put {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    /// Delete a key. Removing an absent key succeeds.
    pub async fn delete(&self, key: &str, skip_replication: bool) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyInput("key cannot be empty"));
        }

        {
            let mut data = self.data.write().await;
            data.remove(key);
        }

        if skip_replication || self.params.replication_factor == 0 {
            return Ok(());
        }
        self.replicate(Mutation::Delete {
            key: key.to_string(),
        })
        .await
    }

    /// Fan a mutation out to the distinct replica peers for its key and
    /// count acks against the write quorum.
    async fn replicate(&self, mutation: Mutation) -> Result<(), StoreError> {
        let hash = RingManager::hash_key(mutation.key());
        let targets = {
            let ring = self.ring.read().await;
            ring.replicas(hash, self.params.replication_factor)?
        };

        let mut handles = Vec::with_capacity(targets.len());
        for peer in &targets {
            let client = Arc::clone(&self.client);
            let peer = peer.clone();
            let mutation = mutation.clone();
            handles.push(tokio::spawn(async move {
                client.replicate(&peer, &mutation).await
            }));
        }

        // Every sub-request runs to completion (ack, error, or its own
        // deadline) before the quorum is counted.
        let mut acks = 0;
        let mut failures = Vec::new();
        for (peer, joined) in targets
            .into_iter()
            .zip(futures::future::join_all(handles).await)
        {
            match joined {
                Ok(Ok(())) => acks += 1,
                Ok(Err(cause)) => {
                    tracing::warn!(peer = %peer, error = %cause, "replication sub-request failed");
                    failures.push((peer, cause));
                }
                Err(join_err) => {
                    tracing::warn!(peer = %peer, error = %join_err, "replication task failed");
                    failures.push((peer, PeerError::Transport(join_err.to_string())));
                }
            }
        }

        if acks < self.params.write_quorum {
            return Err(StoreError::QuorumNotMet {
                acks,
                needed: self.params.write_quorum,
                failures,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every forwarded mutation; fails for peers in `down`.
    struct RecordingClient {
        calls: Mutex<Vec<(String, Mutation)>>,
        down: Mutex<HashSet<String>>,
    }

    impl RecordingClient {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                down: Mutex::new(HashSet::new()),
            }
        }

        fn with_down<I: IntoIterator<Item = &'static str>>(peers: I) -> Self {
            let client = Self::new();
            *client.down.lock().unwrap() = peers.into_iter().map(String::from).collect();
            client
        }

        fn calls(&self) -> Vec<(String, Mutation)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PeerClient for RecordingClient {
        async fn replicate(&self, peer: &str, mutation: &Mutation) -> Result<(), PeerError> {
            self.calls
                .lock()
                .unwrap()
                .push((peer.to_string(), mutation.clone()));
            if self.down.lock().unwrap().contains(peer) {
                Err(PeerError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn probe(&self, peer: &str) -> Result<(), PeerError> {
            if self.down.lock().unwrap().contains(peer) {
                Err(PeerError::Status(503))
            } else {
                Ok(())
            }
        }
    }

    const PEERS: [&str; 3] = ["a:1", "b:1", "c:1"];

    fn store_with(
        client: RecordingClient,
        params: ReplicationParams,
    ) -> Store<RecordingClient> {
        let ring = Arc::new(RwLock::new(RingManager::new(PEERS)));
        Store::new(ring, Arc::new(client), params)
    }

    fn default_params() -> ReplicationParams {
        ReplicationParams::for_cluster(PEERS.len(), 2)
    }

    #[test]
    fn test_quorum_derivation() {
        let cases = [
            // (peers, configured rf) -> (rf, write quorum)
            (1, 2, 0, 1),
            (2, 2, 2, 2),
            (3, 2, 2, 2),
            (4, 2, 2, 3),
            (5, 3, 3, 3),
        ];
        for (n, rf, expect_rf, expect_quorum) in cases {
            let params = ReplicationParams::for_cluster(n, rf);
            assert_eq!(params.replication_factor, expect_rf, "n={}", n);
            assert_eq!(params.write_quorum, expect_quorum, "n={}", n);
            assert_eq!(params.read_quorum, expect_quorum, "n={}", n);
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = store_with(RecordingClient::new(), default_params());

        store.set("key", "value", true).await.unwrap();
        assert_eq!(store.get("key").await.as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = store_with(RecordingClient::new(), default_params());

        store.set("key", "one", true).await.unwrap();
        store.set("key", "two", true).await.unwrap();
        assert_eq!(store.get("key").await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let store = store_with(RecordingClient::new(), default_params());

        store.set("key", "value", true).await.unwrap();
        store.delete("key", true).await.unwrap();
        assert_eq!(store.get("key").await, None);
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let store = store_with(RecordingClient::new(), default_params());

        store.delete("ghost", true).await.unwrap();
        store.delete("ghost", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected() {
        let store = store_with(RecordingClient::new(), default_params());

        assert!(matches!(
            store.set("", "value", true).await,
            Err(StoreError::EmptyInput(_))
        ));
        assert!(matches!(
            store.set("key", "", true).await,
            Err(StoreError::EmptyInput(_))
        ));
        assert!(matches!(
            store.delete("", true).await,
            Err(StoreError::EmptyInput(_))
        ));
        assert_eq!(store.get("key").await, None, "no mutation should land");
    }

    #[tokio::test]
    async fn test_skip_replication_sends_nothing() {
        let store = store_with(RecordingClient::new(), default_params());

        store.set("key", "value", true).await.unwrap();
        store.delete("key", true).await.unwrap();
        assert!(store.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_replication_factor_sends_nothing() {
        let store = store_with(
            RecordingClient::new(),
            ReplicationParams::for_cluster(1, 2),
        );

        store.set("key", "value", false).await.unwrap();
        assert!(store.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_reaches_distinct_peers() {
        let store = store_with(RecordingClient::new(), default_params());

        store.set("key", "value", false).await.unwrap();

        let calls = store.client.calls();
        assert_eq!(calls.len(), 2);
        let contacted: HashSet<_> = calls.iter().map(|(peer, _)| peer.as_str()).collect();
        assert_eq!(contacted.len(), 2, "fan-out must not repeat a peer");
        for (peer, mutation) in &calls {
            assert!(PEERS.contains(&peer.as_str()));
            assert_eq!(
                *mutation,
                Mutation::Put {
                    key: "key".to_string(),
                    value: "value".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_delete_fans_out() {
        let store = store_with(RecordingClient::new(), default_params());

        store.set("key", "value", true).await.unwrap();
        store.delete("key", false).await.unwrap();

        let calls = store.client.calls();
        assert_eq!(calls.len(), 2);
        for (_, mutation) in &calls {
            assert_eq!(
                *mutation,
                Mutation::Delete {
                    key: "key".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_quorum_not_met_keeps_local_write() {
        let store = store_with(
            RecordingClient::with_down(PEERS),
            default_params(),
        );

        let err = store.set("key", "value", false).await.unwrap_err();
        match err {
            StoreError::QuorumNotMet {
                acks,
                needed,
                failures,
            } => {
                assert_eq!(acks, 0);
                assert_eq!(needed, 2);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected QuorumNotMet, got {:?}", other),
        }

        // The local write stays visible regardless of the quorum outcome.
        assert_eq!(store.get("key").await.as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_quorum_met_despite_partial_failure() {
        // Write quorum of 1: a single surviving replica is enough.
        let params = ReplicationParams {
            replication_factor: 2,
            write_quorum: 1,
            read_quorum: 1,
        };
        let store = store_with(RecordingClient::with_down(["a:1"]), params);

        for i in 0..20 {
            store
                .set(&format!("key-{}", i), "value", false)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_quorum_error_lists_each_failed_peer() {
        let store = store_with(
            RecordingClient::with_down(PEERS),
            default_params(),
        );

        let err = store.set("key", "value", false).await.unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("write quorum not met (0/2 acks)"));
        assert!(rendered.contains("failed to replicate to"));
        assert!(rendered.contains("; "), "per-peer causes join on semicolons");
    }

    #[tokio::test]
    async fn test_empty_ring_fails_replicated_write() {
        let ring = Arc::new(RwLock::new(RingManager::new(Vec::<String>::new())));
        let store = Store::new(
            ring,
            Arc::new(RecordingClient::new()),
            ReplicationParams {
                replication_factor: 2,
                write_quorum: 1,
                read_quorum: 1,
            },
        );

        let err = store.set("key", "value", false).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ring(quorumkv_ring::RingError::Empty)
        ));
        // Local-first ordering: the value is already in the map.
        assert_eq!(store.get("key").await.as_deref(), Some("value"));
    }
}
