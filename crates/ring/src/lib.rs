//! quorumkv-ring: consistent-hash ring with virtual nodes.
//!
//! Every active peer occupies [`VIRTUAL_NODES`] positions on a ring of
//! 32-bit FNV-1a hashes. A key hashes to a position; the first ring slot
//! at or past that position names the primary replica, and walking the
//! ring clockwise yields the rest of the replica set.

use std::collections::{HashMap, HashSet};

/// Number of virtual nodes each peer occupies on the ring.
pub const VIRTUAL_NODES: usize = 100;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over raw bytes.
///
/// This is the ring hash: peers must agree on it byte-for-byte, so it is
/// pinned here rather than delegated to a hasher with an unstable output.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, b| {
            (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
        })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    #[error("ring is empty")]
    Empty,

    #[error("ring index {0} out of range")]
    IndexOutOfRange(usize),
}

// ---------------------------------------------------------------------------
// VirtualNode
// ---------------------------------------------------------------------------

/// One of a peer's [`VIRTUAL_NODES`] synthetic positions on the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    /// Peer address (`host:port`), also its stable ring identity.
    pub peer: String,
    /// Index of this virtual node within the peer, in `[0, VIRTUAL_NODES)`.
    pub index: usize,
}

impl VirtualNode {
    /// The string hashed onto the ring for this virtual node.
    fn identity(peer: &str, index: usize) -> String {
        format!("{}#{}", peer, index)
    }

    fn position(peer: &str, index: usize) -> u32 {
        fnv1a_32(Self::identity(peer, index).as_bytes())
    }
}

// ---------------------------------------------------------------------------
// RingManager
// ---------------------------------------------------------------------------

/// The consistent-hash ring: sorted positions, their owners, and the set of
/// active peers.
///
/// Queries take `&self`, mutations take `&mut self`; owners share the
/// manager behind an `Arc<RwLock<RingManager>>` so a reader always observes
/// positions and owners in agreement.
#[derive(Debug, Default)]
pub struct RingManager {
    /// Ascending ring positions. Duplicate values are tolerated (one entry
    /// per inserted virtual node, even under a hash collision).
    ring: Vec<u32>,
    /// Position → owning virtual node. On a cross-peer collision the first
    /// inserted owner wins.
    owners: HashMap<u32, VirtualNode>,
    active: HashSet<String>,
}

impl RingManager {
    /// Build a ring from the initial peer list.
    pub fn new<I, S>(peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut manager = Self::default();
        for peer in peers {
            manager.add_peer(peer.as_ref());
        }
        manager
    }

    /// Hash a key to its ring position.
    pub fn hash_key(key: &str) -> u32 {
        fnv1a_32(key.as_bytes())
    }

    /// Ring index of the first position at or past `hash`, wrapping to 0
    /// when `hash` exceeds every position.
    pub fn primary_slot(&self, hash: u32) -> Result<usize, RingError> {
        if self.ring.is_empty() {
            return Err(RingError::Empty);
        }
        let idx = self.ring.partition_point(|&position| position < hash);
        Ok(if idx == self.ring.len() { 0 } else { idx })
    }

    /// The virtual node occupying ring slot `index`.
    pub fn peer_at(&self, index: usize) -> Result<&VirtualNode, RingError> {
        let position = self
            .ring
            .get(index)
            .ok_or(RingError::IndexOutOfRange(index))?;
        self.owners
            .get(position)
            .ok_or(RingError::IndexOutOfRange(index))
    }

    /// Walk the ring clockwise from the slot owning `hash`, collecting up
    /// to `count` distinct peers.
    ///
    /// Consecutive slots frequently belong to the same peer (it has
    /// [`VIRTUAL_NODES`] of them), so repeats are skipped. The walk visits
    /// each slot at most once; when fewer than `count` distinct peers
    /// exist, all of them are returned.
    pub fn replicas(&self, hash: u32, count: usize) -> Result<Vec<String>, RingError> {
        let start = self.primary_slot(hash)?;

        let mut selected = Vec::with_capacity(count);
        let mut seen: HashSet<&str> = HashSet::with_capacity(count);
        for offset in 0..self.ring.len() {
            if selected.len() == count {
                break;
            }
            let position = self.ring[(start + offset) % self.ring.len()];
            let Some(vnode) = self.owners.get(&position) else {
                // Orphaned slot from a cross-peer hash collision.
                continue;
            };
            if seen.insert(vnode.peer.as_str()) {
                selected.push(vnode.peer.clone());
            }
        }
        Ok(selected)
    }

    /// Insert a peer and its virtual nodes, keeping the ring sorted.
    /// A no-op when the peer is already active.
    pub fn add_peer(&mut self, peer: &str) {
        if !self.active.insert(peer.to_string()) {
            return;
        }

        for index in 0..VIRTUAL_NODES {
            let position = VirtualNode::position(peer, index);
            let at = self.ring.partition_point(|&p| p < position);
            self.ring.insert(at, position);
            self.owners.entry(position).or_insert(VirtualNode {
                peer: peer.to_string(),
                index,
            });
        }
    }

    /// Remove a peer and all of its virtual nodes.
    /// A no-op when the peer is not active.
    pub fn remove_peer(&mut self, peer: &str) {
        if !self.active.remove(peer) {
            return;
        }

        for index in 0..VIRTUAL_NODES {
            let position = VirtualNode::position(peer, index);
            if let Ok(at) = self.ring.binary_search(&position) {
                self.ring.remove(at);
            }
            if self.owners.get(&position).is_some_and(|v| v.peer == peer) {
                self.owners.remove(&position);
            }
        }
    }

    /// Whether `peer` is in the active set.
    pub fn has_peer(&self, peer: &str) -> bool {
        self.active.contains(peer)
    }

    /// Number of positions on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
