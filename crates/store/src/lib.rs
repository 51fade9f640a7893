//! quorumkv-store: the replicated key-value store.
//!
//! [`store::Store`] owns the local data map and fans client mutations out
//! to the ring-selected replica peers, counting acks against a write
//! quorum. [`health::HealthMonitor`] keeps the ring's active set aligned
//! with peer reachability. Both talk to the network through the
//! [`peer_client::PeerClient`] trait; the HTTP implementation lives in
//! `quorumkv-net`, tests inject mocks.

pub mod health;
pub mod peer_client;
pub mod store;

pub use health::HealthMonitor;
pub use peer_client::{Mutation, PeerClient, PeerError, REPLICATION_HEADER};
pub use store::{ReplicationParams, Store, StoreError};
