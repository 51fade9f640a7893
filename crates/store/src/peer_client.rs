//! Outbound peer transport trait.
//!
//! The store and the health monitor are generic over `PeerClient` so unit
//! tests can inject a recording or failing mock; the real HTTP client is
//! `quorumkv_net::HttpPeerClient`.

use async_trait::async_trait;

/// Header marking a mutation as a replication echo. The receiving peer
/// must apply the mutation locally and must not fan out again.
pub const REPLICATION_HEADER: &str = "X-Replication";

/// A mutation forwarded to a replica peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put { key: String, value: String },
    Delete { key: String },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => key,
        }
    }
}

/// A single peer request failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// Connection failure, request build failure, or deadline expiry.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with a non-success status.
    #[error("status code {0}")]
    Status(u16),
}

/// Outbound requests to a single peer. Implementations own the per-request
/// deadline; callers never wait longer than that deadline per call.
#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
    /// Forward a mutation to `peer`, marked as a replication echo.
    /// Success means the peer answered with a status below 400.
    async fn replicate(&self, peer: &str, mutation: &Mutation) -> Result<(), PeerError>;

    /// Probe `peer`'s liveness endpoint. Success means exactly status 200.
    async fn probe(&self, peer: &str) -> Result<(), PeerError>;
}
