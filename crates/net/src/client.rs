//! Outbound HTTP client implementing `PeerClient`.
//!
//! One pooled `reqwest::Client` is shared for all peer traffic; every
//! request carries the per-request deadline configured at construction.

use async_trait::async_trait;
use quorumkv_store::{Mutation, PeerClient, PeerError, REPLICATION_HEADER};
use tokio::time::Duration;

/// HTTP transport to cluster peers.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    /// Build a client whose requests each carry `request_timeout` as a
    /// hard deadline.
    pub fn new(request_timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn replicate(&self, peer: &str, mutation: &Mutation) -> Result<(), PeerError> {
        let request = match mutation {
            Mutation::Put { key, value } => self
                .client
                .put(format!("http://{}/{}", peer, key))
                .body(value.clone()),
            Mutation::Delete { key } => self.client.delete(format!("http://{}/{}", peer, key)),
        };

        let response = request
            .header(REPLICATION_HEADER, "true")
            .send()
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(PeerError::Status(status));
        }
        Ok(())
    }

    async fn probe(&self, peer: &str) -> Result<(), PeerError> {
        let response = self
            .client
            .get(format!("http://{}/health", peer))
            .send()
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200 => Ok(()),
            status => Err(PeerError::Status(status)),
        }
    }
}
