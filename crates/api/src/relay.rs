//! Private transaction relay client.
//!
//! Thin HTTP client for submitting a signed transaction to a private relay
//! (MEV-protect style) instead of the public mempool. Signing happens
//! upstream; this client only carries the already-signed payload and the
//! relay's bespoke auth header.

use alloy::primitives::{Bytes, TxHash};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay returned an error: {0}")]
    RelayRejected(String),
    #[error("relay response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize)]
struct SendPrivateTransactionRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    id: u64,
    params: [PrivateTxParams<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PrivateTxParams<'a> {
    tx: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

/// Outcome of a private relay submission attempt.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub success: bool,
    pub tx_hash: Option<TxHash>,
    pub latency_ms: u64,
}

/// Client for a single private relay endpoint.
pub struct RelayClient {
    http: reqwest::Client,
    rpc_url: String,
    signer_address: String,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("rpc_url", &self.rpc_url)
            .field("signer_address", &self.signer_address)
            .finish()
    }
}

impl RelayClient {
    pub fn new(rpc_url: impl Into<String>, signer_address: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            signer_address: signer_address.into(),
        }
    }

    /// Submit a raw signed transaction via `eth_sendPrivateTransaction`.
    ///
    /// `signature` is the relay's auth signature over the request body,
    /// sent as `<signerAddress>:<signature>` in the `x-flashbots-signature`
    /// header (the de facto convention this style of relay expects).
    #[instrument(skip(self, raw_tx, signature), fields(rpc_url = %self.rpc_url))]
    pub async fn submit_private(
        &self,
        raw_tx: &Bytes,
        signature: &str,
    ) -> Result<RelayOutcome, RelayError> {
        let start = Instant::now();
        let hex_tx = format!("0x{}", hex::encode(raw_tx));

        let body = SendPrivateTransactionRequest {
            jsonrpc: "2.0",
            method: "eth_sendPrivateTransaction",
            id: 1,
            params: [PrivateTxParams { tx: &hex_tx }],
        };

        let header_value = format!("{}:{}", self.signer_address, signature);

        let response = self
            .http
            .post(&self.rpc_url)
            .header("x-flashbots-signature", header_value)
            .json(&body)
            .send()
            .await?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| RelayError::Decode(e.to_string()))?;

        let latency_ms = start.elapsed().as_millis() as u64;

        if let Some(err) = envelope.error {
            warn!(error = %err.message, latency_ms, "private relay rejected submission");
            return Err(RelayError::RelayRejected(err.message));
        }

        let tx_hash = envelope
            .result
            .map(|s| s.parse::<TxHash>())
            .transpose()
            .map_err(|e| RelayError::Decode(e.to_string()))?;

        Ok(RelayOutcome {
            success: true,
            tx_hash,
            latency_ms,
        })
    }
}

/// Retry classification for a failed relay submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFailureKind {
    RpcError,
    Timeout,
    Disabled,
    Unknown,
}

impl RelayFailureKind {
    pub fn classify(err: &RelayError, elapsed: Duration, timeout: Duration) -> Self {
        match err {
            RelayError::Http(e) if e.is_timeout() || elapsed >= timeout => Self::Timeout,
            RelayError::Http(_) | RelayError::RelayRejected(_) => Self::RpcError,
            RelayError::Decode(_) => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_by_elapsed() {
        let err = RelayError::RelayRejected("nope".into());
        let kind = RelayFailureKind::classify(&err, Duration::from_millis(10), Duration::from_millis(5));
        assert_eq!(kind, RelayFailureKind::RpcError);
    }

    #[test]
    fn debug_redacts_nothing_sensitive() {
        let client = RelayClient::new("https://relay.example/rpc", "0xabc");
        let debug = format!("{:?}", client);
        assert!(debug.contains("relay.example"));
    }
}
