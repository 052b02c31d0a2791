//! HTTP/archive/send/WS endpoint bookkeeping and connection health checks.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::Result;
use tracing::{debug, info};

/// Holds the distinct RPC endpoints the engine talks to and verifies
/// connectivity at construction. Per-component readers (MicroVerifier,
/// GasLadder, EventListener) take the specific URL they need directly;
/// this type is for startup verification and ambient endpoint storage.
#[derive(Clone)]
pub struct ProviderManager {
    http_url: String,
    archive_url: String,
    send_url: String,
    ws_url: String,
    pool_address: Address,
}

impl ProviderManager {
    /// Create a new provider manager, verifying the primary HTTP endpoint
    /// is reachable.
    pub async fn new(
        http_url: &str,
        archive_url: &str,
        send_url: &str,
        ws_url: &str,
        pool_address: Address,
    ) -> Result<Self> {
        info!(
            http = http_url,
            archive = archive_url,
            send = send_url,
            ws = ws_url,
            "Initializing provider manager"
        );

        let provider = ProviderBuilder::new().on_http(http_url.parse()?);
        let block = provider.get_block_number().await?;
        info!(block = block, "Provider connection verified");

        Ok(Self {
            http_url: http_url.to_string(),
            archive_url: archive_url.to_string(),
            send_url: send_url.to_string(),
            ws_url: ws_url.to_string(),
            pool_address,
        })
    }

    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    pub fn archive_url(&self) -> &str {
        &self.archive_url
    }

    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn pool_address(&self) -> Address {
        self.pool_address
    }

    pub async fn block_number(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        Ok(provider.get_block_number().await?)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        Ok(provider.get_chain_id().await?)
    }

    pub async fn health_check(&self) -> Result<bool> {
        let block = self.block_number().await?;
        debug!(block = block, "Provider health check passed");
        Ok(block > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_provider_creation() {
        let provider = ProviderManager::new(
            "https://eth.llamarpc.com",
            "https://eth.llamarpc.com",
            "https://eth.llamarpc.com",
            "wss://eth.llamarpc.com",
            "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"
                .parse()
                .unwrap(),
        )
        .await;

        assert!(provider.is_ok());
    }
}
