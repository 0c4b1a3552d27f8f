//! Foreign chain provider with multi-RPC support and automatic failover

use super::{Chain, ForeignClient, SignedTransaction};
use crate::config::EthereumConfig;
use crate::error::{E2eError, E2eResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct EthereumProvider {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EthereumProvider {
    /// Create a new provider over every configured RPC URL
    pub fn new(config: &EthereumConfig) -> E2eResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(100)));
                    debug!("Added foreign HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(E2eError::rpc(Chain::Foreign, "No valid RPC providers"));
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Foreign chain failover to provider {}", next);
    }

    /// Run a read against each provider in turn until one answers
    async fn with_failover<T, F, Fut>(&self, operation: &str, f: F) -> E2eResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match f(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("Failed to {} on foreign chain: {}", operation, e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        Err(E2eError::rpc(
            Chain::Foreign,
            format!(
                "All providers failed to {}: {}",
                operation,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        ))
    }
}

#[async_trait]
impl ForeignClient for EthereumProvider {
    async fn pending_nonce(&self, address: Address) -> E2eResult<u64> {
        let nonce = self
            .with_failover("get pending nonce", |p| async move {
                p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
                    .await
            })
            .await?;
        Ok(nonce.as_u64())
    }

    async fn suggested_gas_price(&self) -> E2eResult<U256> {
        self.with_failover("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn network_id(&self) -> E2eResult<u64> {
        let id = self
            .with_failover("get chain id", |p| async move { p.get_chainid().await })
            .await?;
        Ok(id.as_u64())
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> E2eResult<H256> {
        debug!(
            "Broadcasting {:?} from {:?} to {:?} (nonce {}, {} data bytes)",
            tx.hash,
            tx.from,
            tx.to,
            tx.nonce,
            tx.data.len()
        );
        // broadcasts are not replayed on another endpoint; a second node may already have it
        let pending = self
            .http()
            .send_raw_transaction(tx.raw.clone())
            .await
            .map_err(|e| E2eError::submission(Chain::Foreign, e))?;
        Ok(pending.tx_hash())
    }

    async fn call(&self, to: Address, data: Bytes) -> E2eResult<Bytes> {
        let request: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.with_failover("call contract", |p| {
            let request = request.clone();
            async move { p.call(&request, None).await }
        })
        .await
    }
}
