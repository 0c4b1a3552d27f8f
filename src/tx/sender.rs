//! Foreign transaction signing and broadcast

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use crate::chain::{Chain, ForeignClient, SignedTransaction};
use crate::error::{E2eError, E2eResult};

use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::keccak256;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Signs legacy transactions locally and broadcasts them, never retrying
pub struct ForeignTxSender {
    client: Arc<dyn ForeignClient>,
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    chain_id: OnceCell<u64>,
}

impl ForeignTxSender {
    pub fn new(client: Arc<dyn ForeignClient>) -> Self {
        Self {
            client,
            nonce_manager: NonceManager::new(),
            gas_estimator: GasEstimator::new(),
            chain_id: OnceCell::new(),
        }
    }

    /// Load a wallet from a hex private key, with or without `0x`
    pub fn load_wallet(private_key: &str) -> E2eResult<LocalWallet> {
        private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| E2eError::Wallet(format!("Invalid private key: {}", e)))
    }

    async fn chain_id(&self) -> E2eResult<u64> {
        self.chain_id
            .get_or_try_init(|| self.client.network_id())
            .await
            .copied()
    }

    /// Build, sign and broadcast a zero-value transaction carrying `data`
    pub async fn send(
        &self,
        private_key: &str,
        to: Address,
        data: Vec<u8>,
        kind: &str,
    ) -> E2eResult<SignedTransaction> {
        let wallet = Self::load_wallet(private_key)?;
        let from = wallet.address();
        let chain_id = self.chain_id().await?;

        let gas_limit = self.gas_estimator.gas_limit(&data);
        let gas_price = self.gas_estimator.gas_price(self.client.as_ref()).await?;
        let nonce = self.nonce_manager.next(from, self.client.as_ref()).await?;

        let request = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(U256::zero())
            .data(data.clone())
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(gas_price)
            .chain_id(chain_id);
        let tx = TypedTransaction::Legacy(request);

        let signature = match wallet.with_chain_id(chain_id).sign_transaction(&tx).await {
            Ok(signature) => signature,
            Err(e) => {
                self.nonce_manager.release(from, nonce).await;
                return Err(E2eError::Wallet(e.to_string()));
            }
        };
        let raw = tx.rlp_signed(&signature);

        let signed = SignedTransaction {
            hash: H256::from(keccak256(&raw)),
            from,
            to,
            nonce,
            data: data.into(),
            raw,
        };

        match self.client.send_raw_transaction(&signed).await {
            Ok(tx_hash) => {
                self.nonce_manager.mark_pending(from, nonce, tx_hash).await;
                crate::metrics::record_tx_submitted(Chain::Foreign.as_str(), kind);
                let in_flight = self.nonce_manager.pending_count(from).await;
                info!(
                    "Sent {} transaction {:?} from {:?} (nonce {}, {} in flight)",
                    kind, tx_hash, from, nonce, in_flight
                );
                Ok(signed)
            }
            Err(e) => {
                crate::metrics::record_tx_failed(Chain::Foreign.as_str(), kind);
                if e.to_string().contains("nonce too low") {
                    warn!("Nonce too low for {:?}, syncing with node", from);
                    self.nonce_manager.sync(from, self.client.as_ref()).await?;
                } else {
                    self.nonce_manager.release(from, nonce).await;
                }
                Err(e)
            }
        }
    }
}
