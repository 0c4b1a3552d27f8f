//! Side-effecting transactions on both chains

use super::erc20;
use super::payload::{CloseIntent, LockIntent};
use super::sender::ForeignTxSender;
use crate::chain::{
    Chain, CreateOrder, ForeignClient, LedgerAuth, LedgerClient, SignedTransaction, TxReceipt,
};
use crate::config::ForeignAccount;
use crate::error::{E2eError, E2eResult};
use crate::order::{LedgerAddress, Order, OrderId};

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Ledger-side parameters shared by every submission
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub auth: LedgerAuth,
    pub committee: u64,
    pub fee: u64,
    pub lock_deadline_blocks: u64,
    pub token_contract: Address,
}

pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerClient>,
    sender: ForeignTxSender,
    config: SubmitterConfig,
}

impl TransactionSubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        foreign: Arc<dyn ForeignClient>,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            ledger,
            sender: ForeignTxSender::new(foreign),
            config,
        }
    }

    /// Sell `amount` native tokens for `requested` foreign tokens paid to `seller_receive`
    pub async fn create_order(
        &self,
        amount: u64,
        requested: u64,
        seller_receive: Address,
    ) -> E2eResult<TxReceipt> {
        let order = CreateOrder {
            sell_amount: amount,
            receive_amount: requested,
            committee: self.config.committee,
            receive_address: seller_receive,
            data: self.config.token_contract.as_bytes().to_vec(),
            fee: self.config.fee,
        };

        let receipt = self.ledger.create_order(&self.config.auth, &order).await?;
        crate::metrics::record_tx_submitted(Chain::Ledger.as_str(), "create");
        info!(
            "Created sell order for {} native / {} foreign (tx {})",
            amount, requested, receipt.hash
        );
        Ok(receipt)
    }

    pub async fn delete_order(&self, order_id: &OrderId) -> E2eResult<TxReceipt> {
        let receipt = self
            .ledger
            .delete_order(
                &self.config.auth,
                order_id,
                self.config.committee,
                self.config.fee,
            )
            .await?;
        crate::metrics::record_tx_submitted(Chain::Ledger.as_str(), "delete");
        debug!("Deleted order {} (tx {})", order_id, receipt.hash);
        Ok(receipt)
    }

    /// Reserve `order` for `buyer`, valid until a few ledger blocks from now
    pub async fn lock_order(
        &self,
        order: &Order,
        buyer: &ForeignAccount,
        buyer_receive: &LedgerAddress,
    ) -> E2eResult<SignedTransaction> {
        if order.is_locked() {
            return Err(E2eError::AlreadyLocked {
                order_id: order.id.to_string(),
            });
        }

        let height = self.ledger.height().await?;
        let intent = LockIntent {
            order_id: order.id.as_bytes().to_vec(),
            chain_id: order.committee,
            buyer_receive_address: buyer_receive.as_bytes().to_vec(),
            buyer_send_address: buyer.address.as_bytes().to_vec(),
            buyer_chain_deadline: height + self.config.lock_deadline_blocks,
        };

        // the intent travels as data of a self-transfer
        let tx = self
            .sender
            .send(&buyer.private_key, buyer.address, intent.encode()?, "lock")
            .await?;
        info!(
            "Lock order transaction sent for order {} by buyer {:?}",
            order.id, buyer.address
        );
        Ok(tx)
    }

    /// Pay the seller and request settlement of a locked order
    pub async fn close_order(
        &self,
        order: &Order,
        buyer: &ForeignAccount,
        amount: u64,
    ) -> E2eResult<SignedTransaction> {
        if !order.is_locked() {
            return Err(E2eError::NotLocked {
                order_id: order.id.to_string(),
            });
        }

        let mut data = erc20::transfer_calldata(order.seller_receive_foreign(), U256::from(amount));
        data.extend(CloseIntent::new(order.id.as_bytes().to_vec(), order.committee).encode()?);

        let tx = self
            .sender
            .send(&buyer.private_key, self.config.token_contract, data, "close")
            .await?;
        info!(
            "Close order transaction sent for order {} paying {} to {:?}",
            order.id,
            amount,
            order.seller_receive_foreign()
        );
        Ok(tx)
    }
}
