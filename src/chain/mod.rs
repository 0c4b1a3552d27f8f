//! Chain module - the two ledgers the tester drives
//!
//! This module provides:
//! - `LedgerClient`: the source ledger's query and admin RPC (order books, heights, balances,
//!   order creation and deletion signed by the node keystore)
//! - `ForeignClient`: the external EVM chain (nonces, gas, raw transaction submission, calls)
//! - HTTP implementations of both, with failover across foreign RPC endpoints

pub mod ledger;
pub mod provider;

pub use ledger::LedgerRpcClient;
pub use provider::EthereumProvider;

use crate::error::E2eResult;
use crate::order::{LedgerAddress, OrderBooks, OrderId};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use std::fmt;

/// Which side of the swap an operation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Ledger,
    Foreign,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ledger => "ledger",
            Chain::Foreign => "foreign",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keystore nickname and passphrase the ledger node signs with
#[derive(Clone)]
pub struct LedgerAuth {
    pub nickname: String,
    pub passphrase: String,
}

impl fmt::Debug for LedgerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerAuth")
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

/// Parameters of a sell-order transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub sell_amount: u64,
    pub receive_amount: u64,
    pub committee: u64,
    /// Foreign address the seller is paid at
    pub receive_address: Address,
    pub data: Vec<u8>,
    pub fee: u64,
}

/// Acknowledgement of a ledger transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: String,
}

/// A locally signed foreign transaction, ready to broadcast
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub data: Bytes,
    pub raw: Bytes,
}

/// Source ledger RPC
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current block height
    async fn height(&self) -> E2eResult<u64>;

    /// Fresh snapshot of the order books owned by `committee`
    async fn order_books(&self, committee: u64) -> E2eResult<OrderBooks>;

    /// Native token balance of an account
    async fn account_balance(&self, address: &LedgerAddress) -> E2eResult<u64>;

    /// Submit a sell order signed by the keystore entry in `auth`
    async fn create_order(&self, auth: &LedgerAuth, order: &CreateOrder) -> E2eResult<TxReceipt>;

    /// Submit a delete for one of the signer's orders
    async fn delete_order(
        &self,
        auth: &LedgerAuth,
        order_id: &OrderId,
        committee: u64,
        fee: u64,
    ) -> E2eResult<TxReceipt>;
}

/// External EVM chain RPC
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForeignClient: Send + Sync {
    async fn pending_nonce(&self, address: Address) -> E2eResult<u64>;

    async fn suggested_gas_price(&self) -> E2eResult<U256>;

    async fn network_id(&self) -> E2eResult<u64>;

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> E2eResult<H256>;

    /// Read-only contract call
    async fn call(&self, to: Address, data: Bytes) -> E2eResult<Bytes>;
}
