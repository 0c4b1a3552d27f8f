//! Error types for the lifecycle tester

use crate::chain::Chain;
use crate::lifecycle::Phase;

use ethers::types::I256;
use std::fmt;
use thiserror::Error;

/// Which balance a verification compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceField {
    BuyerForeign,
    SellerForeign,
    ReceiverNative,
    ForeignSupply,
}

impl fmt::Display for BalanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BalanceField::BuyerForeign => "buyer foreign balance",
            BalanceField::SellerForeign => "seller foreign balance",
            BalanceField::ReceiverNative => "receiver native balance",
            BalanceField::ForeignSupply => "foreign token supply",
        };
        f.write_str(name)
    }
}

/// Main error type for the tester
#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Order {order_id} is already locked")]
    AlreadyLocked { order_id: String },

    #[error("Order {order_id} is not locked")]
    NotLocked { order_id: String },

    #[error("Timeout in phase {phase}")]
    LifecycleTimeout { phase: Phase },

    #[error("{field} change mismatch: expected {expected}, got {actual}")]
    BalanceMismatch {
        field: BalanceField,
        expected: I256,
        actual: I256,
    },

    #[error("Transaction submission on {chain} failed: {message}")]
    TransactionSubmission { chain: Chain, message: String },

    #[error("RPC error on {chain}: {message}")]
    Rpc { chain: Chain, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Nonce error for {address}: {message}")]
    Nonce { address: String, message: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Order id already bound to {bound}, refusing {attempted}")]
    OrderIdRebind { bound: String, attempted: String },

    #[error("Test case {0} is already registered")]
    DuplicateCase(String),

    #[error("Encountered {failed} errors while {operation} {total} orders:\n{details}")]
    Bulk {
        operation: String,
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl E2eError {
    /// Check if error is a transient read failure worth another poll
    pub fn is_retryable(&self) -> bool {
        matches!(self, E2eError::Rpc { .. })
    }

    /// Check if error means a selection matched nothing
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(self, E2eError::NotFound(_))
    }

    pub fn submission(chain: Chain, err: impl fmt::Display) -> Self {
        E2eError::TransactionSubmission {
            chain,
            message: err.to_string(),
        }
    }

    pub fn rpc(chain: Chain, err: impl fmt::Display) -> Self {
        E2eError::Rpc {
            chain,
            message: err.to_string(),
        }
    }
}

/// Result type for tester operations
pub type E2eResult<T> = Result<T, E2eError>;
