//! Order book domain types
//!
//! The ledger encodes the lock state of a sell order as the presence of
//! `buyerSendAddress`. Past the wire boundary that becomes [`LockState`], so a
//! zero value can never be mistaken for a lock.

pub mod reader;
pub mod selector;
pub mod wire;

pub use reader::OrderBookReader;

use crate::error::E2eError;

use ethers::types::Address;
use std::fmt;
use std::str::FromStr;

fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = input.trim();
    hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
}

/// Ledger-assigned order identifier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(Vec<u8>);

impl OrderId {
    #[cfg(test)]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId({})", self)
    }
}

impl FromStr for OrderId {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            decode_hex(s).map_err(|e| E2eError::Decode(format!("invalid order id {}: {}", s, e)))?;
        if bytes.is_empty() {
            return Err(E2eError::Decode("empty order id".to_string()));
        }
        Ok(Self(bytes))
    }
}

/// Address on the source ledger (raw bytes, rendered as bare hex)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LedgerAddress(Vec<u8>);

impl LedgerAddress {
    #[cfg(test)]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerAddress({})", self)
    }
}

impl FromStr for LedgerAddress {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)
            .map_err(|e| E2eError::Decode(format!("invalid ledger address {}: {}", s, e)))?;
        if bytes.len() != 20 {
            return Err(E2eError::Decode(format!(
                "ledger address {} must be 20 bytes, got {}",
                s,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }
}

/// Interpret arbitrary bytes as a foreign address, keeping the low 20 bytes
pub fn foreign_address_from_bytes(bytes: &[u8]) -> Address {
    let mut out = [0u8; 20];
    if bytes.len() >= 20 {
        out.copy_from_slice(&bytes[bytes.len() - 20..]);
    } else {
        out[20 - bytes.len()..].copy_from_slice(bytes);
    }
    Address::from(out)
}

/// Lock state of a sell order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked {
        /// Foreign address the buyer pays from
        buyer_send_address: Vec<u8>,
        /// Ledger address that receives the native token
        buyer_receive_address: Vec<u8>,
        /// Ledger height after which the lock lapses
        deadline: u64,
    },
}

/// A sell offer on the source ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub committee: u64,
    pub amount_for_sale: u64,
    pub requested_amount: u64,
    pub seller_receive_address: Vec<u8>,
    pub lock: LockState,
}

impl Order {
    pub fn is_locked(&self) -> bool {
        matches!(self.lock, LockState::Locked { .. })
    }

    /// Whether the order carries the given economics
    pub fn matches_amounts(&self, amount_for_sale: u64, requested_amount: u64) -> bool {
        self.amount_for_sale == amount_for_sale && self.requested_amount == requested_amount
    }

    pub fn seller_receive_foreign(&self) -> Address {
        foreign_address_from_bytes(&self.seller_receive_address)
    }
}

/// One committee's book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    pub committee: u64,
    pub orders: Vec<Order>,
}

/// Snapshot of every book returned by one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBooks {
    pub books: Vec<OrderBook>,
}

impl OrderBooks {
    /// Orders in book order, then order-within-book order
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.books.iter().flat_map(|book| book.orders.iter())
    }

    pub fn len(&self) -> usize {
        self.books.iter().map(|book| book.orders.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
