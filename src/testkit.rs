//! In-process ledger and foreign chain for lifecycle tests
//!
//! Implements both collaborator traits over shared state. Foreign
//! transactions are interpreted the way the ledger's oracle does: a lock
//! intent in a self-transfer reserves an order, and a token transfer followed
//! by a close intent settles it once the payment matches.

use crate::chain::{
    Chain, CreateOrder, ForeignClient, LedgerAuth, LedgerClient, SignedTransaction, TxReceipt,
};
use crate::config::{Accounts, ForeignAccount};
use crate::error::{E2eError, E2eResult};
use crate::lifecycle::Participants;
use crate::order::{LedgerAddress, LockState, Order, OrderBook, OrderBooks, OrderId};
use crate::tx::erc20;
use crate::tx::payload::{CloseIntent, LockIntent};

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const COMMITTEE: u64 = 2;
pub const HEIGHT: u64 = 100;
pub const ORDER_AMOUNT: u64 = 1_000_000;

const FOREIGN_KEYS: [&str; 4] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
];

pub fn accounts() -> Accounts {
    Accounts {
        foreign: FOREIGN_KEYS
            .iter()
            .map(|key| ForeignAccount {
                address: key.parse::<LocalWallet>().unwrap().address(),
                private_key: key.to_string(),
            })
            .collect(),
        ledger: vec![
            LedgerAddress::new(vec![0x02; 20]),
            LedgerAddress::new(vec![0x85; 20]),
        ],
    }
}

pub fn participants(buyer: usize, seller: usize, receiver: usize) -> Participants {
    let accounts = accounts();
    Participants {
        buyer: accounts.foreign[buyer].clone(),
        seller: accounts.foreign[seller].clone(),
        receiver: accounts.ledger[receiver].clone(),
    }
}

#[derive(Default)]
struct SimState {
    books: Vec<OrderBook>,
    next_id: u64,
    native: HashMap<Vec<u8>, u64>,
    tokens: HashMap<Address, U256>,
    supply: U256,
    nonces: HashMap<Address, u64>,
    /// Closed orders and the reads left before they leave the book
    settling: Vec<(OrderId, usize)>,
    sends: usize,
    creates: usize,
    lock_txs: usize,
    close_txs: usize,
}

impl SimState {
    fn order_mut(&mut self, id: &[u8]) -> Option<&mut Order> {
        self.books
            .iter_mut()
            .flat_map(|book| book.orders.iter_mut())
            .find(|order| order.id.as_bytes() == id)
    }

    fn settle(&mut self, id: &OrderId) {
        for book in &mut self.books {
            if let Some(pos) = book.orders.iter().position(|order| &order.id == id) {
                let order = book.orders.remove(pos);
                if let LockState::Locked {
                    buyer_receive_address,
                    ..
                } = order.lock
                {
                    *self.native.entry(buyer_receive_address).or_default() +=
                        order.amount_for_sale;
                }
                return;
            }
        }
    }

    fn tick_settlements(&mut self) {
        let mut due = Vec::new();
        for (id, remaining) in &mut self.settling {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                due.push(id.clone());
            }
        }
        self.settling.retain(|(_, remaining)| *remaining > 0);
        for id in due {
            self.settle(&id);
        }
    }

    fn apply_lock(&mut self, from: Address, intent: LockIntent, hide_locks: bool) {
        self.lock_txs += 1;
        if hide_locks {
            return;
        }
        if let Some(order) = self.order_mut(&intent.order_id) {
            // first lock wins
            if !order.is_locked() {
                order.lock = LockState::Locked {
                    buyer_send_address: from.as_bytes().to_vec(),
                    buyer_receive_address: intent.buyer_receive_address,
                    deadline: intent.buyer_chain_deadline,
                };
            }
        }
    }

    fn apply_transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
        trailer: &[u8],
        settle_after: usize,
    ) -> E2eResult<()> {
        let balance = self.tokens.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(E2eError::submission(
                Chain::Foreign,
                "execution reverted: ERC20: transfer amount exceeds balance",
            ));
        }
        self.tokens.insert(from, balance - amount);
        *self.tokens.entry(to).or_default() += amount;

        let Some(intent) = CloseIntent::decode(trailer) else {
            return Ok(());
        };
        self.close_txs += 1;

        let paid_in_full = match self.order_mut(&intent.order_id) {
            Some(order) => match &order.lock {
                LockState::Locked {
                    buyer_send_address,
                    ..
                } => {
                    buyer_send_address.as_slice() == from.as_bytes()
                        && order.seller_receive_foreign() == to
                        && amount >= U256::from(order.requested_amount)
                }
                LockState::Unlocked => false,
            },
            None => false,
        };

        if paid_in_full {
            let id = OrderId::new(intent.order_id);
            if settle_after == 0 {
                self.settle(&id);
            } else {
                self.settling.push((id, settle_after));
            }
        }
        Ok(())
    }
}

/// Both chains in one process
pub struct Simulator {
    state: Mutex<SimState>,
    token: Address,
    settle_after: usize,
    drop_creates: bool,
    hide_locks: bool,
    fail_balance_reads: bool,
    reject_deletes: bool,
    rejected_sends: HashSet<usize>,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 1_000,
                ..SimState::default()
            }),
            token: Address::from([0x5f; 20]),
            settle_after: 0,
            drop_creates: false,
            hide_locks: false,
            fail_balance_reads: false,
            reject_deletes: false,
            rejected_sends: HashSet::new(),
        }
    }

    /// Keep closed orders on the book for `reads` more order-book reads
    pub fn settle_after_reads(mut self, reads: usize) -> Self {
        self.settle_after = reads;
        self
    }

    /// Acknowledge create-order transactions without adding the order
    pub fn drop_creates(mut self) -> Self {
        self.drop_creates = true;
        self
    }

    /// Accept lock transactions without ever showing the lock on the book
    pub fn hide_locks(mut self) -> Self {
        self.hide_locks = true;
        self
    }

    pub fn fail_balance_reads(mut self) -> Self {
        self.fail_balance_reads = true;
        self
    }

    /// Fail every delete-order transaction
    pub fn reject_deletes(mut self) -> Self {
        self.reject_deletes = true;
        self
    }

    /// Reject the foreign send with this zero-based index
    pub fn reject_send(mut self, index: usize) -> Self {
        self.rejected_sends.insert(index);
        self
    }

    pub fn token(&self) -> Address {
        self.token
    }

    /// Mint tokens to `owner`
    pub fn fund(&self, owner: Address, amount: u64) {
        let mut state = self.state.lock().unwrap();
        *state.tokens.entry(owner).or_default() += U256::from(amount);
        state.supply += U256::from(amount);
    }

    pub fn seed_order(&self, id: u8, locked: bool) -> OrderId {
        self.seed_order_in_book(COMMITTEE, id, locked)
    }

    pub fn seed_order_in_book(&self, committee: u64, id: u8, locked: bool) -> OrderId {
        let accounts = accounts();
        let lock = if locked {
            LockState::Locked {
                buyer_send_address: accounts.foreign[0].address.as_bytes().to_vec(),
                buyer_receive_address: accounts.ledger[0].as_bytes().to_vec(),
                deadline: HEIGHT + 5,
            }
        } else {
            LockState::Unlocked
        };
        let order = Order {
            id: OrderId::new(vec![id]),
            committee,
            amount_for_sale: ORDER_AMOUNT,
            requested_amount: ORDER_AMOUNT,
            seller_receive_address: accounts.foreign[1].address.as_bytes().to_vec(),
            lock,
        };

        let mut state = self.state.lock().unwrap();
        push_order(&mut state.books, order.clone());
        order.id
    }

    pub fn order(&self, id: &OrderId) -> Option<Order> {
        let state = self.state.lock().unwrap();
        state
            .books
            .iter()
            .flat_map(|book| book.orders.iter())
            .find(|order| &order.id == id)
            .cloned()
    }

    pub fn order_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.books.iter().map(|book| book.orders.len()).sum()
    }

    pub fn token_balance(&self, owner: Address) -> U256 {
        let state = self.state.lock().unwrap();
        state.tokens.get(&owner).copied().unwrap_or_default()
    }

    pub fn native_balance(&self, address: &LedgerAddress) -> u64 {
        let state = self.state.lock().unwrap();
        state.native.get(address.as_bytes()).copied().unwrap_or_default()
    }

    pub fn sends(&self) -> usize {
        self.state.lock().unwrap().sends
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn lock_txs(&self) -> usize {
        self.state.lock().unwrap().lock_txs
    }

    pub fn close_txs(&self) -> usize {
        self.state.lock().unwrap().close_txs
    }
}

fn push_order(books: &mut Vec<OrderBook>, order: Order) {
    match books.iter_mut().find(|book| book.committee == order.committee) {
        Some(book) => book.orders.push(order),
        None => books.push(OrderBook {
            committee: order.committee,
            orders: vec![order],
        }),
    }
}

#[async_trait]
impl LedgerClient for Simulator {
    async fn height(&self) -> E2eResult<u64> {
        Ok(HEIGHT)
    }

    /// Every book is returned regardless of committee, so multi-book handling is exercised
    async fn order_books(&self, _committee: u64) -> E2eResult<OrderBooks> {
        let mut state = self.state.lock().unwrap();
        state.tick_settlements();
        Ok(OrderBooks {
            books: state.books.clone(),
        })
    }

    async fn account_balance(&self, address: &LedgerAddress) -> E2eResult<u64> {
        if self.fail_balance_reads {
            return Err(E2eError::rpc(Chain::Ledger, "account query unavailable"));
        }
        Ok(self.native_balance(address))
    }

    async fn create_order(&self, _auth: &LedgerAuth, order: &CreateOrder) -> E2eResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        let hash = format!("create-{}", state.creates);
        if self.drop_creates {
            return Ok(TxReceipt { hash });
        }

        state.next_id += 1;
        let id = OrderId::new(state.next_id.to_be_bytes().to_vec());
        push_order(
            &mut state.books,
            Order {
                id,
                committee: order.committee,
                amount_for_sale: order.sell_amount,
                requested_amount: order.receive_amount,
                seller_receive_address: order.receive_address.as_bytes().to_vec(),
                lock: LockState::Unlocked,
            },
        );
        Ok(TxReceipt { hash })
    }

    async fn delete_order(
        &self,
        _auth: &LedgerAuth,
        order_id: &OrderId,
        _committee: u64,
        _fee: u64,
    ) -> E2eResult<TxReceipt> {
        if self.reject_deletes {
            return Err(E2eError::submission(Chain::Ledger, "delete rejected"));
        }
        let mut state = self.state.lock().unwrap();
        for book in &mut state.books {
            if let Some(pos) = book.orders.iter().position(|order| &order.id == order_id) {
                book.orders.remove(pos);
                return Ok(TxReceipt {
                    hash: format!("delete-{}", order_id),
                });
            }
        }
        Err(E2eError::submission(Chain::Ledger, "order not found"))
    }
}

#[async_trait]
impl ForeignClient for Simulator {
    async fn pending_nonce(&self, address: Address) -> E2eResult<u64> {
        let state = self.state.lock().unwrap();
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn suggested_gas_price(&self) -> E2eResult<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn network_id(&self) -> E2eResult<u64> {
        Ok(31337)
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> E2eResult<H256> {
        let mut state = self.state.lock().unwrap();
        let index = state.sends;
        state.sends += 1;

        if self.rejected_sends.contains(&index) {
            return Err(E2eError::submission(Chain::Foreign, "rejected by node"));
        }

        let expected = state.nonces.get(&tx.from).copied().unwrap_or_default();
        if tx.nonce < expected {
            return Err(E2eError::submission(Chain::Foreign, "nonce too low"));
        }

        if tx.to == self.token {
            let (to, amount, trailer) = erc20::decode_transfer(&tx.data)
                .ok_or_else(|| E2eError::submission(Chain::Foreign, "unsupported token call"))?;
            state.apply_transfer(tx.from, to, amount, trailer, self.settle_after)?;
        } else if let Some(intent) = LockIntent::decode(&tx.data) {
            state.apply_lock(tx.from, intent, self.hide_locks);
        }

        state.nonces.insert(tx.from, tx.nonce + 1);
        Ok(tx.hash)
    }

    async fn call(&self, to: Address, data: Bytes) -> E2eResult<Bytes> {
        if self.fail_balance_reads || to != self.token {
            return Err(E2eError::rpc(Chain::Foreign, "call failed"));
        }

        let state = self.state.lock().unwrap();
        let value = if data.as_ref() == erc20::total_supply_calldata().as_slice() {
            state.supply
        } else if data.len() > 4 && data[..4] == erc20::balance_of_selector() {
            let owner = match abi::decode(&[ParamType::Address], &data[4..]) {
                Ok(tokens) => match tokens.first() {
                    Some(Token::Address(owner)) => *owner,
                    _ => return Err(E2eError::Decode("balanceOf owner".to_string())),
                },
                Err(e) => return Err(E2eError::Decode(e.to_string())),
            };
            state.tokens.get(&owner).copied().unwrap_or_default()
        } else {
            return Err(E2eError::rpc(Chain::Foreign, "unknown selector"));
        };

        Ok(abi::encode(&[Token::Uint(value)]).into())
    }
}
