//! Nonce management for foreign transaction submission
//!
//! Handles:
//! - Local nonce tracking so concurrent cases sharing a sender never collide
//! - Release of nonces whose transaction was rejected
//! - Resync with the node after "nonce too low"

use crate::chain::ForeignClient;
use crate::error::{E2eError, E2eResult};

use dashmap::DashMap;
use ethers::types::{Address, H256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-address nonce state
#[derive(Default)]
struct AccountNonceState {
    /// Next nonce to hand out; `None` until first fetched from the node
    current: Option<u64>,
    /// Broadcast transactions: nonce -> tx hash
    pending: BTreeMap<u64, H256>,
    /// Nonces below `current` whose send failed, reissued lowest first
    released: BTreeSet<u64>,
}

/// Manages nonces across sending addresses
#[derive(Default)]
pub struct NonceManager {
    accounts: DashMap<Address, Arc<Mutex<AccountNonceState>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, address: Address) -> Arc<Mutex<AccountNonceState>> {
        self.accounts.entry(address).or_default().clone()
    }

    /// Allocate the next nonce, initialising from the node's pending nonce
    pub async fn next(&self, address: Address, client: &dyn ForeignClient) -> E2eResult<u64> {
        let state = self.state(address);
        let mut state = state.lock().await;

        if let Some(nonce) = state.released.pop_first() {
            debug!("Reissuing released nonce {} for {:?}", nonce, address);
            return Ok(nonce);
        }

        let nonce = match state.current {
            Some(nonce) => nonce,
            None => fetch_nonce(address, client).await?,
        };
        state.current = Some(nonce + 1);

        debug!("Allocated nonce {} for {:?}", nonce, address);
        Ok(nonce)
    }

    /// Mark a nonce as broadcast with its transaction hash
    pub async fn mark_pending(&self, address: Address, nonce: u64, tx_hash: H256) {
        let state = self.state(address);
        let mut state = state.lock().await;
        state.pending.insert(nonce, tx_hash);
    }

    /// Release a nonce (transaction rejected, can be reused)
    pub async fn release(&self, address: Address, nonce: u64) {
        let state = self.state(address);
        let mut state = state.lock().await;
        state.pending.remove(&nonce);

        match state.current {
            Some(current) if current == nonce + 1 => {
                // Fold trailing released nonces back into the counter
                let mut current = nonce;
                while current > 0 && state.released.remove(&(current - 1)) {
                    current -= 1;
                }
                state.current = Some(current);
            }
            Some(current) if nonce < current => {
                state.released.insert(nonce);
            }
            _ => {}
        }
    }

    /// Sync with the node's pending nonce
    pub async fn sync(&self, address: Address, client: &dyn ForeignClient) -> E2eResult<()> {
        let on_chain_nonce = fetch_nonce(address, client).await?;

        let state = self.state(address);
        let mut state = state.lock().await;

        state.pending.retain(|nonce, _| *nonce >= on_chain_nonce);
        state.released.retain(|nonce| *nonce >= on_chain_nonce);

        match state.current {
            Some(current)
                if current
                    > on_chain_nonce + (state.pending.len() + state.released.len()) as u64 =>
            {
                warn!(
                    "Nonce gap detected for {:?}: local {}, node {}",
                    address, current, on_chain_nonce
                );
            }
            Some(current) if current >= on_chain_nonce => {}
            _ => {
                state.current = Some(on_chain_nonce);
                state.released.clear();
            }
        }

        Ok(())
    }

    pub async fn pending_count(&self, address: Address) -> usize {
        match self.accounts.get(&address).map(|entry| entry.value().clone()) {
            Some(state) => state.lock().await.pending.len(),
            None => 0,
        }
    }
}

/// Fetch nonce from chain
async fn fetch_nonce(address: Address, client: &dyn ForeignClient) -> E2eResult<u64> {
    client
        .pending_nonce(address)
        .await
        .map_err(|e| E2eError::Nonce {
            address: format!("{:?}", address),
            message: e.to_string(),
        })
}
