//! Balance reads on both chains
//!
//! Native balances come from the ledger's account query, foreign balances from
//! ERC20 `balanceOf` calls against the settlement token.

pub mod verifier;

pub use verifier::{BalanceVerifier, Expectation};

use crate::chain::{ForeignClient, LedgerClient};
use crate::config::Accounts;
use crate::error::E2eResult;
use crate::order::LedgerAddress;
use crate::tx::erc20;

use ethers::types::{Address, I256, U256};
use std::sync::Arc;
use tracing::{info, warn};

/// Balances of one test case's participants at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub buyer_foreign: U256,
    pub seller_foreign: U256,
    pub receiver_native: u64,
    pub foreign_supply: U256,
}

pub struct BalanceReader {
    ledger: Arc<dyn LedgerClient>,
    foreign: Arc<dyn ForeignClient>,
    token_contract: Address,
    decimals: u32,
}

impl BalanceReader {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        foreign: Arc<dyn ForeignClient>,
        token_contract: Address,
        decimals: u32,
    ) -> Self {
        Self {
            ledger,
            foreign,
            token_contract,
            decimals,
        }
    }

    pub async fn native_balance(&self, address: &LedgerAddress) -> E2eResult<u64> {
        self.ledger.account_balance(address).await
    }

    pub async fn token_balance(&self, owner: Address) -> E2eResult<U256> {
        let output = self
            .foreign
            .call(self.token_contract, erc20::balance_of_calldata(owner).into())
            .await?;
        erc20::decode_uint(&output)
    }

    pub async fn token_supply(&self) -> E2eResult<U256> {
        let output = self
            .foreign
            .call(self.token_contract, erc20::total_supply_calldata().into())
            .await?;
        erc20::decode_uint(&output)
    }

    pub async fn snapshot(
        &self,
        buyer: Address,
        seller: Address,
        receiver: &LedgerAddress,
    ) -> E2eResult<BalanceSnapshot> {
        let (buyer_foreign, seller_foreign, receiver_native, foreign_supply) = tokio::try_join!(
            self.token_balance(buyer),
            self.token_balance(seller),
            self.native_balance(receiver),
            self.token_supply(),
        )?;

        Ok(BalanceSnapshot {
            buyer_foreign,
            seller_foreign,
            receiver_native,
            foreign_supply,
        })
    }

    /// Log every configured account's balances; read failures are only logged
    pub async fn log_balances(&self, label: &str, accounts: &Accounts) {
        info!("=== Balances {} ===", label);

        for (i, account) in accounts.foreign.iter().enumerate() {
            match self.token_balance(account.address).await {
                Ok(balance) => info!(
                    "  foreign[{}] {:?}: {}",
                    i,
                    account.address,
                    format_token_amount(balance, self.decimals)
                ),
                Err(e) => warn!("  foreign[{}] {:?}: unavailable ({})", i, account.address, e),
            }
        }

        for (i, address) in accounts.ledger.iter().enumerate() {
            match self.native_balance(address).await {
                Ok(balance) => info!("  ledger[{}] {}: {}", i, address, balance),
                Err(e) => warn!("  ledger[{}] {}: unavailable ({})", i, address, e),
            }
        }
    }
}

/// Render a token amount with its decimals, e.g. `1000000` at 6 decimals as `1.000000`
pub fn format_token_amount(amount: U256, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let unit = U256::exp10(decimals as usize);
    let whole = amount / unit;
    let fraction = amount % unit;
    format!(
        "{}.{:0>width$}",
        whole,
        fraction.to_string(),
        width = decimals as usize
    )
}

/// Signed variant for balance deltas
pub fn format_token_delta(delta: I256, decimals: u32) -> String {
    let sign = if delta.is_negative() { "-" } else { "+" };
    format!("{}{}", sign, format_token_amount(delta.unsigned_abs(), decimals))
}
