//! Post-settlement balance verification

use super::{format_token_delta, BalanceReader, BalanceSnapshot};
use crate::error::{BalanceField, E2eError, E2eResult};
use crate::order::LedgerAddress;

use ethers::types::{Address, I256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Economic outcome a settled case must show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub foreign_transfer: u64,
    pub native_transfer: u64,
}

fn delta(initial: U256, current: U256) -> I256 {
    I256::from_raw(current) - I256::from_raw(initial)
}

fn amount(value: u64) -> I256 {
    I256::from_raw(U256::from(value))
}

fn expect_eq(field: BalanceField, expected: I256, actual: I256) -> E2eResult<()> {
    if expected != actual {
        return Err(E2eError::BalanceMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Compare two snapshots against the expected transfer; the first mismatch wins
pub fn check(
    initial: &BalanceSnapshot,
    current: &BalanceSnapshot,
    expectation: &Expectation,
) -> E2eResult<()> {
    let transfer = amount(expectation.foreign_transfer);

    expect_eq(
        BalanceField::BuyerForeign,
        -transfer,
        delta(initial.buyer_foreign, current.buyer_foreign),
    )?;
    expect_eq(
        BalanceField::SellerForeign,
        transfer,
        delta(initial.seller_foreign, current.seller_foreign),
    )?;
    expect_eq(
        BalanceField::ReceiverNative,
        amount(expectation.native_transfer),
        amount(current.receiver_native) - amount(initial.receiver_native),
    )?;
    expect_eq(
        BalanceField::ForeignSupply,
        I256::zero(),
        delta(initial.foreign_supply, current.foreign_supply),
    )
}

pub struct BalanceVerifier {
    reader: Arc<BalanceReader>,
    settle_delay: Duration,
    decimals: u32,
}

impl BalanceVerifier {
    pub fn new(reader: Arc<BalanceReader>, settle_delay: Duration, decimals: u32) -> Self {
        Self {
            reader,
            settle_delay,
            decimals,
        }
    }

    /// Wait out indexing lag once, then read and compare
    pub async fn verify(
        &self,
        initial: &BalanceSnapshot,
        buyer: Address,
        seller: Address,
        receiver: &LedgerAddress,
        expectation: &Expectation,
    ) -> E2eResult<BalanceSnapshot> {
        if !self.settle_delay.is_zero() {
            debug!("Waiting {:?} for balances to settle", self.settle_delay);
            tokio::time::sleep(self.settle_delay).await;
        }

        let current = self.reader.snapshot(buyer, seller, receiver).await?;
        info!(
            "Balance changes: buyer {}, seller {}, receiver {:+}",
            format_token_delta(delta(initial.buyer_foreign, current.buyer_foreign), self.decimals),
            format_token_delta(delta(initial.seller_foreign, current.seller_foreign), self.decimals),
            current.receiver_native as i128 - initial.receiver_native as i128,
        );

        check(initial, &current, expectation)?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(buyer: u64, seller: u64, receiver: u64, supply: u64) -> BalanceSnapshot {
        BalanceSnapshot {
            buyer_foreign: U256::from(buyer),
            seller_foreign: U256::from(seller),
            receiver_native: receiver,
            foreign_supply: U256::from(supply),
        }
    }

    const EXPECT: Expectation = Expectation {
        foreign_transfer: 1_000_000,
        native_transfer: 1_000_000,
    };

    #[test]
    fn test_settled_trade_passes() {
        let initial = snapshot(5_000_000, 0, 10, 9_000_000);
        let current = snapshot(4_000_000, 1_000_000, 1_000_010, 9_000_000);
        assert!(check(&initial, &current, &EXPECT).is_ok());
    }

    #[test]
    fn test_buyer_mismatch_reports_signed_values() {
        let initial = snapshot(5_000_000, 0, 0, 1);
        let current = snapshot(4_500_000, 1_000_000, 1_000_000, 1);
        match check(&initial, &current, &EXPECT).unwrap_err() {
            E2eError::BalanceMismatch {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, BalanceField::BuyerForeign);
                assert_eq!(expected, -amount(1_000_000));
                assert_eq!(actual, -amount(500_000));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_missing_native_release_is_detected() {
        let initial = snapshot(5_000_000, 0, 7, 1);
        let current = snapshot(4_000_000, 1_000_000, 7, 1);
        let err = check(&initial, &current, &EXPECT).unwrap_err();
        assert!(matches!(
            err,
            E2eError::BalanceMismatch {
                field: BalanceField::ReceiverNative,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "receiver native balance change mismatch: expected 1000000, got 0"
        );
    }

    #[test]
    fn test_minted_supply_is_detected() {
        let initial = snapshot(5_000_000, 0, 0, 100);
        let current = snapshot(4_000_000, 1_000_000, 1_000_000, 101);
        assert!(matches!(
            check(&initial, &current, &EXPECT),
            Err(E2eError::BalanceMismatch {
                field: BalanceField::ForeignSupply,
                ..
            })
        ));
    }
}
