//! Command-line interface

use crate::config::{Accounts, ForeignAccount};
use crate::error::{E2eError, E2eResult};
use crate::order::selector::OrderTarget;
use crate::order::LedgerAddress;

use clap::{Parser, Subcommand};
use ethers::types::Address;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oracle-e2e", version)]
#[command(about = "End-to-end lifecycle tester for the cross-chain order book")]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(long, global = true, env = crate::config::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Order amount, and the foreign amount paid when closing
    #[arg(long, global = true, default_value_t = 1_000_000)]
    pub amount: u64,

    /// Buyer foreign address (defaults to foreign account 0)
    #[arg(long, global = true)]
    pub buyer_addr: Option<String>,

    /// Buyer foreign private key in hex (defaults to foreign account 0)
    #[arg(long, global = true)]
    pub buyer_key: Option<String>,

    /// Seller foreign address (defaults to foreign account 1)
    #[arg(long, global = true)]
    pub seller_addr: Option<String>,

    /// Seller foreign private key in hex (defaults to foreign account 1)
    #[arg(long, global = true)]
    pub seller_key: Option<String>,

    /// Ledger address receiving native tokens (defaults to ledger account 0)
    #[arg(long, global = true)]
    pub receive_addr: Option<String>,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a sell order for `--amount`
    CreateOrder,
    /// Lock an order by id, or the first unlocked order with "first"/"auto"
    LockOrder {
        #[arg(default_value = "first")]
        target: OrderTarget,
    },
    /// Lock every unlocked order
    LockAll,
    /// Close an order by id, or the first locked order with "first"/"auto"
    CloseOrder {
        #[arg(default_value = "first")]
        target: OrderTarget,
    },
    /// Close every locked order
    CloseAll,
    /// Delete every order on the books
    DeleteAll,
    /// Run the configured test suite
    RunTests {
        /// Exit non-zero when any case fails
        #[arg(long)]
        strict: bool,
    },
}

fn foreign_account(
    address: Option<&str>,
    key: Option<&str>,
    accounts: &Accounts,
    index: usize,
    role: &str,
) -> E2eResult<ForeignAccount> {
    let default = accounts.foreign.get(index).ok_or_else(|| {
        E2eError::Config(format!("No foreign account {} configured for the {}", index, role))
    })?;

    let address = match address {
        Some(raw) => raw
            .parse::<Address>()
            .map_err(|e| E2eError::Config(format!("Invalid {} address {}: {}", role, raw, e)))?,
        None => default.address,
    };

    Ok(ForeignAccount {
        address,
        private_key: key
            .map(str::to_string)
            .unwrap_or_else(|| default.private_key.clone()),
    })
}

impl CliArgs {
    pub fn buyer(&self, accounts: &Accounts) -> E2eResult<ForeignAccount> {
        foreign_account(
            self.buyer_addr.as_deref(),
            self.buyer_key.as_deref(),
            accounts,
            0,
            "buyer",
        )
    }

    pub fn seller(&self, accounts: &Accounts) -> E2eResult<ForeignAccount> {
        foreign_account(
            self.seller_addr.as_deref(),
            self.seller_key.as_deref(),
            accounts,
            1,
            "seller",
        )
    }

    pub fn receiver(&self, accounts: &Accounts) -> E2eResult<LedgerAddress> {
        match &self.receive_addr {
            Some(raw) => raw.parse(),
            None => accounts
                .ledger
                .first()
                .cloned()
                .ok_or_else(|| E2eError::Config("No ledger account configured".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderId;

    fn accounts() -> Accounts {
        Accounts {
            foreign: vec![
                ForeignAccount {
                    address: Address::from([1u8; 20]),
                    private_key: "k1".to_string(),
                },
                ForeignAccount {
                    address: Address::from([2u8; 20]),
                    private_key: "k2".to_string(),
                },
            ],
            ledger: vec![LedgerAddress::new(vec![3u8; 20])],
        }
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["oracle-e2e", "lock-order"]).unwrap();
        assert_eq!(args.amount, 1_000_000);
        assert!(matches!(
            args.command,
            Command::LockOrder {
                target: OrderTarget::First
            }
        ));

        let accounts = accounts();
        assert_eq!(args.buyer(&accounts).unwrap().address, accounts.foreign[0].address);
        assert_eq!(args.seller(&accounts).unwrap().private_key, "k2");
        assert_eq!(args.receiver(&accounts).unwrap(), accounts.ledger[0]);
    }

    #[test]
    fn test_overrides_and_targets() {
        let receiver = "44".repeat(20);
        let args = CliArgs::try_parse_from([
            "oracle-e2e",
            "close-order",
            "0a0b",
            "--amount",
            "5",
            "--buyer-key",
            "k9",
            "--receive-addr",
            receiver.as_str(),
        ])
        .unwrap();

        assert_eq!(args.amount, 5);
        match &args.command {
            Command::CloseOrder { target } => {
                assert_eq!(target, &OrderTarget::Id(OrderId::new(vec![0x0a, 0x0b])))
            }
            other => panic!("unexpected command {other:?}"),
        }
        let accounts = accounts();
        let buyer = args.buyer(&accounts).unwrap();
        assert_eq!(buyer.private_key, "k9");
        assert_eq!(buyer.address, accounts.foreign[0].address);
        assert_eq!(args.receiver(&accounts).unwrap().to_string(), receiver);
    }

    #[test]
    fn test_run_tests_strict_flag() {
        let args = CliArgs::try_parse_from(["oracle-e2e", "run-tests", "--strict"]).unwrap();
        assert!(matches!(args.command, Command::RunTests { strict: true }));
        assert!(CliArgs::try_parse_from(["oracle-e2e", "lock-order", "zz"]).is_err());
    }
}
