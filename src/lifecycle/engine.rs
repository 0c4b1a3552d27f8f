//! Lifecycle orchestrator
//!
//! Every transition is confirmed by re-reading the order books rather than
//! trusting a submission result: both chains finalize asynchronously, and a
//! submitted transaction can still be dropped or rejected by the oracle.

use super::case::{CaseStatus, TestCase};
use super::poll::{poll_until, Timings};
use super::Phase;
use crate::balance::{BalanceReader, BalanceVerifier};
use crate::chain::{ForeignClient, LedgerAuth, LedgerClient, SignedTransaction, TxReceipt};
use crate::config::{Accounts, ForeignAccount, Settings};
use crate::error::{E2eError, E2eResult};
use crate::order::selector::{self, OrderTarget};
use crate::order::{LedgerAddress, Order, OrderBookReader, OrderId};
use crate::tx::{SubmitterConfig, TransactionSubmitter};

use dashmap::DashSet;
use ethers::types::Address;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub submitter: SubmitterConfig,
    pub token_decimals: u32,
    pub timings: Timings,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> E2eResult<Self> {
        Ok(Self {
            submitter: SubmitterConfig {
                auth: LedgerAuth {
                    nickname: settings.auth.nickname.clone(),
                    passphrase: settings.auth.passphrase.clone(),
                },
                committee: settings.ledger.committee,
                fee: settings.ledger.fee,
                lock_deadline_blocks: settings.ledger.lock_deadline_blocks,
                token_contract: settings.token_contract()?,
            },
            token_decimals: settings.ethereum.token_decimals,
            timings: settings.timing.timings(),
        })
    }
}

/// Outcome of a bulk operation, one entry per attempted order
struct BulkReport {
    total: usize,
    failures: Vec<(OrderId, E2eError)>,
}

impl BulkReport {
    fn into_result(self, operation: &str) -> E2eResult<usize> {
        if self.failures.is_empty() {
            return Ok(self.total);
        }

        let details = self
            .failures
            .iter()
            .map(|(id, e)| format!("  order {}: {}", id, e))
            .collect::<Vec<_>>()
            .join("\n");

        Err(E2eError::Bulk {
            operation: operation.to_string(),
            failed: self.failures.len(),
            total: self.total,
            details,
        })
    }
}

pub struct Orchestrator {
    reader: OrderBookReader,
    submitter: TransactionSubmitter,
    balances: Arc<BalanceReader>,
    verifier: BalanceVerifier,
    accounts: Accounts,
    timings: Timings,
    /// Orders already bound to a case in this run
    claimed: DashSet<OrderId>,
    locks_sent: DashSet<OrderId>,
    closes_sent: DashSet<OrderId>,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        foreign: Arc<dyn ForeignClient>,
        config: OrchestratorConfig,
        accounts: Accounts,
    ) -> Self {
        let balances = Arc::new(BalanceReader::new(
            ledger.clone(),
            foreign.clone(),
            config.submitter.token_contract,
            config.token_decimals,
        ));
        let verifier = BalanceVerifier::new(
            balances.clone(),
            config.timings.settle_delay,
            config.token_decimals,
        );
        let reader = OrderBookReader::new(ledger.clone(), config.submitter.committee);

        Self {
            reader,
            submitter: TransactionSubmitter::new(ledger, foreign, config.submitter),
            balances,
            verifier,
            accounts,
            timings: config.timings,
            claimed: DashSet::new(),
            locks_sent: DashSet::new(),
            closes_sent: DashSet::new(),
        }
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Submit a sell order and log balances afterwards
    pub async fn create_order(
        &self,
        amount: u64,
        requested: u64,
        seller_receive: Address,
    ) -> E2eResult<TxReceipt> {
        let receipt = self
            .submitter
            .create_order(amount, requested, seller_receive)
            .await?;
        self.balances
            .log_balances("after order creation", &self.accounts)
            .await;
        Ok(receipt)
    }

    /// Lock one order, chosen by id or as the first unlocked order not already locked by us
    pub async fn lock_order(
        &self,
        target: &OrderTarget,
        buyer: &ForeignAccount,
        buyer_receive: &LedgerAddress,
    ) -> E2eResult<OrderId> {
        let books = self.reader.fetch().await?;
        let order = match target {
            OrderTarget::Id(id) => selector::by_id(&books, id)?,
            OrderTarget::First => {
                selector::first_unlocked(&books, |order| self.locks_sent.contains(&order.id))?
            }
        };

        self.lock_resolved(order, buyer, buyer_receive).await?;
        self.balances.log_balances("after lock", &self.accounts).await;
        Ok(order.id.clone())
    }

    /// Lock every unlocked order across all books
    pub async fn lock_all_unlocked(
        &self,
        buyer: &ForeignAccount,
        buyer_receive: &LedgerAddress,
    ) -> E2eResult<usize> {
        let books = self.reader.fetch().await?;
        let orders = selector::all_unlocked(&books)?;

        let report = self
            .run_bulk("lock", orders, |order| {
                self.lock_resolved(order, buyer, buyer_receive)
            })
            .await;
        self.balances.log_balances("after lock", &self.accounts).await;
        report.into_result("locking")
    }

    /// Close one locked order, chosen by id or as the first locked order not already closed by us
    pub async fn close_order(
        &self,
        target: &OrderTarget,
        buyer: &ForeignAccount,
        amount: u64,
    ) -> E2eResult<OrderId> {
        let books = self.reader.fetch().await?;
        let order = match target {
            OrderTarget::Id(id) => selector::by_id(&books, id)?,
            OrderTarget::First => {
                selector::first_locked(&books, |order| self.closes_sent.contains(&order.id))?
            }
        };

        if !order.is_locked() {
            return Err(E2eError::NotLocked {
                order_id: order.id.to_string(),
            });
        }

        self.submit_close_once(order, buyer, amount).await?;
        Ok(order.id.clone())
    }

    /// Close every locked order across all books
    pub async fn close_all_locked(&self, buyer: &ForeignAccount, amount: u64) -> E2eResult<usize> {
        let books = self.reader.fetch().await?;
        let orders = selector::all_locked(&books)?;

        self.run_bulk("close", orders, |order| async move {
            self.submit_close_once(order, buyer, amount).await.map(|_| ())
        })
        .await
        .into_result("closing")
    }

    /// Delete every order in every book, then wait for the deletes to land.
    ///
    /// Individual delete failures are logged and skipped; a failed book read is returned.
    pub async fn delete_all_orders(&self) -> E2eResult<usize> {
        let books = self.reader.fetch().await?;
        if books.is_empty() {
            info!("No existing orders to delete");
            return Ok(0);
        }

        let mut deleted = 0;
        for order in books.orders() {
            match self.submitter.delete_order(&order.id).await {
                Ok(_) => deleted += 1,
                Err(e) => warn!("Failed to delete order {}: {}", order.id, e),
            }
        }

        info!(
            "Deleted {}/{} orders, waiting {:?} for cleanup to settle",
            deleted,
            books.len(),
            self.timings.cleanup_settle
        );
        if deleted > 0 {
            tokio::time::sleep(self.timings.cleanup_settle).await;
        }
        Ok(deleted)
    }

    /// Drive one case from order creation to verified balances
    pub async fn run_case(&self, case: &mut TestCase) -> E2eResult<()> {
        let participants = case.participants.clone();
        let buyer = &participants.buyer;
        let seller = &participants.seller;

        let initial = self
            .balances
            .snapshot(buyer.address, seller.address, &participants.receiver)
            .await?;
        case.initial_balances = Some(initial.clone());

        info!(
            "[{}] Creating order: {} native for {} foreign",
            case.name, case.order_amount, case.expected_foreign_transfer
        );
        self.create_order(
            case.order_amount,
            case.expected_foreign_transfer,
            seller.address,
        )
        .await?;

        let order = self
            .await_created(
                case.order_amount,
                case.expected_foreign_transfer,
                seller.address,
            )
            .await?;
        case.bind_order_id(order.id.clone())?;
        info!("[{}] Order {} is on the book", case.name, order.id);

        self.lock_resolved(&order, buyer, &participants.receiver)
            .await?;
        self.balances.log_balances("after lock", &self.accounts).await;

        self.await_locked_and_close(case, &order.id).await?;

        self.await_completion(&order.id).await?;
        info!("[{}] Order {} settled", case.name, order.id);

        self.verifier
            .verify(
                &initial,
                buyer.address,
                seller.address,
                &participants.receiver,
                &case.expectation(),
            )
            .await?;
        case.advance(CaseStatus::Verified)?;
        info!("[{}] Balances verified", case.name);
        Ok(())
    }

    /// Wait for an unlocked order with these economics and payee that no other case has claimed
    pub async fn await_created(
        &self,
        amount: u64,
        requested: u64,
        seller_receive: Address,
    ) -> E2eResult<Order> {
        let reader = &self.reader;
        let claimed = &self.claimed;

        poll_until(
            self.timings.await_create,
            Phase::AwaitCreate,
            move || async move {
                let books = reader.fetch().await?;
                let found = selector::matching(&books, amount, requested, false)
                    .filter(|order| order.seller_receive_foreign() == seller_receive)
                    .find(|order| claimed.insert(order.id.clone()))
                    .cloned();
                Ok(found)
            },
        )
        .await
    }

    /// Wait until the case's order shows a lock, then pay and close it once
    pub async fn await_locked_and_close(
        &self,
        case: &mut TestCase,
        order_id: &OrderId,
    ) -> E2eResult<()> {
        let reader = &self.reader;
        let amount = case.order_amount;
        let requested = case.expected_foreign_transfer;

        let order = poll_until(
            self.timings.await_lock,
            Phase::AwaitLock,
            move || async move {
                let books = reader.fetch().await?;
                let found = selector::matching(&books, amount, requested, true)
                    .find(|order| &order.id == order_id)
                    .cloned();
                Ok(found)
            },
        )
        .await?;
        case.advance(CaseStatus::Locked)?;
        info!("[{}] Order {} is locked", case.name, order.id);

        self.submit_close_once(&order, &case.participants.buyer, requested)
            .await?;
        case.advance(CaseStatus::Closed)?;
        Ok(())
    }

    /// Wait for the order to leave every book
    pub async fn await_completion(&self, order_id: &OrderId) -> E2eResult<()> {
        let reader = &self.reader;

        poll_until(
            self.timings.await_completion,
            Phase::AwaitCompletion,
            move || async move {
                let books = reader.fetch().await?;
                match selector::by_id(&books, order_id) {
                    Ok(_) => Ok(None),
                    Err(e) if e.is_nothing_to_do() => Ok(Some(())),
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    async fn lock_resolved(
        &self,
        order: &Order,
        buyer: &ForeignAccount,
        buyer_receive: &LedgerAddress,
    ) -> E2eResult<()> {
        if order.is_locked() || !self.locks_sent.insert(order.id.clone()) {
            return Err(E2eError::AlreadyLocked {
                order_id: order.id.to_string(),
            });
        }

        if let Err(e) = self.submitter.lock_order(order, buyer, buyer_receive).await {
            self.locks_sent.remove(&order.id);
            return Err(e);
        }
        Ok(())
    }

    /// `None` when a close for this order was already sent in this run
    async fn submit_close_once(
        &self,
        order: &Order,
        buyer: &ForeignAccount,
        amount: u64,
    ) -> E2eResult<Option<SignedTransaction>> {
        if !self.closes_sent.insert(order.id.clone()) {
            debug!("Close for order {} already submitted", order.id);
            return Ok(None);
        }

        match self.submitter.close_order(order, buyer, amount).await {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => {
                self.closes_sent.remove(&order.id);
                Err(e)
            }
        }
    }

    /// Apply `f` to each order with the configured spacing; failures do not stop the batch
    async fn run_bulk<'a, F, Fut>(&self, kind: &str, orders: Vec<&'a Order>, f: F) -> BulkReport
    where
        F: Fn(&'a Order) -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        let total = orders.len();
        let mut failures = Vec::new();

        for (i, order) in orders.into_iter().enumerate() {
            if i > 0 && !self.timings.bulk_spacing.is_zero() {
                tokio::time::sleep(self.timings.bulk_spacing).await;
            }

            info!("{} order {}/{}: {}", kind, i + 1, total, order.id);
            match f(order).await {
                Ok(()) => debug!("{} of order {} submitted", kind, order.id),
                Err(e) => {
                    warn!("Failed to {} order {}: {}", kind, order.id, e);
                    failures.push((order.id.clone(), e));
                }
            }
        }

        BulkReport { total, failures }
    }
}
