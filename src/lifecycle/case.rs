//! Test case run state

use crate::balance::{BalanceSnapshot, Expectation};
use crate::config::ForeignAccount;
use crate::error::{E2eError, E2eResult};
use crate::order::{LedgerAddress, OrderId};

use std::fmt;

/// Ordered so that a case's status can only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CaseStatus {
    Created,
    Locked,
    Closed,
    Verified,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaseStatus::Created => "created",
            CaseStatus::Locked => "locked",
            CaseStatus::Closed => "closed",
            CaseStatus::Verified => "verified",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Participants {
    /// Pays foreign tokens and receives native tokens at `receiver`
    pub buyer: ForeignAccount,
    /// Receives foreign tokens
    pub seller: ForeignAccount,
    pub receiver: LedgerAddress,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub order_amount: u64,
    pub expected_foreign_transfer: u64,
    pub expected_native_transfer: u64,
    pub participants: Participants,
    status: CaseStatus,
    order_id: Option<OrderId>,
    pub initial_balances: Option<BalanceSnapshot>,
    pub error: Option<String>,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        order_amount: u64,
        expected_foreign_transfer: u64,
        expected_native_transfer: u64,
        participants: Participants,
    ) -> Self {
        Self {
            name: name.into(),
            order_amount,
            expected_foreign_transfer,
            expected_native_transfer,
            participants,
            status: CaseStatus::Created,
            order_id: None,
            initial_balances: None,
            error: None,
        }
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn expectation(&self) -> Expectation {
        Expectation {
            foreign_transfer: self.expected_foreign_transfer,
            native_transfer: self.expected_native_transfer,
        }
    }

    /// Move the status forward; staying put is allowed, going back is not
    pub fn advance(&mut self, to: CaseStatus) -> E2eResult<()> {
        if to < self.status {
            return Err(E2eError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Record the ledger-assigned id; a case is bound to one order for life
    pub fn bind_order_id(&mut self, id: OrderId) -> E2eResult<()> {
        match &self.order_id {
            Some(bound) if *bound != id => Err(E2eError::OrderIdRebind {
                bound: bound.to_string(),
                attempted: id.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.order_id = Some(id);
                Ok(())
            }
        }
    }
}
