//! Selection predicates over an order-book snapshot
//!
//! Every function is pure over the snapshot it is handed. The bulk selections
//! fail with `NotFound` when nothing matches, so callers that treat an empty
//! book as "nothing to do" must check [`E2eError::is_nothing_to_do`].

use super::{Order, OrderBooks, OrderId};
use crate::error::{E2eError, E2eResult};

/// Which orders a caller wants to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTarget {
    Id(OrderId),
    First,
}

impl std::str::FromStr for OrderTarget {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" | "auto" => Ok(OrderTarget::First),
            other => Ok(OrderTarget::Id(other.parse()?)),
        }
    }
}

pub fn by_id<'a>(books: &'a OrderBooks, id: &OrderId) -> E2eResult<&'a Order> {
    books
        .orders()
        .find(|order| &order.id == id)
        .ok_or_else(|| E2eError::NotFound(format!("order {} not found", id)))
}

/// First unlocked order that `skip` does not reject
pub fn first_unlocked<'a>(
    books: &'a OrderBooks,
    skip: impl Fn(&Order) -> bool,
) -> E2eResult<&'a Order> {
    books
        .orders()
        .find(|order| !order.is_locked() && !skip(order))
        .ok_or_else(|| E2eError::NotFound("no unlocked orders found".to_string()))
}

/// First locked order that `skip` does not reject
pub fn first_locked<'a>(
    books: &'a OrderBooks,
    skip: impl Fn(&Order) -> bool,
) -> E2eResult<&'a Order> {
    books
        .orders()
        .find(|order| order.is_locked() && !skip(order))
        .ok_or_else(|| E2eError::NotFound("no locked orders found".to_string()))
}

pub fn all_unlocked(books: &OrderBooks) -> E2eResult<Vec<&Order>> {
    let orders: Vec<_> = books.orders().filter(|order| !order.is_locked()).collect();
    if orders.is_empty() {
        return Err(E2eError::NotFound("no unlocked orders found".to_string()));
    }
    Ok(orders)
}

pub fn all_locked(books: &OrderBooks) -> E2eResult<Vec<&Order>> {
    let orders: Vec<_> = books.orders().filter(|order| order.is_locked()).collect();
    if orders.is_empty() {
        return Err(E2eError::NotFound("no locked orders found".to_string()));
    }
    Ok(orders)
}

/// Orders with the given economics and lock state, in iteration order
pub fn matching<'a>(
    books: &'a OrderBooks,
    amount_for_sale: u64,
    requested_amount: u64,
    locked: bool,
) -> impl Iterator<Item = &'a Order> {
    books.orders().filter(move |order| {
        order.is_locked() == locked && order.matches_amounts(amount_for_sale, requested_amount)
    })
}
