//! JSON shapes returned by the ledger's order query
//!
//! Byte fields arrive as bare hex strings. An absent, null or empty
//! `buyerSendAddress` all mean the order is unlocked.

use super::{LockState, Order, OrderBook, OrderBooks, OrderId};
use crate::error::{E2eError, E2eResult};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOrderBooks {
    #[serde(default)]
    pub order_books: Option<Vec<WireOrderBook>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireOrderBook {
    #[serde(rename = "chainID", alias = "chainId", default)]
    pub chain_id: u64,
    #[serde(default)]
    pub orders: Option<Vec<WireSellOrder>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSellOrder {
    pub id: String,
    #[serde(default)]
    pub committee: u64,
    #[serde(default)]
    pub amount_for_sale: u64,
    #[serde(default)]
    pub requested_amount: u64,
    #[serde(default)]
    pub seller_receive_address: Option<String>,
    #[serde(default)]
    pub buyer_send_address: Option<String>,
    #[serde(default)]
    pub buyer_receive_address: Option<String>,
    #[serde(default)]
    pub buyer_chain_deadline: u64,
}

fn hex_field(name: &str, value: Option<&str>) -> E2eResult<Vec<u8>> {
    let value = value.unwrap_or_default();
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| E2eError::Decode(format!("invalid hex in {}: {}", name, e)))
}

impl TryFrom<WireSellOrder> for Order {
    type Error = E2eError;

    fn try_from(wire: WireSellOrder) -> E2eResult<Self> {
        let id: OrderId = wire.id.parse()?;
        let buyer_send_address = hex_field("buyerSendAddress", wire.buyer_send_address.as_deref())?;

        let lock = if buyer_send_address.is_empty() {
            LockState::Unlocked
        } else {
            LockState::Locked {
                buyer_send_address,
                buyer_receive_address: hex_field(
                    "buyerReceiveAddress",
                    wire.buyer_receive_address.as_deref(),
                )?,
                deadline: wire.buyer_chain_deadline,
            }
        };

        Ok(Order {
            id,
            committee: wire.committee,
            amount_for_sale: wire.amount_for_sale,
            requested_amount: wire.requested_amount,
            seller_receive_address: hex_field(
                "sellerReceiveAddress",
                wire.seller_receive_address.as_deref(),
            )?,
            lock,
        })
    }
}

impl TryFrom<WireOrderBooks> for OrderBooks {
    type Error = E2eError;

    fn try_from(wire: WireOrderBooks) -> E2eResult<Self> {
        let books = wire
            .order_books
            .unwrap_or_default()
            .into_iter()
            .map(|book| -> E2eResult<OrderBook> {
                let orders = book
                    .orders
                    .unwrap_or_default()
                    .into_iter()
                    .map(Order::try_from)
                    .collect::<E2eResult<Vec<_>>>()?;
                Ok(OrderBook {
                    committee: book.chain_id,
                    orders,
                })
            })
            .collect::<E2eResult<Vec<_>>>()?;

        Ok(OrderBooks { books })
    }
}
