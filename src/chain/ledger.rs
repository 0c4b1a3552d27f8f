//! HTTP client for the source ledger's query and admin RPC

use super::{Chain, CreateOrder, LedgerAuth, LedgerClient, TxReceipt};
use crate::config::LedgerConfig;
use crate::error::{E2eError, E2eResult};
use crate::order::wire::WireOrderBooks;
use crate::order::{LedgerAddress, OrderBooks, OrderId};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const HEIGHT_PATH: &str = "/v1/query/height";
const ORDERS_PATH: &str = "/v1/query/orders";
const ACCOUNT_PATH: &str = "/v1/query/account";
const CREATE_ORDER_PATH: &str = "/v1/admin/tx-create-order";
const DELETE_ORDER_PATH: &str = "/v1/admin/tx-delete-order";

#[derive(Serialize)]
struct HeightQuery {}

#[derive(Serialize)]
struct OrdersQuery {
    height: u64,
    committee: u64,
}

#[derive(Serialize)]
struct AccountQuery<'a> {
    height: u64,
    address: &'a str,
}

#[derive(Deserialize)]
struct HeightResponse {
    height: u64,
}

#[derive(Deserialize)]
struct AccountResponse {
    #[serde(default)]
    amount: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    nickname: &'a str,
    password: &'a str,
    amount: u64,
    receive_amount: u64,
    committees: String,
    receive_address: String,
    data: String,
    fee: u64,
    submit: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOrderRequest<'a> {
    nickname: &'a str,
    password: &'a str,
    order_id: String,
    committees: String,
    fee: u64,
    submit: bool,
}

/// Ledger RPC over HTTP
pub struct LedgerRpcClient {
    client: reqwest::Client,
    rpc_url: String,
    admin_rpc_url: String,
}

impl LedgerRpcClient {
    pub fn new(config: &LedgerConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| E2eError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.trim_end_matches('/').to_string(),
            admin_rpc_url: config.admin_rpc_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, base: &str, path: &str, body: &B) -> Result<T, String>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", base, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("POST {} failed: {}", url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("POST {} returned {}: {}", url, status, error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| format!("POST {} returned malformed body: {}", url, e))
    }

    async fn query<B, T>(&self, path: &str, body: &B) -> E2eResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        self.post(&self.rpc_url, path, body)
            .await
            .map_err(|e| E2eError::rpc(Chain::Ledger, e))
    }

    async fn submit<B: Serialize + Sync>(&self, path: &str, body: &B) -> E2eResult<TxReceipt> {
        let value: serde_json::Value = self
            .post(&self.admin_rpc_url, path, body)
            .await
            .map_err(|e| E2eError::submission(Chain::Ledger, e))?;

        // a submitted transaction answers with its hash as a bare JSON string
        let hash = match value {
            serde_json::Value::String(hash) => hash,
            other => other.to_string(),
        };
        debug!("Ledger accepted transaction {}", hash);
        Ok(TxReceipt { hash })
    }
}

#[async_trait]
impl LedgerClient for LedgerRpcClient {
    async fn height(&self) -> E2eResult<u64> {
        let response: HeightResponse = self.query(HEIGHT_PATH, &HeightQuery {}).await?;
        Ok(response.height)
    }

    async fn order_books(&self, committee: u64) -> E2eResult<OrderBooks> {
        let wire: WireOrderBooks = self
            .query(ORDERS_PATH, &OrdersQuery { height: 0, committee })
            .await?;
        OrderBooks::try_from(wire)
    }

    async fn account_balance(&self, address: &LedgerAddress) -> E2eResult<u64> {
        let address = address.to_string();
        let response: AccountResponse = self
            .query(
                ACCOUNT_PATH,
                &AccountQuery {
                    height: 0,
                    address: &address,
                },
            )
            .await?;
        Ok(response.amount)
    }

    async fn create_order(&self, auth: &LedgerAuth, order: &CreateOrder) -> E2eResult<TxReceipt> {
        let request = CreateOrderRequest {
            nickname: &auth.nickname,
            password: &auth.passphrase,
            amount: order.sell_amount,
            receive_amount: order.receive_amount,
            committees: order.committee.to_string(),
            receive_address: hex::encode(order.receive_address.as_bytes()),
            data: hex::encode(&order.data),
            fee: order.fee,
            submit: true,
        };
        self.submit(CREATE_ORDER_PATH, &request).await
    }

    async fn delete_order(
        &self,
        auth: &LedgerAuth,
        order_id: &OrderId,
        committee: u64,
        fee: u64,
    ) -> E2eResult<TxReceipt> {
        let request = DeleteOrderRequest {
            nickname: &auth.nickname,
            password: &auth.passphrase,
            order_id: order_id.to_string(),
            committees: committee.to_string(),
            fee,
            submit: true,
        };
        self.submit(DELETE_ORDER_PATH, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    #[test]
    fn test_create_order_request_shape() {
        let request = CreateOrderRequest {
            nickname: "nick-0",
            password: "test",
            amount: 1_000_000,
            receive_amount: 1_000_000,
            committees: 2.to_string(),
            receive_address: hex::encode(Address::from([0x70u8; 20]).as_bytes()),
            data: hex::encode([0xabu8, 0xcd]),
            fee: 100_000,
            submit: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["receiveAmount"], 1_000_000);
        assert_eq!(json["committees"], "2");
        assert_eq!(json["receiveAddress"], "70".repeat(20));
        assert_eq!(json["data"], "abcd");
        assert_eq!(json["submit"], true);
    }

    #[test]
    fn test_delete_order_request_shape() {
        let request = DeleteOrderRequest {
            nickname: "nick-0",
            password: "test",
            order_id: OrderId::new(vec![0x0a, 0x0b]).to_string(),
            committees: "2".to_string(),
            fee: 100_000,
            submit: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["orderId"], "0a0b");
        assert_eq!(json["fee"], 100_000);
    }

    #[test]
    fn test_account_response_defaults_missing_amount() {
        let response: AccountResponse = serde_json::from_str(r#"{"address":"ab"}"#).unwrap();
        assert_eq!(response.amount, 0);
    }
}
