//! Lock and close intents carried in foreign transaction data
//!
//! The ledger's oracle watches the foreign chain and decodes these JSON
//! documents, so the field names are a fixed wire contract. Byte fields are
//! lowercase hex without a prefix.

use crate::error::{E2eError, E2eResult};

use serde::{Deserialize, Serialize};

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

/// Reserves a sell order for a buyer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockIntent {
    #[serde(rename = "orderID", with = "hex_bytes")]
    pub order_id: Vec<u8>,
    #[serde(rename = "chainID")]
    pub chain_id: u64,
    #[serde(with = "hex_bytes")]
    pub buyer_receive_address: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub buyer_send_address: Vec<u8>,
    pub buyer_chain_deadline: u64,
}

/// Finalizes a locked order; appended after the token transfer call data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseIntent {
    #[serde(rename = "orderID", with = "hex_bytes")]
    pub order_id: Vec<u8>,
    #[serde(rename = "chainID")]
    pub chain_id: u64,
    #[serde(rename = "closeOrder")]
    pub close_order: bool,
}

impl LockIntent {
    pub fn encode(&self) -> E2eResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| E2eError::Encode(format!("lock intent: {}", e)))
    }

    #[cfg(test)]
    pub fn decode(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

impl CloseIntent {
    pub fn new(order_id: Vec<u8>, chain_id: u64) -> Self {
        Self {
            order_id,
            chain_id,
            close_order: true,
        }
    }

    pub fn encode(&self) -> E2eResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| E2eError::Encode(format!("close intent: {}", e)))
    }

    /// Only documents that actually request a close are accepted
    #[cfg(test)]
    pub fn decode(data: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(data)
            .ok()
            .filter(|intent| intent.close_order)
    }
}
