//! Gas limits and prices for foreign transactions

use crate::chain::ForeignClient;
use crate::error::E2eResult;

use ethers::types::U256;
use tracing::debug;

/// Plain value transfer
const BASE_GAS_LIMIT: u64 = 21_000;
/// Any transaction carrying call data
const DATA_GAS_LIMIT: u64 = 100_000;

/// Gas estimator for transactions
pub struct GasEstimator {
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self {
            gas_price_buffer_percent: 10,
        }
    }

    pub fn gas_limit(&self, data: &[u8]) -> U256 {
        if data.is_empty() {
            U256::from(BASE_GAS_LIMIT)
        } else {
            U256::from(DATA_GAS_LIMIT)
        }
    }

    /// Node-suggested legacy gas price plus the buffer
    pub async fn gas_price(&self, client: &dyn ForeignClient) -> E2eResult<U256> {
        let price = client.suggested_gas_price().await?;
        let buffered = price + price * self.gas_price_buffer_percent / 100u64;
        debug!("Foreign gas price {} (suggested {})", buffered, price);
        Ok(buffered)
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockForeignClient;

    #[test]
    fn test_gas_limit_depends_on_data() {
        let gas = GasEstimator::new();
        assert_eq!(gas.gas_limit(&[]), U256::from(21_000u64));
        assert_eq!(gas.gas_limit(b"{}"), U256::from(100_000u64));
    }

    #[tokio::test]
    async fn test_gas_price_is_buffered() {
        let mut client = MockForeignClient::new();
        client
            .expect_suggested_gas_price()
            .returning(|| Ok(U256::from(1_000u64)));
        let price = GasEstimator::new().gas_price(&client).await.unwrap();
        assert_eq!(price, U256::from(1_100u64));
    }
}
