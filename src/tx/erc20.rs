//! ERC20 call data for the settlement token

use crate::error::{E2eError, E2eResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::id;

/// Selector plus two ABI words
#[cfg(test)]
pub const TRANSFER_CALLDATA_LEN: usize = 4 + 32 + 32;

pub fn transfer_selector() -> [u8; 4] {
    id("transfer(address,uint256)")
}

pub fn balance_of_selector() -> [u8; 4] {
    id("balanceOf(address)")
}

pub fn total_supply_selector() -> [u8; 4] {
    id("totalSupply()")
}

pub fn transfer_calldata(to: Address, amount: U256) -> Vec<u8> {
    let mut data = transfer_selector().to_vec();
    data.extend(abi::encode(&[Token::Address(to), Token::Uint(amount)]));
    data
}

pub fn balance_of_calldata(owner: Address) -> Vec<u8> {
    let mut data = balance_of_selector().to_vec();
    data.extend(abi::encode(&[Token::Address(owner)]));
    data
}

pub fn total_supply_calldata() -> Vec<u8> {
    total_supply_selector().to_vec()
}

/// Decode a single `uint256` return value
pub fn decode_uint(output: &[u8]) -> E2eResult<U256> {
    let tokens = abi::decode(&[ParamType::Uint(256)], output)
        .map_err(|e| E2eError::Decode(format!("uint256 return value: {}", e)))?;
    match tokens.first() {
        Some(Token::Uint(value)) => Ok(*value),
        other => Err(E2eError::Decode(format!(
            "unexpected return token {:?}",
            other
        ))),
    }
}

/// Split call data into a `transfer` call and whatever bytes follow it
#[cfg(test)]
pub fn decode_transfer(data: &[u8]) -> Option<(Address, U256, &[u8])> {
    if data.len() < TRANSFER_CALLDATA_LEN || data[..4] != transfer_selector() {
        return None;
    }
    let tokens = abi::decode(
        &[ParamType::Address, ParamType::Uint(256)],
        &data[4..TRANSFER_CALLDATA_LEN],
    )
    .ok()?;
    match tokens.as_slice() {
        [Token::Address(to), Token::Uint(amount)] => {
            Some((*to, *amount, &data[TRANSFER_CALLDATA_LEN..]))
        }
        _ => None,
    }
}
