//! Transaction construction and submission for both chains

pub mod erc20;
mod gas;
mod nonce;
pub mod payload;
mod sender;
mod submitter;

pub use submitter::{SubmitterConfig, TransactionSubmitter};
