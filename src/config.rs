//! Configuration management for the lifecycle tester
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{E2eError, E2eResult};
use crate::lifecycle::{PollPolicy, Timings};
use crate::order::LedgerAddress;

use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "ORACLE_E2E_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Places a BLS key file is looked for when the configured path is missing
const KEYS_FILE_CANDIDATES: [&str; 3] = [
    "keys/node-bls.json",
    "../keys/node-bls.json",
    "../../keys/node-bls.json",
];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ledger: LedgerConfig,
    pub ethereum: EthereumConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub admin_rpc_url: String,
    #[serde(default = "default_committee")]
    pub committee: u64,
    #[serde(default = "default_fee")]
    pub fee: u64,
    #[serde(default = "default_lock_deadline_blocks")]
    pub lock_deadline_blocks: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthereumConfig {
    pub rpc_urls: Vec<String>,
    pub token_contract: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub nickname: String,
    pub passphrase: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignAccountConfig {
    pub address: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_foreign_accounts")]
    pub foreign: Vec<ForeignAccountConfig>,
    /// Used when no key file can be read
    #[serde(default = "default_ledger_accounts")]
    pub ledger: Vec<String>,
    pub keys_file: Option<PathBuf>,
}

/// Poll intervals are in milliseconds, timeouts and delays in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub create_poll_interval_ms: u64,
    pub create_timeout_secs: u64,
    pub lock_poll_interval_ms: u64,
    pub lock_timeout_secs: u64,
    pub completion_poll_interval_ms: u64,
    pub completion_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub cleanup_settle_secs: u64,
    pub bulk_spacing_ms: u64,
    pub suite_poll_interval_ms: u64,
    pub suite_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseConfig {
    pub name: String,
    pub order_amount: u64,
    pub expected_foreign_transfer: u64,
    pub expected_native_transfer: u64,
    /// Index into `accounts.foreign`
    pub buyer: usize,
    /// Index into `accounts.foreign`
    pub seller: usize,
    /// Index into the resolved ledger accounts
    pub receiver: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_cases")]
    pub cases: Vec<CaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_committee() -> u64 {
    2
}

fn default_fee() -> u64 {
    100_000
}

fn default_lock_deadline_blocks() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

const MAX_TOKEN_DECIMALS: u32 = 77;

fn default_token_decimals() -> u32 {
    6
}

fn default_metrics_port() -> u16 {
    9464
}

/// Well-known development accounts of a local EVM node
fn default_foreign_accounts() -> Vec<ForeignAccountConfig> {
    [
        (
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ),
        (
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
            "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        ),
        (
            "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
            "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
        ),
    ]
    .into_iter()
    .map(|(address, key)| ForeignAccountConfig {
        address: address.to_string(),
        private_key: key.to_string(),
    })
    .collect()
}

fn default_ledger_accounts() -> Vec<String> {
    vec![
        "02cd4e5eb53ea665702042a6ed6d31d616054dc5".to_string(),
        "851e90eaef1fa27debaee2c2591503bdeec1d123".to_string(),
    ]
}

fn default_cases() -> Vec<CaseConfig> {
    vec![CaseConfig {
        name: "BasicOrderFlow_1000USDC".to_string(),
        order_amount: 1_000_000,
        expected_foreign_transfer: 1_000_000,
        expected_native_transfer: 1_000_000,
        buyer: 0,
        seller: 1,
        receiver: 1,
    }]
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            foreign: default_foreign_accounts(),
            ledger: default_ledger_accounts(),
            keys_file: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            create_poll_interval_ms: 1_000,
            create_timeout_secs: 60,
            lock_poll_interval_ms: 1_000,
            lock_timeout_secs: 180,
            completion_poll_interval_ms: 2_000,
            completion_timeout_secs: 120,
            settle_delay_secs: 5,
            cleanup_settle_secs: 10,
            bulk_spacing_ms: 1_000,
            suite_poll_interval_ms: 1_000,
            suite_timeout_secs: 300,
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            cases: default_cases(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl TimingConfig {
    pub fn timings(&self) -> Timings {
        Timings {
            await_create: PollPolicy::new(
                Duration::from_millis(self.create_poll_interval_ms),
                Duration::from_secs(self.create_timeout_secs),
            ),
            await_lock: PollPolicy::new(
                Duration::from_millis(self.lock_poll_interval_ms),
                Duration::from_secs(self.lock_timeout_secs),
            ),
            await_completion: PollPolicy::new(
                Duration::from_millis(self.completion_poll_interval_ms),
                Duration::from_secs(self.completion_timeout_secs),
            ),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            cleanup_settle: Duration::from_secs(self.cleanup_settle_secs),
            bulk_spacing: Duration::from_millis(self.bulk_spacing_ms),
            suite: PollPolicy::new(
                Duration::from_millis(self.suite_poll_interval_ms),
                Duration::from_secs(self.suite_timeout_secs),
            ),
        }
    }
}

/// A foreign account with its signing key
#[derive(Clone)]
pub struct ForeignAccount {
    pub address: Address,
    pub private_key: String,
}

impl std::fmt::Debug for ForeignAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Accounts available to commands and test cases
#[derive(Debug, Clone)]
pub struct Accounts {
    pub foreign: Vec<ForeignAccount>,
    pub ledger: Vec<LedgerAddress>,
}

#[derive(Debug, Deserialize)]
struct BlsKey {
    address: String,
}

#[derive(Debug, Deserialize)]
struct BlsKeyFile {
    keys: Vec<BlsKey>,
}

impl AccountsConfig {
    /// Resolve foreign accounts and ledger addresses, preferring the BLS key file
    pub fn resolve(&self) -> E2eResult<Accounts> {
        let foreign = self
            .foreign
            .iter()
            .map(|account| -> E2eResult<ForeignAccount> {
                let address = account.address.parse::<Address>().map_err(|e| {
                    E2eError::Config(format!("Invalid foreign address {}: {}", account.address, e))
                })?;
                Ok(ForeignAccount {
                    address,
                    private_key: account.private_key.clone(),
                })
            })
            .collect::<E2eResult<Vec<_>>>()?;

        let ledger = match self.load_keys_file() {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(
                    "Failed to load ledger accounts from key file: {}; using fallback addresses",
                    e
                );
                self.ledger
                    .iter()
                    .map(|a| a.parse::<LedgerAddress>())
                    .collect::<E2eResult<Vec<_>>>()?
            }
        };

        if foreign.is_empty() || ledger.is_empty() {
            return Err(E2eError::Config(
                "At least one foreign and one ledger account are required".to_string(),
            ));
        }

        Ok(Accounts { foreign, ledger })
    }

    fn load_keys_file(&self) -> E2eResult<Vec<LedgerAddress>> {
        let path = self
            .keys_file
            .iter()
            .cloned()
            .chain(KEYS_FILE_CANDIDATES.iter().map(PathBuf::from))
            .find(|p| p.exists())
            .ok_or_else(|| E2eError::Config("no BLS key file found".to_string()))?;

        read_keys_file(&path)
    }
}

fn read_keys_file(path: &Path) -> E2eResult<Vec<LedgerAddress>> {
    let data = std::fs::read_to_string(path)?;
    let file: BlsKeyFile = serde_json::from_str(&data).map_err(|e| {
        E2eError::Config(format!("Failed to parse BLS keys at {}: {}", path.display(), e))
    })?;

    if file.keys.is_empty() {
        return Err(E2eError::Config(format!(
            "No ledger accounts found in {}",
            path.display()
        )));
    }

    file.keys.iter().map(|k| k.address.parse()).collect()
}

impl Settings {
    /// Load settings from an explicit path, `ORACLE_E2E_CONFIG`, or the default location
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
            E2eError::Config(format!(
                "Failed to read config file {:?}: {}",
                config_path, e
            ))
        })?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text after substituting `${VAR}` placeholders
    pub fn from_toml(input: &str) -> E2eResult<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings = toml::from_str(&config_str)
            .map_err(|e| E2eError::Config(format!("Failed to parse configuration: {}", e)))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> E2eResult<()> {
        if self.auth.nickname.is_empty() || self.auth.passphrase.is_empty() {
            return Err(E2eError::Config(
                "auth.nickname and auth.passphrase must be set (E2E_FROM_NICK / E2E_FROM_PASS)"
                    .to_string(),
            ));
        }

        if self.ethereum.rpc_urls.iter().all(|u| u.is_empty()) {
            return Err(E2eError::Config(
                "ethereum.rpc_urls must contain an endpoint (ETH_RPC_URL)".to_string(),
            ));
        }

        self.token_contract()?;

        // 10^78 no longer fits in a U256
        if self.ethereum.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(E2eError::Config(format!(
                "ethereum.token_decimals must be at most {}, got {}",
                MAX_TOKEN_DECIMALS, self.ethereum.token_decimals
            )));
        }

        let t = &self.timing;
        if t.create_poll_interval_ms == 0
            || t.lock_poll_interval_ms == 0
            || t.completion_poll_interval_ms == 0
            || t.suite_poll_interval_ms == 0
        {
            return Err(E2eError::Config(
                "Poll intervals must be non-zero".to_string(),
            ));
        }

        let foreign_accounts = self.accounts.foreign.len();
        for case in &self.suite.cases {
            if case.buyer >= foreign_accounts || case.seller >= foreign_accounts {
                return Err(E2eError::Config(format!(
                    "Case {} references a foreign account that is not configured",
                    case.name
                )));
            }
        }

        Ok(())
    }

    /// Token contract as an address
    pub fn token_contract(&self) -> E2eResult<Address> {
        let raw = self.ethereum.token_contract.trim();
        if raw.is_empty() {
            return Err(E2eError::Config(
                "ethereum.token_contract must be set (USDC_CONTRACT)".to_string(),
            ));
        }
        let hex = raw.strip_prefix("0x").unwrap_or(raw);
        format!("0x{}", hex)
            .parse::<Address>()
            .map_err(|e| E2eError::Config(format!("Invalid token contract {}: {}", raw, e)))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref VAR: regex::Regex = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .expect("static pattern");
    }

    VAR.replace_all(input, |cap: &regex::Captures| {
        env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}
