//! Chain and session configuration.

use serde::{Deserialize, Serialize};

use crate::defaults::{DefaultChain, DEFAULT_RPC_MAX_RETRIES, DEFAULT_RPC_TIMEOUT};
use crate::error::SessionError;

/// An EVM chain whose native balance the wallet shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Chain {
    /// EIP-155 chain id.
    pub id: u64,
    /// Display name of the native currency.
    pub name: String,
    /// JSON-RPC endpoint. Must be `https`.
    pub rpc_url: String,
    /// Native currency symbol.
    pub symbol: String,
    /// Native currency decimals.
    pub decimals: u8,
}

impl Default for Chain {
    fn default() -> Self {
        Self::agro_testnet()
    }
}

/// Settings for a [`SessionController`](crate::SessionController).
///
/// Every field is optional in JSON; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct SessionConfig {
    /// Chain used for balance queries.
    pub chain: Chain,
    /// Per-attempt timeout of balance RPC calls, in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Retries after the first failed balance RPC attempt.
    pub rpc_max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chain: Chain::default(),
            rpc_timeout_ms: u64::try_from(DEFAULT_RPC_TIMEOUT.as_millis()).unwrap_or(5_000),
            rpc_max_retries: DEFAULT_RPC_MAX_RETRIES,
        }
    }
}

impl SessionConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidInput`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json)
            .map_err(|e| SessionError::invalid_input("config", e.to_string()))
    }
}

/// Default configuration: AGRO test network, 5 s RPC timeout, 3 retries.
#[uniffi::export]
#[must_use]
pub fn default_session_config() -> SessionConfig {
    SessionConfig::default()
}

/// Parses a [`SessionConfig`] from JSON.
///
/// # Errors
/// Returns [`SessionError::InvalidInput`] if the JSON is malformed.
#[uniffi::export]
pub fn session_config_from_json(json: &str) -> Result<SessionConfig, SessionError> {
    SessionConfig::from_json(json)
}
