use std::time::Duration;

use crate::chain::Chain;

/// Chain id of the AGRO test network.
pub const AGRO_TESTNET_CHAIN_ID: u64 = 3452;

/// Public JSON-RPC endpoint of the AGRO test network.
pub const AGRO_TESTNET_RPC_URL: &str = "https://rpc.agrotest.online/";

/// Timeout applied to each balance RPC attempt.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Retries after the first balance RPC attempt (total attempts = 4).
pub const DEFAULT_RPC_MAX_RETRIES: u32 = 3;

pub trait DefaultChain {
    fn agro_testnet() -> Self;
}

impl DefaultChain for Chain {
    fn agro_testnet() -> Self {
        Self {
            id: AGRO_TESTNET_CHAIN_ID,
            name: "AGRO Global".to_string(),
            rpc_url: AGRO_TESTNET_RPC_URL.to_string(),
            symbol: "AGRO".to_string(),
            decimals: 18,
        }
    }
}
