//! Native balance lookups over the chain's JSON-RPC endpoint.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::BalanceProvider;
use crate::chain::{Chain, SessionConfig};
use crate::error::BackendError;
use crate::snapshot::Balance;

/// [`BalanceProvider`] backed by `eth_getBalance` on the chain's RPC endpoint.
///
/// Transient failures (timeouts, connection errors, HTTP 429 and 5xx) are
/// retried with exponential backoff; JSON-RPC errors are not.
pub struct ChainRpcBalances {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl ChainRpcBalances {
    /// Builds a provider using the timeout and retry settings of `config`.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(config.rpc_timeout_ms),
            max_retries: config.rpc_max_retries,
        }
    }

    /// Calls a JSON-RPC method and returns its `result`.
    async fn call(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, BackendError> {
        if cfg!(not(test)) && !url.starts_with("https") {
            return Err(BackendError::rejected(format!(
                "refusing non-https rpc endpoint {url}"
            )));
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        let response = (|| self.send_once(url, &body))
            .retry(backoff)
            .when(RpcFailure::is_transient)
            .notify(|failure, delay| {
                log::debug!("retrying {method} in {delay:?}: {}", failure.error);
            })
            .await
            .map_err(BackendError::from)?;

        match (response.result, response.error) {
            (_, Some(error)) => Err(BackendError::rejected(format!(
                "{method} failed ({}): {}",
                error.code, error.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(BackendError::Network {
                url: url.to_string(),
                status: None,
                error: format!("{method} response carried neither result nor error"),
            }),
        }
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<RpcResponse, RpcFailure> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("agrokit-core/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(body)
            .send()
            .await
            .map_err(|err| RpcFailure {
                url: url.to_string(),
                status: None,
                transient: err.is_timeout() || err.is_connect(),
                error: format!("request failed: {err}"),
            })?;

        let status = response.status().as_u16();
        if status == 429 || (500..600).contains(&status) {
            return Err(RpcFailure {
                url: url.to_string(),
                status: Some(status),
                transient: true,
                error: format!("bad status code {status}"),
            });
        }
        if !response.status().is_success() {
            return Err(RpcFailure {
                url: url.to_string(),
                status: Some(status),
                transient: false,
                error: format!("bad status code {status}"),
            });
        }

        response.json::<RpcResponse>().await.map_err(|err| RpcFailure {
            url: url.to_string(),
            status: Some(status),
            transient: false,
            error: format!("malformed json-rpc response: {err}"),
        })
    }
}

#[async_trait::async_trait]
impl BalanceProvider for ChainRpcBalances {
    async fn query_balance(
        &self,
        chain: Chain,
        address: String,
    ) -> Result<Balance, BackendError> {
        let address = Address::from_str(address.trim())
            .map_err(|e| BackendError::rejected(format!("invalid address: {e}")))?;
        let scale = unit_scale(chain.decimals).ok_or_else(|| {
            BackendError::rejected(format!("unsupported decimals {}", chain.decimals))
        })?;

        let result = self
            .call(
                &chain.rpc_url,
                "eth_getBalance",
                json!([address.to_string(), "latest"]),
            )
            .await?;

        let hex = result.as_str().ok_or_else(|| {
            BackendError::rejected(format!("eth_getBalance returned {result}"))
        })?;
        let wei = U256::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|e| {
            BackendError::rejected(format!("eth_getBalance returned {hex}: {e}"))
        })?;

        Ok(Balance {
            amount: format_units(wei, scale, chain.decimals),
            symbol: chain.symbol,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug)]
struct RpcFailure {
    url: String,
    status: Option<u16>,
    error: String,
    transient: bool,
}

impl RpcFailure {
    const fn is_transient(&self) -> bool {
        self.transient
    }
}

impl From<RpcFailure> for BackendError {
    fn from(value: RpcFailure) -> Self {
        Self::Network {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

/// `10^decimals`, or `None` past 77 decimals where it no longer fits a `U256`.
fn unit_scale(decimals: u8) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(decimals))
}

/// Renders an integer amount of base units as a decimal string with trailing
/// zeros removed (`1500000000000000000` at 18 decimals is `"1.5"`).
fn format_units(amount: U256, scale: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let whole = amount / scale;
    let fraction = (amount % scale).to_string();
    let fraction = format!("{fraction:0>width$}", width = usize::from(decimals));
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}
