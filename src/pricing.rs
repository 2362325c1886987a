//! Price Lookup - DefiLlama coins API
//!
//! Resolves current USD prices for a set of token addresses in one call.
//! Every requested address is expected back; the TVL aggregator treats a
//! missing entry as fatal, so no fallback price is ever invented here.
//!
//! API: https://coins.llama.fi/prices/current/arbitrum:0x...,arbitrum:0x...

use eyre::{Result, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::AggregatorError;

// ============================================
// CONSTANTS
// ============================================

/// DefiLlama coins API base URL
pub const DEFAULT_PRICE_API_URL: &str = "https://coins.llama.fi";

/// Timeout for API calls
pub const DEFAULT_PRICE_TIMEOUT_SECS: u64 = 10;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct CoinsResponse {
    #[serde(default)]
    coins: HashMap<String, TokenPrice>,
}

/// Current price of one token
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPrice {
    /// USD price
    pub price: f64,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub timestamp: Option<u64>,
    pub confidence: Option<f64>,
}

impl TokenPrice {
    pub fn usd(price: f64) -> Self {
        Self {
            price,
            symbol: None,
            decimals: None,
            timestamp: None,
            confidence: None,
        }
    }
}

/// Lowercase token address -> price
pub type PriceMap = HashMap<String, TokenPrice>;

// ============================================
// PRICE SOURCE
// ============================================

/// Anything that can price a batch of tokens
#[allow(async_fn_in_trait)]
pub trait PriceSource {
    /// Prices keyed by lowercase address
    async fn get_prices(&self, addresses: &[String]) -> Result<PriceMap>;
}

/// DefiLlama-backed price lookup
pub struct LlamaPriceOracle {
    http_client: Client,
    base_url: String,
    chain: String,
}

impl LlamaPriceOracle {
    pub fn new(base_url: String, chain: String, timeout_secs: u64) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain,
        })
    }

    /// `{base}/prices/current/{chain}:{addr},...`
    fn request_url(&self, addresses: &[String]) -> String {
        let coins = addresses
            .iter()
            .map(|a| format!("{}:{}", self.chain, a.to_lowercase()))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}/prices/current/{}", self.base_url, coins)
    }

    /// Strip the `{chain}:` prefix and lowercase what is left
    fn normalize(&self, coins: HashMap<String, TokenPrice>) -> PriceMap {
        coins
            .into_iter()
            .map(|(key, price)| {
                let address = key
                    .split_once(':')
                    .map(|(_, addr)| addr)
                    .unwrap_or(&key)
                    .to_lowercase();
                (address, price)
            })
            .collect()
    }
}

impl PriceSource for LlamaPriceOracle {
    async fn get_prices(&self, addresses: &[String]) -> Result<PriceMap> {
        if addresses.is_empty() {
            return Ok(PriceMap::new());
        }

        let url = self.request_url(addresses);
        trace!("Price request: {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AggregatorError::PriceApi(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::PriceApi(format!("HTTP {}", status)).into());
        }

        let body: CoinsResponse = response
            .json()
            .await
            .map_err(|e| AggregatorError::PriceApi(e.to_string()))?;

        let prices = self.normalize(body.coins);
        debug!("💲 Priced {}/{} tokens", prices.len(), addresses.len());

        Ok(prices)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> LlamaPriceOracle {
        LlamaPriceOracle::new(
            "https://coins.llama.fi/".to_string(),
            "arbitrum".to_string(),
            DEFAULT_PRICE_TIMEOUT_SECS,
        )
        .unwrap()
    }

    #[test]
    fn test_request_url_lowercases_and_prefixes_chain() {
        let url = oracle().request_url(&[
            "0xAAA".to_string(),
            "0xbbb".to_string(),
        ]);
        assert_eq!(
            url,
            "https://coins.llama.fi/prices/current/arbitrum:0xaaa,arbitrum:0xbbb"
        );
    }

    #[test]
    fn test_parse_response_keys_by_address() {
        let body = r#"{
            "coins": {
                "arbitrum:0x82aF49447D8a07e3bd95BD0d56f35241523fBab1": {
                    "decimals": 18,
                    "symbol": "WETH",
                    "price": 3512.4,
                    "timestamp": 1700000000,
                    "confidence": 0.99
                }
            }
        }"#;
        let parsed: CoinsResponse = serde_json::from_str(body).unwrap();
        let prices = oracle().normalize(parsed.coins);

        let weth = &prices["0x82af49447d8a07e3bd95bd0d56f35241523fbab1"];
        assert_eq!(weth.price, 3512.4);
        assert_eq!(weth.symbol.as_deref(), Some("WETH"));
    }

    #[test]
    fn test_empty_request_skips_network() {
        let prices = tokio_test::block_on(oracle().get_prices(&[])).unwrap();
        assert!(prices.is_empty());
    }
}
