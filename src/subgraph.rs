//! Pair Subgraph Client
//!
//! One GraphQL query returns the current raw balances of every leverage
//! vault pair. There is no pagination: the full result set is expected to
//! fit in a single response.

use alloy_primitives::U256;
use eyre::{Result, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::AggregatorError;

// ============================================
// CONSTANTS
// ============================================

pub const DEFAULT_SUBGRAPH_URL: &str =
    "https://api.thegraph.com/subgraphs/name/dimasriat/factor-leverage-vault";

const PAIR_STATES_QUERY: &str = r#"
{
    leverageVaultPairStates {
        id
        assetBalanceRaw
        assetTokenAddress
        debtBalanceRaw
        debtTokenAddress
    }
}
"#;

const SUBGRAPH_TIMEOUT_SECS: u64 = 30;

// ============================================
// RESPONSE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PairStatesData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairStatesData {
    leverage_vault_pair_states: Vec<RawPairState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPairState {
    #[allow(dead_code)]
    id: Option<String>,
    asset_balance_raw: String,
    asset_token_address: String,
    debt_balance_raw: String,
    debt_token_address: String,
}

/// Current raw balances of one vault pair (fixed point, 1e18)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairBalance {
    pub asset_address: String,
    pub debt_address: String,
    pub asset_balance_raw: U256,
    pub debt_balance_raw: U256,
}

impl PairBalance {
    fn from_raw(raw: RawPairState) -> Result<Self> {
        Ok(Self {
            asset_balance_raw: parse_balance("assetBalanceRaw", &raw.asset_balance_raw)?,
            debt_balance_raw: parse_balance("debtBalanceRaw", &raw.debt_balance_raw)?,
            asset_address: raw.asset_token_address,
            debt_address: raw.debt_token_address,
        })
    }
}

fn parse_balance(field: &'static str, value: &str) -> Result<U256> {
    U256::from_str(value.trim()).map_err(|_| {
        AggregatorError::InvalidBalance {
            field,
            value: value.to_string(),
        }
        .into()
    })
}

// ============================================
// PAIR STATE SOURCE
// ============================================

/// Anything that can list the current pair balances
#[allow(async_fn_in_trait)]
pub trait PairStateSource {
    async fn fetch_pair_balances(&self) -> Result<Vec<PairBalance>>;
}

pub struct SubgraphClient {
    http_client: Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: String) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(SUBGRAPH_TIMEOUT_SECS))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self { http_client, url })
    }
}

/// Turn a GraphQL body into balances, surfacing query errors
fn decode_response(body: GraphQlResponse) -> Result<Vec<PairBalance>> {
    if !body.errors.is_empty() {
        let message = body
            .errors
            .iter()
            .map(|e| e.message.clone())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AggregatorError::Subgraph(message).into());
    }

    let data = body
        .data
        .ok_or_else(|| AggregatorError::Subgraph("No data in response".to_string()))?;

    data.leverage_vault_pair_states
        .into_iter()
        .map(PairBalance::from_raw)
        .collect()
}

impl PairStateSource for SubgraphClient {
    async fn fetch_pair_balances(&self) -> Result<Vec<PairBalance>> {
        trace!("Subgraph query → {}", self.url);

        let response = self
            .http_client
            .post(&self.url)
            .json(&json!({ "query": PAIR_STATES_QUERY }))
            .send()
            .await
            .map_err(|e| AggregatorError::Subgraph(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Subgraph(format!("HTTP {}", status)).into());
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| AggregatorError::Subgraph(e.to_string()))?;

        let pairs = decode_response(body)?;
        debug!("📡 Subgraph returned {} pair states", pairs.len());

        Ok(pairs)
    }
}

// ============================================
// TESTS
// ============================================
