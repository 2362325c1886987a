//! TVL Aggregator
//!
//! Converts raw pair balances into net USD value per vault pair:
//!
//! ```text
//! tvl = assetRaw / 1e18 * assetPrice - debtRaw / 1e18 * debtPrice
//! ```
//!
//! The result is keyed by the lowercased `"{asset}-{debt}"` pair key.
//! Duplicate keys from the subgraph overwrite (last write wins). Registry
//! pairs the subgraph did not report are filled with 0, so every vault
//! has an entry.

use alloy_primitives::U256;
use eyre::Result;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::error::AggregatorError;
use crate::pricing::{PriceMap, PriceSource};
use crate::registry::VaultRegistry;
use crate::subgraph::{PairBalance, PairStateSource};

/// Fixed-point scale shared by asset and debt balances
pub const BALANCE_SCALE: f64 = 1e18;

/// Lowercased `"{asset}-{debt}"`
pub fn pair_key(asset_address: &str, debt_address: &str) -> String {
    format!("{}-{}", asset_address, debt_address).to_lowercase()
}

/// Raw fixed-point integer as a double, rounded once to nearest
pub fn raw_to_f64(raw: U256) -> f64 {
    // decimal digits always parse; U256::MAX is far below f64::MAX
    raw.to_string().parse().unwrap_or(f64::INFINITY)
}

// ============================================
// TVL TABLE
// ============================================

/// Net USD value per pair key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TvlTable {
    values: HashMap<String, f64>,
}

impl TvlTable {
    pub fn get(&self, asset_address: &str, debt_address: &str) -> Option<f64> {
        self.values.get(&pair_key(asset_address, debt_address)).copied()
    }

    pub fn contains(&self, asset_address: &str, debt_address: &str) -> bool {
        self.values.contains_key(&pair_key(asset_address, debt_address))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total_usd(&self) -> f64 {
        self.values.values().sum()
    }
}

// ============================================
// AGGREGATION
// ============================================

/// Distinct lowercase token addresses referenced by the pairs (sorted)
pub fn referenced_tokens(pairs: &[PairBalance]) -> Vec<String> {
    pairs
        .iter()
        .flat_map(|p| [p.asset_address.to_lowercase(), p.debt_address.to_lowercase()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn price_of(prices: &PriceMap, address: &str) -> Result<f64> {
    prices.get(address).map(|p| p.price).ok_or_else(|| {
        AggregatorError::MissingPrice {
            address: address.to_string(),
        }
        .into()
    })
}

/// Net USD value of one pair
pub fn net_value_usd(pair: &PairBalance, prices: &PriceMap) -> Result<f64> {
    let asset_price = price_of(prices, &pair.asset_address.to_lowercase())?;
    let debt_price = price_of(prices, &pair.debt_address.to_lowercase())?;

    let asset_amount = raw_to_f64(pair.asset_balance_raw) / BALANCE_SCALE;
    let debt_amount = raw_to_f64(pair.debt_balance_raw) / BALANCE_SCALE;

    Ok(asset_amount * asset_price - debt_amount * debt_price)
}

/// Build the table from already-fetched balances and prices
pub fn build_tvl_table(
    pairs: &[PairBalance],
    prices: &PriceMap,
    registry: &VaultRegistry,
) -> Result<TvlTable> {
    let mut values = HashMap::new();

    for pair in pairs {
        let key = pair_key(&pair.asset_address, &pair.debt_address);
        let net = net_value_usd(pair, prices)?;
        if values.insert(key.clone(), net).is_some() {
            warn!("Duplicate pair state for {}, keeping the later one", key);
        }
    }

    let mut filled = 0;
    for vault in registry.vaults() {
        values
            .entry(pair_key(&vault.asset_address, &vault.debt_address))
            .or_insert_with(|| {
                filled += 1;
                0.0
            });
    }

    if filled > 0 {
        debug!("{} registry pairs had no subgraph state, TVL set to 0", filled);
    }

    Ok(TvlTable { values })
}

/// Query balances, price the referenced tokens, build the table
pub async fn initialize_tvl_table<S, P>(
    subgraph: &S,
    prices: &P,
    registry: &VaultRegistry,
) -> Result<TvlTable>
where
    S: PairStateSource,
    P: PriceSource,
{
    let pairs = subgraph.fetch_pair_balances().await?;
    let tokens = referenced_tokens(&pairs);
    let price_map = prices.get_prices(&tokens).await?;

    let table = build_tvl_table(&pairs, &price_map, registry)?;
    if table.is_empty() {
        warn!("TVL table is empty: no subgraph pairs and no registry vaults");
    }
    info!(
        "📊 TVL table ready: {} pairs, ${:.2} net",
        table.len(),
        table.total_usd()
    );

    Ok(table)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::TokenPrice;
    use crate::registry::VaultEntry;

    const WAD: u128 = 1_000_000_000_000_000_000;

    fn vault(asset: &str, debt: &str) -> VaultEntry {
        VaultEntry {
            protocol: "facAAVEv3".to_string(),
            market: "facAAVEv3".to_string(),
            asset_address: asset.to_string(),
            asset_symbol: "A".to_string(),
            debt_address: debt.to_string(),
            debt_symbol: "D".to_string(),
            vault_address: "0x00000000000000000000000000000000000000ff".to_string(),
        }
    }

    fn pair(asset: &str, debt: &str, asset_raw: u128, debt_raw: u128) -> PairBalance {
        PairBalance {
            asset_address: asset.to_string(),
            debt_address: debt.to_string(),
            asset_balance_raw: U256::from(asset_raw),
            debt_balance_raw: U256::from(debt_raw),
        }
    }

    fn prices(entries: &[(&str, f64)]) -> PriceMap {
        entries
            .iter()
            .map(|(a, p)| (a.to_lowercase(), TokenPrice::usd(*p)))
            .collect()
    }

    const A1: &str = "0x00000000000000000000000000000000000000A1";
    const A2: &str = "0x00000000000000000000000000000000000000A2";
    const A3: &str = "0x00000000000000000000000000000000000000A3";

    #[test]
    fn test_pair_key_lowercases() {
        assert_eq!(pair_key("0xAAA", "0xBbB"), "0xaaa-0xbbb");
    }

    #[test]
    fn test_raw_to_f64_large_values() {
        assert_eq!(raw_to_f64(U256::from(2 * WAD)), 2e18);
        let big = U256::from(WAD) * U256::from(WAD);
        assert!((raw_to_f64(big) - 1e36).abs() / 1e36 < 1e-12);
    }

    #[test]
    fn test_raw_to_f64_rounds_once_to_nearest() {
        // 2^64 + 2^63 + 2049 sits just above a rounding midpoint
        let raw = U256::from((1u128 << 64) + (1u128 << 63) + 2049);
        assert_eq!(raw.to_string(), "27670116110564329473");
        assert_eq!(raw_to_f64(raw), 27670116110564329473.0);
        assert_eq!(raw_to_f64(raw), 2.767011611056433e19);
        assert_eq!(raw_to_f64(U256::MAX), 2f64.powi(256));
    }

    #[test]
    fn test_net_value_signed() {
        let registry = VaultRegistry::new(vec![vault(A1, A2)]).unwrap();
        let pairs = vec![pair(A1, A2, 2 * WAD, WAD)];
        let prices = prices(&[(A1, 1.0), (A2, 2000.0)]);

        let table = build_tvl_table(&pairs, &prices, &registry).unwrap();
        assert_eq!(table.get(A1, A2), Some(-1998.0));
    }

    #[test]
    fn test_registry_pairs_filled_with_zero() {
        let registry = VaultRegistry::new(vec![vault(A1, A2), vault(A3, A2)]).unwrap();
        let pairs = vec![pair(A1, A2, 3 * WAD, 0)];
        let prices = prices(&[(A1, 10.0), (A2, 1.0)]);

        let table = build_tvl_table(&pairs, &prices, &registry).unwrap();
        assert_eq!(table.get(A1, A2), Some(30.0));
        assert_eq!(table.get(A3, A2), Some(0.0));
        for v in registry.vaults() {
            assert!(table.contains(&v.asset_address, &v.debt_address));
        }
    }

    #[test]
    fn test_duplicate_pairs_last_write_wins() {
        let registry = VaultRegistry::default();
        let pairs = vec![pair(A1, A2, WAD, 0), pair(A1, A2, 5 * WAD, 0)];
        let prices = prices(&[(A1, 1.0), (A2, 1.0)]);

        let table = build_tvl_table(&pairs, &prices, &registry).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(A1, A2), Some(5.0));
    }

    #[test]
    fn test_missing_price_is_fatal() {
        let registry = VaultRegistry::default();
        let pairs = vec![pair(A1, A2, WAD, WAD)];
        let prices = prices(&[(A1, 1.0)]);

        let err = build_tvl_table(&pairs, &prices, &registry).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AggregatorError>(),
            Some(&AggregatorError::MissingPrice {
                address: A2.to_lowercase()
            })
        );
    }

    #[test]
    fn test_referenced_tokens_case_insensitive() {
        let pairs = vec![pair("0xAB", "0xCD", 0, 0), pair("0xab", "0xEF", 0, 0)];
        assert_eq!(referenced_tokens(&pairs), vec!["0xab", "0xcd", "0xef"]);
    }
}
