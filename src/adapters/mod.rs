//! Protocol APY Adapters
//!
//! Each leverage vault borrows from one lending market. The adapter for
//! that market reads the market's current rates once per refresh and then
//! answers `get_apy_base(asset, debt)` from memory.
//!
//! ## Pair APY
//!
//! ```text
//! apyBase = supplyApy(asset) - borrowApy(debt)      (percent)
//! ```
//!
//! A side the adapter has no rates for contributes 0, so a pair unknown
//! to the adapter is 0.
//!
//! Markets without an adapter resolve to `MarketAdapter::Dummy`, which
//! always answers 0 instead of failing the refresh.

mod aave_v3;
mod compound_v3;
mod lodestar;
mod multicall;

pub use aave_v3::{AaveV3Adapter, AAVE_V3_POOL};
pub use compound_v3::{CompoundV3Adapter, COMET_USDC, COMET_USDC_NATIVE};
pub use lodestar::{LodestarAdapter, LODESTAR_COMPTROLLER, LODESTAR_MARKETS};

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::registry::VaultRegistry;

// ============================================
// RATE MATH
// ============================================

pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;
pub const BLOCKS_PER_DAY: f64 = 7_200.0;
pub const DAYS_PER_YEAR: f64 = 365.0;

const RAY: f64 = 1e27;
const WAD: f64 = 1e18;

/// `(1 + r)^n - 1` as a percentage
fn compound_pct(rate_per_period: f64, periods: f64) -> f64 {
    (periods * rate_per_period.ln_1p()).exp_m1() * 100.0
}

/// Aave ray APR (1e27) compounded per second
pub fn ray_apr_to_apy(rate_ray: f64) -> f64 {
    compound_pct(rate_ray / RAY / SECONDS_PER_YEAR, SECONDS_PER_YEAR)
}

/// Comet per-second rate (1e18)
pub fn per_second_rate_to_apy(rate_wad: f64) -> f64 {
    compound_pct(rate_wad / WAD, SECONDS_PER_YEAR)
}

/// Compound v2 per-block rate (1e18), compounded daily
pub fn per_block_rate_to_apy(rate_wad: f64) -> f64 {
    compound_pct(rate_wad / WAD * BLOCKS_PER_DAY, DAYS_PER_YEAR)
}

// ============================================
// RATE BOOK
// ============================================

/// Supply / borrow APY of one token, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenRates {
    pub supply_apy: f64,
    pub borrow_apy: f64,
}

/// Rates an adapter collected during `initialize`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateBook {
    rates: HashMap<Address, TokenRates>,
}

impl RateBook {
    pub fn insert(&mut self, token: Address, rates: TokenRates) {
        self.rates.insert(token, rates);
    }

    pub fn get(&self, token: &str) -> Option<&TokenRates> {
        let token = Address::from_str(token).ok()?;
        self.rates.get(&token)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Supply APY of the asset minus borrow APY of the debt
    pub fn pair_apy(&self, asset_address: &str, debt_address: &str) -> f64 {
        let supply = self.get(asset_address).map_or(0.0, |r| r.supply_apy);
        let borrow = self.get(debt_address).map_or(0.0, |r| r.borrow_apy);
        supply - borrow
    }
}

// ============================================
// MARKETS
// ============================================

/// Lending markets with an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    AaveV3,
    Compound,
    CompoundNative,
    Lodestar,
}

impl Market {
    pub const ALL: [Market; 4] = [
        Market::AaveV3,
        Market::Compound,
        Market::CompoundNative,
        Market::Lodestar,
    ];

    /// Identifier used in the vault registry
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::AaveV3 => "facAAVEv3",
            Market::Compound => "facCompound",
            Market::CompoundNative => "facCompoundNative",
            Market::Lodestar => "facLodestar",
        }
    }
}

impl FromStr for Market {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Market::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// MARKET ADAPTER
// ============================================

pub enum MarketAdapter {
    AaveV3(AaveV3Adapter),
    CompoundV3(CompoundV3Adapter),
    Lodestar(LodestarAdapter),
    /// Fallback for markets without an integration
    Dummy,
}

impl MarketAdapter {
    pub fn name(&self) -> &'static str {
        match self {
            MarketAdapter::AaveV3(_) => "Aave V3",
            MarketAdapter::CompoundV3(_) => "Compound V3",
            MarketAdapter::Lodestar(_) => "Lodestar",
            MarketAdapter::Dummy => "Dummy",
        }
    }

    /// Fetch and cache the market's current rates
    pub async fn initialize(&mut self) -> Result<()> {
        let name = self.name();
        let result = match self {
            MarketAdapter::AaveV3(adapter) => adapter.initialize().await,
            MarketAdapter::CompoundV3(adapter) => adapter.initialize().await,
            MarketAdapter::Lodestar(adapter) => adapter.initialize().await,
            MarketAdapter::Dummy => Ok(()),
        };
        result.wrap_err_with(|| format!("{} adapter failed to initialize", name))
    }

    /// Base APY (percent) for a vault pair; 0 if the pair is unknown
    pub fn get_apy_base(&self, asset_address: &str, debt_address: &str) -> f64 {
        match self {
            MarketAdapter::AaveV3(adapter) => adapter.rates().pair_apy(asset_address, debt_address),
            MarketAdapter::CompoundV3(adapter) => adapter.rates().pair_apy(asset_address, debt_address),
            MarketAdapter::Lodestar(adapter) => adapter.rates().pair_apy(asset_address, debt_address),
            MarketAdapter::Dummy => 0.0,
        }
    }
}

// ============================================
// ADAPTER REGISTRY
// ============================================

/// Market identifier -> adapter, with a Dummy fallback
pub struct AdapterRegistry {
    adapters: HashMap<Market, MarketAdapter>,
    fallback: MarketAdapter,
}

impl AdapterRegistry {
    /// Only the fallback; every market yields 0
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: MarketAdapter::Dummy,
        }
    }

    /// The standard Arbitrum adapter set
    pub fn for_registry(registry: &VaultRegistry, rpc_url: &str) -> Self {
        let aave_tokens = registry
            .vaults_for_market(Market::AaveV3.as_str())
            .flat_map(|v| [v.asset(), v.debt()])
            .filter_map(|token| token.ok())
            .collect::<Vec<_>>();

        Self::empty()
            .with_adapter(
                Market::AaveV3,
                MarketAdapter::AaveV3(AaveV3Adapter::new(rpc_url.to_string(), AAVE_V3_POOL, aave_tokens)),
            )
            .with_adapter(
                Market::Compound,
                MarketAdapter::CompoundV3(CompoundV3Adapter::new(rpc_url.to_string(), COMET_USDC)),
            )
            .with_adapter(
                Market::CompoundNative,
                MarketAdapter::CompoundV3(CompoundV3Adapter::new(rpc_url.to_string(), COMET_USDC_NATIVE)),
            )
            .with_adapter(
                Market::Lodestar,
                MarketAdapter::Lodestar(LodestarAdapter::new(
                    rpc_url.to_string(),
                    LODESTAR_COMPTROLLER,
                    LODESTAR_MARKETS.to_vec(),
                )),
            )
    }

    pub fn with_adapter(mut self, market: Market, adapter: MarketAdapter) -> Self {
        self.adapters.insert(market, adapter);
        self
    }

    /// Adapter for a registry market string; unknown markets get the fallback
    pub fn get_adapter(&self, market: &str) -> &MarketAdapter {
        market
            .parse::<Market>()
            .ok()
            .and_then(|m| self.adapters.get(&m))
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Initialize every adapter concurrently; the first failure wins
    pub async fn initialize_all(&mut self) -> Result<()> {
        debug!("Initializing {} market adapters", self.adapters.len());
        try_join_all(self.adapters.iter_mut().map(|(market, adapter)| {
            debug!("Initializing {} ({})", market, adapter.name());
            adapter.initialize()
        }))
        .await?;
        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const USDC: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
    const WETH: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");

    fn book() -> RateBook {
        let mut book = RateBook::default();
        book.insert(WETH, TokenRates { supply_apy: 2.0, borrow_apy: 3.0 });
        book.insert(USDC, TokenRates { supply_apy: 4.0, borrow_apy: 5.5 });
        book
    }

    #[test]
    fn test_pair_apy_supply_minus_borrow() {
        let book = book();
        let weth = "0x82af49447d8a07e3bd95bd0d56f35241523fbab1";
        let usdc = "0xAF88D065E77C8CC2239327C5EDB3A432268E5831";
        assert!((book.pair_apy(weth, usdc) - (2.0 - 5.5)).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_pair_is_zero() {
        let book = book();
        assert_eq!(
            book.pair_apy(
                "0x0000000000000000000000000000000000000001",
                "0x0000000000000000000000000000000000000002"
            ),
            0.0
        );
        assert_eq!(book.pair_apy("garbage", "also-garbage"), 0.0);
    }

    #[test]
    fn test_unknown_market_falls_back_to_dummy() {
        let registry = AdapterRegistry::empty();
        let adapter = registry.get_adapter("facSomethingNew");
        assert!(matches!(adapter, MarketAdapter::Dummy));
        assert_eq!(adapter.get_apy_base("0xA1", "0xA2"), 0.0);
    }

    #[test]
    fn test_known_market_resolves() {
        let registry = VaultRegistry::embedded().unwrap();
        let adapters = AdapterRegistry::for_registry(&registry, "http://localhost:8545");

        assert_eq!(adapters.len(), 4);
        assert_eq!(adapters.get_adapter("facAAVEv3").name(), "Aave V3");
        assert_eq!(adapters.get_adapter("facCompoundNative").name(), "Compound V3");
        assert_eq!(adapters.get_adapter("facLodestar").name(), "Lodestar");
        // case sensitive, like the registry identifiers
        assert_eq!(adapters.get_adapter("facaavev3").name(), "Dummy");
    }

    #[test]
    fn test_market_round_trip() {
        for market in Market::ALL {
            assert_eq!(market.as_str().parse::<Market>(), Ok(market));
        }
        assert!("dummy".parse::<Market>().is_err());
    }

    #[tokio::test]
    async fn test_dummy_initialize_is_noop() {
        let mut registry = AdapterRegistry::empty();
        registry.initialize_all().await.unwrap();
        let mut dummy = MarketAdapter::Dummy;
        dummy.initialize().await.unwrap();
    }

    #[test]
    fn test_ray_apr_to_apy() {
        // 5% APR in ray compounds to ~5.127% APY
        let apy = ray_apr_to_apy(0.05 * 1e27);
        assert!((apy - 5.127).abs() < 0.001, "got {}", apy);
        assert_eq!(ray_apr_to_apy(0.0), 0.0);
    }

    #[test]
    fn test_per_second_rate_to_apy() {
        let per_second = 0.05 / SECONDS_PER_YEAR * 1e18;
        let apy = per_second_rate_to_apy(per_second);
        assert!((apy - 5.127).abs() < 0.001, "got {}", apy);
    }

    #[test]
    fn test_per_block_rate_to_apy() {
        // 0.05 APR spread over 7200 blocks/day * 365 days, daily compounding
        let per_block = 0.05 / (BLOCKS_PER_DAY * DAYS_PER_YEAR) * 1e18;
        let apy = per_block_rate_to_apy(per_block);
        assert!((apy - 5.1267).abs() < 0.001, "got {}", apy);
    }
}
