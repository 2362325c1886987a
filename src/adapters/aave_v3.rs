//! Aave V3 (Arbitrum) rates
//!
//! Reads `getReserveData` for every token used by an Aave-backed vault.
//! `currentLiquidityRate` is the supply APR and `currentVariableBorrowRate`
//! the borrow APR, both in ray (1e27).

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;
use eyre::Result;
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::multicall::{aggregate, call3, decode};
use super::{ray_apr_to_apy, RateBook, TokenRates};

/// Aave V3 Pool on Arbitrum
pub const AAVE_V3_POOL: Address = address!("794a61358D6845594F94dc1DB02A252b5b4814aD");

sol! {
    interface IAaveV3Pool {
        struct ReserveConfigurationMap {
            uint256 data;
        }

        struct ReserveData {
            ReserveConfigurationMap configuration;
            uint128 liquidityIndex;
            uint128 currentLiquidityRate;
            uint128 variableBorrowIndex;
            uint128 currentVariableBorrowRate;
            uint128 currentStableBorrowRate;
            uint40 lastUpdateTimestamp;
            uint16 id;
            address aTokenAddress;
            address stableDebtTokenAddress;
            address variableDebtTokenAddress;
            address interestRateStrategyAddress;
            uint128 accruedToTreasury;
            uint128 unbacked;
            uint128 isolationModeTotalDebt;
        }

        function getReserveData(address asset) external view returns (ReserveData memory);
    }
}

/// Supply/borrow APY from raw ray rates
pub fn reserve_rates(liquidity_rate_ray: u128, variable_borrow_rate_ray: u128) -> TokenRates {
    TokenRates {
        supply_apy: ray_apr_to_apy(liquidity_rate_ray as f64),
        borrow_apy: ray_apr_to_apy(variable_borrow_rate_ray as f64),
    }
}

pub struct AaveV3Adapter {
    rpc_url: String,
    pool: Address,
    /// Reserves to read, deduplicated
    tokens: Vec<Address>,
    rates: RateBook,
}

impl AaveV3Adapter {
    pub fn new(rpc_url: String, pool: Address, tokens: Vec<Address>) -> Self {
        let tokens = tokens.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        Self {
            rpc_url,
            pool,
            tokens,
            rates: RateBook::default(),
        }
    }

    pub fn rates(&self) -> &RateBook {
        &self.rates
    }

    pub async fn initialize(&mut self) -> Result<()> {
        let calls = self
            .tokens
            .iter()
            .map(|token| call3(self.pool, &IAaveV3Pool::getReserveDataCall { asset: *token }))
            .collect();

        let results = aggregate(&self.rpc_url, calls).await?;

        let mut rates = RateBook::default();
        for (idx, token) in self.tokens.iter().enumerate() {
            match decode::<IAaveV3Pool::getReserveDataCall>(results.get(idx)) {
                Some(reserve) => {
                    rates.insert(
                        *token,
                        reserve_rates(reserve.currentLiquidityRate, reserve.currentVariableBorrowRate),
                    );
                }
                None => warn!("Aave V3: no reserve data for {}", token),
            }
        }

        if rates.is_empty() && !self.tokens.is_empty() {
            warn!("Aave V3: no reserve returned rates, every pair will read 0");
        }
        info!("🏦 Aave V3: rates for {}/{} reserves", rates.len(), self.tokens.len());
        self.rates = rates;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_rates_from_ray() {
        // 3% supply, 4.5% borrow APR
        let rates = reserve_rates(30_000_000_000_000_000_000_000_000, 45_000_000_000_000_000_000_000_000);
        assert!((rates.supply_apy - 3.0454).abs() < 0.001, "got {}", rates.supply_apy);
        assert!((rates.borrow_apy - 4.6028).abs() < 0.001, "got {}", rates.borrow_apy);
    }

    #[test]
    fn test_tokens_deduplicated() {
        let weth = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");
        let usdc = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
        let adapter = AaveV3Adapter::new(String::new(), AAVE_V3_POOL, vec![weth, usdc, weth]);

        assert_eq!(adapter.tokens.len(), 2);
        assert!(adapter.rates().is_empty());
    }

    #[tokio::test]
    async fn test_no_tokens_needs_no_rpc() {
        let mut adapter = AaveV3Adapter::new("http://localhost:1".to_string(), AAVE_V3_POOL, vec![]);
        adapter.initialize().await.unwrap();
        assert!(adapter.rates().is_empty());
    }
}
