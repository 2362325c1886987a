//! Lodestar (Compound v2 fork) rates
//!
//! Every configured lToken that the comptroller still lists contributes
//! its underlying token's supply and borrow rate. Rates are per block,
//! scaled 1e18.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::sol;
use eyre::{eyre, Result};
use std::collections::HashSet;
use tracing::{info, warn};

use super::multicall::{aggregate, call3, decode};
use super::{per_block_rate_to_apy, RateBook, TokenRates};
use crate::tvl::raw_to_f64;

/// Lodestar comptroller on Arbitrum
pub const LODESTAR_COMPTROLLER: Address = address!("24C25910aF4068B5F6C3b75252a36c4810849135");

/// lToken markets read by the adapter
pub const LODESTAR_MARKETS: &[Address] = &[
    address!("1ca530f02DD0487cef4943c674342c5aEa08922F"), // lUSDC.e
    address!("4C9aAed3b8c443b4b634D1A189a5e25C604768dE"), // lUSDC
    address!("f21Ef887CB667f84B8eC5934C1713A7Ade8c38Cf"), // lMAGIC
    address!("C37896BF3EE5a2c62Cdbd674035069776f721668"), // lWBTC
    address!("9365181A7df82a1cC578eAE443EFd89f00dbb643"), // lUSDT
    address!("5d27cFf80dF09f28534bb37d386D43aA60f88e25"), // lDPX
    address!("8991d64fe388fA79A4f7Aa7826E8dA09F0c3C96a"), // lARB
    address!("4987782da9a63bC3ABace48648B15546D821c720"), // lDAI
    address!("D12d43Cdf498e377D3bfa2c6217f05B466E14228"), // lFRAX
    address!("fECe754D92bd956F681A941Cef4632AB65710495"), // lwstETH
    address!("79B6c5e1A7C0aD507E1dB81eC7cF269062BAb4Eb"), // lGMX
];

sol! {
    interface IComptroller {
        function getAllMarkets() external view returns (address[] memory);
    }

    interface ILToken {
        function underlying() external view returns (address);
        function supplyRatePerBlock() external view returns (uint256);
        function borrowRatePerBlock() external view returns (uint256);
    }
}

/// Underlying token APYs from per-block rates
pub fn ltoken_rates(supply_rate_per_block: U256, borrow_rate_per_block: U256) -> TokenRates {
    TokenRates {
        supply_apy: per_block_rate_to_apy(raw_to_f64(supply_rate_per_block)),
        borrow_apy: per_block_rate_to_apy(raw_to_f64(borrow_rate_per_block)),
    }
}

/// Configured markets the comptroller lists, in configured order
fn listed_markets(configured: &[Address], listed: &[Address]) -> Vec<Address> {
    let listed: HashSet<&Address> = listed.iter().collect();
    configured
        .iter()
        .filter(|m| {
            let ok = listed.contains(m);
            if !ok {
                warn!("Lodestar: market {} is not listed, skipping", m);
            }
            ok
        })
        .copied()
        .collect()
}

pub struct LodestarAdapter {
    rpc_url: String,
    comptroller: Address,
    markets: Vec<Address>,
    rates: RateBook,
}

impl LodestarAdapter {
    pub fn new(rpc_url: String, comptroller: Address, markets: Vec<Address>) -> Self {
        Self {
            rpc_url,
            comptroller,
            markets,
            rates: RateBook::default(),
        }
    }

    pub fn rates(&self) -> &RateBook {
        &self.rates
    }

    pub async fn initialize(&mut self) -> Result<()> {
        // One batch: market list + 3 reads per configured market
        let mut calls = vec![call3(self.comptroller, &IComptroller::getAllMarketsCall {})];
        for market in &self.markets {
            calls.push(call3(*market, &ILToken::underlyingCall {}));
            calls.push(call3(*market, &ILToken::supplyRatePerBlockCall {}));
            calls.push(call3(*market, &ILToken::borrowRatePerBlockCall {}));
        }

        let results = aggregate(&self.rpc_url, calls).await?;

        let all_markets = decode::<IComptroller::getAllMarketsCall>(results.first())
            .ok_or_else(|| eyre!("Lodestar comptroller {}: getAllMarkets() failed", self.comptroller))?;
        let listed = listed_markets(&self.markets, &all_markets);

        let mut book = RateBook::default();
        for (idx, market) in self.markets.iter().enumerate() {
            if !listed.contains(market) {
                continue;
            }

            let base = 1 + idx * 3;
            let underlying = decode::<ILToken::underlyingCall>(results.get(base));
            let supply = decode::<ILToken::supplyRatePerBlockCall>(results.get(base + 1));
            let borrow = decode::<ILToken::borrowRatePerBlockCall>(results.get(base + 2));

            match (underlying, supply, borrow) {
                (Some(underlying), Some(supply), Some(borrow)) => {
                    book.insert(underlying, ltoken_rates(supply, borrow));
                }
                _ => warn!("Lodestar: incomplete rate data for market {}", market),
            }
        }

        info!("🏦 Lodestar: rates for {}/{} markets", book.len(), self.markets.len());
        self.rates = book;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listed_markets_keeps_configured_order() {
        let a = LODESTAR_MARKETS[0];
        let b = LODESTAR_MARKETS[1];
        let c = LODESTAR_MARKETS[2];

        let listed = listed_markets(&[a, b, c], &[c, a]);
        assert_eq!(listed, vec![a, c]);
    }

    #[test]
    fn test_ltoken_rates() {
        // 5% APR over 2,628,000 blocks per year
        let per_block = U256::from(19_025_875_190u64);
        let rates = ltoken_rates(per_block, U256::ZERO);
        assert!((rates.supply_apy - 5.1267).abs() < 0.001, "got {}", rates.supply_apy);
        assert_eq!(rates.borrow_apy, 0.0);
    }

    #[test]
    fn test_configured_market_list() {
        assert_eq!(LODESTAR_MARKETS.len(), 11);
        let adapter = LodestarAdapter::new(String::new(), LODESTAR_COMPTROLLER, LODESTAR_MARKETS.to_vec());
        assert!(adapter.rates().is_empty());
    }
}
