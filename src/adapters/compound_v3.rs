//! Compound V3 (Comet) rates
//!
//! A Comet market only pays and charges interest on its base token, so
//! the rate book holds a single entry. Rates are per second, scaled 1e18,
//! and depend on the current utilization.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::sol;
use eyre::{eyre, Result};
use tracing::info;

use super::multicall::{aggregate, call3, decode};
use super::{per_second_rate_to_apy, RateBook, TokenRates};
use crate::tvl::raw_to_f64;

/// cUSDCv3 (bridged USDC.e base)
pub const COMET_USDC: Address = address!("A5EDBDD9646f8dFF606d7448e414884C7d905dCA");

/// cUSDCv3 (native USDC base)
pub const COMET_USDC_NATIVE: Address = address!("9c4ec768c28520B50860ea7a15bd7213a9fF58bf");

sol! {
    interface IComet {
        function baseToken() external view returns (address);
        function getUtilization() external view returns (uint256);
        function getSupplyRate(uint256 utilization) external view returns (uint64);
        function getBorrowRate(uint256 utilization) external view returns (uint64);
    }
}

/// Base token APYs from per-second rates
pub fn comet_rates(supply_rate: u64, borrow_rate: u64) -> TokenRates {
    TokenRates {
        supply_apy: per_second_rate_to_apy(supply_rate as f64),
        borrow_apy: per_second_rate_to_apy(borrow_rate as f64),
    }
}

pub struct CompoundV3Adapter {
    rpc_url: String,
    comet: Address,
    rates: RateBook,
}

impl CompoundV3Adapter {
    pub fn new(rpc_url: String, comet: Address) -> Self {
        Self {
            rpc_url,
            comet,
            rates: RateBook::default(),
        }
    }

    pub fn rates(&self) -> &RateBook {
        &self.rates
    }

    pub async fn initialize(&mut self) -> Result<()> {
        // Batch 1: base token + utilization
        let results = aggregate(
            &self.rpc_url,
            vec![
                call3(self.comet, &IComet::baseTokenCall {}),
                call3(self.comet, &IComet::getUtilizationCall {}),
            ],
        )
        .await?;

        let base_token = decode::<IComet::baseTokenCall>(results.first())
            .ok_or_else(|| eyre!("Comet {}: baseToken() failed", self.comet))?;
        let utilization: U256 = decode::<IComet::getUtilizationCall>(results.get(1))
            .ok_or_else(|| eyre!("Comet {}: getUtilization() failed", self.comet))?;

        // Batch 2: rates at that utilization
        let results = aggregate(
            &self.rpc_url,
            vec![
                call3(self.comet, &IComet::getSupplyRateCall { utilization }),
                call3(self.comet, &IComet::getBorrowRateCall { utilization }),
            ],
        )
        .await?;

        let supply_rate = decode::<IComet::getSupplyRateCall>(results.first())
            .ok_or_else(|| eyre!("Comet {}: getSupplyRate() failed", self.comet))?;
        let borrow_rate = decode::<IComet::getBorrowRateCall>(results.get(1))
            .ok_or_else(|| eyre!("Comet {}: getBorrowRate() failed", self.comet))?;

        let rates = comet_rates(supply_rate, borrow_rate);
        info!(
            "🏦 Compound V3 {}: utilization {:.2}%, supply {:.2}%, borrow {:.2}%",
            self.comet,
            raw_to_f64(utilization) / 1e16,
            rates.supply_apy,
            rates.borrow_apy
        );

        let mut book = RateBook::default();
        book.insert(base_token, rates);
        self.rates = book;
        Ok(())
    }
}
