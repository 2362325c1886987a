//! Refresh Orchestrator
//!
//! One refresh = TVL aggregation and every adapter's `initialize` run
//! concurrently, then one record per registry entry. Any failure fails
//! the whole refresh; retrying is the caller's job.

use eyre::Result;
use futures::try_join;
use std::time::Instant;
use tracing::info;

use crate::adapters::AdapterRegistry;
use crate::config::Config;
use crate::error::AggregatorError;
use crate::pools::{build_records, PoolContext, PoolRecord};
use crate::pricing::{LlamaPriceOracle, PriceSource};
use crate::registry::VaultRegistry;
use crate::subgraph::{PairStateSource, SubgraphClient};
use crate::tvl::{initialize_tvl_table, TvlTable};

/// Historical backfill is not supported
pub const TIMETRAVEL: bool = false;

// ============================================
// REFRESH STATE
// ============================================

/// Written once per refresh, read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    tvl: Option<TvlTable>,
}

impl RefreshState {
    pub fn is_initialized(&self) -> bool {
        self.tvl.is_some()
    }

    pub fn tvl_table(&self) -> Result<&TvlTable> {
        self.tvl
            .as_ref()
            .ok_or_else(|| AggregatorError::NotInitialized.into())
    }

    /// Net USD value of a pair; 0 for pairs the table does not know
    pub fn tvl_usd(&self, asset_address: &str, debt_address: &str) -> Result<f64> {
        Ok(self
            .tvl_table()?
            .get(asset_address, debt_address)
            .unwrap_or(0.0))
    }
}

// ============================================
// AGGREGATOR
// ============================================

pub struct LeverageVaultAggregator<S, P> {
    context: PoolContext,
    registry: VaultRegistry,
    subgraph: S,
    prices: P,
    adapters: AdapterRegistry,
    state: RefreshState,
}

impl<S, P> LeverageVaultAggregator<S, P>
where
    S: PairStateSource,
    P: PriceSource,
{
    pub fn new(
        context: PoolContext,
        registry: VaultRegistry,
        subgraph: S,
        prices: P,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            context,
            registry,
            subgraph,
            prices,
            adapters,
            state: RefreshState::default(),
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    /// Fetch TVL and adapter state concurrently
    pub async fn initialize(&mut self) -> Result<()> {
        let start = Instant::now();
        // a failed cycle must not leave the previous table readable
        self.state.tvl = None;

        let (tvl, ()) = try_join!(
            initialize_tvl_table(&self.subgraph, &self.prices, &self.registry),
            self.adapters.initialize_all(),
        )?;

        self.state.tvl = Some(tvl);
        info!("✓ Refresh state initialized in {:?}", start.elapsed());
        Ok(())
    }

    /// Records for every registry entry; fails only if not initialized
    pub fn create_pools_data(&self) -> Result<Vec<PoolRecord>> {
        let tvl = self.state.tvl_table()?;
        Ok(build_records(&self.context, &self.registry, tvl, &self.adapters))
    }

    /// `initialize` then `create_pools_data`
    pub async fn refresh(&mut self) -> Result<Vec<PoolRecord>> {
        self.initialize().await?;
        self.create_pools_data()
    }
}

/// Entry point for the host platform: one full refresh against the live
/// subgraph, price API and chain
pub async fn apy(config: &Config, registry: &VaultRegistry) -> Result<Vec<PoolRecord>> {
    let subgraph = SubgraphClient::new(config.subgraph_url.clone())?;
    let prices = LlamaPriceOracle::new(
        config.price_api_url.clone(),
        config.chain.clone(),
        config.price_timeout_secs,
    )?;
    let adapters = AdapterRegistry::for_registry(registry, &config.rpc_url);

    let mut aggregator = LeverageVaultAggregator::new(
        config.pool_context(),
        registry.clone(),
        subgraph,
        prices,
        adapters,
    );
    aggregator.refresh().await
}

// ============================================
// TESTS
// ============================================
