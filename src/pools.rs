//! Pool Data Builder
//!
//! Turns registry entries plus the refreshed TVL table and adapters into
//! the records the yield platform ingests. Pure over initialized inputs:
//! every lookup has a default, so no individual entry can fail.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::adapters::AdapterRegistry;
use crate::registry::{VaultEntry, VaultRegistry};
use crate::tvl::TvlTable;

/// Where the records are published and linked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolContext {
    pub chain: String,
    pub project: String,
    /// Deep-link base, without trailing slash
    pub app_base_url: String,
}

impl PoolContext {
    /// Lowercase `{market}-{asset}-{debt}-{chain}`
    pub fn pool_id(&self, vault: &VaultEntry) -> String {
        format!(
            "{}-{}-{}-{}",
            vault.market, vault.asset_address, vault.debt_address, self.chain
        )
        .to_lowercase()
    }

    /// `{base}/{protocol}/{market}/open-pair?asset=..&debt=..&vault=..`
    pub fn pool_url(&self, vault: &VaultEntry) -> String {
        format!(
            "{}/{}/{}/open-pair?asset={}&debt={}&vault={}",
            self.app_base_url,
            vault.protocol,
            vault.market,
            vault.asset_address,
            vault.debt_address,
            vault.vault_address
        )
    }
}

/// `"{protocol} {assetSymbol}/{debtSymbol}"`
pub fn pool_symbol(vault: &VaultEntry) -> String {
    format!("{} {}/{}", vault.protocol, vault.asset_symbol, vault.debt_symbol)
}

// ============================================
// POOL RECORD
// ============================================

/// One listed pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRecord {
    pub pool: String,
    pub chain: String,
    pub project: String,
    pub symbol: String,
    pub tvl_usd: f64,
    pub apy_base: f64,
    /// `[asset, debt]`
    pub underlying_tokens: Vec<String>,
    pub url: String,
}

/// One record per registry entry, in registry order
pub fn build_records(
    context: &PoolContext,
    registry: &VaultRegistry,
    tvl: &TvlTable,
    adapters: &AdapterRegistry,
) -> Vec<PoolRecord> {
    registry
        .vaults()
        .iter()
        .map(|vault| {
            let tvl_usd = tvl
                .get(&vault.asset_address, &vault.debt_address)
                .unwrap_or(0.0);
            let adapter = adapters.get_adapter(&vault.market);
            let apy_base = adapter.get_apy_base(&vault.asset_address, &vault.debt_address);
            trace!(
                "{} via {}: tvl=${:.2} apy={:.4}%",
                pool_symbol(vault),
                adapter.name(),
                tvl_usd,
                apy_base
            );

            PoolRecord {
                pool: context.pool_id(vault),
                chain: context.chain.clone(),
                project: context.project.clone(),
                symbol: pool_symbol(vault),
                tvl_usd,
                apy_base,
                underlying_tokens: vec![vault.asset_address.clone(), vault.debt_address.clone()],
                url: context.pool_url(vault),
            }
        })
        .collect()
}

/// Legacy `factor-leverage` listing: keyed by vault address, no TVL or yield
pub fn build_legacy_records(context: &PoolContext, registry: &VaultRegistry) -> Vec<PoolRecord> {
    registry
        .vaults()
        .iter()
        .map(|vault| PoolRecord {
            pool: format!("{}-{}", vault.vault_address, context.chain).to_lowercase(),
            chain: context.chain.clone(),
            project: context.project.clone(),
            symbol: pool_symbol(vault),
            tvl_usd: 0.0,
            apy_base: 0.0,
            underlying_tokens: vec![vault.asset_address.clone(), vault.debt_address.clone()],
            url: context.pool_url(vault),
        })
        .collect()
}

// ============================================
// TESTS
// ============================================
