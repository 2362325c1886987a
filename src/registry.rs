//! Vault Registry
//!
//! The static list of known leverage vault pairs. Loaded once at startup
//! (embedded `vaults.toml` or a file given on the command line) and never
//! refreshed afterwards.
//!
//! Addresses are validated on load but kept as the original strings:
//! the pool id lowercases them, the URL and `underlyingTokens` do not.

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::AggregatorError;

/// Registry bundled with the binary
const EMBEDDED_REGISTRY: &str = include_str!("../vaults.toml");

// ============================================
// VAULT ENTRY
// ============================================

/// One leverage vault pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Protocol label shown in the symbol and URL (e.g. "facAAVEv3")
    pub protocol: String,

    /// Lending market the vault borrows from; selects the APY adapter
    pub market: String,

    pub asset_address: String,
    pub asset_symbol: String,
    pub debt_address: String,
    pub debt_symbol: String,

    /// Vault contract address
    #[serde(rename = "pool")]
    pub vault_address: String,
}

impl VaultEntry {
    /// Asset token as a typed address
    pub fn asset(&self) -> Result<Address> {
        parse_address("asset_address", &self.asset_address)
    }

    /// Debt token as a typed address
    pub fn debt(&self) -> Result<Address> {
        parse_address("debt_address", &self.debt_address)
    }

    fn validate(&self) -> Result<()> {
        self.asset()?;
        self.debt()?;
        parse_address("pool", &self.vault_address)?;
        Ok(())
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|_| {
        AggregatorError::InvalidAddress {
            field,
            value: value.to_string(),
        }
        .into()
    })
}

// ============================================
// REGISTRY
// ============================================

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    vault: Vec<VaultEntry>,
}

/// Immutable, ordered list of vault entries
#[derive(Debug, Clone, Default)]
pub struct VaultRegistry {
    vaults: Vec<VaultEntry>,
}

impl VaultRegistry {
    /// Build from already-parsed entries (validates every address)
    pub fn new(vaults: Vec<VaultEntry>) -> Result<Self> {
        for vault in &vaults {
            vault.validate().wrap_err_with(|| {
                format!(
                    "invalid vault entry {} {}/{}",
                    vault.protocol, vault.asset_symbol, vault.debt_symbol
                )
            })?;
        }
        Ok(Self { vaults })
    }

    /// Parse a TOML registry (`[[vault]]` tables)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RegistryFile =
            toml::from_str(content).wrap_err("failed to parse vault registry")?;
        Self::new(file.vault)
    }

    /// Load a registry file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read vault registry {}", path.display()))?;
        let registry = Self::from_toml_str(&content)?;
        debug!("Loaded {} vaults from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// The registry compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_REGISTRY)
    }

    pub fn vaults(&self) -> &[VaultEntry] {
        &self.vaults
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Entries served by a given market, in registry order
    pub fn vaults_for_market<'a>(&'a self, market: &'a str) -> impl Iterator<Item = &'a VaultEntry> {
        self.vaults.iter().filter(move |v| v.market == market)
    }

    /// Distinct markets in first-seen order
    pub fn markets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.vaults
            .iter()
            .map(|v| v.market.as_str())
            .filter(|m| seen.insert(*m))
            .collect()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[vault]]
        protocol = "facAAVEv3"
        market = "facAAVEv3"
        asset_address = "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"
        asset_symbol = "WETH"
        debt_address = "0xaf88d065e77c8cC2239327C5EDb3A432268e5831"
        debt_symbol = "USDC"
        pool = "0x0000000000000000000000000000000000000001"

        [[vault]]
        protocol = "facLodestar"
        market = "facLodestar"
        asset_address = "0x912CE59144191C1204E64559FE8253a0e49E6548"
        asset_symbol = "ARB"
        debt_address = "0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8"
        debt_symbol = "USDC.e"
        pool = "0x0000000000000000000000000000000000000002"
    "#;

    #[test]
    fn test_parse_registry_preserves_order_and_case() {
        let registry = VaultRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(registry.len(), 2);

        let first = &registry.vaults()[0];
        assert_eq!(first.asset_symbol, "WETH");
        assert_eq!(first.asset_address, "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1");
        assert_eq!(first.vault_address, "0x0000000000000000000000000000000000000001");
        assert_eq!(registry.vaults()[1].market, "facLodestar");
    }

    #[test]
    fn test_invalid_address_rejected() {
        let bad = SAMPLE.replace("0x912CE59144191C1204E64559FE8253a0e49E6548", "0xnot-an-address");
        let err = VaultRegistry::from_toml_str(&bad).unwrap_err();

        let kind = err.downcast_ref::<AggregatorError>().unwrap();
        assert_eq!(
            *kind,
            AggregatorError::InvalidAddress {
                field: "asset_address",
                value: "0xnot-an-address".to_string(),
            }
        );
    }

    #[test]
    fn test_markets_deduplicated_in_order() {
        let mut vaults = VaultRegistry::from_toml_str(SAMPLE).unwrap().vaults().to_vec();
        vaults.push(vaults[0].clone());
        let registry = VaultRegistry::new(vaults).unwrap();

        assert_eq!(registry.markets(), vec!["facAAVEv3", "facLodestar"]);
        assert_eq!(registry.vaults_for_market("facAAVEv3").count(), 2);
    }

    #[test]
    fn test_embedded_registry_loads() {
        let registry = VaultRegistry::embedded().unwrap();
        assert!(!registry.is_empty());
    }
}
