//! Configuration for the vault yield listing
//!
//! Endpoints, output identity (chain/project/deep-link base) and the
//! caller-side scheduling knobs. Read from the environment (`.env`
//! supported) or a TOML file.

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::pools::{PoolContext, PoolRecord};
use crate::pricing::{DEFAULT_PRICE_API_URL, DEFAULT_PRICE_TIMEOUT_SECS};
use crate::refresh::TIMETRAVEL;
use crate::subgraph::DEFAULT_SUBGRAPH_URL;

const DEFAULT_RPC_URL: &str = "https://arb1.arbitrum.io/rpc";
const DEFAULT_APP_BASE_URL: &str = "https://app.factor.fi/studio/vault-leveraged";
const DEFAULT_CHAIN: &str = "arbitrum";
const DEFAULT_PROJECT: &str = "factor-leverage-vault";
const LEGACY_PROJECT: &str = "factor-leverage";

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Data Sources ==========
    /// Arbitrum RPC used by the market adapters
    pub rpc_url: String,

    /// Leverage vault subgraph endpoint
    pub subgraph_url: String,

    /// DefiLlama-compatible coins API
    pub price_api_url: String,

    pub price_timeout_secs: u64,

    // ========== Output ==========
    pub chain: String,
    pub project: String,

    /// Deep-link base for pool URLs
    pub app_base_url: String,

    /// Registry file; the embedded registry is used when unset
    pub vault_registry_path: Option<String>,

    // ========== Scheduling (watch mode) ==========
    /// Upper bound on one refresh
    pub refresh_timeout_secs: u64,

    /// Seconds between refreshes
    pub refresh_interval_secs: u64,

    // ========== Snapshot Log ==========
    pub snapshot_log: bool,
    pub snapshot_log_path: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            rpc_url: env_or("ARBITRUM_RPC_URL", DEFAULT_RPC_URL),
            subgraph_url: env_or("SUBGRAPH_URL", DEFAULT_SUBGRAPH_URL),
            price_api_url: env_or("PRICE_API_URL", DEFAULT_PRICE_API_URL),
            price_timeout_secs: env_parse("PRICE_TIMEOUT_SECS", DEFAULT_PRICE_TIMEOUT_SECS),

            chain: env_or("CHAIN", DEFAULT_CHAIN),
            project: env_or("PROJECT", DEFAULT_PROJECT),
            app_base_url: env_or("APP_BASE_URL", DEFAULT_APP_BASE_URL),
            vault_registry_path: env::var("VAULT_REGISTRY_PATH").ok(),

            refresh_timeout_secs: env_parse("REFRESH_TIMEOUT_SECS", 120),
            refresh_interval_secs: env_parse("REFRESH_INTERVAL_SECS", 3600),

            snapshot_log: env_parse("SNAPSHOT_LOG", false),
            snapshot_log_path: env_or("SNAPSHOT_LOG_PATH", "./logs/pool_snapshots.jsonl"),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("ARBITRUM_RPC_URL", &self.rpc_url),
            ("SUBGRAPH_URL", &self.subgraph_url),
            ("PRICE_API_URL", &self.price_api_url),
            ("APP_BASE_URL", &self.app_base_url),
        ] {
            if url.is_empty() || url.contains("YOUR_API_KEY") {
                return Err(eyre::eyre!("Invalid {} - please set a valid URL", name));
            }
        }

        if self.chain.trim().is_empty() {
            return Err(eyre::eyre!("CHAIN must not be empty"));
        }
        if self.refresh_timeout_secs == 0 || self.price_timeout_secs == 0 {
            return Err(eyre::eyre!("Timeouts must be at least 1 second"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(eyre::eyre!("REFRESH_INTERVAL_SECS must be at least 1 second"));
        }

        Ok(())
    }

    /// Identity stamped on every record
    pub fn pool_context(&self) -> PoolContext {
        PoolContext {
            chain: self.chain.clone(),
            project: self.project.clone(),
            app_base_url: self.app_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Same, for the legacy listing
    pub fn legacy_pool_context(&self) -> PoolContext {
        PoolContext {
            project: LEGACY_PROJECT.to_string(),
            ..self.pool_context()
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║            FACTOR VAULT YIELDS - CONFIGURATION             ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain:             {:^40} ║", self.chain);
        println!("║ Project:           {:^40} ║", self.project);
        println!("║ Registry:          {:^40} ║",
            self.vault_registry_path.as_deref().unwrap_or("embedded")
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SOURCES                                                    ║");
        println!("║ • Subgraph:        {:^40} ║", shorten(&self.subgraph_url, 40));
        println!("║ • Prices:          {:^40} ║", shorten(&self.price_api_url, 40));
        println!("║ • RPC:             {:^40} ║", shorten(&self.rpc_url, 40));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SCHEDULING                                                 ║");
        println!("║ • Timeout:         {:>38}s ║", self.refresh_timeout_secs);
        println!("║ • Interval:        {:>38}s ║", self.refresh_interval_secs);
        println!("║ • Timetravel:      {:^40} ║",
            if TIMETRAVEL { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("║ • Snapshot Log:    {:^40} ║",
            if self.snapshot_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Keep long URLs inside the summary box
fn shorten(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let head: String = value.chars().take(max - 3).collect();
    format!("{}...", head)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            subgraph_url: DEFAULT_SUBGRAPH_URL.to_string(),
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
            price_timeout_secs: DEFAULT_PRICE_TIMEOUT_SECS,
            chain: DEFAULT_CHAIN.to_string(),
            project: DEFAULT_PROJECT.to_string(),
            app_base_url: DEFAULT_APP_BASE_URL.to_string(),
            vault_registry_path: None,
            refresh_timeout_secs: 120,
            refresh_interval_secs: 3600,
            snapshot_log: false,
            snapshot_log_path: "./logs/pool_snapshots.jsonl".to_string(),
        }
    }
}

// ============================================
// SNAPSHOT LOGGER
// ============================================

/// One refresh worth of records, appended as a JSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshotLog {
    pub timestamp: DateTime<Utc>,
    pub pool_count: usize,
    pub total_tvl_usd: f64,
    pub records: Vec<PoolRecord>,
}

impl PoolSnapshotLog {
    pub fn new(records: Vec<PoolRecord>) -> Self {
        Self {
            timestamp: Utc::now(),
            pool_count: records.len(),
            total_tvl_usd: records.iter().map(|r| r.tvl_usd).sum(),
            records,
        }
    }

    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain, "arbitrum");
        assert_eq!(config.project, "factor-leverage-vault");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_placeholders() {
        let config = Config {
            rpc_url: "https://arb-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            refresh_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            refresh_interval_secs: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("REFRESH_INTERVAL_SECS"));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = std::env::temp_dir().join(format!("fvy-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let config = Config {
            chain: "arbitrum-sepolia".to_string(),
            vault_registry_path: Some("vaults.toml".to_string()),
            ..Config::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_pool_context_trims_base_url() {
        let config = Config {
            app_base_url: "https://app.factor.fi/studio/vault-leveraged/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.pool_context().app_base_url,
            "https://app.factor.fi/studio/vault-leveraged"
        );
        assert_eq!(config.legacy_pool_context().project, "factor-leverage");
    }

    #[test]
    fn test_snapshot_log_appends_lines() {
        let dir = std::env::temp_dir().join(format!("fvy-snapshot-{}", std::process::id()));
        let path = dir.join("snapshots.jsonl");

        let snapshot = PoolSnapshotLog::new(Vec::new());
        snapshot.append_to_file(&path).unwrap();
        snapshot.append_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(snapshot.pool_count, 0);

        fs::remove_dir_all(&dir).ok();
    }
}
