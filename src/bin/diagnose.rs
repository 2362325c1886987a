//! Diagnostic tool - Check configuration and endpoint reachability
//!
//! Run with: cargo run --bin diagnose

use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

async fn check(name: &str, request: reqwest::RequestBuilder) {
    match request.send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("  {:<12} ✅ reachable ({})", name, resp.status());
        }
        Ok(resp) => println!("  {:<12} ⚠️  responded {}", name, resp.status()),
        Err(e) => println!("  {:<12} ❌ {}", name, e),
    }
}

#[tokio::main]
async fn main() {
    println!("🔍 FACTOR VAULT YIELDS DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("ARBITRUM_RPC_URL", "https://arb1.arbitrum.io/rpc", "RPC for market adapters"),
        (
            "SUBGRAPH_URL",
            "https://api.thegraph.com/subgraphs/name/dimasriat/factor-leverage-vault",
            "Pair balance subgraph",
        ),
        ("PRICE_API_URL", "https://coins.llama.fi", "Token price API"),
        ("CHAIN", "arbitrum", "Chain name on every record"),
        ("VAULT_REGISTRY_PATH", "embedded", "Vault registry file"),
        ("REFRESH_TIMEOUT_SECS", "120", "Upper bound on one refresh"),
        ("REFRESH_INTERVAL_SECS", "3600", "Seconds between refreshes (--watch)"),
        ("SNAPSHOT_LOG", "false", "Append refresh snapshots?"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    println!("═══════════════════════════════════════════════════");
    println!("                   ENDPOINTS                        ");
    println!("═══════════════════════════════════════════════════\n");

    let client = match Client::builder().timeout(Duration::from_secs(10)).build() {
        Ok(client) => client,
        Err(e) => {
            println!("  ❌ Could not build HTTP client: {}", e);
            return;
        }
    };

    let value = |key: &str, default: &str| env::var(key).unwrap_or_else(|_| default.to_string());
    let rpc = value("ARBITRUM_RPC_URL", "https://arb1.arbitrum.io/rpc");
    let subgraph = value(
        "SUBGRAPH_URL",
        "https://api.thegraph.com/subgraphs/name/dimasriat/factor-leverage-vault",
    );
    let prices = value("PRICE_API_URL", "https://coins.llama.fi");

    check(
        "RPC",
        client
            .post(&rpc)
            .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_chainId", "params": [] })),
    )
    .await;
    check(
        "Subgraph",
        client
            .post(&subgraph)
            .json(&json!({ "query": "{ _meta { block { number } } }" })),
    )
    .await;
    check(
        "Prices",
        client.get(format!(
            "{}/prices/current/arbitrum:0x82af49447d8a07e3bd95bd0d56f35241523fbab1",
            prices.trim_end_matches('/')
        )),
    )
    .await;

    println!("\n✅ Diagnostic complete!\n");
}
