//! Aggregator error kinds
//!
//! Everything is propagated as `eyre::Report`; these are the failures a
//! caller may want to tell apart (via `downcast_ref::<AggregatorError>()`).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AggregatorError {
    /// TVL table read before the refresh populated it
    #[error("Tvl pair map not initialized")]
    NotInitialized,

    /// Price API returned no entry for a token referenced by the subgraph
    #[error("no price returned for token {address}")]
    MissingPrice { address: String },

    #[error("subgraph query failed: {0}")]
    Subgraph(String),

    #[error("price API request failed: {0}")]
    PriceApi(String),

    #[error("invalid raw balance in {field}: {value:?}")]
    InvalidBalance { field: &'static str, value: String },

    #[error("invalid address in {field}: {value:?}")]
    InvalidAddress { field: &'static str, value: String },
}
