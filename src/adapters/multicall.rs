//! Multicall3 batching for adapter reads
//!
//! Each adapter fetches all of its on-chain state in a single
//! `aggregate3` eth_call. Individual calls may fail (`allowFailure`);
//! the batch itself failing is an error.

use alloy_primitives::{address, Address};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use eyre::{eyre, Result};
use tracing::debug;

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

/// Multicall3 address (same on all EVM chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Wrap a typed call for the batch
pub fn call3<C: SolCall>(target: Address, call: &C) -> IMulticall3::Call3 {
    IMulticall3::Call3 {
        target,
        allowFailure: true,
        callData: call.abi_encode().into(),
    }
}

/// Decode one batch result; `None` if the call reverted or did not decode
pub fn decode<C: SolCall>(result: Option<&IMulticall3::Result>) -> Option<C::Return> {
    let result = result?;
    if !result.success {
        return None;
    }
    C::abi_decode_returns(&result.returnData).ok()
}

/// Execute Multicall3 batch - SINGLE RPC call
pub async fn aggregate(
    rpc_url: &str,
    calls: Vec<IMulticall3::Call3>,
) -> Result<Vec<IMulticall3::Result>> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }

    let count = calls.len();
    let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?);

    let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

    let tx = TransactionRequest::default()
        .to(MULTICALL3)
        .input(calldata.into());

    let result = provider
        .call(tx)
        .await
        .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

    let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
        .map_err(|e| eyre!("Failed to decode multicall: {}", e))?;

    debug!("Multicall3: {} calls, {} results", count, decoded.len());
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    sol! {
        interface IToken {
            function decimals() external view returns (uint8);
        }
    }

    #[test]
    fn test_failed_call_decodes_to_none() {
        let failed = IMulticall3::Result {
            success: false,
            returnData: Bytes::new(),
        };
        assert!(decode::<IToken::decimalsCall>(Some(&failed)).is_none());
        assert!(decode::<IToken::decimalsCall>(None).is_none());
    }

    #[test]
    fn test_call3_allows_failure() {
        let call = call3(MULTICALL3, &IToken::decimalsCall {});
        assert!(call.allowFailure);
        assert_eq!(call.callData.len(), 4);
    }

    #[test]
    fn test_empty_batch_skips_rpc() {
        let results = tokio_test::block_on(aggregate("http://localhost:8545", Vec::new())).unwrap();
        assert!(results.is_empty());
    }
}
