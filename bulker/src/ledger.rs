//! The remote ledger seam.
//!
//! Everything the engine knows about the chain goes through [`Ledger`]:
//! nonce and fee reads, gas estimation, raw submission, receipt polling and
//! read-only calls. [`RpcLedger`] speaks JSON-RPC over HTTP.

use std::time::Duration;

use alloy_core::primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionInput, TransactionReceipt, TransactionRequest};
use alloy_transport::TransportError;
use async_trait::async_trait;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("rpc transport: {0}")]
    Transport(String),

    /// The node refused the request, e.g. stale nonce, insufficient funds
    /// for fees, or a call that would revert.
    #[error("rejected by node: {0}")]
    Rejected(String),

    #[error("no receipt for {hash} after {after:?}")]
    Timeout { hash: TxHash, after: Duration },

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// EIP-1559 fee parameters for the next transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Terminal outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    /// `false` means included but reverted.
    pub success: bool,
    pub gas_used: u64,
    pub effective_gas_price: Option<u128>,
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            // an absent `effectiveGasPrice` deserializes as zero
            effective_gas_price: (receipt.effective_gas_price != 0)
                .then_some(receipt.effective_gas_price),
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    /// Next nonce for `address`, counting pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError>;

    async fn fee_estimate(&self) -> Result<FeeQuote, LedgerError>;

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        input: Bytes,
    ) -> Result<u64, LedgerError>;

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, LedgerError>;

    /// Blocks until the receipt for `hash` is observed or `timeout` elapses.
    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Receipt, LedgerError>;

    async fn call(&self, from: Address, to: Address, input: Bytes) -> Result<Bytes, LedgerError>;
}

pub struct RpcLedger {
    provider: DynProvider,
}

impl RpcLedger {
    pub fn connect(rpc_url: &str) -> Result<Self, LedgerError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| LedgerError::Transport(format!("bad rpc url {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::default().connect_http(url).erased();
        Ok(Self { provider })
    }

    fn request(from: Address, to: Address, input: Bytes) -> TransactionRequest {
        TransactionRequest::default()
            .from(from)
            .to(to)
            .input(TransactionInput::new(input))
    }
}

fn transport<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

// Error responses carry the node's reason, everything else is transport.
fn classify(e: TransportError) -> LedgerError {
    match e.as_error_resp() {
        Some(resp) => LedgerError::Rejected(resp.message.to_string()),
        None => transport(e),
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.provider.get_chain_id().await.map_err(transport)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(transport)
    }

    async fn fee_estimate(&self) -> Result<FeeQuote, LedgerError> {
        let estimate = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(transport)?;
        Ok(FeeQuote {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        input: Bytes,
    ) -> Result<u64, LedgerError> {
        self.provider
            .estimate_gas(Self::request(from, to, input))
            .await
            .map_err(classify)
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, LedgerError> {
        let pending = self
            .provider
            .send_raw_transaction(&encoded)
            .await
            .map_err(classify)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Receipt, LedgerError> {
        let poll = async {
            loop {
                if let Some(receipt) = self
                    .provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(transport)?
                {
                    return Ok::<_, LedgerError>(Receipt::from(receipt));
                }
                trace!(%hash, "receipt not yet available");
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| LedgerError::Timeout {
                hash,
                after: timeout,
            })?
    }

    async fn call(&self, from: Address, to: Address, input: Bytes) -> Result<Bytes, LedgerError> {
        self.provider
            .call(Self::request(from, to, input))
            .await
            .map_err(classify)
    }
}
