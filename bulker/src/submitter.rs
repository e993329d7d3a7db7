use std::time::Duration;

use alloy_consensus::TxEip1559;
use alloy_core::primitives::{Address, TxHash, TxKind, U256};
use calls::CallDescriptor;
use tracing::{debug, info_span, Instrument};

use crate::{
    accounts::Account,
    config::SubmitSettings,
    ledger::{Ledger, LedgerError, Receipt},
};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("reading chain state for {account} failed: {source}")]
    Query {
        account: Address,
        #[source]
        source: LedgerError,
    },

    #[error("transaction from {account} with nonce {nonce} rejected: {reason}")]
    Rejected {
        account: Address,
        nonce: u64,
        reason: String,
    },

    #[error(
        "transaction {hash} from {account} with nonce {nonce} has no receipt after {after:?}; \
         its fate is unknown, query it before re-running"
    )]
    Timeout {
        account: Address,
        nonce: u64,
        hash: TxHash,
        after: Duration,
    },

    /// Transport broke after the signed transaction left; `hash` is `None`
    /// when the node never acknowledged it.
    #[error(
        "transaction from {account} with nonce {nonce} lost contact with the node; \
         its fate is unknown, query it before re-running: {source}"
    )]
    Unsettled {
        account: Address,
        nonce: u64,
        hash: Option<TxHash>,
        #[source]
        source: LedgerError,
    },

    #[error("signing for {account} with nonce {nonce} failed: {source}")]
    Signing {
        account: Address,
        nonce: u64,
        #[source]
        source: alloy_signer::Error,
    },
}

impl SubmitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The transaction may still land.
    pub fn is_fate_unknown(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unsettled { .. })
    }
}

/// A call descriptor bound to a sender and nonce, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub nonce: u64,
    pub chain_id: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub call: CallDescriptor,
}

impl TransactionRequest {
    pub fn unsigned(&self) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            to: TxKind::Call(self.call.target),
            value: U256::ZERO,
            access_list: Default::default(),
            input: self.call.input(),
        }
    }
}

/// Builds, signs, submits and awaits one transaction at a time.
pub struct Submitter<L> {
    ledger: L,
    chain_id: u64,
    settings: SubmitSettings,
}

impl<L: Ledger> Submitter<L> {
    pub async fn new(ledger: L, settings: SubmitSettings) -> Result<Self, LedgerError> {
        let chain_id = ledger.chain_id().await?;
        Ok(Self {
            ledger,
            chain_id,
            settings,
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Submits `call` from `from` and blocks until its receipt or the
    /// configured timeout. A reverted transaction is still `Ok`; check
    /// [`Receipt::success`].
    pub async fn submit(&self, from: &Account, call: &CallDescriptor) -> Result<Receipt, SubmitError> {
        let account = from.address();
        let span = info_span!("submit", %account, call = %call.call);
        async move {
            let request = self.prepare(account, call).await?;
            let nonce = request.nonce;
            debug!(nonce, gas_limit = request.gas_limit, "signing");

            let encoded = from
                .sign(request.unsigned())
                .map_err(|source| SubmitError::Signing {
                    account,
                    nonce,
                    source,
                })?;

            let hash = self
                .ledger
                .send_raw_transaction(encoded)
                .await
                .map_err(|e| match e {
                    LedgerError::Rejected(reason) => SubmitError::Rejected {
                        account,
                        nonce,
                        reason,
                    },
                    other => SubmitError::Unsettled {
                        account,
                        nonce,
                        hash: None,
                        source: other,
                    },
                })?;
            debug!(nonce, %hash, "submitted, awaiting receipt");

            let receipt = self
                .ledger
                .wait_for_receipt(hash, self.settings.receipt_timeout, self.settings.poll_interval)
                .await
                .map_err(|e| match e {
                    LedgerError::Timeout { hash, after } => SubmitError::Timeout {
                        account,
                        nonce,
                        hash,
                        after,
                    },
                    other => SubmitError::Unsettled {
                        account,
                        nonce,
                        hash: Some(hash),
                        source: other,
                    },
                })?;
            debug!(nonce, success = receipt.success, gas_used = receipt.gas_used, "receipt");
            Ok(receipt)
        }
        .instrument(span)
        .await
    }

    async fn prepare(&self, account: Address, call: &CallDescriptor) -> Result<TransactionRequest, SubmitError> {
        let query = |source| SubmitError::Query { account, source };

        // always re-read: other runs may have advanced the nonce
        let nonce = self.ledger.transaction_count(account).await.map_err(query)?;

        let estimate = self
            .ledger
            .estimate_gas(account, call.target, call.input())
            .await
            .map_err(|e| match e {
                LedgerError::Rejected(reason) => SubmitError::Rejected {
                    account,
                    nonce,
                    reason,
                },
                other => query(other),
            })?;
        let gas_limit = estimate.saturating_mul(self.settings.gas_limit_multiplier_percent) / 100;
        let fees = self.ledger.fee_estimate().await.map_err(query)?;

        Ok(TransactionRequest {
            from: account,
            nonce,
            chain_id: self.chain_id,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            call: call.clone(),
        })
    }
}
