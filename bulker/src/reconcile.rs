//! Restores the baseline distribution: all fungible balance with the primary
//! account and every tracked token id owned by it.
//!
//! Each pass re-reads chain state, so a transaction that timed out earlier
//! and landed later is picked up like any other drift. Nothing is cached
//! between passes and a pass over an already restored state submits nothing.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, U256};
use calls::{CallDescriptor, ContractCall, Query};
use tracing::{debug, info};

use crate::{
    accounts::{Account, AccountSet},
    config::Deployment,
    cost::CostLine,
    ledger::{Ledger, LedgerError},
    submitter::{SubmitError, Submitter},
};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("reading token state failed: {0}")]
    Query(#[from] LedgerError),

    /// The environment does not match the tracked account set.
    #[error("token {token_id} is owned by {owner}, which is not a tracked account")]
    UntrackedOwner { token_id: U256, owner: Address },

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("compensating transfer `{description}` reverted")]
    Reverted { description: String },
}

impl ReconcileError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UntrackedOwner { .. })
    }
}

pub async fn balance_of<L: Ledger>(
    ledger: &L,
    token: Address,
    owner: Address,
) -> Result<U256, LedgerError> {
    let output = ledger
        .call(owner, token, Query::BalanceOf { owner }.encode())
        .await?;
    Query::decode_balance(&output).map_err(|e| LedgerError::Decode(e.to_string()))
}

pub async fn owner_of<L: Ledger>(
    ledger: &L,
    nft: Address,
    token_id: U256,
) -> Result<Address, LedgerError> {
    let output = ledger
        .call(Address::ZERO, nft, Query::OwnerOf { token_id }.encode())
        .await?;
    Query::decode_owner(&output).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Which state a pass restores, and which accounts may sign compensations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub fungible: bool,
    /// `None` means every tracked account.
    pub accounts: Option<Vec<usize>>,
}

impl Scope {
    pub fn full() -> Self {
        Self {
            fungible: true,
            accounts: None,
        }
    }

    pub fn non_fungible() -> Self {
        Self {
            fungible: false,
            accounts: None,
        }
    }

    pub fn non_fungible_among(accounts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fungible: false,
            accounts: Some(accounts.into_iter().collect()),
        }
    }

    pub fn includes(&self, index: usize) -> bool {
        index == 0
            || self
                .accounts
                .as_ref()
                .map_or(true, |accounts| accounts.contains(&index))
    }
}

/// Point-in-time read of the state a pass restores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Fungible balance of every non-primary account in scope.
    pub balances: BTreeMap<Address, U256>,
    pub owners: BTreeMap<U256, Address>,
}

/// A single compensating transfer and the account that signs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compensation<'a> {
    pub signer: &'a Account,
    pub call: CallDescriptor,
}

impl Compensation<'_> {
    pub fn description(&self) -> String {
        match &self.call.call {
            ContractCall::Transfer { amount, .. } => {
                format!("return {amount} units from A{}", self.signer.index())
            }
            ContractCall::TransferToken { token_id, .. } => {
                format!("return #{token_id} from A{}", self.signer.index())
            }
            other => other.to_string(),
        }
    }
}

/// Computes the compensations that take `snapshot` back to baseline.
/// Every owner is resolved before anything is returned, so an untracked
/// owner fails the whole pass without a single transaction.
pub fn plan<'a>(
    snapshot: &Snapshot,
    accounts: &'a AccountSet,
    scope: &Scope,
    deployment: &Deployment,
) -> Result<Vec<Compensation<'a>>, ReconcileError> {
    let primary = accounts.primary().address();
    let signer_for = |address: Address| {
        accounts
            .by_address(address)
            .filter(|account| scope.includes(account.index()))
    };
    let mut compensations = Vec::new();

    for (&holder, &balance) in &snapshot.balances {
        if balance.is_zero() || holder == primary {
            continue;
        }
        if let Some(signer) = signer_for(holder) {
            compensations.push(Compensation {
                signer,
                call: CallDescriptor::new(
                    deployment.token,
                    ContractCall::Transfer {
                        to: primary,
                        amount: balance,
                    },
                ),
            });
        }
    }

    for (&token_id, &owner) in &snapshot.owners {
        if owner == primary {
            continue;
        }
        let signer = signer_for(owner).ok_or(ReconcileError::UntrackedOwner { token_id, owner })?;
        compensations.push(Compensation {
            signer,
            call: CallDescriptor::new(
                deployment.nft,
                ContractCall::TransferToken {
                    from: owner,
                    to: primary,
                    token_id,
                },
            ),
        });
    }

    Ok(compensations)
}

/// What a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub transfers: Vec<CostLine>,
}

pub struct Reconciler<'a, L> {
    submitter: &'a Submitter<L>,
    accounts: &'a AccountSet,
    deployment: Deployment,
    token_ids: Vec<U256>,
}

impl<'a, L: Ledger> Reconciler<'a, L> {
    pub fn new(
        submitter: &'a Submitter<L>,
        accounts: &'a AccountSet,
        deployment: Deployment,
        token_ids: Vec<U256>,
    ) -> Self {
        Self {
            submitter,
            accounts,
            deployment,
            token_ids,
        }
    }

    pub async fn snapshot(&self, scope: &Scope) -> Result<Snapshot, LedgerError> {
        let ledger = self.submitter.ledger();
        let mut snapshot = Snapshot::default();
        if scope.fungible {
            for account in self.accounts.recipients() {
                if !scope.includes(account.index()) {
                    continue;
                }
                let balance =
                    balance_of(ledger, self.deployment.token, account.address()).await?;
                snapshot.balances.insert(account.address(), balance);
            }
        }
        for &token_id in &self.token_ids {
            let owner = owner_of(ledger, self.deployment.nft, token_id).await?;
            snapshot.owners.insert(token_id, owner);
        }
        debug!(?snapshot, "ledger snapshot");
        Ok(snapshot)
    }

    /// Runs one pass. The first failing compensation aborts it; what was
    /// already restored stays restored and a re-run finishes the rest.
    pub async fn run(&self, scope: &Scope) -> Result<ReconcileReport, ReconcileError> {
        let snapshot = self.snapshot(scope).await?;
        let compensations = plan(&snapshot, self.accounts, scope, &self.deployment)?;
        if compensations.is_empty() {
            info!("already at baseline");
        }

        let mut report = ReconcileReport::default();
        for compensation in compensations {
            let description = compensation.description();
            info!(%description, "restoring");
            let receipt = self
                .submitter
                .submit(compensation.signer, &compensation.call)
                .await?;
            if !receipt.success {
                return Err(ReconcileError::Reverted { description });
            }
            report.transfers.push(CostLine::new(description, receipt));
        }
        Ok(report)
    }
}
