//! The scenario as data: an ordered list of named steps, executed one after
//! another by [`Driver`]. Steps can be run from any index, which is how a
//! halted run is resumed.

use alloy_core::primitives::{Address, TxHash, U256};
use calls::{CallDescriptor, ContractCall, Transfer};
use tracing::{info, info_span, Instrument};

use crate::{
    accounts::AccountSet,
    config::{Deployment, ScenarioParams},
    cost::CostLine,
    ledger::{Ledger, LedgerError},
    reconcile::{balance_of, ReconcileError, Reconciler, Scope},
    submitter::{SubmitError, Submitter},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Read-only: fungible balance of every tracked account.
    ReportBalances,
    /// Primary grants the batching contract unlimited allowance and
    /// operator approval.
    GrantApprovals,
    BulkTransfer20 {
        calls: Vec<Transfer>,
    },
    BulkTransfer721 {
        calls: Vec<Transfer>,
    },
    BulkTransfer721Lite {
        to: Address,
        token_ids: Vec<U256>,
    },
    Reconcile(Scope),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub action: Action,
}

impl Step {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

pub mod plan {
    use super::*;

    /// Three structurally different batch entry points, each starting from
    /// the same token distribution so their gas costs are comparable.
    pub fn gas_comparison(accounts: &AccountSet, params: &ScenarioParams) -> Vec<Step> {
        let recipients: Vec<Address> = accounts.recipients().iter().map(|a| a.address()).collect();
        let ids = params.tracked_ids();
        let a1 = recipients[0];

        let fungible = recipients
            .iter()
            .map(|to| Transfer::new(*to, params.amount()))
            .collect();
        let three = recipients
            .iter()
            .zip(&ids)
            .map(|(to, id)| Transfer::new(*to, *id))
            .collect();
        let six = recipients
            .iter()
            .cycle()
            .zip(&ids)
            .map(|(to, id)| Transfer::new(*to, *id))
            .collect();

        vec![
            Step::new("balances", Action::ReportBalances),
            Step::new("approve batching contract", Action::GrantApprovals),
            Step::new(
                "bulkTransfer20 to 3 recipients",
                Action::BulkTransfer20 { calls: fungible },
            ),
            Step::new("balances after bulkTransfer20", Action::ReportBalances),
            Step::new(
                "bulkTransfer721, 3 ids to 3 recipients",
                Action::BulkTransfer721 { calls: three },
            ),
            Step::new("reset tokens", Action::Reconcile(Scope::non_fungible())),
            Step::new(
                "bulkTransfer721, 6 ids to 3 recipients",
                Action::BulkTransfer721 { calls: six },
            ),
            Step::new("reset tokens", Action::Reconcile(Scope::non_fungible())),
            Step::new(
                "bulkTransfer721Lite, 3 ids to 1 recipient",
                Action::BulkTransfer721Lite {
                    to: a1,
                    token_ids: ids[..3].to_vec(),
                },
            ),
            Step::new(
                "reset tokens",
                Action::Reconcile(Scope::non_fungible_among(0..4)),
            ),
            Step::new(
                "bulkTransfer721Lite, 6 ids to 1 recipient",
                Action::BulkTransfer721Lite {
                    to: a1,
                    token_ids: ids,
                },
            ),
        ]
    }

    /// Recovers a dirty state between runs. Approvals still go out first,
    /// only the measured batches are skipped.
    pub fn reset() -> Vec<Step> {
        vec![
            Step::new("balances", Action::ReportBalances),
            Step::new("approve batching contract", Action::GrantApprovals),
            Step::new("reset to baseline", Action::Reconcile(Scope::full())),
            Step::new("balances after reset", Action::ReportBalances),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("reading balances failed: {0}")]
    Query(#[from] LedgerError),

    #[error("transaction {hash} was included but reverted")]
    Reverted { hash: TxHash },
}

#[derive(Debug, thiserror::Error)]
#[error("step {index} `{name}` failed: {source}")]
pub struct DriverError {
    pub index: usize,
    pub name: String,
    #[source]
    pub source: StepError,
}

/// What one step produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub name: String,
    pub lines: Vec<CostLine>,
    pub balances: Vec<(Address, U256)>,
}

impl StepReport {
    pub fn render(&self, symbol: &str) -> Vec<String> {
        let mut out = vec![format!("[{}] {}", self.index, self.name)];
        out.extend(
            self.balances
                .iter()
                .map(|(address, balance)| format!("  {address}: {balance}")),
        );
        out.extend(self.lines.iter().map(|line| format!("  {}", line.render(symbol))));
        if self.balances.is_empty() && self.lines.is_empty() {
            out.push("  nothing to do".to_string());
        }
        out
    }
}

pub struct Driver<'a, L> {
    submitter: &'a Submitter<L>,
    accounts: &'a AccountSet,
    deployment: Deployment,
    token_ids: Vec<U256>,
}

impl<'a, L: Ledger> Driver<'a, L> {
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

    pub async fn run(&self, steps: &[Step]) -> Result<Vec<StepReport>, DriverError> {
        self.run_with(steps, 0, |_| {}).await
    }

    pub async fn run_from(
        &self,
        steps: &[Step],
        start: usize,
    ) -> Result<Vec<StepReport>, DriverError> {
        self.run_with(steps, start, |_| {}).await
    }

    /// Runs `steps[start..]` in order, handing each report to `on_step` as
    /// soon as the step completes. The first failing step stops the run.
    pub async fn run_with(
        &self,
        steps: &[Step],
        start: usize,
        mut on_step: impl FnMut(&StepReport),
    ) -> Result<Vec<StepReport>, DriverError> {
        let mut reports = Vec::new();
        for (index, step) in steps.iter().enumerate().skip(start) {
            let span = info_span!("step", index, name = %step.name);
            let mut report = self
                .execute(&step.action)
                .instrument(span)
                .await
                .map_err(|source| DriverError {
                    index,
                    name: step.name.clone(),
                    source,
                })?;
            report.index = index;
            report.name = step.name.clone();
            on_step(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    async fn execute(&self, action: &Action) -> Result<StepReport, StepError> {
        let mut report = StepReport::default();
        let primary = self.accounts.primary();
        match action {
            Action::ReportBalances => {
                for account in self.accounts.iter() {
                    let balance = balance_of(
                        self.submitter.ledger(),
                        self.deployment.token,
                        account.address(),
                    )
                    .await?;
                    report.balances.push((account.address(), balance));
                }
            }
            Action::GrantApprovals => {
                let bulk = self.deployment.bulk_transfer;
                let approve = CallDescriptor::new(
                    self.deployment.token,
                    ContractCall::Approve {
                        spender: bulk,
                        amount: U256::MAX,
                    },
                );
                let operator = CallDescriptor::new(
                    self.deployment.nft,
                    ContractCall::SetApprovalForAll {
                        operator: bulk,
                        approved: true,
                    },
                );
                for call in [approve, operator] {
                    report.lines.push(self.submit(&call).await?);
                }
            }
            Action::BulkTransfer20 { calls } => {
                let call = ContractCall::BulkTransfer20 {
                    token: self.deployment.token,
                    calls: calls.clone(),
                };
                report.lines.push(self.submit_bulk(call).await?);
            }
            Action::BulkTransfer721 { calls } => {
                let call = ContractCall::BulkTransfer721 {
                    token: self.deployment.nft,
                    calls: calls.clone(),
                };
                report.lines.push(self.submit_bulk(call).await?);
            }
            Action::BulkTransfer721Lite { to, token_ids } => {
                let call = ContractCall::BulkTransfer721Lite {
                    token: self.deployment.nft,
                    to: *to,
                    token_ids: token_ids.clone(),
                };
                report.lines.push(self.submit_bulk(call).await?);
            }
            Action::Reconcile(scope) => {
                let reconciler = Reconciler::new(
                    self.submitter,
                    self.accounts,
                    self.deployment,
                    self.token_ids.clone(),
                );
                report.lines = reconciler.run(scope).await?.transfers;
            }
        }
        info!(account = %primary, transactions = report.lines.len(), "step done");
        Ok(report)
    }

    async fn submit_bulk(&self, call: ContractCall) -> Result<CostLine, StepError> {
        self.submit(&CallDescriptor::new(self.deployment.bulk_transfer, call))
            .await
    }

    async fn submit(&self, call: &CallDescriptor) -> Result<CostLine, StepError> {
        let receipt = self.submitter.submit(self.accounts.primary(), call).await?;
        let line = CostLine::new(call.call.to_string(), receipt);
        if !line.receipt.success {
            return Err(StepError::Reverted {
                hash: line.receipt.hash,
            });
        }
        Ok(line)
    }
}
