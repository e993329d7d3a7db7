//! Batched token-transfer engine: builds, signs and submits transactions
//! against a fixed batching-contract deployment, reports what each one cost,
//! and reconciles token ownership back to a known baseline between runs.

pub mod accounts;
pub mod config;
pub mod cost;
pub mod ledger;
pub mod reconcile;
pub mod scenario;
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;

pub use accounts::{Account, AccountSet, LocalKey, PayloadSigner};
pub use config::{Config, Deployment, ScenarioParams, SubmitSettings};
pub use cost::{realized_fee, CostLine, Fee};
pub use ledger::{Ledger, LedgerError, Receipt, RpcLedger};
pub use reconcile::{ReconcileError, Reconciler, Scope};
pub use scenario::{plan, Action, Driver, DriverError, Step, StepReport};
pub use submitter::{SubmitError, Submitter};
