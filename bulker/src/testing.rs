//! In-memory ledger used by the engine tests. It decodes submitted
//! envelopes, recovers the sender, enforces nonces and runs the token and
//! batching semantics the deployed contracts implement.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use alloy_consensus::{SignableTransaction, TxEnvelope};
use alloy_core::{
    primitives::{Address, Bytes, TxHash, TxKind, U256},
    sol_types::{SolCall, SolValue},
};
use alloy_eips::eip2718::Decodable2718;
use async_trait::async_trait;
use calls::{ContractCall, ContractKind, IERC20, IERC721};
use tokio::sync::Mutex;

use crate::{
    accounts::{AccountSet, LocalKey, PayloadSigner},
    config::{Deployment, ScenarioParams},
    ledger::{FeeQuote, Ledger, LedgerError, Receipt},
};

pub(crate) const CHAIN_ID: u64 = 43113;
pub(crate) const GAS_PRICE: u128 = 25_000_000_000;

pub(crate) fn deployment() -> Deployment {
    Deployment {
        bulk_transfer: Address::repeat_byte(0xb1),
        token: Address::repeat_byte(0x20),
        nft: Address::repeat_byte(0x72),
    }
}

pub(crate) fn accounts() -> AccountSet {
    let signers = (0..4)
        .map(|_| Arc::new(LocalKey::random()) as Arc<dyn PayloadSigner>)
        .collect();
    AccountSet::from_signers(signers).unwrap()
}

/// A ledger at baseline: the primary holds `supply` fungible units and
/// every scenario token id.
pub(crate) async fn baseline(accounts: &AccountSet, supply: u64) -> MockLedger {
    let ledger = MockLedger::new(deployment());
    let primary = accounts.primary().address();
    ledger.mint(primary, U256::from(supply)).await;
    for id in ScenarioParams::default().tracked_ids() {
        ledger.mint_token(primary, id).await;
    }
    ledger
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sent {
    pub from: Address,
    pub nonce: u64,
    pub target: Address,
    pub call: ContractCall,
    pub success: bool,
}

#[derive(Debug, Clone, Default)]
struct Tokens {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    owners: HashMap<U256, Address>,
    operators: HashSet<(Address, Address)>,
}

impl Tokens {
    fn move_units(&mut self, from: Address, to: Address, amount: U256) -> Result<(), String> {
        let balance = self.balances.get(&from).copied().unwrap_or_default();
        if balance < amount {
            return Err(format!("insufficient balance: {balance} < {amount}"));
        }
        self.balances.insert(from, balance - amount);
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    fn spend_allowance(&mut self, owner: Address, spender: Address, amount: U256) -> Result<(), String> {
        let allowance = self
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default();
        if allowance < amount {
            return Err("insufficient allowance".to_string());
        }
        if allowance != U256::MAX {
            self.allowances.insert((owner, spender), allowance - amount);
        }
        Ok(())
    }

    fn move_token(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        id: U256,
    ) -> Result<(), String> {
        let owner = self.owners.get(&id).copied().ok_or("nonexistent token")?;
        if owner != from {
            return Err(format!("token {id} is not owned by {from}"));
        }
        if operator != owner && !self.operators.contains(&(owner, operator)) {
            return Err("caller is not owner nor approved".to_string());
        }
        self.owners.insert(id, to);
        Ok(())
    }
}

struct State {
    nonces: HashMap<Address, u64>,
    tokens: Tokens,
    receipts: HashMap<TxHash, Receipt>,
    sent: Vec<Sent>,
    block: u64,
    stall_receipts: bool,
    reject_next: Option<String>,
    revert_next: bool,
    lose_send_response: bool,
    fail_receipt_polls: bool,
    gas_price: Option<u128>,
}

pub(crate) struct MockLedger {
    deployment: Deployment,
    state: Mutex<State>,
}

fn gas_for(call: &ContractCall) -> u64 {
    let per_item = |n: usize, cost: u64| 21_000 + cost * n as u64;
    match call {
        ContractCall::BulkTransfer20 { calls, .. } => per_item(calls.len(), 30_000),
        ContractCall::BulkTransfer721 { calls, .. } => per_item(calls.len(), 35_000),
        ContractCall::BulkTransfer721Lite { token_ids, .. } => per_item(token_ids.len(), 25_000),
        ContractCall::Approve { .. } | ContractCall::SetApprovalForAll { .. } => 46_000,
        ContractCall::Transfer { .. } | ContractCall::TransferFrom { .. } => 51_000,
        ContractCall::TransferToken { .. } => 58_000,
    }
}

impl MockLedger {
    pub(crate) fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            state: Mutex::new(State {
                nonces: HashMap::new(),
                tokens: Tokens::default(),
                receipts: HashMap::new(),
                sent: Vec::new(),
                block: 1,
                stall_receipts: false,
                reject_next: None,
                revert_next: false,
                lose_send_response: false,
                fail_receipt_polls: false,
                gas_price: Some(GAS_PRICE),
            }),
        }
    }

    pub(crate) async fn mint(&self, owner: Address, amount: U256) {
        *self.state.lock().await.tokens.balances.entry(owner).or_default() += amount;
    }

    pub(crate) async fn mint_token(&self, owner: Address, id: U256) {
        self.state.lock().await.tokens.owners.insert(id, owner);
    }

    pub(crate) async fn balance(&self, owner: Address) -> U256 {
        let state = self.state.lock().await;
        state.tokens.balances.get(&owner).copied().unwrap_or_default()
    }

    pub(crate) async fn owner(&self, id: U256) -> Option<Address> {
        self.state.lock().await.tokens.owners.get(&id).copied()
    }

    pub(crate) async fn sent(&self) -> Vec<Sent> {
        self.state.lock().await.sent.clone()
    }

    pub(crate) async fn stall_receipts(&self, stall: bool) {
        self.state.lock().await.stall_receipts = stall;
    }

    pub(crate) async fn reject_next(&self, reason: &str) {
        self.state.lock().await.reject_next = Some(reason.to_string());
    }

    pub(crate) async fn revert_next(&self) {
        self.state.lock().await.revert_next = true;
    }

    /// The next submission is applied but its response never arrives.
    pub(crate) async fn lose_send_response(&self) {
        self.state.lock().await.lose_send_response = true;
    }

    pub(crate) async fn fail_receipt_polls(&self, fail: bool) {
        self.state.lock().await.fail_receipt_polls = fail;
    }

    pub(crate) async fn hide_gas_price(&self) {
        self.state.lock().await.gas_price = None;
    }

    fn kind_of(&self, target: Address) -> Option<ContractKind> {
        if target == self.deployment.bulk_transfer {
            Some(ContractKind::Bulk)
        } else if target == self.deployment.token {
            Some(ContractKind::Erc20)
        } else if target == self.deployment.nft {
            Some(ContractKind::Erc721)
        } else {
            None
        }
    }

    fn execute(&self, tokens: &mut Tokens, sender: Address, call: &ContractCall) -> Result<(), String> {
        let bulk = self.deployment.bulk_transfer;
        let mut next = tokens.clone();
        match call {
            ContractCall::Approve { spender, amount } => {
                next.allowances.insert((sender, *spender), *amount);
            }
            ContractCall::Transfer { to, amount } => next.move_units(sender, *to, *amount)?,
            ContractCall::TransferFrom { from, to, amount } => {
                next.spend_allowance(*from, sender, *amount)?;
                next.move_units(*from, *to, *amount)?;
            }
            ContractCall::SetApprovalForAll { operator, approved } => {
                if *approved {
                    next.operators.insert((sender, *operator));
                } else {
                    next.operators.remove(&(sender, *operator));
                }
            }
            ContractCall::TransferToken { from, to, token_id } => {
                next.move_token(sender, *from, *to, *token_id)?
            }
            ContractCall::BulkTransfer20 { token, calls } => {
                if *token != self.deployment.token {
                    return Err("unknown token".to_string());
                }
                for t in calls {
                    next.spend_allowance(sender, bulk, t.amount_or_token_id)?;
                    next.move_units(sender, t.to, t.amount_or_token_id)?;
                }
            }
            ContractCall::BulkTransfer721 { token, calls } => {
                if *token != self.deployment.nft {
                    return Err("unknown token".to_string());
                }
                for t in calls {
                    next.move_token(bulk, sender, t.to, t.amount_or_token_id)?;
                }
            }
            ContractCall::BulkTransfer721Lite {
                token,
                to,
                token_ids,
            } => {
                if *token != self.deployment.nft {
                    return Err("unknown token".to_string());
                }
                for id in token_ids {
                    next.move_token(bulk, sender, *to, *id)?;
                }
            }
        }
        *tokens = next;
        Ok(())
    }

    fn decode(&self, target: Address, input: &[u8]) -> Result<ContractCall, LedgerError> {
        let kind = self
            .kind_of(target)
            .ok_or_else(|| LedgerError::Rejected(format!("no contract at {target}")))?;
        ContractCall::decode(kind, input).map_err(|e| LedgerError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        Ok(CHAIN_ID)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        Ok(self
            .state
            .lock()
            .await
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn fee_estimate(&self) -> Result<FeeQuote, LedgerError> {
        Ok(FeeQuote {
            max_fee_per_gas: 2 * GAS_PRICE,
            max_priority_fee_per_gas: GAS_PRICE / 10,
        })
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        input: Bytes,
    ) -> Result<u64, LedgerError> {
        let call = self.decode(to, &input)?;
        let mut scratch = self.state.lock().await.tokens.clone();
        self.execute(&mut scratch, from, &call)
            .map_err(|reason| LedgerError::Rejected(format!("execution reverted: {reason}")))?;
        Ok(gas_for(&call))
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = state.reject_next.take() {
            return Err(LedgerError::Rejected(reason));
        }

        let envelope = TxEnvelope::decode_2718(&mut &encoded[..])
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let TxEnvelope::Eip1559(signed) = envelope else {
            return Err(LedgerError::Rejected("unsupported transaction type".into()));
        };
        let tx = signed.tx();
        let from = signed
            .signature()
            .recover_address_from_prehash(&tx.signature_hash())
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        if tx.chain_id != CHAIN_ID {
            return Err(LedgerError::Rejected("invalid chain id".into()));
        }
        let expected = state.nonces.get(&from).copied().unwrap_or_default();
        if tx.nonce != expected {
            return Err(LedgerError::Rejected(format!(
                "nonce mismatch: got {}, expected {expected}",
                tx.nonce
            )));
        }
        let TxKind::Call(target) = tx.to else {
            return Err(LedgerError::Rejected("contract creation".into()));
        };
        let call = self.decode(target, &tx.input)?;

        state.nonces.insert(from, expected + 1);
        let success = if std::mem::take(&mut state.revert_next) {
            false
        } else {
            self.execute(&mut state.tokens, from, &call).is_ok()
        };
        let hash = *signed.hash();
        state.block += 1;
        let receipt = Receipt {
            hash,
            block_number: Some(state.block),
            success,
            gas_used: gas_for(&call),
            effective_gas_price: state.gas_price,
        };
        state.receipts.insert(hash, receipt);
        state.sent.push(Sent {
            from,
            nonce: tx.nonce,
            target,
            call,
            success,
        });
        if std::mem::take(&mut state.lose_send_response) {
            return Err(LedgerError::Transport("connection reset by peer".into()));
        }
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
        _poll_interval: Duration,
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.state.lock().await;
        if state.fail_receipt_polls {
            return Err(LedgerError::Transport("503 service unavailable".into()));
        }
        if state.stall_receipts {
            return Err(LedgerError::Timeout {
                hash,
                after: timeout,
            });
        }
        state.receipts.remove(&hash).ok_or(LedgerError::Timeout {
            hash,
            after: timeout,
        })
    }

    async fn call(&self, _from: Address, to: Address, input: Bytes) -> Result<Bytes, LedgerError> {
        let state = self.state.lock().await;
        if to == self.deployment.token {
            let query = IERC20::balanceOfCall::abi_decode(&input)
                .map_err(|e| LedgerError::Rejected(e.to_string()))?;
            let balance = state
                .tokens
                .balances
                .get(&query.account)
                .copied()
                .unwrap_or_default();
            return Ok(balance.abi_encode().into());
        }
        if to == self.deployment.nft {
            let query = IERC721::ownerOfCall::abi_decode(&input)
                .map_err(|e| LedgerError::Rejected(e.to_string()))?;
            let owner = state
                .tokens
                .owners
                .get(&query.tokenId)
                .copied()
                .ok_or_else(|| LedgerError::Rejected("execution reverted: invalid token ID".into()))?;
            return Ok(owner.abi_encode().into());
        }
        Err(LedgerError::Rejected(format!("no contract at {to}")))
    }
}
