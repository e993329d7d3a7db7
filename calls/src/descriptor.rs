use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol_types::{SolCall, SolInterface},
};
use serde::{Deserialize, Serialize};

use crate::{IBulkTransfer, IERC20, IERC721};

/// Which of the three known contract interfaces a call targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Bulk,
    Erc20,
    Erc721,
}

impl std::str::FromStr for ContractKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bulk" => Ok(Self::Bulk),
            "erc20" => Ok(Self::Erc20),
            "erc721" => Ok(Self::Erc721),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown contract kind `{0}`, expected bulk, erc20 or erc721")]
    UnknownKind(String),

    #[error("calldata is not a known {kind:?} call: {source}")]
    Abi {
        kind: ContractKind,
        #[source]
        source: alloy_core::sol_types::Error,
    },
}

/// One `(recipient, amount-or-token-id)` entry of a batch call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub to: Address,
    pub amount_or_token_id: U256,
}

impl Transfer {
    pub fn new(to: Address, amount_or_token_id: U256) -> Self {
        Self {
            to,
            amount_or_token_id,
        }
    }
}

impl From<Transfer> for IBulkTransfer::Call {
    fn from(t: Transfer) -> Self {
        Self {
            to: t.to,
            amountOrTokenId: t.amount_or_token_id,
        }
    }
}

impl From<IBulkTransfer::Call> for Transfer {
    fn from(c: IBulkTransfer::Call) -> Self {
        Self::new(c.to, c.amountOrTokenId)
    }
}

/// Strongly-typed arguments of every mutating call the engine submits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum ContractCall {
    BulkTransfer20 {
        token: Address,
        calls: Vec<Transfer>,
    },
    BulkTransfer721 {
        token: Address,
        calls: Vec<Transfer>,
    },
    BulkTransfer721Lite {
        token: Address,
        to: Address,
        token_ids: Vec<U256>,
    },
    Approve {
        spender: Address,
        amount: U256,
    },
    Transfer {
        to: Address,
        amount: U256,
    },
    TransferFrom {
        from: Address,
        to: Address,
        amount: U256,
    },
    SetApprovalForAll {
        operator: Address,
        approved: bool,
    },
    TransferToken {
        from: Address,
        to: Address,
        token_id: U256,
    },
}

impl ContractCall {
    pub fn kind(&self) -> ContractKind {
        match self {
            Self::BulkTransfer20 { .. }
            | Self::BulkTransfer721 { .. }
            | Self::BulkTransfer721Lite { .. } => ContractKind::Bulk,
            Self::Approve { .. } | Self::Transfer { .. } | Self::TransferFrom { .. } => {
                ContractKind::Erc20
            }
            Self::SetApprovalForAll { .. } | Self::TransferToken { .. } => ContractKind::Erc721,
        }
    }

    /// Canonical Solidity signature of the function this call invokes.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::BulkTransfer20 { .. } => IBulkTransfer::bulkTransfer20Call::SIGNATURE,
            Self::BulkTransfer721 { .. } => IBulkTransfer::bulkTransfer721Call::SIGNATURE,
            Self::BulkTransfer721Lite { .. } => IBulkTransfer::bulkTransfer721LiteCall::SIGNATURE,
            Self::Approve { .. } => IERC20::approveCall::SIGNATURE,
            Self::Transfer { .. } => IERC20::transferCall::SIGNATURE,
            Self::TransferFrom { .. } => IERC20::transferFromCall::SIGNATURE,
            Self::SetApprovalForAll { .. } => IERC721::setApprovalForAllCall::SIGNATURE,
            Self::TransferToken { .. } => IERC721::transferFromCall::SIGNATURE,
        }
    }

    pub fn encode(&self) -> Bytes {
        let data = match self.clone() {
            Self::BulkTransfer20 { token, calls } => IBulkTransfer::bulkTransfer20Call {
                token,
                calls: calls.into_iter().map(Into::into).collect(),
            }
            .abi_encode(),
            Self::BulkTransfer721 { token, calls } => IBulkTransfer::bulkTransfer721Call {
                token,
                calls: calls.into_iter().map(Into::into).collect(),
            }
            .abi_encode(),
            Self::BulkTransfer721Lite {
                token,
                to,
                token_ids,
            } => IBulkTransfer::bulkTransfer721LiteCall {
                token,
                to,
                tokenIds: token_ids,
            }
            .abi_encode(),
            Self::Approve { spender, amount } => {
                IERC20::approveCall { spender, amount }.abi_encode()
            }
            Self::Transfer { to, amount } => IERC20::transferCall {
                recipient: to,
                amount,
            }
            .abi_encode(),
            Self::TransferFrom { from, to, amount } => IERC20::transferFromCall {
                sender: from,
                recipient: to,
                amount,
            }
            .abi_encode(),
            Self::SetApprovalForAll { operator, approved } => {
                IERC721::setApprovalForAllCall { operator, approved }.abi_encode()
            }
            Self::TransferToken { from, to, token_id } => IERC721::transferFromCall {
                from,
                to,
                tokenId: token_id,
            }
            .abi_encode(),
        };
        data.into()
    }

    /// Decodes calldata addressed to a contract of the given kind. The kind
    /// is required because fungible and non-fungible `transferFrom` share a
    /// selector.
    pub fn decode(kind: ContractKind, input: &[u8]) -> Result<Self, DecodeError> {
        let abi = |source| DecodeError::Abi { kind, source };
        let call = match kind {
            ContractKind::Bulk => {
                match IBulkTransfer::IBulkTransferCalls::abi_decode(input).map_err(abi)? {
                    IBulkTransfer::IBulkTransferCalls::bulkTransfer20(c) => Self::BulkTransfer20 {
                        token: c.token,
                        calls: c.calls.into_iter().map(Into::into).collect(),
                    },
                    IBulkTransfer::IBulkTransferCalls::bulkTransfer721(c) => {
                        Self::BulkTransfer721 {
                            token: c.token,
                            calls: c.calls.into_iter().map(Into::into).collect(),
                        }
                    }
                    IBulkTransfer::IBulkTransferCalls::bulkTransfer721Lite(c) => {
                        Self::BulkTransfer721Lite {
                            token: c.token,
                            to: c.to,
                            token_ids: c.tokenIds,
                        }
                    }
                }
            }
            ContractKind::Erc20 => match IERC20::IERC20Calls::abi_decode(input).map_err(abi)? {
                IERC20::IERC20Calls::approve(c) => Self::Approve {
                    spender: c.spender,
                    amount: c.amount,
                },
                IERC20::IERC20Calls::transfer(c) => Self::Transfer {
                    to: c.recipient,
                    amount: c.amount,
                },
                IERC20::IERC20Calls::transferFrom(c) => Self::TransferFrom {
                    from: c.sender,
                    to: c.recipient,
                    amount: c.amount,
                },
                IERC20::IERC20Calls::balanceOf(_) => {
                    return Err(abi(alloy_core::sol_types::Error::custom(
                        "balanceOf is a read-only query",
                    )))
                }
            },
            ContractKind::Erc721 => match IERC721::IERC721Calls::abi_decode(input).map_err(abi)? {
                IERC721::IERC721Calls::setApprovalForAll(c) => Self::SetApprovalForAll {
                    operator: c.operator,
                    approved: c.approved,
                },
                IERC721::IERC721Calls::transferFrom(c) => Self::TransferToken {
                    from: c.from,
                    to: c.to,
                    token_id: c.tokenId,
                },
                IERC721::IERC721Calls::ownerOf(_) => {
                    return Err(abi(alloy_core::sol_types::Error::custom(
                        "ownerOf is a read-only query",
                    )))
                }
            },
        };
        Ok(call)
    }
}

impl std::fmt::Display for ContractCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BulkTransfer20 { calls, .. } => write!(f, "bulkTransfer20 x{}", calls.len()),
            Self::BulkTransfer721 { calls, .. } => write!(f, "bulkTransfer721 x{}", calls.len()),
            Self::BulkTransfer721Lite { to, token_ids, .. } => {
                write!(f, "bulkTransfer721Lite x{} to {to}", token_ids.len())
            }
            Self::Approve { spender, .. } => write!(f, "approve {spender}"),
            Self::Transfer { to, amount } => write!(f, "transfer {amount} to {to}"),
            Self::TransferFrom { from, to, amount } => {
                write!(f, "transferFrom {amount} from {from} to {to}")
            }
            Self::SetApprovalForAll { operator, approved } => {
                write!(f, "setApprovalForAll {operator} {approved}")
            }
            Self::TransferToken { from, to, token_id } => {
                write!(f, "transferFrom #{token_id} from {from} to {to}")
            }
        }
    }
}

/// A call bound to the contract it targets. Pure value, reusable across
/// senders and nonces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallDescriptor {
    pub target: Address,
    pub call: ContractCall,
}

impl CallDescriptor {
    pub fn new(target: Address, call: ContractCall) -> Self {
        Self { target, call }
    }

    pub fn input(&self) -> Bytes {
        self.call.encode()
    }
}

impl std::fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.call, self.target)
    }
}
