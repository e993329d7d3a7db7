use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use serde::{Deserialize, Serialize};

use crate::{ContractKind, DecodeError, IERC20, IERC721};

/// Read-only token queries used to snapshot ledger state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Query {
    BalanceOf { owner: Address },
    OwnerOf { token_id: U256 },
}

impl Query {
    pub fn encode(&self) -> Bytes {
        match *self {
            Self::BalanceOf { owner } => IERC20::balanceOfCall { account: owner }.abi_encode(),
            Self::OwnerOf { token_id } => IERC721::ownerOfCall { tokenId: token_id }.abi_encode(),
        }
        .into()
    }

    pub fn decode_balance(output: &[u8]) -> Result<U256, DecodeError> {
        IERC20::balanceOfCall::abi_decode_returns(output).map_err(|source| DecodeError::Abi {
            kind: ContractKind::Erc20,
            source,
        })
    }

    pub fn decode_owner(output: &[u8]) -> Result<Address, DecodeError> {
        IERC721::ownerOfCall::abi_decode_returns(output).map_err(|source| DecodeError::Abi {
            kind: ContractKind::Erc721,
            source,
        })
    }
}
