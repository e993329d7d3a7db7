use alloy_core::primitives::{utils::format_ether, U256};

use crate::ledger::Receipt;

/// Realized fee of a confirmed transaction, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fee {
    Known(U256),
    /// The node did not report an effective gas price.
    Unknown,
}

pub fn realized_fee(receipt: &Receipt) -> Fee {
    match receipt.effective_gas_price {
        Some(price) => Fee::Known(U256::from(receipt.gas_used) * U256::from(price)),
        None => Fee::Unknown,
    }
}

impl Fee {
    pub fn display(&self, symbol: &str) -> String {
        match self {
            Self::Known(wei) => format!("{} {symbol}", format_ether(*wei)),
            Self::Unknown => "unknown".to_string(),
        }
    }
}

/// One human-readable output line: what was done and what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostLine {
    pub description: String,
    pub receipt: Receipt,
    pub fee: Fee,
}

impl CostLine {
    pub fn new(description: impl Into<String>, receipt: Receipt) -> Self {
        let fee = realized_fee(&receipt);
        Self {
            description: description.into(),
            receipt,
            fee,
        }
    }

    pub fn render(&self, symbol: &str) -> String {
        format!(
            "{}: {} gas, fee {}{}",
            self.description,
            self.receipt.gas_used,
            self.fee.display(symbol),
            if self.receipt.success { "" } else { " (REVERTED)" }
        )
    }
}
