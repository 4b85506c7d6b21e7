use thiserror::Error;

use super::{AccountId, Cents, TransactionStatus};

/// Invariant violations raised by the entities themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Transaction cannot move from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub(crate) const AMOUNT_NOT_POSITIVE: &str = "amount must be greater than 0";
