use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AccountId, Cents, DomainError, RepositoryError, TransactionStatus};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

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

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::InsufficientFunds { .. })
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::InsufficientFunds {
                account_id,
                balance,
                required,
            } => AppError::InsufficientFunds {
                account_id,
                balance,
                required,
            },
            DomainError::InvalidTransition { from, to } => AppError::InvalidTransition { from, to },
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { entity, id } => AppError::Conflict { entity, id },
            other => AppError::Repository(other),
        }
    }
}
