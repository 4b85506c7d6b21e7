use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AMOUNT_NOT_POSITIVE;
use super::{Cents, DomainError};

pub type AccountId = Uuid;

/// A funds-holding party. The balance never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Balance in cents
    pub balance: Cents,
    /// Optimistic concurrency stamp, compared and bumped by the repository on save
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(initial_balance: Cents) -> Result<Self, DomainError> {
        if initial_balance < 0 {
            return Err(DomainError::validation(
                "initial balance must not be negative",
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            balance: initial_balance,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn deposit(&mut self, amount: Cents) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::validation(AMOUNT_NOT_POSITIVE));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("balance overflow"))?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Debit the account. On error the balance is left untouched.
    pub fn withdraw(&mut self, amount: Cents) -> Result<(), DomainError> {
        if amount <= 0 {
            return Err(DomainError::validation(AMOUNT_NOT_POSITIVE));
        }
        if self.balance < amount {
            return Err(DomainError::InsufficientFunds {
                account_id: self.id,
                balance: self.balance,
                required: amount,
            });
        }
        self.balance -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }
}
