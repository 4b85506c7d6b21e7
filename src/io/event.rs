use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Cents, Destination, Transaction, TransactionStatus};

#[derive(Error, Debug)]
pub enum EventError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("event must name exactly one destination, found {0}")]
    Destination(usize),

    #[error("amount must not be negative: {0}")]
    NegativeAmount(Cents),

    #[error("unknown status: {0}")]
    Status(String),

    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat wire form of a transaction, one optional key per destination kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub account_from: Option<Uuid>,
    pub amount: Cents,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<Uuid>,
}

impl TransactionEvent {
    pub fn from_transaction(transaction: &Transaction) -> Result<Self, EventError> {
        let event = Self {
            id: Some(transaction.id),
            account_from: Some(transaction.source_account_id),
            amount: transaction.amount,
            status: transaction.status.as_str().to_string(),
            account_to: transaction.destination.account_id(),
            service: transaction.destination.service_id(),
            store: transaction.destination.store_id(),
        };
        event.validate()?;
        Ok(event)
    }

    pub fn from_json(json: &str) -> Result<Self, EventError> {
        let event: Self = serde_json::from_str(json)?;
        event.validate()?;
        Ok(event)
    }

    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), EventError> {
        if self.id.is_none() {
            return Err(EventError::MissingField("id"));
        }
        if self.account_from.is_none() {
            return Err(EventError::MissingField("account_from"));
        }
        let destinations = [self.account_to, self.service, self.store]
            .iter()
            .filter(|d| d.is_some())
            .count();
        if destinations != 1 {
            return Err(EventError::Destination(destinations));
        }
        if self.amount < 0 {
            return Err(EventError::NegativeAmount(self.amount));
        }
        self.status()?;
        Ok(())
    }

    pub fn status(&self) -> Result<TransactionStatus, EventError> {
        self.status
            .parse()
            .map_err(|_| EventError::Status(self.status.clone()))
    }

    pub fn destination(&self) -> Result<Destination, EventError> {
        match (self.account_to, self.service, self.store) {
            (Some(id), None, None) => Ok(Destination::Account(id)),
            (None, Some(id), None) => Ok(Destination::Service(id)),
            (None, None, Some(id)) => Ok(Destination::Store(id)),
            (a, s, st) => Err(EventError::Destination(
                [a, s, st].iter().filter(|d| d.is_some()).count(),
            )),
        }
    }
}
