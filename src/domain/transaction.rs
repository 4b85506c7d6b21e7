use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AMOUNT_NOT_POSITIVE;
use super::{Account, AccountId, Cents, DomainError, ServiceId, StoreId, normalize_currency};

pub type TransactionId = Uuid;

/// Receiving side of a transaction. Exactly one kind is ever set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Destination {
    Account(AccountId),
    Service(ServiceId),
    Store(StoreId),
}

impl Destination {
    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Account(_) => DestinationKind::Account,
            Destination::Service(_) => DestinationKind::Service,
            Destination::Store(_) => DestinationKind::Store,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Destination::Account(id) | Destination::Service(id) | Destination::Store(id) => *id,
        }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Destination::Account(id) => Some(*id),
            _ => None,
        }
    }

    pub fn service_id(&self) -> Option<ServiceId> {
        match self {
            Destination::Service(id) => Some(*id),
            _ => None,
        }
    }

    pub fn store_id(&self) -> Option<StoreId> {
        match self {
            Destination::Store(id) => Some(*id),
            _ => None,
        }
    }

    /// Rebuild a destination from its kind and id (storage rows, CLI arguments).
    pub fn from_parts(kind: DestinationKind, id: Uuid) -> Self {
        match kind {
            DestinationKind::Account => Destination::Account(id),
            DestinationKind::Service => Destination::Service(id),
            DestinationKind::Store => Destination::Store(id),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// The transaction "type": which kind of destination received the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationKind {
    #[serde(rename = "to_account")]
    Account,
    #[serde(rename = "to_service")]
    Service,
    #[serde(rename = "to_store")]
    Store,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Account => "to_account",
            DestinationKind::Service => "to_service",
            DestinationKind::Store => "to_store",
        }
    }
}

impl FromStr for DestinationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "to_account" | "to_user" | "account" => Ok(DestinationKind::Account),
            "to_service" | "service" => Ok(DestinationKind::Service),
            "to_store" | "store" => Ok(DestinationKind::Store),
            other => Err(DomainError::validation(format!(
                "invalid transaction type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Canceled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Validate a move to `target`. Staying in the same status is allowed;
    /// leaving a terminal status is not.
    pub fn transition(self, target: TransactionStatus) -> Result<TransactionStatus, DomainError> {
        match (self, target) {
            (from, to) if from == to => Ok(to),
            (TransactionStatus::Pending, to) => Ok(to),
            (from, to) => Err(DomainError::InvalidTransition { from, to }),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "canceled" => Ok(TransactionStatus::Canceled),
            other => Err(DomainError::validation(format!("invalid status: {}", other))),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger record of one transfer. Once registered only `status` and
/// `updated_at` change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Amount in cents (always positive)
    pub amount: Cents,
    pub currency: String,
    pub status: TransactionStatus,
    /// Debited account
    pub source_account_id: AccountId,
    pub destination: Destination,
    /// Caller-side reference (order number, invoice, ...)
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a pending transaction from `source` to `destination`.
    pub fn new(
        source: &Account,
        destination: Destination,
        amount: Cents,
        currency: &str,
    ) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::validation(AMOUNT_NOT_POSITIVE));
        }
        if destination == Destination::Account(source.id) {
            return Err(DomainError::validation(
                "source and destination accounts must differ",
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            amount,
            currency: normalize_currency(currency)?,
            status: TransactionStatus::Pending,
            source_account_id: source.id,
            destination,
            external_reference: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_external_reference(mut self, reference: Option<String>) -> Self {
        self.external_reference = reference.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn kind(&self) -> DestinationKind {
        self.destination.kind()
    }

    /// Move to `target`, returning whether the status actually changed.
    pub fn transition_to(&mut self, target: TransactionStatus) -> Result<bool, DomainError> {
        let next = self.status.transition(target)?;
        if next == self.status {
            return Ok(false);
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(true)
    }
}
