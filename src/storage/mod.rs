mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

use std::cmp::Ordering;

use crate::domain::{
    AccountId, Destination, DestinationKind, Pagination, SortDirection, SortField, Transaction,
};

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Predicate shared by the single and paginated transaction lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransactionFilter {
    All,
    Destination(Destination),
    SourceAccount(AccountId),
    Kind(DestinationKind),
    ExternalReference(String),
}

impl TransactionFilter {
    pub(crate) fn matches(&self, transaction: &Transaction) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Destination(destination) => transaction.destination == *destination,
            TransactionFilter::SourceAccount(id) => transaction.source_account_id == *id,
            TransactionFilter::Kind(kind) => transaction.kind() == *kind,
            TransactionFilter::ExternalReference(reference) => {
                transaction.external_reference.as_deref() == Some(reference.as_str())
            }
        }
    }
}

/// In-memory equivalent of `ORDER BY <field> <dir>, id <dir>`.
pub(crate) fn compare_transactions(
    a: &Transaction,
    b: &Transaction,
    pagination: &Pagination,
) -> Ordering {
    let ordering = match pagination.sort.field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Amount => a.amount.cmp(&b.amount),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
    .then_with(|| a.id.to_string().cmp(&b.id.to_string()));

    match pagination.sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}
