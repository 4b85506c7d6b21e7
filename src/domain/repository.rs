//! Persistence contracts the ledger depends on.
//!
//! Implementations live in [`crate::storage`]; the ledger services only ever
//! see these traits.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::{
    Account, AccountId, Destination, DestinationKind, Page, Pagination, Service, ServiceId,
    ServicePrice, ServicePriceId, Store, StoreId, Transaction, TransactionId, TransactionStatus,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A conditional write lost a race with another writer.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: Uuid },

    #[error("Storage error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find(&self, id: AccountId) -> Result<Option<Account>, RepositoryError>;

    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;

    /// Persist the balance. Succeeds only while the stored version equals
    /// `account.version`; the stored version is then incremented.
    async fn save(&self, account: &Account) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn find(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError>;

    /// Find a service only if its status is active.
    async fn find_active(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError>;

    async fn create(&self, service: &Service) -> Result<(), RepositoryError>;

    async fn save(&self, service: &Service) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn find(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    /// Find a store only if its status is active.
    async fn find_active(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    async fn create(&self, store: &Store) -> Result<(), RepositoryError>;

    async fn save(&self, store: &Store) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ServicePriceRepository: Send + Sync {
    async fn find(&self, id: ServicePriceId) -> Result<Option<ServicePrice>, RepositoryError>;

    async fn create(&self, price: &ServicePrice) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a new transaction.
    async fn register(&self, transaction: &Transaction) -> Result<(), RepositoryError>;

    /// Write `status`/`updated_at`, provided the stored status is still `expected`.
    async fn save(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> Result<(), RepositoryError>;

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>, RepositoryError>;

    async fn find_all(&self, pagination: &Pagination) -> Result<Page<Transaction>, RepositoryError>;

    /// Find a transaction only if it was paid to `destination`.
    async fn find_for_destination(
        &self,
        id: TransactionId,
        destination: &Destination,
    ) -> Result<Option<Transaction>, RepositoryError>;

    async fn list_for_destination(
        &self,
        destination: &Destination,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError>;

    async fn find_for_source_account(
        &self,
        id: TransactionId,
        account_id: AccountId,
    ) -> Result<Option<Transaction>, RepositoryError>;

    async fn list_for_source_account(
        &self,
        account_id: AccountId,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError>;

    async fn find_for_kind(
        &self,
        id: TransactionId,
        kind: DestinationKind,
    ) -> Result<Option<Transaction>, RepositoryError>;

    async fn list_for_kind(
        &self,
        kind: DestinationKind,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError>;

    async fn find_for_external_reference(
        &self,
        id: TransactionId,
        reference: &str,
    ) -> Result<Option<Transaction>, RepositoryError>;

    async fn list_for_external_reference(
        &self,
        reference: &str,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError>;
}

/// Opens atomic write scopes spanning transactions and accounts.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, RepositoryError>;
}

/// Writes staged inside one atomic unit. Nothing is visible to readers until
/// [`LedgerScope::commit`]; dropping the scope discards every staged write.
#[async_trait]
pub trait LedgerScope: Send {
    async fn register_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), RepositoryError>;

    /// Same version check as [`AccountRepository::save`].
    async fn save_account(&mut self, account: &Account) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}
