use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{
    Account, AccountId, AccountRepository, Destination, DestinationKind, LedgerScope, Page,
    Pagination, RepositoryError, Service, ServiceId, ServicePrice, ServicePriceId,
    ServicePriceRepository, ServiceRepository, Store, StoreId, StoreRepository, Transaction,
    TransactionId, TransactionRepository, TransactionStatus, UnitOfWork,
};

use super::{TransactionFilter, compare_transactions};

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    services: HashMap<ServiceId, Service>,
    stores: HashMap<StoreId, Store>,
    service_prices: HashMap<ServicePriceId, ServicePrice>,
    transactions: HashMap<TransactionId, Transaction>,
}

impl State {
    fn check_account_version(&self, account: &Account) -> Result<(), RepositoryError> {
        match self.accounts.get(&account.id) {
            Some(stored) if stored.version == account.version => Ok(()),
            _ => Err(RepositoryError::Conflict {
                entity: "Account",
                id: account.id,
            }),
        }
    }

    fn put_account(&mut self, account: &Account) {
        let mut stored = account.clone();
        stored.version += 1;
        self.accounts.insert(stored.id, stored);
    }

    fn check_new_transaction(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        if self.transactions.contains_key(&transaction.id) {
            return Err(RepositoryError::Duplicate {
                entity: "Transaction",
                id: transaction.id,
            });
        }
        Ok(())
    }

    fn find_transaction(
        &self,
        id: TransactionId,
        filter: &TransactionFilter,
    ) -> Option<Transaction> {
        self.transactions
            .get(&id)
            .filter(|t| filter.matches(t))
            .cloned()
    }

    fn list_transactions(
        &self,
        filter: &TransactionFilter,
        pagination: &Pagination,
    ) -> Page<Transaction> {
        let mut matching: Vec<&Transaction> = self
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .collect();
        matching.sort_by(|a, b| compare_transactions(a, b, pagination));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.limit as usize)
            .cloned()
            .collect();
        Page { items, total }
    }
}

/// Process-local implementation of every repository contract.
///
/// Cheap to clone; clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutating calls (creates, saves, committed scopes).
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored transactions.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    async fn find_where(
        &self,
        id: TransactionId,
        filter: TransactionFilter,
    ) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self.state.lock().await.find_transaction(id, &filter))
    }

    async fn list_where(
        &self,
        filter: TransactionFilter,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        Ok(self.state.lock().await.list_transactions(&filter, pagination))
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn find(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.id) {
            return Err(RepositoryError::Duplicate {
                entity: "Account",
                id: account.id,
            });
        }
        state.accounts.insert(account.id, account.clone());
        self.record_write();
        Ok(())
    }

    async fn save(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_account_version(account)?;
        state.put_account(account);
        self.record_write();
        Ok(())
    }
}

#[async_trait]
impl ServiceRepository for InMemoryStore {
    async fn find(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError> {
        Ok(self.state.lock().await.services.get(&id).cloned())
    }

    async fn find_active(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .services
            .get(&id)
            .filter(|s| s.is_active())
            .cloned())
    }

    async fn create(&self, service: &Service) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.services.contains_key(&service.id) {
            return Err(RepositoryError::Duplicate {
                entity: "Service",
                id: service.id,
            });
        }
        state.services.insert(service.id, service.clone());
        self.record_write();
        Ok(())
    }

    async fn save(&self, service: &Service) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .services
            .insert(service.id, service.clone());
        self.record_write();
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for InMemoryStore {
    async fn find(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.state.lock().await.stores.get(&id).cloned())
    }

    async fn find_active(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .stores
            .get(&id)
            .filter(|s| s.is_active())
            .cloned())
    }

    async fn create(&self, store: &Store) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.stores.contains_key(&store.id) {
            return Err(RepositoryError::Duplicate {
                entity: "Store",
                id: store.id,
            });
        }
        state.stores.insert(store.id, store.clone());
        self.record_write();
        Ok(())
    }

    async fn save(&self, store: &Store) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .await
            .stores
            .insert(store.id, store.clone());
        self.record_write();
        Ok(())
    }
}

#[async_trait]
impl ServicePriceRepository for InMemoryStore {
    async fn find(&self, id: ServicePriceId) -> Result<Option<ServicePrice>, RepositoryError> {
        Ok(self.state.lock().await.service_prices.get(&id).cloned())
    }

    async fn create(&self, price: &ServicePrice) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.service_prices.contains_key(&price.id) {
            return Err(RepositoryError::Duplicate {
                entity: "Service price",
                id: price.id,
            });
        }
        state.service_prices.insert(price.id, price.clone());
        self.record_write();
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn register(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_new_transaction(transaction)?;
        state
            .transactions
            .insert(transaction.id, transaction.clone());
        self.record_write();
        Ok(())
    }

    async fn save(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.transactions.get_mut(&transaction.id) else {
            return Err(RepositoryError::Conflict {
                entity: "Transaction",
                id: transaction.id,
            });
        };
        if stored.status != expected {
            return Err(RepositoryError::Conflict {
                entity: "Transaction",
                id: transaction.id,
            });
        }
        stored.status = transaction.status;
        stored.updated_at = transaction.updated_at;
        self.record_write();
        Ok(())
    }

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        self.find_where(id, TransactionFilter::All).await
    }

    async fn find_all(&self, pagination: &Pagination) -> Result<Page<Transaction>, RepositoryError> {
        self.list_where(TransactionFilter::All, pagination).await
    }

    async fn find_for_destination(
        &self,
        id: TransactionId,
        destination: &Destination,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_where(id, TransactionFilter::Destination(*destination))
            .await
    }

    async fn list_for_destination(
        &self,
        destination: &Destination,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_where(TransactionFilter::Destination(*destination), pagination)
            .await
    }

    async fn find_for_source_account(
        &self,
        id: TransactionId,
        account_id: AccountId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_where(id, TransactionFilter::SourceAccount(account_id))
            .await
    }

    async fn list_for_source_account(
        &self,
        account_id: AccountId,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_where(TransactionFilter::SourceAccount(account_id), pagination)
            .await
    }

    async fn find_for_kind(
        &self,
        id: TransactionId,
        kind: DestinationKind,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_where(id, TransactionFilter::Kind(kind)).await
    }

    async fn list_for_kind(
        &self,
        kind: DestinationKind,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_where(TransactionFilter::Kind(kind), pagination)
            .await
    }

    async fn find_for_external_reference(
        &self,
        id: TransactionId,
        reference: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_where(
            id,
            TransactionFilter::ExternalReference(reference.to_string()),
        )
        .await
    }

    async fn list_for_external_reference(
        &self,
        reference: &str,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_where(
            TransactionFilter::ExternalReference(reference.to_string()),
            pagination,
        )
        .await
    }
}

/// Writes staged until commit, then validated and applied under one lock.
pub struct InMemoryScope {
    store: InMemoryStore,
    transactions: Vec<Transaction>,
    accounts: Vec<Account>,
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, RepositoryError> {
        Ok(Box::new(InMemoryScope {
            store: self.clone(),
            transactions: Vec::new(),
            accounts: Vec::new(),
        }))
    }
}

#[async_trait]
impl LedgerScope for InMemoryScope {
    async fn register_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), RepositoryError> {
        let state = self.store.state.lock().await;
        state.check_new_transaction(transaction)?;
        if self.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(RepositoryError::Duplicate {
                entity: "Transaction",
                id: transaction.id,
            });
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepositoryError> {
        let state = self.store.state.lock().await;
        state.check_account_version(account)?;
        if self.accounts.iter().any(|a| a.id == account.id) {
            return Err(RepositoryError::Conflict {
                entity: "Account",
                id: account.id,
            });
        }
        self.accounts.push(account.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut state = self.store.state.lock().await;

        // Re-check under the lock: another scope may have committed since staging.
        for transaction in &self.transactions {
            state.check_new_transaction(transaction)?;
        }
        for account in &self.accounts {
            state.check_account_version(account)?;
        }

        for transaction in &self.transactions {
            state
                .transactions
                .insert(transaction.id, transaction.clone());
        }
        for account in &self.accounts {
            state.put_account(account);
        }
        drop(state);

        self.store.record_write();
        debug!(
            transactions = self.transactions.len(),
            accounts = self.accounts.len(),
            "in-memory scope committed"
        );
        Ok(())
    }
}
