// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use payments::application::{Ledger, LedgerConfig, Repositories};
use payments::domain::{
    Account, LedgerScope, MerchantStatus, RepositoryError, Service, ServicePrice,
    ServicePriceRepository, Store, Transaction, UnitOfWork,
};
use payments::storage::{InMemoryStore, SqliteStore};
use tempfile::TempDir;
use uuid::Uuid;

/// In-memory ledger plus a handle on its store for inspection.
pub struct TestLedger {
    pub ledger: Ledger,
    pub store: InMemoryStore,
    pub repos: Repositories,
}

pub fn memory_ledger() -> TestLedger {
    memory_ledger_with(LedgerConfig::default())
}

pub fn memory_ledger_with(config: LedgerConfig) -> TestLedger {
    let store = InMemoryStore::new();
    let repos = Repositories::from_backend(Arc::new(store.clone()));
    TestLedger {
        ledger: Ledger::new(&repos, config),
        store,
        repos,
    }
}

/// Helper to create repositories over a temporary SQLite database
pub async fn sqlite_repos() -> Result<(Repositories, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let url = format!("sqlite:{}?mode=rwc", db_path.display());
    let store = SqliteStore::init(&url).await?;
    Ok((Repositories::from_backend(Arc::new(store)), temp_dir))
}

/// Helper to create a ledger over a temporary SQLite database
pub async fn sqlite_ledger() -> Result<(Ledger, TempDir)> {
    let (repos, temp_dir) = sqlite_repos().await?;
    Ok((Ledger::new(&repos, LedgerConfig::default()), temp_dir))
}

/// Ledger whose unit of work fails at `fail_at`, over a shared in-memory store.
pub fn failing_ledger(fail_at: FailAt) -> TestLedger {
    let store = InMemoryStore::new();
    let mut repos = Repositories::from_backend(Arc::new(store.clone()));
    repos.unit_of_work = Arc::new(FailingUnitOfWork::new(repos.unit_of_work.clone(), fail_at));
    TestLedger {
        ledger: Ledger::new(&repos, LedgerConfig::default()),
        store,
        repos,
    }
}

pub async fn active_service(ledger: &Ledger, name: &str) -> Result<Service> {
    let service = ledger
        .provisioning
        .create_service(name.into(), None, Uuid::new_v4(), Uuid::new_v4())
        .await?;
    Ok(ledger
        .provisioning
        .set_service_status(service.id, MerchantStatus::Active)
        .await?)
}

pub async fn active_store(ledger: &Ledger, name: &str) -> Result<Store> {
    let store = ledger
        .provisioning
        .create_store(name.into(), None, Uuid::new_v4(), Uuid::new_v4())
        .await?;
    Ok(ledger
        .provisioning
        .set_store_status(store.id, MerchantStatus::Active)
        .await?)
}

/// Store a price directly, bypassing the constructor's amount check.
pub async fn raw_price(
    repos: &Repositories,
    service: &Service,
    amount: i64,
    currency: &str,
) -> Result<ServicePrice> {
    let now = chrono::Utc::now();
    let price = ServicePrice {
        id: Uuid::new_v4(),
        service_id: service.id,
        description: None,
        amount,
        currency: currency.into(),
        created_at: now,
        updated_at: now,
    };
    repos.service_prices.create(&price).await?;
    Ok(price)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Register,
    SaveAccount,
    Commit,
}

pub struct FailingUnitOfWork {
    inner: Arc<dyn UnitOfWork>,
    fail_at: FailAt,
}

impl FailingUnitOfWork {
    pub fn new(inner: Arc<dyn UnitOfWork>, fail_at: FailAt) -> Self {
        Self { inner, fail_at }
    }
}

struct FailingScope {
    inner: Box<dyn LedgerScope>,
    fail_at: FailAt,
}

fn injected(step: &str) -> RepositoryError {
    RepositoryError::Backend(anyhow!("injected {} failure", step))
}

#[async_trait]
impl UnitOfWork for FailingUnitOfWork {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, RepositoryError> {
        Ok(Box::new(FailingScope {
            inner: self.inner.begin().await?,
            fail_at: self.fail_at,
        }))
    }
}

#[async_trait]
impl LedgerScope for FailingScope {
    async fn register_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), RepositoryError> {
        if self.fail_at == FailAt::Register {
            return Err(injected("register"));
        }
        self.inner.register_transaction(transaction).await
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepositoryError> {
        if self.fail_at == FailAt::SaveAccount {
            return Err(injected("save"));
        }
        self.inner.save_account(account).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        if self.fail_at == FailAt::Commit {
            return Err(injected("commit"));
        }
        self.inner.commit().await
    }
}
