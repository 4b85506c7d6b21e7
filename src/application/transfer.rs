//! Transfers from an account to a destination.
//!
//! The algorithm lives once in [`TransferService`]; each destination kind
//! plugs in through a [`DestinationResolver`]:
//!
//! 1. load the source account
//! 2. resolve the destination and the amount to charge
//! 3. debit the account in memory
//! 4. build the pending transaction
//! 5. register the transaction and save the debited account in one atomic scope
//!
//! A lost optimistic-concurrency race on the account restarts from step 1.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    AccountId, AccountRepository, Cents, Destination, DestinationKind, Page, Pagination,
    ServiceId, ServicePriceId, ServicePriceRepository, ServiceRepository, StoreId,
    StoreRepository, Transaction, TransactionId, TransactionRepository, UnitOfWork,
};

use super::{AppError, LedgerConfig, Repositories};

/// Where the money goes and how much is charged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDestination {
    pub destination: Destination,
    pub amount: Cents,
    /// Currency suggested by the destination (e.g. a fixed price), used when the caller sends none
    pub currency: Option<String>,
}

/// Strategy for one destination kind.
#[async_trait]
pub trait DestinationResolver: Send + Sync {
    type Request: Send + Sync;

    fn kind(&self) -> DestinationKind;

    /// Cheap argument checks that run before any repository access.
    fn precheck(&self, _request: &Self::Request) -> Result<(), AppError> {
        Ok(())
    }

    async fn resolve(&self, request: &Self::Request) -> Result<ResolvedDestination, AppError>;

    /// Fail with `NotFound` unless a destination with this id exists (any status).
    async fn ensure_exists(&self, id: Uuid) -> Result<Destination, AppError>;
}

/// Account to account transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTransfer {
    pub to: AccountId,
    pub amount: Cents,
}

/// Payment to a service, either a caller amount or a fixed service price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTransfer {
    pub service_id: ServiceId,
    pub service_price_id: Option<ServicePriceId>,
    pub amount: Option<Cents>,
}

/// Payment to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTransfer {
    pub store_id: StoreId,
    pub amount: Cents,
}

pub struct AccountDestination {
    accounts: Arc<dyn AccountRepository>,
}

#[async_trait]
impl DestinationResolver for AccountDestination {
    type Request = AccountTransfer;

    fn kind(&self) -> DestinationKind {
        DestinationKind::Account
    }

    async fn resolve(&self, request: &AccountTransfer) -> Result<ResolvedDestination, AppError> {
        let destination = self.ensure_exists(request.to).await?;
        Ok(ResolvedDestination {
            destination,
            amount: request.amount,
            currency: None,
        })
    }

    async fn ensure_exists(&self, id: Uuid) -> Result<Destination, AppError> {
        self.accounts
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Account", id))?;
        Ok(Destination::Account(id))
    }
}

pub struct ServiceDestination {
    services: Arc<dyn ServiceRepository>,
    prices: Arc<dyn ServicePriceRepository>,
}

#[async_trait]
impl DestinationResolver for ServiceDestination {
    type Request = ServiceTransfer;

    fn kind(&self) -> DestinationKind {
        DestinationKind::Service
    }

    fn precheck(&self, request: &ServiceTransfer) -> Result<(), AppError> {
        let has_amount = request.amount.is_some_and(|amount| amount > 0);
        if request.service_price_id.is_none() && !has_amount {
            return Err(AppError::MissingParameter(
                "amount or service_price_id".to_string(),
            ));
        }
        Ok(())
    }

    async fn resolve(&self, request: &ServiceTransfer) -> Result<ResolvedDestination, AppError> {
        let service = self
            .services
            .find_active(request.service_id)
            .await?
            .ok_or_else(|| AppError::not_found("Active service", request.service_id))?;

        let Some(price_id) = request.service_price_id else {
            return Ok(ResolvedDestination {
                destination: Destination::Service(service.id),
                amount: request.amount.unwrap_or_default(),
                currency: None,
            });
        };

        let price = self
            .prices
            .find(price_id)
            .await?
            .ok_or_else(|| AppError::not_found("Service price", price_id))?;

        if price.service_id != service.id {
            return Err(AppError::validation(format!(
                "service price {} does not belong to service {}",
                price.id, service.id
            )));
        }

        Ok(ResolvedDestination {
            destination: Destination::Service(service.id),
            amount: price.amount,
            currency: Some(price.currency),
        })
    }

    async fn ensure_exists(&self, id: Uuid) -> Result<Destination, AppError> {
        self.services
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Service", id))?;
        Ok(Destination::Service(id))
    }
}

pub struct StoreDestination {
    stores: Arc<dyn StoreRepository>,
}

#[async_trait]
impl DestinationResolver for StoreDestination {
    type Request = StoreTransfer;

    fn kind(&self) -> DestinationKind {
        DestinationKind::Store
    }

    async fn resolve(&self, request: &StoreTransfer) -> Result<ResolvedDestination, AppError> {
        let store = self
            .stores
            .find_active(request.store_id)
            .await?
            .ok_or_else(|| AppError::not_found("Active store", request.store_id))?;
        Ok(ResolvedDestination {
            destination: Destination::Store(store.id),
            amount: request.amount,
            currency: None,
        })
    }

    async fn ensure_exists(&self, id: Uuid) -> Result<Destination, AppError> {
        self.stores
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Store", id))?;
        Ok(Destination::Store(id))
    }
}

pub type AccountTransferService = TransferService<AccountDestination>;
pub type ServiceTransferService = TransferService<ServiceDestination>;
pub type StoreTransferService = TransferService<StoreDestination>;

pub struct TransferService<D> {
    accounts: Arc<dyn AccountRepository>,
    transactions: Arc<dyn TransactionRepository>,
    unit_of_work: Arc<dyn UnitOfWork>,
    destination: D,
    config: LedgerConfig,
}

impl TransferService<AccountDestination> {
    pub fn for_accounts(repos: &Repositories, config: LedgerConfig) -> Self {
        let destination = AccountDestination {
            accounts: repos.accounts.clone(),
        };
        Self::new(repos, destination, config)
    }
}

impl TransferService<ServiceDestination> {
    pub fn for_services(repos: &Repositories, config: LedgerConfig) -> Self {
        let destination = ServiceDestination {
            services: repos.services.clone(),
            prices: repos.service_prices.clone(),
        };
        Self::new(repos, destination, config)
    }
}

impl TransferService<StoreDestination> {
    pub fn for_stores(repos: &Repositories, config: LedgerConfig) -> Self {
        let destination = StoreDestination {
            stores: repos.stores.clone(),
        };
        Self::new(repos, destination, config)
    }
}

impl<D: DestinationResolver> TransferService<D> {
    pub fn new(repos: &Repositories, destination: D, config: LedgerConfig) -> Self {
        Self {
            accounts: repos.accounts.clone(),
            transactions: repos.transactions.clone(),
            unit_of_work: repos.unit_of_work.clone(),
            destination,
            config,
        }
    }

    /// Move money from `source_id` to the requested destination.
    ///
    /// Returns the registered, still pending, transaction. On any error no
    /// transaction is stored and the source balance is unchanged.
    pub async fn transfer(
        &self,
        source_id: AccountId,
        request: D::Request,
        currency: &str,
        external_reference: Option<String>,
    ) -> Result<Transaction, AppError> {
        self.destination.precheck(&request)?;

        let attempts = self.config.max_transfer_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .try_transfer(source_id, &request, currency, external_reference.clone())
                .await
            {
                Err(AppError::Conflict { entity, id }) if attempt < attempts => {
                    warn!(
                        attempt,
                        %entity,
                        %id,
                        "transfer lost a concurrent update, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_transfer(
        &self,
        source_id: AccountId,
        request: &D::Request,
        currency: &str,
        external_reference: Option<String>,
    ) -> Result<Transaction, AppError> {
        let mut source = self
            .accounts
            .find(source_id)
            .await?
            .ok_or_else(|| AppError::not_found("Account", source_id))?;

        let resolved = self.destination.resolve(request).await?;

        // Debit before building the record so a failed debit never leaves a transaction behind.
        source.withdraw(resolved.amount)?;

        let currency = if currency.trim().is_empty() {
            resolved
                .currency
                .unwrap_or_else(|| self.config.default_currency.clone())
        } else {
            currency.to_string()
        };
        let transaction =
            Transaction::new(&source, resolved.destination, resolved.amount, &currency)?
                .with_external_reference(external_reference);

        let mut scope = self.unit_of_work.begin().await?;
        scope.register_transaction(&transaction).await?;
        scope.save_account(&source).await?;
        scope.commit().await?;

        debug!(
            transaction_id = %transaction.id,
            source = %source_id,
            destination = %transaction.destination,
            amount = transaction.amount,
            "transfer registered"
        );
        Ok(transaction)
    }

    /// Fetch one transaction, provided it was paid to `destination_id`.
    pub async fn find_by_destination(
        &self,
        destination_id: Uuid,
        transaction_id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let destination = self.destination.ensure_exists(destination_id).await?;
        self.transactions
            .find_for_destination(transaction_id, &destination)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", transaction_id))
    }

    /// Page through the transactions paid to `destination_id`.
    pub async fn list_by_destination(
        &self,
        destination_id: Uuid,
        page: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Page<Transaction>, AppError> {
        let pagination = Pagination::new(page, limit, sort)?;
        let destination = self.destination.ensure_exists(destination_id).await?;
        Ok(self
            .transactions
            .list_for_destination(&destination, &pagination)
            .await?)
    }

    pub fn kind(&self) -> DestinationKind {
        self.destination.kind()
    }
}
