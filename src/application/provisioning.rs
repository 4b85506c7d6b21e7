use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountRepository, Cents, MerchantStatus, Service, ServiceId,
    ServicePrice, ServicePriceId, ServicePriceRepository, ServiceRepository, Store, StoreId,
    StoreRepository,
};

use super::{AppError, Repositories};

/// Creates and maintains the parties a transfer can involve:
/// accounts, services, their fixed prices and stores.
pub struct ProvisioningService {
    accounts: Arc<dyn AccountRepository>,
    services: Arc<dyn ServiceRepository>,
    stores: Arc<dyn StoreRepository>,
    service_prices: Arc<dyn ServicePriceRepository>,
}

impl ProvisioningService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            accounts: repos.accounts.clone(),
            services: repos.services.clone(),
            stores: repos.stores.clone(),
            service_prices: repos.service_prices.clone(),
        }
    }

    // ========================
    // Account operations
    // ========================

    pub async fn create_account(&self, initial_balance: Cents) -> Result<Account, AppError> {
        let account = Account::new(initial_balance)?;
        self.accounts.create(&account).await?;
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.accounts
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Account", id))
    }

    /// Credit an account. A concurrent write surfaces as `Conflict`.
    pub async fn deposit(&self, id: AccountId, amount: Cents) -> Result<Account, AppError> {
        let mut account = self.get_account(id).await?;
        account.deposit(amount)?;
        self.accounts.save(&account).await?;
        account.version += 1;
        Ok(account)
    }

    // ========================
    // Service operations
    // ========================

    pub async fn create_service(
        &self,
        name: String,
        description: Option<String>,
        owner_id: Uuid,
        type_id: Uuid,
    ) -> Result<Service, AppError> {
        let mut service = Service::new(name, owner_id, type_id)?;
        if let Some(desc) = description {
            service = service.with_description(desc);
        }
        self.services.create(&service).await?;
        Ok(service)
    }

    pub async fn get_service(&self, id: ServiceId) -> Result<Service, AppError> {
        self.services
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Service", id))
    }

    pub async fn set_service_status(
        &self,
        id: ServiceId,
        status: MerchantStatus,
    ) -> Result<Service, AppError> {
        let mut service = self.get_service(id).await?;
        service.set_status(status);
        self.services.save(&service).await?;
        Ok(service)
    }

    pub async fn create_service_price(
        &self,
        service_id: ServiceId,
        description: Option<String>,
        amount: Cents,
        currency: &str,
    ) -> Result<ServicePrice, AppError> {
        let service = self.get_service(service_id).await?;
        let price = ServicePrice::new(&service, description, amount, currency)?;
        self.service_prices.create(&price).await?;
        Ok(price)
    }

    pub async fn get_service_price(&self, id: ServicePriceId) -> Result<ServicePrice, AppError> {
        self.service_prices
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Service price", id))
    }

    // ========================
    // Store operations
    // ========================

    pub async fn create_store(
        &self,
        name: String,
        description: Option<String>,
        owner_id: Uuid,
        type_id: Uuid,
    ) -> Result<Store, AppError> {
        let mut store = Store::new(name, owner_id, type_id)?;
        if let Some(desc) = description {
            store = store.with_description(desc);
        }
        self.stores.create(&store).await?;
        Ok(store)
    }

    pub async fn get_store(&self, id: StoreId) -> Result<Store, AppError> {
        self.stores
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Store", id))
    }

    pub async fn set_store_status(
        &self,
        id: StoreId,
        status: MerchantStatus,
    ) -> Result<Store, AppError> {
        let mut store = self.get_store(id).await?;
        store.set_status(status);
        self.stores.save(&store).await?;
        Ok(store)
    }
}
