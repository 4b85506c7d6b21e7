use std::sync::Arc;

use crate::domain::{
    AccountRepository, ServicePriceRepository, ServiceRepository, StoreRepository,
    TransactionRepository, UnitOfWork,
};

/// The set of repository handles the services are wired with.
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub stores: Arc<dyn StoreRepository>,
    pub service_prices: Arc<dyn ServicePriceRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub unit_of_work: Arc<dyn UnitOfWork>,
}

impl Repositories {
    /// Wire every handle to one backend that implements all contracts.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AccountRepository
            + ServiceRepository
            + StoreRepository
            + ServicePriceRepository
            + TransactionRepository
            + UnitOfWork
            + 'static,
    {
        Self {
            accounts: backend.clone(),
            services: backend.clone(),
            stores: backend.clone(),
            service_prices: backend.clone(),
            transactions: backend.clone(),
            unit_of_work: backend,
        }
    }
}
