use super::{
    AccountTransferService, LedgerConfig, ProvisioningService, Repositories,
    ServiceTransferService, StoreTransferService, TransactionService,
};

/// Every ledger service, wired to one set of repositories.
pub struct Ledger {
    pub provisioning: ProvisioningService,
    pub transactions: TransactionService,
    pub to_accounts: AccountTransferService,
    pub to_services: ServiceTransferService,
    pub to_stores: StoreTransferService,
    pub config: LedgerConfig,
}

impl Ledger {
    pub fn new(repos: &Repositories, config: LedgerConfig) -> Self {
        Self {
            provisioning: ProvisioningService::new(repos),
            transactions: TransactionService::new(repos),
            to_accounts: AccountTransferService::for_accounts(repos, config.clone()),
            to_services: ServiceTransferService::for_services(repos, config.clone()),
            to_stores: StoreTransferService::for_stores(repos, config.clone()),
            config,
        }
    }
}
