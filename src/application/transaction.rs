use std::sync::Arc;

use tracing::info;

use crate::domain::{
    AccountId, Destination, DestinationKind, Page, Pagination, Transaction, TransactionId,
    TransactionRepository, TransactionStatus,
};

use super::{AppError, Repositories};

/// Read access to the ledger and finalization of pending transactions.
pub struct TransactionService {
    transactions: Arc<dyn TransactionRepository>,
}

impl TransactionService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            transactions: repos.transactions.clone(),
        }
    }

    pub async fn find(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.transactions
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", id))
    }

    pub async fn find_all(
        &self,
        page: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Page<Transaction>, AppError> {
        let pagination = Pagination::new(page, limit, sort)?;
        Ok(self.transactions.find_all(&pagination).await?)
    }

    pub async fn find_by_kind(
        &self,
        kind: DestinationKind,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.transactions
            .find_for_kind(id, kind)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", id))
    }

    pub async fn find_all_by_kind(
        &self,
        kind: DestinationKind,
        page: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Page<Transaction>, AppError> {
        let pagination = Pagination::new(page, limit, sort)?;
        Ok(self.transactions.list_for_kind(kind, &pagination).await?)
    }

    pub async fn find_by_external_reference(
        &self,
        reference: &str,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.transactions
            .find_for_external_reference(id, reference)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", id))
    }

    pub async fn find_all_by_external_reference(
        &self,
        reference: &str,
        page: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Page<Transaction>, AppError> {
        let pagination = Pagination::new(page, limit, sort)?;
        Ok(self
            .transactions
            .list_for_external_reference(reference, &pagination)
            .await?)
    }

    pub async fn find_by_source_account(
        &self,
        account_id: AccountId,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.transactions
            .find_for_source_account(id, account_id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", id))
    }

    pub async fn find_all_by_source_account(
        &self,
        account_id: AccountId,
        page: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Page<Transaction>, AppError> {
        let pagination = Pagination::new(page, limit, sort)?;
        Ok(self
            .transactions
            .list_for_source_account(account_id, &pagination)
            .await?)
    }

    pub async fn find_by_destination_account(
        &self,
        account_id: AccountId,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.transactions
            .find_for_destination(id, &Destination::Account(account_id))
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", id))
    }

    pub async fn find_all_by_destination_account(
        &self,
        account_id: AccountId,
        page: u32,
        limit: u32,
        sort: &str,
    ) -> Result<Page<Transaction>, AppError> {
        let pagination = Pagination::new(page, limit, sort)?;
        Ok(self
            .transactions
            .list_for_destination(&Destination::Account(account_id), &pagination)
            .await?)
    }

    /// Mark a transaction as completed.
    pub async fn complete(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.finalize(id, TransactionStatus::Completed).await
    }

    /// Mark a transaction as canceled (the failure outcome).
    pub async fn cancel(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.finalize(id, TransactionStatus::Canceled).await
    }

    async fn finalize(
        &self,
        id: TransactionId,
        target: TransactionStatus,
    ) -> Result<Transaction, AppError> {
        let mut transaction = self.find(id).await?;
        let previous = transaction.status;

        if transaction.transition_to(target)? {
            self.transactions.save(&transaction, previous).await?;
            info!(transaction_id = %id, from = %previous, to = %target, "transaction finalized");
        }
        Ok(transaction)
    }
}
