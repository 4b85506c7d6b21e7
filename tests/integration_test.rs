mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{FailAt, FailingUnitOfWork, active_service, active_store, sqlite_ledger, sqlite_repos};
use payments::application::{
    AccountTransfer, AppError, Ledger, LedgerConfig, ServiceTransfer, StoreTransfer,
};
use payments::domain::{
    AccountRepository, DestinationKind, MerchantStatus, RepositoryError, TransactionStatus,
};
use payments::io::{ExportFormat, Exporter, TransactionEvent};
use uuid::Uuid;

#[tokio::test]
async fn test_sqlite_end_to_end() -> Result<()> {
    let (ledger, _temp) = sqlite_ledger().await?;

    let a = ledger.provisioning.create_account(300093).await?;
    let b = ledger.provisioning.create_account(20000).await?;
    let service = active_service(&ledger, "Internet").await?;
    let price = ledger
        .provisioning
        .create_service_price(service.id, Some("Basic plan".into()), 4500, "")
        .await?;
    let store = active_store(&ledger, "Grocery").await?;

    let to_b = ledger
        .to_accounts
        .transfer(a.id, AccountTransfer { to: b.id, amount: 20000 }, "", None)
        .await?;
    let to_service = ledger
        .to_services
        .transfer(
            a.id,
            ServiceTransfer {
                service_id: service.id,
                service_price_id: Some(price.id),
                amount: None,
            },
            "",
            Some("invoice-1".into()),
        )
        .await?;
    let to_store = ledger
        .to_stores
        .transfer(
            a.id,
            StoreTransfer {
                store_id: store.id,
                amount: 1093,
            },
            "usd",
            None,
        )
        .await?;

    let a_after = ledger.provisioning.get_account(a.id).await?;
    assert_eq!(a_after.balance, 300093 - 20000 - 4500 - 1093);
    assert_eq!(a_after.version, 3);

    // Stored rows read back identically, timestamps included.
    assert_eq!(ledger.transactions.find(to_b.id).await?, to_b);
    assert_eq!(ledger.transactions.find(to_service.id).await?, to_service);
    assert_eq!(ledger.transactions.find(to_store.id).await?, to_store);
    assert_eq!(to_store.currency, "USD");

    let page = ledger.transactions.find_all(1, 2, "created_at asc").await?;
    assert_eq!(page.total, 3);
    let ids: Vec<_> = page.items.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![to_b.id, to_service.id]);

    let page = ledger.transactions.find_all(1, 10, "amount desc").await?;
    let amounts: Vec<_> = page.items.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![20000, 4500, 1093]);

    let by_service = ledger
        .to_services
        .list_by_destination(service.id, 1, 10, "")
        .await?;
    assert_eq!(by_service.total, 1);
    assert_eq!(by_service.items[0].id, to_service.id);

    let by_kind = ledger
        .transactions
        .find_all_by_kind(DestinationKind::Account, 1, 10, "")
        .await?;
    assert_eq!(by_kind.total, 1);

    let by_reference = ledger
        .transactions
        .find_by_external_reference("invoice-1", to_service.id)
        .await?;
    assert_eq!(by_reference.id, to_service.id);

    let err = ledger
        .to_stores
        .find_by_destination(store.id, to_service.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_finalization() -> Result<()> {
    let (ledger, _temp) = sqlite_ledger().await?;
    let a = ledger.provisioning.create_account(1000).await?;
    let b = ledger.provisioning.create_account(0).await?;

    let tx = ledger
        .to_accounts
        .transfer(a.id, AccountTransfer { to: b.id, amount: 400 }, "", None)
        .await?;

    let canceled = ledger.transactions.cancel(tx.id).await?;
    assert_eq!(canceled.status, TransactionStatus::Canceled);
    assert_eq!(
        ledger.transactions.find(tx.id).await?.status,
        TransactionStatus::Canceled
    );

    let err = ledger.transactions.complete(tx.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let err = ledger.transactions.complete(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_merchant_status_controls_payments() -> Result<()> {
    let (ledger, _temp) = sqlite_ledger().await?;
    let payer = ledger.provisioning.create_account(1000).await?;
    let store = active_store(&ledger, "Pharmacy").await?;

    ledger
        .provisioning
        .set_store_status(store.id, MerchantStatus::Disabled)
        .await?;
    assert_eq!(
        ledger.provisioning.get_store(store.id).await?.status,
        MerchantStatus::Disabled
    );

    let request = || StoreTransfer {
        store_id: store.id,
        amount: 100,
    };
    let err = ledger
        .to_stores
        .transfer(payer.id, request(), "", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // Still listable, even while disabled.
    let page = ledger
        .to_stores
        .list_by_destination(store.id, 1, 10, "")
        .await?;
    assert_eq!(page.total, 0);

    ledger
        .provisioning
        .set_store_status(store.id, MerchantStatus::Active)
        .await?;
    ledger
        .to_stores
        .transfer(payer.id, request(), "", None)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_sqlite_failed_commit_leaves_no_trace() -> Result<()> {
    let (mut repos, _temp) = sqlite_repos().await?;
    repos.unit_of_work = Arc::new(FailingUnitOfWork::new(
        repos.unit_of_work.clone(),
        FailAt::SaveAccount,
    ));
    let ledger = Ledger::new(&repos, LedgerConfig::default());

    let a = ledger.provisioning.create_account(1000).await?;
    let b = ledger.provisioning.create_account(0).await?;

    let err = ledger
        .to_accounts
        .transfer(a.id, AccountTransfer { to: b.id, amount: 400 }, "", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Repository(_)));

    assert_eq!(ledger.transactions.find_all(1, 10, "").await?.total, 0);
    assert_eq!(ledger.provisioning.get_account(a.id).await?.balance, 1000);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_stale_save_conflicts() -> Result<()> {
    let (repos, _temp) = sqlite_repos().await?;
    let ledger = Ledger::new(&repos, LedgerConfig::default());
    let account = ledger.provisioning.create_account(1000).await?;

    let mut first = account.clone();
    first.withdraw(100)?;
    repos.accounts.save(&first).await?;

    let mut stale = account.clone();
    stale.withdraw(300)?;
    let err = repos.accounts.save(&stale).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let err = repos.accounts.create(&account).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Duplicate { .. }));
    Ok(())
}

#[tokio::test]
async fn test_export_transactions() -> Result<()> {
    let (ledger, _temp) = sqlite_ledger().await?;
    let a = ledger.provisioning.create_account(5000).await?;
    let b = ledger.provisioning.create_account(0).await?;
    for amount in [100, 200, 300] {
        ledger
            .to_accounts
            .transfer(a.id, AccountTransfer { to: b.id, amount }, "", None)
            .await?;
    }

    let exporter = Exporter::new(&ledger.transactions);

    let mut csv = Vec::new();
    assert_eq!(exporter.export_transactions(ExportFormat::Csv, &mut csv).await?, 3);
    assert_eq!(String::from_utf8(csv)?.lines().count(), 4);

    let mut json = Vec::new();
    exporter
        .export_transactions(ExportFormat::Json, &mut json)
        .await?;
    let events: Vec<TransactionEvent> = serde_json::from_slice(&json)?;
    let amounts: Vec<_> = events.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![100, 200, 300]);
    assert!(events.iter().all(|e| e.account_to == Some(b.id)));
    Ok(())
}
