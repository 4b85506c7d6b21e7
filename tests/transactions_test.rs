mod common;

use anyhow::Result;
use common::{active_service, active_store, memory_ledger};
use payments::application::{AccountTransfer, AppError, Ledger, ServiceTransfer, StoreTransfer};
use payments::domain::{Account, DestinationKind, Transaction, TransactionStatus};
use uuid::Uuid;

async fn pay_account(
    ledger: &Ledger,
    from: &Account,
    to: &Account,
    amount: i64,
    reference: Option<&str>,
) -> Result<Transaction> {
    Ok(ledger
        .to_accounts
        .transfer(
            from.id,
            AccountTransfer { to: to.id, amount },
            "",
            reference.map(String::from),
        )
        .await?)
}

#[tokio::test]
async fn test_complete_and_cancel() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let a = ledger.provisioning.create_account(10000).await?;
    let b = ledger.provisioning.create_account(0).await?;

    let first = pay_account(ledger, &a, &b, 100, None).await?;
    let second = pay_account(ledger, &a, &b, 200, None).await?;

    let completed = ledger.transactions.complete(first.id).await?;
    assert_eq!(completed.status, TransactionStatus::Completed);
    assert_eq!(completed.amount, first.amount);
    assert_eq!(completed.source_account_id, first.source_account_id);
    assert_eq!(completed.destination, first.destination);
    assert_eq!(completed.created_at, first.created_at);

    let canceled = ledger.transactions.cancel(second.id).await?;
    assert_eq!(canceled.status, TransactionStatus::Canceled);

    assert_eq!(
        ledger.transactions.find(first.id).await?.status,
        TransactionStatus::Completed
    );
    assert_eq!(
        ledger.transactions.find(second.id).await?.status,
        TransactionStatus::Canceled
    );
    Ok(())
}

#[tokio::test]
async fn test_terminal_status_is_final() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let a = ledger.provisioning.create_account(10000).await?;
    let b = ledger.provisioning.create_account(0).await?;
    let tx = pay_account(ledger, &a, &b, 100, None).await?;

    ledger.transactions.complete(tx.id).await?;
    let writes = t.store.write_count();

    // Repeating the same terminal status is a no-op.
    let again = ledger.transactions.complete(tx.id).await?;
    assert_eq!(again.status, TransactionStatus::Completed);
    assert_eq!(t.store.write_count(), writes);

    let err = ledger.transactions.cancel(tx.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: TransactionStatus::Completed,
            to: TransactionStatus::Canceled
        }
    ));
    assert_eq!(
        ledger.transactions.find(tx.id).await?.status,
        TransactionStatus::Completed
    );
    Ok(())
}

#[tokio::test]
async fn test_complete_missing_transaction_is_not_found() -> Result<()> {
    let t = memory_ledger();
    let writes = t.store.write_count();

    let err = t.ledger.transactions.complete(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
    let err = t.ledger.transactions.cancel(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(t.store.write_count(), writes);
    Ok(())
}

#[tokio::test]
async fn test_list_by_destination_distinguishes_empty_from_missing() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let store = active_store(ledger, "Corner shop").await?;

    let page = ledger
        .to_stores
        .list_by_destination(store.id, 1, 10, "")
        .await?;
    assert!(page.is_empty());
    assert_eq!(page.total, 0);

    let err = ledger
        .to_stores
        .list_by_destination(Uuid::new_v4(), 1, 10, "")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_find_by_destination() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let payer = ledger.provisioning.create_account(10000).await?;
    let service = active_service(ledger, "Internet").await?;
    let other = active_service(ledger, "Water").await?;

    let tx = ledger
        .to_services
        .transfer(
            payer.id,
            ServiceTransfer {
                service_id: service.id,
                service_price_id: None,
                amount: Some(1234),
            },
            "",
            None,
        )
        .await?;

    let found = ledger
        .to_services
        .find_by_destination(service.id, tx.id)
        .await?;
    assert_eq!(found.id, tx.id);

    // Exists, but was paid to a different service.
    let err = ledger
        .to_services
        .find_by_destination(other.id, tx.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "Transaction", .. }));

    let err = ledger
        .to_services
        .find_by_destination(Uuid::new_v4(), tx.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "Service", .. }));

    // Same id, wrong destination kind.
    let err = ledger
        .to_stores
        .find_by_destination(service.id, tx.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_pagination_and_sort() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let a = ledger.provisioning.create_account(100000).await?;
    let b = ledger.provisioning.create_account(0).await?;

    for amount in [500, 100, 400, 200, 300] {
        pay_account(ledger, &a, &b, amount, None).await?;
    }

    let page = ledger
        .to_accounts
        .list_by_destination(b.id, 1, 2, "amount asc")
        .await?;
    assert_eq!(page.total, 5);
    let amounts: Vec<_> = page.items.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![100, 200]);

    let page = ledger
        .to_accounts
        .list_by_destination(b.id, 3, 2, "amount asc")
        .await?;
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].amount, 500);

    let page = ledger.transactions.find_all(1, 3, "amount desc").await?;
    let amounts: Vec<_> = page.items.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![500, 400, 300]);

    // Past the end: empty window, total unchanged.
    let page = ledger.transactions.find_all(10, 3, "").await?;
    assert!(page.is_empty());
    assert_eq!(page.total, 5);
    Ok(())
}

#[tokio::test]
async fn test_bad_pagination_is_rejected() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;

    for (page, limit, sort) in [
        (0, 10, ""),
        (1, 0, ""),
        (1, 10, "amount; DROP TABLE transactions"),
        (1, 10, "balance asc"),
        (1, 10, "amount sideways"),
    ] {
        let err = ledger
            .transactions
            .find_all(page, limit, sort)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{page} {limit} {sort}");
    }
    Ok(())
}

#[tokio::test]
async fn test_reads_are_idempotent() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let a = ledger.provisioning.create_account(10000).await?;
    let b = ledger.provisioning.create_account(0).await?;
    let tx = pay_account(ledger, &a, &b, 700, Some("order-1")).await?;
    pay_account(ledger, &a, &b, 300, None).await?;

    let writes = t.store.write_count();

    let first = ledger.transactions.find_all(1, 10, "").await?;
    let second = ledger.transactions.find_all(1, 10, "").await?;
    assert_eq!(first, second);

    assert_eq!(
        ledger.transactions.find(tx.id).await?,
        ledger.transactions.find(tx.id).await?
    );
    assert_eq!(
        ledger.to_accounts.list_by_destination(b.id, 1, 10, "").await?,
        ledger.to_accounts.list_by_destination(b.id, 1, 10, "").await?
    );
    assert_eq!(t.store.write_count(), writes);
    Ok(())
}

#[tokio::test]
async fn test_generic_lookups() -> Result<()> {
    let t = memory_ledger();
    let ledger = &t.ledger;
    let a = ledger.provisioning.create_account(10000).await?;
    let b = ledger.provisioning.create_account(10000).await?;
    let store = active_store(ledger, "Bookshop").await?;

    let to_b = pay_account(ledger, &a, &b, 100, Some("order-9")).await?;
    let to_a = pay_account(ledger, &b, &a, 200, None).await?;
    let to_store = ledger
        .to_stores
        .transfer(
            a.id,
            StoreTransfer {
                store_id: store.id,
                amount: 300,
            },
            "",
            Some("order-9".into()),
        )
        .await?;

    let by_source = ledger
        .transactions
        .find_all_by_source_account(a.id, 1, 10, "")
        .await?;
    assert_eq!(by_source.total, 2);

    let by_destination = ledger
        .transactions
        .find_all_by_destination_account(a.id, 1, 10, "")
        .await?;
    assert_eq!(by_destination.total, 1);
    assert_eq!(by_destination.items[0].id, to_a.id);

    let by_kind = ledger
        .transactions
        .find_all_by_kind(DestinationKind::Store, 1, 10, "")
        .await?;
    assert_eq!(by_kind.total, 1);
    assert_eq!(by_kind.items[0].id, to_store.id);

    let by_reference = ledger
        .transactions
        .find_all_by_external_reference("order-9", 1, 10, "amount asc")
        .await?;
    let ids: Vec<_> = by_reference.items.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![to_b.id, to_store.id]);

    assert_eq!(
        ledger
            .transactions
            .find_by_source_account(a.id, to_b.id)
            .await?
            .id,
        to_b.id
    );
    assert!(
        ledger
            .transactions
            .find_by_source_account(b.id, to_b.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert_eq!(
        ledger
            .transactions
            .find_by_destination_account(b.id, to_b.id)
            .await?
            .id,
        to_b.id
    );
    assert!(
        ledger
            .transactions
            .find_by_kind(DestinationKind::Service, to_store.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert_eq!(
        ledger
            .transactions
            .find_by_external_reference("order-9", to_store.id)
            .await?
            .id,
        to_store.id
    );
    Ok(())
}
