mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{FailAt, failing_ledger, memory_ledger, memory_ledger_with};
use payments::application::{AccountTransfer, AppError, LedgerConfig};
use payments::domain::{
    AccountRepository, Destination, RepositoryError, Transaction, UnitOfWork,
};

#[tokio::test]
async fn test_failed_write_rolls_back_whole_transfer() -> Result<()> {
    for fail_at in [FailAt::Register, FailAt::SaveAccount, FailAt::Commit] {
        let t = failing_ledger(fail_at);
        let ledger = &t.ledger;
        let a = ledger.provisioning.create_account(5000).await?;
        let b = ledger.provisioning.create_account(0).await?;

        let err = ledger
            .to_accounts
            .transfer(a.id, AccountTransfer { to: b.id, amount: 1000 }, "", None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Repository(_)), "{fail_at:?}: {err:?}");
        assert_eq!(t.store.transaction_count().await, 0, "{fail_at:?}");
        let a = ledger.provisioning.get_account(a.id).await?;
        assert_eq!(a.balance, 5000, "{fail_at:?}");
        assert_eq!(a.version, 0, "{fail_at:?}");
    }
    Ok(())
}

#[tokio::test]
async fn test_dropped_scope_discards_staged_writes() -> Result<()> {
    let t = memory_ledger();
    let a = t.ledger.provisioning.create_account(5000).await?;
    let b = t.ledger.provisioning.create_account(0).await?;

    let mut debited = a.clone();
    debited.withdraw(500)?;
    let tx = Transaction::new(&a, Destination::Account(b.id), 500, "")?;

    {
        let mut scope = t.store.begin().await?;
        scope.register_transaction(&tx).await?;
        scope.save_account(&debited).await?;
    }

    assert_eq!(t.store.transaction_count().await, 0);
    assert_eq!(t.ledger.provisioning.get_account(a.id).await?.balance, 5000);
    Ok(())
}

#[tokio::test]
async fn test_stale_account_save_conflicts() -> Result<()> {
    let t = memory_ledger();
    let account = t.ledger.provisioning.create_account(5000).await?;

    let mut first = account.clone();
    first.withdraw(100)?;
    AccountRepository::save(&t.store, &first).await?;

    let mut stale = account.clone();
    stale.withdraw(200)?;
    let err = AccountRepository::save(&t.store, &stale).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { entity: "Account", .. }));

    assert_eq!(t.ledger.provisioning.get_account(account.id).await?.balance, 4900);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_never_lose_updates() -> Result<()> {
    let t = memory_ledger_with(LedgerConfig::default().with_max_transfer_attempts(100));
    let source = t.ledger.provisioning.create_account(1000).await?;
    let sink = t.ledger.provisioning.create_account(0).await?;
    let (source_id, sink_id) = (source.id, sink.id);
    let ledger = Arc::new(t.ledger);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .to_accounts
                .transfer(
                    source_id,
                    AccountTransfer {
                        to: sink_id,
                        amount: 100,
                    },
                    "",
                    None,
                )
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(err) => assert!(
                err.is_insufficient_funds() || matches!(err, AppError::Conflict { .. }),
                "unexpected error: {err:?}"
            ),
        }
    }

    assert!(successes >= 1);
    assert!(successes <= 10);
    let balance = ledger.provisioning.get_account(source.id).await?.balance;
    assert_eq!(balance, 1000 - 100 * successes as i64);
    assert_eq!(t.store.transaction_count().await, successes);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contended_transfers_all_succeed_after_retries() -> Result<()> {
    let t = memory_ledger_with(LedgerConfig::default().with_max_transfer_attempts(100));
    let source = t.ledger.provisioning.create_account(10_000).await?;
    let sink = t.ledger.provisioning.create_account(0).await?;
    let (source_id, sink_id) = (source.id, sink.id);
    let ledger = Arc::new(t.ledger);

    let mut transfers = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        transfers.push(tokio::spawn(async move {
            ledger
                .to_accounts
                .transfer(
                    source_id,
                    AccountTransfer {
                        to: sink_id,
                        amount: 250,
                    },
                    "",
                    None,
                )
                .await
        }));
    }

    for transfer in transfers {
        transfer.await??;
    }

    let account = ledger.provisioning.get_account(source.id).await?;
    assert_eq!(account.balance, 10_000 - 10 * 250);
    assert_eq!(account.version, 10);
    assert_eq!(t.store.transaction_count().await, 10);
    Ok(())
}
