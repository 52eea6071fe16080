//! End-to-end ledger behaviour against real SQLite databases.

use coinbox_core::{ErrorKind, UserId};
use coinbox_storage::{
    CreditLedger, Database, DatabaseConfig, EntryDetails, LedgerConfig, NewUser, StorageError,
    SqliteUserRepository, UserRepository,
};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn create_user(db: &Database, name: &str) -> UserId {
    SqliteUserRepository::new(db.pool().clone())
        .create(&NewUser::registered(name))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_add_add_deduct_scenario() {
    let db = Database::in_memory().await.unwrap();
    let ledger = CreditLedger::new(&db);
    let user = create_user(&db, "User 1").await;

    ledger
        .add_credits(user, dec("5.00"), "coin", EntryDetails::new())
        .await
        .unwrap();
    ledger
        .add_credits(user, dec("5.00"), "coin", EntryDetails::new())
        .await
        .unwrap();
    ledger
        .deduct_credits(user, dec("10.00"), "print", EntryDetails::new())
        .await
        .unwrap();

    assert_eq!(ledger.balance(user).await.unwrap(), dec("0.00"));

    let mut history = ledger.transaction_history(user, 50).await.unwrap();
    history.reverse();
    let chain: Vec<String> = history
        .iter()
        .map(|entry| entry.balance_after.to_string())
        .collect();

    assert_eq!(chain, ["5.00", "10.00", "0.00"]);
    assert!(history.iter().all(|entry| entry.is_consistent()));
}

#[tokio::test]
async fn test_insufficient_balance_changes_nothing() {
    let db = Database::in_memory().await.unwrap();
    let ledger = CreditLedger::new(&db);
    let user = create_user(&db, "User 2").await;

    ledger
        .add_credits(user, dec("5.00"), "coin", EntryDetails::new())
        .await
        .unwrap();

    let result = ledger
        .deduct_credits(user, dec("10.00"), "print", EntryDetails::new())
        .await;

    assert!(matches!(
        result,
        Err(StorageError::InsufficientBalance { .. })
    ));
    assert_eq!(ledger.balance(user).await.unwrap(), dec("5.00"));
    assert_eq!(ledger.transaction_history(user, 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ledger_rows_are_append_only() {
    let db = Database::in_memory().await.unwrap();
    let ledger = CreditLedger::new(&db);
    let user = create_user(&db, "Auditor").await;

    let entry = ledger
        .add_credits(user, dec("1"), "coin", EntryDetails::new())
        .await
        .unwrap();

    let update = sqlx::query("UPDATE ledger_entries SET amount_cents = 9999 WHERE id = ?")
        .bind(entry.id)
        .execute(db.pool())
        .await;
    let delete = sqlx::query("DELETE FROM ledger_entries WHERE id = ?")
        .bind(entry.id)
        .execute(db.pool())
        .await;

    assert!(update.is_err());
    assert!(delete.is_err());
    assert!(ledger.verify_balance(user).await.unwrap());
}

#[tokio::test]
async fn test_user_with_history_cannot_be_deleted() {
    let db = Database::in_memory().await.unwrap();
    let ledger = CreditLedger::new(&db);
    let repo = SqliteUserRepository::new(db.pool().clone());
    let user = create_user(&db, "Kept").await;

    ledger
        .add_credits(user, dec("1"), "coin", EntryDetails::new())
        .await
        .unwrap();

    assert!(repo.delete(user).await.is_err());
    assert!(repo.find_by_id(user).await.unwrap().is_some());
}

#[tokio::test]
async fn test_balance_matches_ledger_sum_after_mixed_operations() {
    let db = Database::in_memory().await.unwrap();
    let ledger = CreditLedger::new(&db);
    let user = create_user(&db, "Mixed").await;

    ledger
        .add_credits(user, dec("20"), "coin", EntryDetails::new())
        .await
        .unwrap();
    ledger
        .admin_add_credits(user, dec("2.50"), "top-up")
        .await
        .unwrap();
    ledger
        .deduct_credits(user, dec("7.25"), "print", EntryDetails::new().print_job(1))
        .await
        .unwrap();
    let _ = ledger
        .deduct_credits(user, dec("100"), "print", EntryDetails::new())
        .await;
    ledger
        .refund(user, dec("7.25"), "refund", EntryDetails::new().print_job(1))
        .await
        .unwrap();
    ledger
        .drain_balance(user, "cancel", EntryDetails::new())
        .await
        .unwrap();

    assert_eq!(ledger.balance(user).await.unwrap(), Decimal::ZERO);
    assert_eq!(ledger.ledger_sum(user).await.unwrap(), Decimal::ZERO);
    assert!(ledger.verify_balance(user).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let db = Database::new(
        DatabaseConfig::new(path.to_str().unwrap())
            .max_connections(8)
            .busy_timeout(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    let user = create_user(&db, "Contended").await;
    let ledger = Arc::new(CreditLedger::with_config(
        &db,
        LedgerConfig::default().max_attempts(10),
    ));

    ledger
        .add_credits(user, dec("10"), "seed", EntryDetails::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..30 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            if i % 3 == 0 {
                ledger
                    .deduct_credits(user, dec("1"), "print", EntryDetails::new())
                    .await
            } else {
                ledger
                    .add_credits(user, dec("1"), "coin", EntryDetails::new())
                    .await
            }
        }));
    }

    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    // 10 seed + 20 credits - 10 deductions
    assert_eq!(ledger.balance(user).await.unwrap(), dec("20"));
    assert!(ledger.verify_balance(user).await.unwrap());

    let history = ledger.transaction_history(user, 100).await.unwrap();
    assert_eq!(history.len(), 31);
    assert!(history.iter().all(|entry| entry.is_consistent()));

    // Each entry starts from the balance the previous one left
    let mut chronological = history;
    chronological.reverse();
    for pair in chronological.windows(2) {
        assert_eq!(pair[0].balance_after, pair[1].balance_before);
    }

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deductions_never_overdraw() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overdraw.db");
    let db = Database::new(DatabaseConfig::new(path.to_str().unwrap()).max_connections(8))
        .await
        .unwrap();

    let user = create_user(&db, "Racer").await;
    let ledger = Arc::new(CreditLedger::with_config(
        &db,
        LedgerConfig::default().max_attempts(10),
    ));
    ledger
        .add_credits(user, dec("5"), "seed", EntryDetails::new())
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .deduct_credits(user, dec("1"), "print", EntryDetails::new())
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(StorageError::InsufficientBalance { .. })))
        .count();

    assert_eq!(succeeded, 5);
    assert_eq!(insufficient, 5);
    assert_eq!(ledger.balance(user).await.unwrap(), Decimal::ZERO);

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_lock_held_past_timeout_aborts_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let db = Database::new(
        DatabaseConfig::new(path.to_str().unwrap())
            .max_connections(4)
            .busy_timeout(Duration::from_secs(2)),
    )
    .await
    .unwrap();
    let user = create_user(&db, "Blocked").await;

    let timeout = Duration::from_millis(50);
    let ledger = CreditLedger::with_config(
        &db,
        LedgerConfig::default()
            .transaction_timeout(timeout)
            .max_attempts(1),
    );

    // Another writer holds the database write lock
    let mut holder = db.pool().begin().await.unwrap();
    sqlx::query("UPDATE users SET updated_at = updated_at WHERE id = ?")
        .bind(user)
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = ledger
        .add_credits(user, dec("5"), "coin", EntryDetails::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Timeout(t) if t == timeout));
    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    assert!(!err.is_retryable());

    holder.rollback().await.unwrap();

    assert_eq!(ledger.balance(user).await.unwrap(), Decimal::ZERO);
    assert!(ledger.transaction_history(user, 10).await.unwrap().is_empty());

    // Once the lock is gone an unhurried ledger commits normally
    let patient = CreditLedger::new(&db);
    patient
        .add_credits(user, dec("5"), "coin", EntryDetails::new())
        .await
        .unwrap();
    assert_eq!(patient.balance(user).await.unwrap(), dec("5"));
    assert!(patient.verify_balance(user).await.unwrap());

    db.close().await;
}
