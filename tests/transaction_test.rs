mod common;

use std::time::Duration;

use common::mock_adapter;
use onedb::error::ErrorKind;
use onedb::native::NativeError;
use onedb::prelude::*;
use onedb::TransactionState;
use pretty_assertions::assert_eq;

fn user(name: &str) -> Record {
    record([("name", name)])
}

#[tokio::test]
async fn test_commit_runs_on_one_connection() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 2).await;

    let id = db
        .transaction(|s| {
            Box::pin(async move {
                let result = s.execute_query(&Query::insert_into("users").values(user("Ada"))).await?;
                Ok(result.last_id)
            })
        })
        .await
        .unwrap();

    assert_eq!(id, Some(Value::Int(1)));
    let log = driver.state.log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], "BEGIN");
    assert!(log[1].starts_with("INSERT INTO users"));
    assert_eq!(log[2], "COMMIT");

    let stats = db.pool_stats().unwrap();
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn test_error_in_body_rolls_back() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;

    let err = db
        .transaction(|s| {
            Box::pin(async move {
                s.execute_query(&Query::insert_into("users").values(user("Ada"))).await?;
                Err::<(), _>(OnedbError::invalid_query("balance would go negative"))
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    assert!(err.rollback_failure().is_none());
    assert_eq!(driver.state.log().last().map(String::as_str), Some("ROLLBACK"));

    // The connection went back clean and is reused.
    let stats = db.pool_stats().unwrap();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.total_discarded, 0);
}

#[tokio::test]
async fn test_nested_begin_uses_savepoint() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;

    let mut tx = db.begin().await.unwrap();
    tx.begin().await.unwrap();
    assert_eq!(tx.depth(), 2);
    tx.execute_query(&Query::insert_into("users").values(user("Bob")))
        .await
        .unwrap();
    Session::rollback(&mut tx).await.unwrap();
    assert_eq!(tx.depth(), 1);
    assert_eq!(tx.transaction_state(), TransactionState::Active);
    tx.commit().await.unwrap();

    let log = driver.state.log();
    assert_eq!(log[0], "BEGIN");
    assert_eq!(log[1], "SAVEPOINT sp_1");
    assert_eq!(log[3], "ROLLBACK TO SAVEPOINT sp_1");
    assert_eq!(log[4], "COMMIT");
}

#[tokio::test]
async fn test_guard_commit_releases_every_level() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;

    let mut tx = db.begin().await.unwrap();
    tx.begin().await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        driver.state.log(),
        vec!["BEGIN", "SAVEPOINT sp_1", "RELEASE SAVEPOINT sp_1", "COMMIT"]
    );
    assert_eq!(db.pool_stats().unwrap().leased, 0);
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;
    driver
        .state
        .fail_on("COMMIT", NativeError::new("database", "could not serialize access"));

    let err = db
        .transaction(|s| {
            Box::pin(async move {
                s.execute_query(&Query::update("users").set("active", false)).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Query);
    assert_eq!(err.details()["query"], "COMMIT");
    let log = driver.state.log();
    assert_eq!(&log[log.len() - 2..], ["COMMIT", "ROLLBACK"]);
    assert_eq!(db.pool_stats().unwrap().leased, 0);
}

#[tokio::test]
async fn test_failed_rollback_is_attached_not_replacing() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;
    driver
        .state
        .fail_on("ROLLBACK", NativeError::new("io", "connection reset by peer"));

    let err = db
        .transaction(|_s| {
            Box::pin(async move { Err::<(), _>(OnedbError::invalid_query("bad input")) })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    assert!(matches!(err.root_cause(), OnedbError::InvalidQuery(_)));
    let rollback = err.rollback_failure().unwrap();
    assert_eq!(rollback.kind(), ErrorKind::Connection);
    assert!(err.details().contains_key("rollback_error"));

    // A connection whose rollback failed is not reused.
    let stats = db.pool_stats().unwrap();
    assert_eq!(stats.total_discarded, 1);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn test_dropped_guard_rolls_back_in_background() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;

    {
        let mut tx = db.begin().await.unwrap();
        tx.execute("DELETE FROM sessions", vec![]).await.unwrap();
    }

    let mut rolled_back = false;
    for _ in 0..50 {
        if driver.state.log().iter().any(|s| s == "ROLLBACK") {
            rolled_back = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(rolled_back);

    // The background task returns the lease once the rollback finished.
    let session = tokio::time::timeout(Duration::from_secs(1), db.session()).await;
    assert!(matches!(session, Ok(Ok(_))));
}

#[tokio::test]
async fn test_guard_rollback_discards_work() {
    let (db, driver) = mock_adapter("sqlite:///app.db", 1).await;

    let mut tx = db.begin().await.unwrap();
    tx.execute("DELETE FROM sessions WHERE expired = ?", vec![true.into()])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(
        driver.state.log(),
        vec!["BEGIN", "DELETE FROM sessions WHERE expired = ?", "ROLLBACK"]
    );
}

#[tokio::test]
async fn test_redis_transaction_has_no_savepoints() {
    let (db, driver) = mock_adapter("redis://localhost:6379/0", 1).await;

    let mut tx = db.begin().await.unwrap();
    let err = tx.begin().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(tx.depth(), 1);
    tx.rollback().await.unwrap();

    assert_eq!(driver.state.log(), vec!["MULTI", "DISCARD"]);
}

#[tokio::test]
async fn test_document_store_begin_without_transactions() {
    let (db, _driver) = mock_adapter("dynamodb://localhost:8000/us-east-1", 1).await;

    let err = db.begin().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    // The failed begin did not hold on to the connection.
    assert_eq!(db.pool_stats().unwrap().leased, 0);
}
