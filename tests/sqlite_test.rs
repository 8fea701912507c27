//! End-to-end runs against a real SQLite file through the built-in sqlx driver.
#![cfg(feature = "sqlite")]

use anyhow::Result;
use onedb::error::ErrorKind;
use onedb::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn open() -> Result<(Adapter, TempDir)> {
    let dir = tempfile::tempdir()?;
    let uri = format!("sqlite:///{}?pool_size=2", dir.path().join("app.db").display());
    let db = onedb::connect(&uri).await?;
    db.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, age INTEGER)",
        vec![],
    )
    .await?;
    Ok((db, dir))
}

fn user(name: &str, age: i64) -> Record {
    record([("name", Value::from(name)), ("age", Value::Int(age))])
}

#[tokio::test]
async fn test_insert_and_fetch() -> Result<()> {
    let (db, _dir) = open().await?;

    let first = db.insert("users", user("Ada", 36)).await?;
    assert_eq!(first.affected_rows, 1);
    assert_eq!(first.last_id, Some(Value::Int(1)));
    let many = db
        .insert_many("users", vec![user("Grace", 45), user("Linus", 17)])
        .await?;
    assert_eq!(many.affected_rows, 2);
    assert_eq!(many.last_id, Some(Value::Int(3)));

    let adults = db
        .fetch_all(
            &Query::new("users")
                .select(["name", "age"])
                .and_where("age", ">=", 18)
                .order_by_desc("age"),
        )
        .await?;
    let names: Vec<_> = adults.iter().filter_map(|r| r.get("name")).cloned().collect();
    assert_eq!(names, vec![Value::from("Grace"), Value::from("Ada")]);

    assert_eq!(db.count("users", None).await?, 3);
    let minor = db.find_one("users", Some(Predicate::lt("age", 18))).await?;
    assert_eq!(
        minor.and_then(|r| r.get("name").cloned()),
        Some(Value::from("Linus"))
    );
    Ok(())
}

#[tokio::test]
async fn test_update_and_delete() -> Result<()> {
    let (db, _dir) = open().await?;
    db.insert_many("users", vec![user("Ada", 36), user("Grace", 45)])
        .await?;

    let updated = db
        .update(
            "users",
            record([("age", 37)]),
            Some(Predicate::eq("name", "Ada")),
        )
        .await?;
    assert_eq!(updated.affected_rows, 1);
    // Only inserts report an id.
    assert_eq!(updated.last_id, None);

    let deleted = db.delete("users", Some(Predicate::gt("age", 40))).await?;
    assert_eq!(deleted.affected_rows, 1);

    let age = db
        .fetch_scalar(&Query::new("users").select(["age"]).where_eq("name", "Ada"))
        .await?;
    assert_eq!(age, Some(Value::Int(37)));
    Ok(())
}

#[tokio::test]
async fn test_unique_violation_is_constraint_error() -> Result<()> {
    let (db, _dir) = open().await?;
    db.insert("users", user("Ada", 36)).await?;

    let err = db.insert("users", user("Ada", 99)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(err.details()["query"].starts_with("INSERT INTO users"));
    Ok(())
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() -> Result<()> {
    let (db, _dir) = open().await?;

    db.transaction(|tx| {
        Box::pin(async move {
            tx.execute_query(&Query::insert_into("users").values(user("Ada", 36)))
                .await?;
            tx.execute_query(&Query::insert_into("users").values(user("Grace", 45)))
                .await?;
            Ok(())
        })
    })
    .await?;
    assert_eq!(db.count("users", None).await?, 2);

    let err = db
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute_query(&Query::delete_from("users")).await?;
                // Duplicate name aborts the whole unit of work.
                tx.execute_query(&Query::insert_into("users").values(user("Linus", 17)))
                    .await?;
                tx.execute_query(&Query::insert_into("users").values(user("Linus", 18)))
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(db.count("users", None).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_savepoint_rollback_keeps_outer_work() -> Result<()> {
    let (db, _dir) = open().await?;

    let mut tx = db.begin().await?;
    tx.execute_query(&Query::insert_into("users").values(user("Ada", 36)))
        .await?;
    tx.begin().await?;
    tx.execute_query(&Query::insert_into("users").values(user("Grace", 45)))
        .await?;
    Session::rollback(&mut tx).await?;
    tx.commit().await?;

    let names = db
        .fetch_all(&Query::new("users").select(["name"]))
        .await?
        .iter()
        .filter_map(|r| r.get("name").cloned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec![Value::from("Ada")]);
    Ok(())
}

#[tokio::test]
async fn test_introspection() -> Result<()> {
    let (db, _dir) = open().await?;

    assert_eq!(db.get_tables().await?, vec!["users"]);
    assert!(db.table_exists("users").await?);
    assert!(!db.table_exists("orders").await?);

    let columns = db.get_columns("users").await?;
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "age"]);
    assert_eq!(columns[1].data_type, "TEXT");
    assert!(!columns[1].nullable);
    assert!(columns[2].nullable);
    Ok(())
}

#[tokio::test]
async fn test_pool_stats_and_disconnect() -> Result<()> {
    let (db, _dir) = open().await?;
    assert!(db.ping().await);

    let stats = db.pool_stats().expect("connected adapter has a pool");
    assert_eq!(stats.max_size, 2);
    assert_eq!(stats.leased, 0);

    db.disconnect().await;
    assert!(!db.is_connected());
    assert!(db.pool_stats().is_none());
    Ok(())
}
