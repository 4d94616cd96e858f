//! Statement helpers against a live PostgreSQL server.
//!
//! Ignored by default. Point the `AC_DATABASE__*` variables at a scratch
//! database and run `cargo test -p database --test postgres -- --ignored`.

use database::query::{
    self, exec_batch, exec_delete, exec_insert_for_primary_key, exec_update, new_batch,
};
use database::{BatchStatement, Database, DbError, PgTx, TxContext, close_owned};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo};
use sqlx::{Encode, Postgres, Row, Type};
use std::fmt;

const CREATE_NOTES: &str =
    "CREATE TEMP TABLE notes (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL UNIQUE) ON COMMIT DROP";
const INSERT_NOTE: &str = "INSERT INTO notes (body) VALUES ($1)";

struct Unencodable;

impl Type<Postgres> for Unencodable {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl Encode<'_, Postgres> for Unencodable {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Err("value cannot be encoded".into())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct Note {
    id: i64,
    body: String,
}

async fn connected() -> Database {
    let mut cfg = configuration::load_config()
        .expect("configuration should load")
        .database;
    cfg.connect_max_attempts = 1;
    let db = Database::new(cfg);
    db.connect().await.expect("a reachable PostgreSQL server");
    db
}

/// Begins an owned transaction holding an empty `notes` table.
async fn scratch(db: &Database) -> TxContext<PgTx> {
    let (ctx, owner) = db.begin_writable(&TxContext::new()).await.unwrap();
    assert!(owner);
    exec_update(&ctx, sqlx::query(CREATE_NOTES)).await.unwrap();
    ctx
}

fn cause(err: &DbError) -> Option<&(dyn fmt::Display + Sync)> {
    Some(err as &(dyn fmt::Display + Sync))
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn batch_reports_rows_affected_per_statement() {
    let db = connected().await;
    let ctx = scratch(&db).await;

    let affected = exec_batch(
        &ctx,
        new_batch(vec![
            BatchStatement::new(INSERT_NOTE).bind("first"),
            BatchStatement::new(INSERT_NOTE).bind("second"),
            BatchStatement::new("DELETE FROM notes"),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(affected, vec![1, 1, 2]);
    close_owned(&ctx, None).await.unwrap();
    db.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn batch_stops_at_the_first_failing_statement() {
    let db = connected().await;
    let ctx = scratch(&db).await;

    let err = exec_batch(
        &ctx,
        new_batch(vec![
            BatchStatement::new(INSERT_NOTE).bind("first"),
            BatchStatement::new(INSERT_NOTE).bind("first"),
            BatchStatement::new(INSERT_NOTE).bind("never"),
        ]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DbError::BatchStatement { index: 1, source: sqlx::Error::Database(_) }));
    close_owned(&ctx, cause(&err)).await.unwrap();
    db.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn batch_reports_a_bind_failure_at_its_index() {
    let db = connected().await;
    let ctx = scratch(&db).await;

    let err = exec_batch(
        &ctx,
        new_batch(vec![
            BatchStatement::new(INSERT_NOTE).bind("first"),
            BatchStatement::new(INSERT_NOTE).bind(Unencodable),
        ]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DbError::BatchStatement { index: 1, source: sqlx::Error::Encode(_) }));
    close_owned(&ctx, cause(&err)).await.unwrap();
    db.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn single_row_helpers_return_none_when_nothing_matches() {
    let db = connected().await;
    let ctx = scratch(&db).await;

    let id = exec_insert_for_primary_key::<i64>(
        &ctx,
        sqlx::query("INSERT INTO notes (body) VALUES ($1) RETURNING id").bind("kept"),
    )
    .await
    .unwrap();

    let found: Option<Note> = query::scan_one(&ctx, sqlx::query("SELECT id, body FROM notes"))
        .await
        .unwrap();
    let found = found.unwrap();
    assert_eq!((found.id, found.body.as_str()), (id, "kept"));

    let missing: Option<Note> =
        query::scan_one(&ctx, sqlx::query("SELECT id, body FROM notes WHERE id = $1").bind(id + 1))
            .await
            .unwrap();
    assert!(missing.is_none());

    let body = query::query_row(
        &ctx,
        sqlx::query("SELECT body FROM notes WHERE body = $1").bind("absent"),
        |row: &sqlx::postgres::PgRow| row.try_get::<String, _>("body"),
    )
    .await
    .unwrap();
    assert!(body.is_none());

    let length = query::scan_and_map_one(
        &ctx,
        sqlx::query("SELECT id, body FROM notes"),
        |note: Note| note.body.len(),
    )
    .await
    .unwrap();
    assert_eq!(length, Some(4));

    assert!(exec_delete(&ctx, sqlx::query("DELETE FROM notes WHERE id = $1").bind(id)).await.unwrap());
    assert!(!exec_delete(&ctx, sqlx::query("DELETE FROM notes WHERE id = $1").bind(id)).await.unwrap());

    close_owned(&ctx, None).await.unwrap();
    db.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "needs a PostgreSQL server"]
async fn helpers_report_a_transaction_closed_by_its_owner() {
    let db = connected().await;
    let ctx = scratch(&db).await;
    close_owned(&ctx, None).await.unwrap();

    let err = exec_update(&ctx, sqlx::query("SELECT 1")).await.unwrap_err();
    assert!(matches!(err, DbError::TxClosed));
    db.shutdown().await.unwrap();
}
