//! Thin helpers that run statements on the transaction carried by a
//! [`TxContext`].
//!
//! Every helper expects the scope to carry a transaction and panics when it
//! does not. Using a scope after its owner closed it yields
//! [`DbError::TxClosed`].

use crate::error::DbError;
use crate::pool::PgTx;
use crate::tx::TxContext;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Arguments, Decode, Encode, FromRow, Postgres, Row, Type};
use std::fmt;
use tokio::sync::{OwnedMappedMutexGuard, OwnedMutexGuard};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Exclusive use of the scope's open transaction. Owns its share of the slot
/// so the guard can be held across `.await` in `Send` futures.
pub(crate) type OpenTx<T> = OwnedMappedMutexGuard<Option<T>, T>;

/// Maps one result row to a value.
pub trait RowMapper<T> {
    fn map_row(&self, row: &PgRow) -> Result<T, sqlx::Error>;
}

impl<T, F> RowMapper<T> for F
where
    F: Fn(&PgRow) -> Result<T, sqlx::Error>,
{
    fn map_row(&self, row: &PgRow) -> Result<T, sqlx::Error> {
        self(row)
    }
}

pub(crate) async fn open_tx<T>(ctx: &TxContext<T>) -> Result<OpenTx<T>, DbError> {
    let slot = ctx.must_get().clone().lock_owned().await;
    OwnedMutexGuard::try_map(slot, |slot| slot.as_mut()).map_err(|_| DbError::TxClosed)
}

async fn fetch_one_row(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<PgRow, DbError> {
    let mut tx = open_tx(ctx).await?;
    Ok(query.fetch_one(&mut **tx).await?)
}

async fn fetch_optional_row(
    ctx: &TxContext<PgTx>,
    query: PgQuery<'_>,
) -> Result<Option<PgRow>, DbError> {
    let mut tx = open_tx(ctx).await?;
    Ok(query.fetch_optional(&mut **tx).await?)
}

/// Runs an `INSERT ... RETURNING <key>` and decodes the first column of the
/// single returned row.
pub async fn exec_insert_for_primary_key<K>(
    ctx: &TxContext<PgTx>,
    query: PgQuery<'_>,
) -> Result<K, DbError>
where
    K: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    let row = fetch_one_row(ctx, query).await?;
    Ok(row.try_get::<K, _>(0)?)
}

/// `true` when at least one row was inserted.
pub async fn exec_insert(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<bool, DbError> {
    exec_affecting(ctx, query).await
}

/// `true` when at least one row was updated.
pub async fn exec_update(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<bool, DbError> {
    exec_affecting(ctx, query).await
}

/// `true` when at least one row was deleted.
pub async fn exec_delete(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<bool, DbError> {
    exec_affecting(ctx, query).await
}

async fn exec_affecting(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<bool, DbError> {
    let mut tx = open_tx(ctx).await?;
    let result = query.execute(&mut **tx).await?;
    Ok(result.rows_affected() > 0)
}

/// Returns the raw rows.
pub async fn query_rows(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<Vec<PgRow>, DbError> {
    let mut tx = open_tx(ctx).await?;
    Ok(query.fetch_all(&mut **tx).await?)
}

/// Maps the first row, if any. No matching row is `Ok(None)`.
pub async fn query_row<T>(
    ctx: &TxContext<PgTx>,
    query: PgQuery<'_>,
    mapper: impl RowMapper<T>,
) -> Result<Option<T>, DbError> {
    match fetch_optional_row(ctx, query).await? {
        Some(row) => Ok(Some(mapper.map_row(&row)?)),
        None => Ok(None),
    }
}

pub async fn query_all<T>(
    ctx: &TxContext<PgTx>,
    query: PgQuery<'_>,
    mapper: impl RowMapper<T>,
) -> Result<Vec<T>, DbError> {
    let rows = query_rows(ctx, query).await?;
    rows.iter()
        .map(|row| mapper.map_row(row).map_err(DbError::from))
        .collect()
}

/// Scans the first row, if any, into `T` by column name.
pub async fn scan_one<T>(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<Option<T>, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    match fetch_optional_row(ctx, query).await? {
        Some(row) => Ok(Some(T::from_row(&row)?)),
        None => Ok(None),
    }
}

pub async fn scan_all<T>(ctx: &TxContext<PgTx>, query: PgQuery<'_>) -> Result<Vec<T>, DbError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    let rows = query_rows(ctx, query).await?;
    rows.iter()
        .map(|row| T::from_row(row).map_err(DbError::from))
        .collect()
}

/// Scans the first row, if any, into `S`, then converts it with `map`.
pub async fn scan_and_map_one<S, T>(
    ctx: &TxContext<PgTx>,
    query: PgQuery<'_>,
    map: impl FnOnce(S) -> T,
) -> Result<Option<T>, DbError>
where
    S: for<'r> FromRow<'r, PgRow>,
{
    Ok(scan_one::<S>(ctx, query).await?.map(map))
}

pub async fn scan_and_map_all<S, T>(
    ctx: &TxContext<PgTx>,
    query: PgQuery<'_>,
    map: impl FnMut(S) -> T,
) -> Result<Vec<T>, DbError>
where
    S: for<'r> FromRow<'r, PgRow>,
{
    Ok(scan_all::<S>(ctx, query).await?.into_iter().map(map).collect())
}

/// One statement of a [`Batch`], with its arguments bound up front.
pub struct BatchStatement<'q> {
    sql: &'q str,
    args: PgArguments,
    bind_error: Option<BoxDynError>,
}

impl<'q> BatchStatement<'q> {
    pub fn new(sql: &'q str) -> Self {
        Self {
            sql,
            args: PgArguments::default(),
            bind_error: None,
        }
    }

    /// Binds the next positional argument. An encoding failure is kept and
    /// reported when the batch runs.
    pub fn bind<T>(mut self, value: T) -> Self
    where
        T: Encode<'q, Postgres> + Type<Postgres> + 'q,
    {
        if self.bind_error.is_none() {
            if let Err(e) = self.args.add(value) {
                self.bind_error = Some(e);
            }
        }
        self
    }
}

impl fmt::Debug for BatchStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchStatement")
            .field("sql", &self.sql)
            .field("args", &self.args.len())
            .field("bind_error", &self.bind_error.is_some())
            .finish()
    }
}

/// Statements executed in order on one transaction.
#[derive(Debug)]
pub struct Batch<'q> {
    statements: Vec<BatchStatement<'q>>,
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

pub fn new_batch(statements: Vec<BatchStatement<'_>>) -> Batch<'_> {
    Batch { statements }
}

/// Runs every statement in order and returns the rows affected by each.
///
/// Stops at the first failing statement. The transaction is left for its
/// owner to roll back.
pub async fn exec_batch(ctx: &TxContext<PgTx>, batch: Batch<'_>) -> Result<Vec<u64>, DbError> {
    let mut tx = open_tx(ctx).await?;
    let mut affected = Vec::with_capacity(batch.len());

    for (index, statement) in batch.statements.into_iter().enumerate() {
        if let Some(e) = statement.bind_error {
            return Err(DbError::BatchStatement {
                index,
                source: sqlx::Error::Encode(e),
            });
        }
        let result = sqlx::query_with(statement.sql, statement.args)
            .execute(&mut **tx)
            .await
            .map_err(|source| DbError::BatchStatement { index, source })?;
        affected.push(result.rows_affected());
    }

    Ok(affected)
}
