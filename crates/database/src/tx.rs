//! Transaction scopes that flow through nested calls.
//!
//! A [`TxContext`] is passed explicitly from the outermost operation down to
//! the data-access layer. The first layer that needs a transaction begins one
//! and becomes its owner; every layer below joins it. Only the owner commits
//! or rolls back.

use crate::db::{Database, TxOf};
use crate::error::DbError;
use crate::pool::{AccessMode, Connector, PgTx, PoolBackend, TxHandle};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The slot shared by every clone of one scope. `None` once the owner has
/// committed or rolled back.
pub(crate) type SharedTx<T> = Arc<Mutex<Option<T>>>;

/// A request-scoped handle on at most one open transaction.
///
/// Clones share the same transaction. The default value carries none.
pub struct TxContext<T = PgTx> {
    tx: Option<SharedTx<T>>,
}

impl<T> TxContext<T> {
    /// A scope with no transaction.
    pub fn new() -> Self {
        Self { tx: None }
    }

    pub fn has_tx(&self) -> bool {
        self.tx.is_some()
    }

    /// Attaches `tx` unless the scope already carries one, in which case the
    /// scope is returned unchanged and `tx` is dropped.
    pub fn with_tx(self, tx: T) -> Self {
        if self.tx.is_some() {
            return self;
        }
        Self {
            tx: Some(Arc::new(Mutex::new(Some(tx)))),
        }
    }

    /// `true` when both scopes carry the very same transaction.
    pub fn same_tx(&self, other: &Self) -> bool {
        match (&self.tx, &other.tx) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The shared transaction slot.
    ///
    /// # Panics
    ///
    /// When the scope carries no transaction. Reaching the data layer without
    /// one is a programming error, not a runtime condition.
    pub(crate) fn must_get(&self) -> &SharedTx<T> {
        match &self.tx {
            Some(tx) => tx,
            None => panic!("no transaction on context"),
        }
    }
}

impl<T> Clone for TxContext<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Default for TxContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TxContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("has_tx", &self.has_tx())
            .finish()
    }
}

impl<C: Connector> Database<C> {
    /// Joins the scope's transaction, or begins a read/write one.
    ///
    /// The returned flag is `true` only when a new transaction was begun; the
    /// caller then owns it and must hand it to [`close_owned`].
    pub async fn begin_writable(
        &self,
        ctx: &TxContext<TxOf<C>>,
    ) -> Result<(TxContext<TxOf<C>>, bool), DbError> {
        self.begin(ctx, AccessMode::ReadWrite).await
    }

    /// Like [`begin_writable`](Self::begin_writable), but a newly begun
    /// transaction is read-only.
    pub async fn begin_read_only(
        &self,
        ctx: &TxContext<TxOf<C>>,
    ) -> Result<(TxContext<TxOf<C>>, bool), DbError> {
        self.begin(ctx, AccessMode::ReadOnly).await
    }

    async fn begin(
        &self,
        ctx: &TxContext<TxOf<C>>,
        access: AccessMode,
    ) -> Result<(TxContext<TxOf<C>>, bool), DbError> {
        if ctx.has_tx() {
            return Ok((ctx.clone(), false));
        }
        let tx = self.pool()?.begin(access).await.map_err(DbError::Begin)?;
        tracing::trace!(?access, "began transaction");
        Ok((ctx.clone().with_tx(tx), true))
    }

    /// Runs `f` in a fresh transaction of its own, never joining an outer one.
    pub async fn transaction<R, E, F, Fut>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(TxContext<TxOf<C>>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DbError> + fmt::Display + Sync,
    {
        execute_in_tx(&TxContext::new(), self, f).await
    }
}

/// Finishes an owned transaction: commits when `outcome` is `None`, rolls
/// back otherwise. `outcome` is the failure that caused the rollback.
///
/// # Panics
///
/// When `ctx` carries no transaction.
pub async fn close_owned<T: TxHandle>(
    ctx: &TxContext<T>,
    outcome: Option<&(dyn fmt::Display + Sync)>,
) -> Result<(), DbError> {
    let tx = ctx.must_get().lock().await.take().ok_or(DbError::TxClosed)?;
    match outcome {
        None => tx.commit().await.map_err(DbError::Commit),
        Some(cause) => {
            let cause = cause.to_string();
            tracing::debug!(%cause, "rolling back transaction");
            tx.rollback()
                .await
                .map_err(|rollback| DbError::Rollback { rollback, cause })
        }
    }
}

/// Runs `op` inside the scope's transaction, beginning a read/write one if
/// there is none. When this call began the transaction it also closes it:
/// commit on `Ok`, rollback on `Err`.
///
/// Returns `op`'s result unless closing failed, in which case the close
/// error wins.
pub async fn execute_in_tx<C, R, E, F, Fut>(
    ctx: &TxContext<TxOf<C>>,
    db: &Database<C>,
    op: F,
) -> Result<R, E>
where
    C: Connector,
    F: FnOnce(TxContext<TxOf<C>>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<DbError> + fmt::Display + Sync,
{
    let (scoped, owner) = db.begin_writable(ctx).await?;
    run_scoped(scoped, owner, op).await
}

/// The read-only counterpart of [`execute_in_tx`].
pub async fn execute_in_read_only_tx<C, R, E, F, Fut>(
    ctx: &TxContext<TxOf<C>>,
    db: &Database<C>,
    op: F,
) -> Result<R, E>
where
    C: Connector,
    F: FnOnce(TxContext<TxOf<C>>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<DbError> + fmt::Display + Sync,
{
    let (scoped, owner) = db.begin_read_only(ctx).await?;
    run_scoped(scoped, owner, op).await
}

async fn run_scoped<T, R, E, F, Fut>(scoped: TxContext<T>, owner: bool, op: F) -> Result<R, E>
where
    T: TxHandle,
    F: FnOnce(TxContext<T>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<DbError> + fmt::Display + Sync,
{
    let result = op(scoped.clone()).await;
    if !owner {
        return result;
    }

    let closed = match &result {
        Ok(_) => close_owned(&scoped, None).await,
        Err(e) => close_owned(&scoped, Some(e as &(dyn fmt::Display + Sync))).await,
    };
    match closed {
        Ok(()) => result,
        Err(close_err) => {
            tracing::warn!(error = %close_err, "failed to close transaction");
            Err(close_err.into())
        }
    }
}
