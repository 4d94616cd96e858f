//! # Accelerate Database Crate
//!
//! Pooled PostgreSQL access shared by every service in the workspace.
//!
//! ## Architectural Principles
//!
//! - **Guarded lifecycle:** [`Database::connect`] and [`Database::shutdown`]
//!   run through a `core_types::StateMachine`, so each happens once and in order.
//! - **Explicit transaction scopes:** a [`TxContext`] travels down the call
//!   chain. The outermost layer that needs a transaction owns it; inner
//!   layers join it. [`execute_in_tx`] wraps any operation this way.
//! - **Swappable pool:** the manager talks to the pool through the
//!   [`Connector`] / [`PoolBackend`] / [`TxHandle`] traits. Production uses
//!   `sqlx::PgPool`; tests use in-memory doubles.
//!
//! ## Public API
//!
//! - `Database`: connect, acquire (with retry), run, transaction, stats, shutdown.
//! - `begin_writable` / `begin_read_only` / `close_owned`: manual scope control.
//! - `query`: statement helpers over the scope's transaction, including batches.
//! - `DbError`: the error type for everything above.

pub mod connection;
pub mod db;
pub mod error;
pub mod pool;
pub mod query;
pub mod tx;

pub use db::{ConnOf, Database, TxOf};
pub use error::DbError;
pub use pool::{AccessMode, Connector, DbStats, PgBackend, PgConnector, PgTx, PoolBackend, TxHandle};
pub use query::{Batch, BatchStatement, RowMapper};
pub use tx::{TxContext, close_owned, execute_in_read_only_tx, execute_in_tx};
