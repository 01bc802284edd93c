//! # Sessions
//!
//! A [`Session`] is the boundary between the query engine and a database
//! provider. It owns one logical connection (a provider may route reads
//! to a replica and upgrade to the primary on the first write), the dialect
//! statements are compiled for, the schema registry and the shard strategy.
//!
//! The engine asks the session for a connection once per statement and
//! never keeps it.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value as Json;

pub use crate::context::SessionId;
use crate::compile::Query;
use crate::connection::{Connection, Intent, Row, Transaction};
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::error::Result;
use crate::eval::{Evaluator, JsonEvaluator};
use crate::schema::SchemaRegistry;
use crate::table::Table;

/// Collaborators a database provider supplies to the engine.
pub trait Session: Debug + Send + Sync {
    /// Identity used to refuse combining queries across sessions.
    fn id(&self) -> SessionId;

    /// SQL dialect statements are compiled for.
    fn dialect(&self) -> &dyn Dialect;

    /// Where entity schemas are resolved.
    fn schemas(&self) -> &SchemaRegistry {
        SchemaRegistry::global()
    }

    /// Maps shard keys to connection and table suffixes.
    fn shard_strategy(&self) -> &dyn ShardStrategy {
        &NoSharding
    }

    /// Evaluates member access and method calls on captured values.
    fn evaluator(&self) -> &dyn Evaluator {
        &JsonEvaluator
    }

    /// A connection for one statement. `shard` is the connection-shard
    /// suffix; empty means the default database.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when no connection can be opened.
    fn connection(&self, intent: Intent, shard: &str) -> anyhow::Result<Arc<dyn Connection>>;

    /// The transaction currently open on this session, if any.
    fn transaction(&self) -> Option<Arc<dyn Transaction>>;

    /// Opens a transaction. It stays current until committed or rolled
    /// back.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, including when a transaction is
    /// already open.
    fn begin(&self) -> anyhow::Result<Arc<dyn Transaction>>;
}

/// Convenience constructors on a shared session.
pub trait SessionExt {
    /// The table for entity `T`, unsharded.
    ///
    /// # Errors
    ///
    /// Returns an error if `T`'s schema cannot be resolved.
    fn table<T: Entity>(&self) -> Result<Table<T>>;

    /// The table for entity `T` in the shard selected by `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T`'s schema cannot be resolved.
    fn table_for<T: Entity>(&self, key: &ShardKey) -> Result<Table<T>>;
}

impl SessionExt for Arc<dyn Session> {
    fn table<T: Entity>(&self) -> Result<Table<T>> {
        Table::new(Arc::clone(self), &ShardKey::none())
    }

    fn table_for<T: Entity>(&self, key: &ShardKey) -> Result<Table<T>> {
        Table::new(Arc::clone(self), key)
    }
}

/// The value a shard strategy routes on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardKey(pub Json);

impl ShardKey {
    /// No key: the unsharded table.
    #[must_use]
    pub const fn none() -> Self {
        Self(Json::Null)
    }

    /// A key captured from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn new(value: &impl Serialize) -> Result<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Whether this is the empty key.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_null()
    }
}

/// Resolves the suffixes that select a physical connection and table. An
/// empty suffix means unsharded.
pub trait ShardStrategy: Debug + Send + Sync {
    /// Suffix of the connection (database) holding `key`.
    fn connection_shard(&self, _key: &ShardKey) -> String {
        String::new()
    }

    /// Suffix appended to `table` for the shard holding `key`.
    fn table_shard(&self, _table: &str, _key: &ShardKey) -> String {
        String::new()
    }

    /// Suffix appended after the shard suffix for `key`'s partition.
    fn table_partition(&self, _table: &str, _key: &ShardKey) -> String {
        String::new()
    }
}

/// Every entity lives in its base table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSharding;

impl ShardStrategy for NoSharding {}

/// Integer keys spread over `shards` tables: key `k` lives in
/// `{table}_{k mod shards}`. Non-integer keys stay unsharded.
#[derive(Debug, Clone, Copy)]
pub struct ModuloSharding {
    /// Number of table shards.
    pub shards: u64,
}

impl ShardStrategy for ModuloSharding {
    fn table_shard(&self, _table: &str, key: &ShardKey) -> String {
        if self.shards == 0 {
            return String::new();
        }
        match &key.0 {
            Json::Number(n) => n.as_i64().map_or_else(
                || n.as_u64().map_or_else(String::new, |n| format!("_{}", n % self.shards)),
                |n| format!("_{}", n.unsigned_abs() % self.shards),
            ),
            _ => String::new(),
        }
    }
}

/// The connection for one statement: the open transaction's when there is
/// one, otherwise a fresh one for `intent`.
pub(crate) fn connection_for(session: &dyn Session, intent: Intent, shard: &str) -> Result<Arc<dyn Connection>> {
    if let Some(tx) = session.transaction() {
        return Ok(tx.connection());
    }
    Ok(session.connection(intent, shard)?)
}

/// Runs a row-returning statement.
pub(crate) fn fetch(session: &dyn Session, shard: &str, query: &Query) -> Result<Vec<Row>> {
    let conn = connection_for(session, Intent::Read, shard)?;
    fetch_on(conn.as_ref(), query)
}

/// Runs a statement that modifies rows and returns the affected count.
pub(crate) fn execute(session: &dyn Session, shard: &str, query: &Query) -> Result<u64> {
    let conn = connection_for(session, Intent::Write, shard)?;
    execute_on(conn.as_ref(), query)
}

pub(crate) fn fetch_on(conn: &dyn Connection, query: &Query) -> Result<Vec<Row>> {
    let started = Instant::now();
    let rows = conn.query(&query.sql, &query.params).inspect_err(|err| {
        tracing::error!(sql = %query.sql, error = %err, "query failed");
    })?;
    tracing::debug!(
        sql = %query.sql,
        elapsed_ms = started.elapsed().as_millis(),
        rows = rows.len(),
        "query executed"
    );
    Ok(rows)
}

pub(crate) fn execute_on(conn: &dyn Connection, query: &Query) -> Result<u64> {
    let started = Instant::now();
    let affected = conn.exec(&query.sql, &query.params).inspect_err(|err| {
        tracing::error!(sql = %query.sql, error = %err, "statement failed");
    })?;
    tracing::debug!(
        sql = %query.sql,
        elapsed_ms = started.elapsed().as_millis(),
        rows = affected,
        "statement executed"
    );
    Ok(affected)
}

/// Runs `body` inside the session's transaction, opening (and committing
/// or rolling back) one when none is current.
pub(crate) fn transactional<R>(session: &dyn Session, body: impl FnOnce() -> Result<R>) -> Result<R> {
    if session.transaction().is_some() {
        return body();
    }

    let tx = session.begin()?;
    match body() {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback() {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
