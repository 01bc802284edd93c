//! Default `SQLite` session.
//!
//! Every statement runs on one embedded connection. Parameters are bound by
//! name, so the `@pN` placeholders the compiler emits are used as they are.

#![allow(clippy::significant_drop_tightening)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use fromenv::FromEnv;
use parking_lot::Mutex;
use quarry::{
    Connection, Dialect, Field, Intent, NoSharding, Parameter, Row, Session, SessionId, ShardStrategy,
    SqliteDialect, Transaction,
};
use rusqlite::ToSql;
use rusqlite::types::Value;
use tracing::instrument;

use crate::convert::{from_sqlite, to_sqlite};

/// Options used to open the database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database file, or `:memory:`.
    #[env(from = "SQL_DATABASE", default = ":memory:")]
    pub database: String,

    /// Statements taking longer than this many milliseconds are logged at
    /// `warn`.
    #[env(from = "SQL_SLOW_QUERY_MS", default = "500")]
    pub slow_query_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
            slow_query_ms: 500,
        }
    }
}

#[derive(Debug)]
struct Database {
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Mutex<rusqlite::Connection>,
    slow_query: Duration,
    in_transaction: AtomicBool,
}

impl Database {
    fn batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql).with_context(|| format!("failed to execute `{sql}`"))
    }

    fn observe(&self, sql: &str, started: Instant, rows: usize) {
        let elapsed = started.elapsed();
        if elapsed >= self.slow_query {
            tracing::warn!(sql, elapsed_ms = elapsed.as_millis(), rows, "slow statement");
        } else {
            tracing::trace!(sql, elapsed_ms = elapsed.as_millis(), rows, "sqlite statement");
        }
    }
}

/// A [`Session`] over an embedded `SQLite` database.
#[derive(Debug)]
pub struct SqliteSession {
    id: SessionId,
    db: Arc<Database>,
    strategy: Box<dyn ShardStrategy>,
}

impl SqliteSession {
    /// Opens the database named by the environment (see
    /// [`ConnectOptions`]).
    ///
    /// # Errors
    ///
    /// Returns an error when the options cannot be loaded or the database
    /// cannot be opened.
    #[instrument]
    pub fn connect() -> Result<Self> {
        let options = ConnectOptions::from_env().finalize().context("issue loading connection options")?;
        Self::connect_with(options)
    }

    /// Opens the database described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened.
    #[instrument]
    pub fn connect_with(options: ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn = rusqlite::Connection::open(&options.database).context("failed to open SQLite database")?;
        Ok(Self {
            id: SessionId::next(),
            db: Arc::new(Database {
                conn: Mutex::new(conn),
                slow_query: Duration::from_millis(options.slow_query_ms),
                in_transaction: AtomicBool::new(false),
            }),
            strategy: Box::new(NoSharding),
        })
    }

    /// Routes tables through `strategy`. Connection shards all resolve to
    /// this one database; table suffixes apply as usual.
    #[must_use]
    pub fn with_shard_strategy(mut self, strategy: impl ShardStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Runs one or more `;`-separated statements without parameters, such
    /// as schema setup.
    ///
    /// # Errors
    ///
    /// Returns the `SQLite` error.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.db.batch(sql)
    }
}

impl Session for SqliteSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn shard_strategy(&self) -> &dyn ShardStrategy {
        self.strategy.as_ref()
    }

    fn connection(&self, intent: Intent, shard: &str) -> Result<Arc<dyn Connection>> {
        tracing::trace!(?intent, shard, "opening SQLite connection");
        Ok(Arc::new(SqliteConnection {
            db: Arc::clone(&self.db),
        }))
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.db.in_transaction.load(Ordering::Acquire).then(|| {
            Arc::new(SqliteTransaction {
                db: Arc::clone(&self.db),
            }) as Arc<dyn Transaction>
        })
    }

    fn begin(&self) -> Result<Arc<dyn Transaction>> {
        if self.db.in_transaction.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            bail!("a transaction is already open on this session");
        }
        if let Err(err) = self.db.batch("BEGIN") {
            self.db.in_transaction.store(false, Ordering::Release);
            return Err(err);
        }
        tracing::debug!("transaction started");
        Ok(Arc::new(SqliteTransaction {
            db: Arc::clone(&self.db),
        }))
    }
}

#[derive(Debug)]
struct SqliteConnection {
    db: Arc<Database>,
}

fn bind(params: &[Parameter]) -> Vec<(&str, Value)> {
    params.iter().map(|param| (param.name.as_str(), to_sqlite(&param.value))).collect()
}

fn named<'a>(values: &'a [(&'a str, Value)]) -> Vec<(&'a str, &'a dyn ToSql)> {
    values.iter().map(|(name, value)| (*name, value as &dyn ToSql)).collect()
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Parameter]) -> Result<Vec<Row>> {
        let started = Instant::now();
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;

        let values = bind(params);
        let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let mut rows = stmt.query(named(&values).as_slice()).context("failed to execute query")?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().context("failed to fetch row")? {
            let mut fields = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let value = row.get_ref(i).context("failed to get column value")?;
                fields.push(Field {
                    name: name.clone(),
                    value: from_sqlite(value)?,
                });
            }
            result.push(Row { fields });
        }

        self.db.observe(sql, started, result.len());
        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Parameter]) -> Result<u64> {
        let started = Instant::now();
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;

        let values = bind(params);
        let affected = stmt.execute(named(&values).as_slice()).context("failed to execute statement")?;

        self.db.observe(sql, started, affected);
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }
}

#[derive(Debug)]
struct SqliteTransaction {
    db: Arc<Database>,
}

impl SqliteTransaction {
    fn finish(&self, sql: &str) -> Result<()> {
        if !self.db.in_transaction.swap(false, Ordering::AcqRel) {
            bail!("no transaction is open");
        }
        self.db.batch(sql)?;
        tracing::debug!(statement = sql, "transaction finished");
        Ok(())
    }
}

impl Transaction for SqliteTransaction {
    fn connection(&self) -> Arc<dyn Connection> {
        Arc::new(SqliteConnection {
            db: Arc::clone(&self.db),
        })
    }

    fn commit(&self) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

#[cfg(test)]
mod tests {
    use quarry::DataType;

    use super::*;

    #[test]
    fn sqlite_operations() {
        let session = SqliteSession::connect_with(ConnectOptions::default()).expect("connect");
        let conn = session.connection(Intent::Write, "").expect("open connection");

        let rows_affected = conn
            .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", &[])
            .expect("create table");
        assert_eq!(rows_affected, 0);

        for (name, age) in [("Alice", 30), ("Bob", 25)] {
            let params = [
                Parameter {
                    name: "@p0".to_string(),
                    value: DataType::Str(Some(name.to_string())),
                },
                Parameter {
                    name: "@p1".to_string(),
                    value: DataType::Int32(Some(age)),
                },
            ];
            let rows_affected =
                conn.exec("INSERT INTO users (name, age) VALUES (@p0, @p1)", &params).expect("insert");
            assert_eq!(rows_affected, 1);
        }

        let rows = conn.query("SELECT id, name, age FROM users ORDER BY name", &[]).expect("query");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields[1].name, "name");
        assert_eq!(rows[0].get("name"), Some(&DataType::Str(Some("Alice".to_string()))));
        assert_eq!(rows[1].get("age"), Some(&DataType::Int64(Some(25))));
    }

    #[test]
    fn transactions_commit_and_roll_back() {
        let session = SqliteSession::connect_with(ConnectOptions::default()).expect("connect");
        session.execute_batch("CREATE TABLE t (x INTEGER)").expect("create table");

        let tx = session.begin().expect("begin");
        assert!(session.transaction().is_some());
        let err = session.begin().unwrap_err();
        assert!(err.to_string().contains("already open"));

        tx.connection().exec("INSERT INTO t (x) VALUES (1)", &[]).expect("insert");
        tx.rollback().expect("rollback");
        assert!(session.transaction().is_none());

        let tx = session.begin().expect("begin");
        tx.connection().exec("INSERT INTO t (x) VALUES (2)", &[]).expect("insert");
        tx.commit().expect("commit");

        let conn = session.connection(Intent::Read, "").expect("open connection");
        let rows = conn.query("SELECT x FROM t", &[]).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields[0].value, DataType::Int64(Some(2)));
    }
}
