//! Common test helpers shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use quarry::{
    Connection, DataType, Dialect, Field, Intent, Parameter, Row, Session, SessionId, ShardStrategy,
    SqlServerDialect, Transaction, entity,
};
use serde::{Deserialize, Serialize};

// Common test entities used across multiple test files

entity! {
    table = "User",
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct User {
        pub id: i64 => "Id" [primary_key, identity],
        pub name: String => "Name",
        pub age: i32 => "Age",
    }
}

entity! {
    table = "Order",
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Order {
        pub id: i64 => "Id" [primary_key, identity],
        pub user_id: i64 => "UserId",
        pub total: f64 => "Total",
    }
}

/// One statement a [`RecordingSession`] was asked to run.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Parameter>,
    pub shard: String,
}

#[derive(Debug, Default)]
struct Log {
    statements: Vec<Statement>,
    results: VecDeque<Vec<Row>>,
    events: Vec<String>,
}

/// A session that runs nothing: it records every statement and answers
/// queries with rows queued by the test.
#[derive(Debug)]
pub struct RecordingSession {
    id: SessionId,
    dialect: Box<dyn Dialect>,
    strategy: Option<Box<dyn ShardStrategy>>,
    log: Arc<Mutex<Log>>,
    current: Arc<Mutex<Option<Arc<dyn Transaction>>>>,
}

impl RecordingSession {
    pub fn new() -> Arc<Self> {
        Self::with_dialect(SqlServerDialect)
    }

    pub fn with_dialect(dialect: impl Dialect + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::next(),
            dialect: Box::new(dialect),
            strategy: None,
            log: Arc::default(),
            current: Arc::default(),
        })
    }

    pub fn sharded(strategy: impl ShardStrategy + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::next(),
            dialect: Box::new(SqlServerDialect),
            strategy: Some(Box::new(strategy)),
            log: Arc::default(),
            current: Arc::default(),
        })
    }

    /// Queues the rows returned by the next query.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.log.lock().results.push_back(rows);
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().statements.clone()
    }

    pub fn last(&self) -> Statement {
        self.statements().pop().expect("no statement recorded")
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().events.clone()
    }

    fn recorder(&self, shard: &str) -> Arc<RecordingConnection> {
        Arc::new(RecordingConnection {
            log: Arc::clone(&self.log),
            shard: shard.to_string(),
        })
    }
}

impl Session for RecordingSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn shard_strategy(&self) -> &dyn ShardStrategy {
        self.strategy.as_deref().unwrap_or(&quarry::NoSharding)
    }

    fn connection(&self, intent: Intent, shard: &str) -> anyhow::Result<Arc<dyn Connection>> {
        self.log.lock().events.push(format!("connect {intent:?}"));
        Ok(self.recorder(shard))
    }

    fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.current.lock().clone()
    }

    fn begin(&self) -> anyhow::Result<Arc<dyn Transaction>> {
        let mut current = self.current.lock();
        if current.is_some() {
            anyhow::bail!("a transaction is already open");
        }
        self.log.lock().events.push("begin".to_string());
        let tx: Arc<dyn Transaction> = Arc::new(RecordingTransaction {
            conn: self.recorder(""),
            log: Arc::clone(&self.log),
            current: Arc::clone(&self.current),
        });
        *current = Some(Arc::clone(&tx));
        Ok(tx)
    }
}

/// Shares `session` as the trait object the query engine takes.
pub fn shared(session: &Arc<RecordingSession>) -> Arc<dyn Session> {
    Arc::clone(session) as Arc<dyn Session>
}

#[derive(Debug)]
struct RecordingConnection {
    log: Arc<Mutex<Log>>,
    shard: String,
}

impl RecordingConnection {
    fn record(&self, log: &mut Log, sql: &str, params: &[Parameter]) {
        log.statements.push(Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
            shard: self.shard.clone(),
        });
    }
}

impl Connection for RecordingConnection {
    fn query(&self, sql: &str, params: &[Parameter]) -> anyhow::Result<Vec<Row>> {
        let mut log = self.log.lock();
        self.record(&mut log, sql, params);
        Ok(log.results.pop_front().unwrap_or_default())
    }

    fn exec(&self, sql: &str, params: &[Parameter]) -> anyhow::Result<u64> {
        let mut log = self.log.lock();
        self.record(&mut log, sql, params);
        Ok(1)
    }
}

#[derive(Debug)]
struct RecordingTransaction {
    conn: Arc<RecordingConnection>,
    log: Arc<Mutex<Log>>,
    current: Arc<Mutex<Option<Arc<dyn Transaction>>>>,
}

impl Transaction for RecordingTransaction {
    fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.conn) as Arc<dyn Connection>
    }

    fn commit(&self) -> anyhow::Result<()> {
        self.log.lock().events.push("commit".to_string());
        self.current.lock().take();
        Ok(())
    }

    fn rollback(&self) -> anyhow::Result<()> {
        self.log.lock().events.push("rollback".to_string());
        self.current.lock().take();
        Ok(())
    }
}

/// Builds a result row from `(column, value)` pairs.
pub fn row(fields: &[(&str, DataType)]) -> Row {
    Row {
        fields: fields
            .iter()
            .map(|(name, value)| Field {
                name: (*name).to_string(),
                value: value.clone(),
            })
            .collect(),
    }
}

pub fn user_row(id: i64, name: &str, age: i32) -> Row {
    row(&[
        ("Id", DataType::Int64(Some(id))),
        ("Name", DataType::Str(Some(name.to_string()))),
        ("Age", DataType::Int32(Some(age))),
    ])
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' | '[' | ']' if !in_single_quote => {
                // Strip identifier quoting so tests read the same for every dialect.
            }
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
///
/// Identifier quotes are stripped and whitespace normalized on both sides,
/// then each fragment must appear after the previous one.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            use std::io::Write;
            let mut stderr = std::io::stderr();
            writeln!(stderr, "*** fragment-canonical: {fragment_canonical}").unwrap();
            writeln!(stderr, "*** actual-canonical-sql: {actual_canonical}").unwrap();
            stderr.flush().unwrap();

            panic!("expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`");
        }
    }
}
