//! # Provider connection abstraction
//!
//! SQL providers implement [`Connection`] (and [`Transaction`]) so the query
//! engine can execute compiled statements without knowing anything about the
//! physical database. Execution is synchronous: one blocking call per
//! statement.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;

/// A single value exchanged with a provider, either as a statement parameter
/// or as a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Boolean value.
    Boolean(Option<bool>),
    /// 32-bit signed integer.
    Int32(Option<i32>),
    /// 64-bit signed integer.
    Int64(Option<i64>),
    /// 32-bit unsigned integer.
    Uint32(Option<u32>),
    /// 64-bit unsigned integer.
    Uint64(Option<u64>),
    /// Single precision float.
    Float(Option<f32>),
    /// Double precision float.
    Double(Option<f64>),
    /// UTF-8 text.
    Str(Option<String>),
    /// Raw bytes.
    Binary(Option<Vec<u8>>),
    /// Date formatted as `%Y-%m-%d`.
    Date(Option<String>),
    /// Time formatted as `%H:%M:%S%.f`.
    Time(Option<String>),
    /// Timestamp, RFC 3339 or `%Y-%m-%d %H:%M:%S%.f`.
    Timestamp(Option<String>),
}

impl DataType {
    /// Returns true when the value is SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Boolean(None)
                | Self::Int32(None)
                | Self::Int64(None)
                | Self::Uint32(None)
                | Self::Uint64(None)
                | Self::Float(None)
                | Self::Double(None)
                | Self::Str(None)
                | Self::Binary(None)
                | Self::Date(None)
                | Self::Time(None)
                | Self::Timestamp(None)
        )
    }
}

/// A named column value within a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name as reported by the provider.
    pub name: String,
    /// Column value.
    pub value: DataType,
}

/// One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Columns in select-list order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Looks up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.value)
    }
}

/// A named statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Placeholder name exactly as it appears in the SQL text (`@p0`, `$1`).
    pub name: String,
    /// Bound value.
    pub value: DataType,
}

/// Whether a statement reads or writes. Sessions may route reads to a
/// replica and writes to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// `SELECT` statements.
    Read,
    /// `INSERT`, `UPDATE`, and `DELETE` statements.
    Write,
}

/// Providers implement [`Connection`] to execute SQL statements against a
/// backend (`SQLite`, Postgres, SQL Server, etc).
pub trait Connection: Debug + Send + Sync {
    /// Execute a query and return the resulting rows.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the statement fails.
    fn query(&self, sql: &str, params: &[Parameter]) -> Result<Vec<Row>>;

    /// Execute a statement that does not return rows (e.g., an `INSERT`,
    /// `UPDATE`, or `DELETE`) and return the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the statement fails.
    fn exec(&self, sql: &str, params: &[Parameter]) -> Result<u64>;
}

/// An open transaction on a session's connection.
pub trait Transaction: Debug + Send + Sync {
    /// The connection statements in this transaction run on.
    fn connection(&self) -> Arc<dyn Connection>;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the commit fails.
    fn commit(&self) -> Result<()>;

    /// Roll back the transaction.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the rollback fails.
    fn rollback(&self) -> Result<()>;
}
