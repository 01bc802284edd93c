//! # SQL dialects
//!
//! The compiler renders every fragment through a [`Dialect`]: parameter
//! names, identifier quoting, function names, and the final assembly of a
//! `SELECT` from its compiled parts. Three dialects are provided.

use std::fmt::{Debug, Write as _};

use crate::context::{Paging, UnionMode};
use crate::schema::DataTypeTag;

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Aggregate {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

/// Clock functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Local server time.
    Now,
    /// UTC server time.
    UtcNow,
    /// Current timestamp at the database's precision.
    Timestamp,
}

/// The compiled pieces of one `SELECT`, ready for assembly.
#[derive(Debug, Clone, Default)]
pub struct SelectParts {
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// Select list entries, aliases included.
    pub columns: Vec<String>,
    /// Rendered sources (`[User] t0`).
    pub from: Vec<String>,
    /// Rendered joins (`INNER JOIN [Order] t1 ON …`).
    pub joins: Vec<String>,
    /// `WHERE` condition.
    pub filter: Option<String>,
    /// `GROUP BY` keys.
    pub group_by: Vec<String>,
    /// `HAVING` condition.
    pub having: Option<String>,
    /// Union operands, rendered.
    pub unions: Vec<(UnionMode, String)>,
    /// `ORDER BY` keys with direction.
    pub order_by: Vec<String>,
    /// Paging.
    pub paging: Option<Paging>,
    /// Limit to one row.
    pub first_only: bool,
}

impl SelectParts {
    /// Rows to skip and rows to take once paging and the one-row limit are
    /// combined.
    #[must_use]
    pub fn window(&self) -> Option<(u64, u64)> {
        match (self.paging, self.first_only) {
            (Some(paging), first) => {
                Some((paging.offset, if first { paging.count.min(1) } else { paging.count }))
            }
            (None, true) => Some((0, 1)),
            (None, false) => None,
        }
    }
}

/// Hooks a database backend supplies to the shared compiler.
pub trait Dialect: Debug + Send + Sync {
    /// Name used in log events.
    fn name(&self) -> &'static str;

    /// Placeholder for the parameter at `index` (zero based).
    fn parameter_name(&self, index: usize) -> String {
        format!("@p{index}")
    }

    /// Opening and closing identifier quotes.
    fn quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quotes an identifier, doubling any embedded closing quote.
    fn quote(&self, ident: &str) -> String {
        let (open, close) = self.quotes();
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(open);
        for ch in ident.chars() {
            if ch == close {
                quoted.push(close);
            }
            quoted.push(ch);
        }
        quoted.push(close);
        quoted
    }

    /// Clause appended to every `LIKE` so the backslash escapes wildcards.
    fn like_escape(&self) -> &'static str {
        " ESCAPE '\\'"
    }

    /// Renders an aggregate call. `None` means all rows (`COUNT(*)`).
    fn aggregate(&self, func: Aggregate, arg: Option<&str>) -> String {
        let name = match func {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Max => "MAX",
            Aggregate::Min => "MIN",
            Aggregate::Avg => "AVG",
        };
        format!("{name}({})", arg.unwrap_or("*"))
    }

    /// Renders a clock function.
    fn clock(&self, func: Clock) -> String;

    /// Renders null-coalescing.
    fn coalesce(&self, value: &str, fallback: &str) -> String {
        format!("COALESCE({value}, {fallback})")
    }

    /// Column type used by `CAST`.
    fn type_name(&self, tag: DataTypeTag) -> &'static str;

    /// Renders a conversion.
    fn cast(&self, expr: &str, tag: DataTypeTag) -> String {
        format!("CAST({expr} AS {})", self.type_name(tag))
    }

    /// A condition that is constantly true or false.
    fn constant_condition(&self, value: bool) -> &'static str {
        if value { "1=1" } else { "1=0" }
    }

    /// Query returning the identity generated by the last insert.
    fn last_insert_id(&self) -> Option<&'static str>;

    /// Text placed between `SELECT [DISTINCT]` and the select list.
    fn top_clause(&self, _parts: &SelectParts) -> Option<String> {
        None
    }

    /// Text placed after `ORDER BY`.
    fn limit_clause(&self, parts: &SelectParts) -> Option<String> {
        let (offset, count) = parts.window()?;
        if offset == 0 {
            Some(format!("LIMIT {count}"))
        } else {
            Some(format!("LIMIT {count} OFFSET {offset}"))
        }
    }

    /// Assembles a complete `SELECT`.
    fn assemble(&self, parts: &SelectParts) -> String {
        let mut sql = String::from("SELECT ");
        if parts.distinct {
            sql.push_str("DISTINCT ");
        }
        if let Some(top) = self.top_clause(parts) {
            sql.push_str(&top);
            sql.push(' ');
        }
        sql.push_str(&parts.columns.join(", "));
        let _ = write!(sql, " FROM {}", parts.from.join(", "));
        for join in &parts.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if let Some(filter) = &parts.filter {
            let _ = write!(sql, " WHERE {filter}");
        }
        if !parts.group_by.is_empty() {
            let _ = write!(sql, " GROUP BY {}", parts.group_by.join(", "));
        }
        if let Some(having) = &parts.having {
            let _ = write!(sql, " HAVING {having}");
        }
        for (mode, operand) in &parts.unions {
            let keyword = match mode {
                UnionMode::Distinct => "UNION",
                UnionMode::All => "UNION ALL",
            };
            let _ = write!(sql, " {keyword} {operand}");
        }
        if !parts.order_by.is_empty() {
            let _ = write!(sql, " ORDER BY {}", parts.order_by.join(", "));
        }
        if let Some(limit) = self.limit_clause(parts) {
            sql.push(' ');
            sql.push_str(&limit);
        }
        sql
    }

    /// Renders an `INSERT` of one row.
    fn insert(&self, table: &str, columns: &[String], values: &[String]) -> String {
        let columns: Vec<_> = columns.iter().map(|column| self.quote(column)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            values.join(", ")
        )
    }

    /// Renders an `UPDATE`.
    fn update(&self, table: &str, assignments: &[(String, String)], filter: &str) -> String {
        let set: Vec<_> = assignments
            .iter()
            .map(|(column, value)| format!("{}={value}", self.quote(column)))
            .collect();
        format!("UPDATE {} SET {} WHERE {filter}", self.quote(table), set.join(", "))
    }

    /// Renders a `DELETE`.
    fn delete(&self, table: &str, filter: &str) -> String {
        format!("DELETE FROM {} WHERE {filter}", self.quote(table))
    }
}

/// Microsoft SQL Server.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn clock(&self, func: Clock) -> String {
        match func {
            Clock::Now => "GETDATE()",
            Clock::UtcNow => "GETUTCDATE()",
            Clock::Timestamp => "SYSDATETIME()",
        }
        .to_string()
    }

    fn coalesce(&self, value: &str, fallback: &str) -> String {
        format!("ISNULL({value}, {fallback})")
    }

    fn type_name(&self, tag: DataTypeTag) -> &'static str {
        match tag {
            DataTypeTag::Bool => "BIT",
            DataTypeTag::Int32 => "INT",
            DataTypeTag::Int64 => "BIGINT",
            DataTypeTag::Float => "REAL",
            DataTypeTag::Double => "FLOAT",
            DataTypeTag::Text | DataTypeTag::Json => "NVARCHAR(MAX)",
            DataTypeTag::Binary => "VARBINARY(MAX)",
            DataTypeTag::Date => "DATE",
            DataTypeTag::DateTime => "DATETIME2",
            DataTypeTag::Timestamp => "DATETIMEOFFSET",
        }
    }

    fn last_insert_id(&self) -> Option<&'static str> {
        Some("SELECT CAST(SCOPE_IDENTITY() AS BIGINT)")
    }

    fn top_clause(&self, parts: &SelectParts) -> Option<String> {
        (parts.first_only && parts.paging.is_none()).then(|| "TOP 1".to_string())
    }

    fn limit_clause(&self, parts: &SelectParts) -> Option<String> {
        parts.paging?;
        let (offset, count) = parts.window()?;
        let mut clause = String::new();
        if parts.order_by.is_empty() {
            // OFFSET/FETCH is only valid after an ORDER BY
            clause.push_str("ORDER BY (SELECT NULL) ");
        }
        let _ = write!(clause, "OFFSET {offset} ROWS FETCH NEXT {count} ROWS ONLY");
        Some(clause)
    }
}

/// `SQLite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn clock(&self, func: Clock) -> String {
        match func {
            Clock::Now => "datetime('now', 'localtime')",
            Clock::UtcNow => "datetime('now')",
            Clock::Timestamp => "CURRENT_TIMESTAMP",
        }
        .to_string()
    }

    fn coalesce(&self, value: &str, fallback: &str) -> String {
        format!("IFNULL({value}, {fallback})")
    }

    fn type_name(&self, tag: DataTypeTag) -> &'static str {
        match tag {
            DataTypeTag::Bool | DataTypeTag::Int32 | DataTypeTag::Int64 => "INTEGER",
            DataTypeTag::Float | DataTypeTag::Double => "REAL",
            DataTypeTag::Binary => "BLOB",
            DataTypeTag::Text
            | DataTypeTag::Json
            | DataTypeTag::Date
            | DataTypeTag::DateTime
            | DataTypeTag::Timestamp => "TEXT",
        }
    }

    fn last_insert_id(&self) -> Option<&'static str> {
        Some("SELECT last_insert_rowid()")
    }
}

/// `PostgreSQL`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn parameter_name(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn clock(&self, func: Clock) -> String {
        match func {
            Clock::Now => "LOCALTIMESTAMP",
            Clock::UtcNow => "(NOW() AT TIME ZONE 'UTC')",
            Clock::Timestamp => "CURRENT_TIMESTAMP",
        }
        .to_string()
    }

    fn type_name(&self, tag: DataTypeTag) -> &'static str {
        match tag {
            DataTypeTag::Bool => "BOOLEAN",
            DataTypeTag::Int32 => "INTEGER",
            DataTypeTag::Int64 => "BIGINT",
            DataTypeTag::Float => "REAL",
            DataTypeTag::Double => "DOUBLE PRECISION",
            DataTypeTag::Text => "TEXT",
            DataTypeTag::Binary => "BYTEA",
            DataTypeTag::Date => "DATE",
            DataTypeTag::DateTime => "TIMESTAMP",
            DataTypeTag::Timestamp => "TIMESTAMPTZ",
            DataTypeTag::Json => "JSONB",
        }
    }

    fn constant_condition(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn last_insert_id(&self) -> Option<&'static str> {
        Some("SELECT lastval()")
    }
}
