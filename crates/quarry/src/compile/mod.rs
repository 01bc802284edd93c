//! # Statement compilation
//!
//! Turns a [`QueryContext`] (or a mutation request) into SQL text plus an
//! ordered parameter list. Table aliases (`t0`, `t1`, ...) are assigned per
//! statement in the order sources appear, outer query first, so a nested
//! query never shadows an alias of the statement it is embedded in.

mod like;
mod mutation;
mod statement;
mod translate;

use std::sync::Arc;

pub use mutation::{compile_delete, compile_insert, compile_update};
use translate::Translator;

use crate::connection::Parameter;
use crate::context::{QueryContext, TableInfo};
use crate::convert::values_to_parameters;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::schema::{DataTypeTag, EntitySchema};

/// A compiled statement.
#[derive(Debug, Clone)]
pub struct Query {
    /// SQL text with named placeholders.
    pub sql: String,
    /// Placeholder values, in placeholder order.
    pub params: Vec<Parameter>,
}

/// Shape of one result row.
#[derive(Debug, Clone)]
pub enum RowShape {
    /// Every mapped column of an entity.
    Entity(Arc<EntitySchema>),
    /// Named, individually typed columns of an anonymous projection.
    Record(Vec<(String, Option<DataTypeTag>)>),
    /// A single column.
    Scalar(String, Option<DataTypeTag>),
}

impl RowShape {
    /// Column names in select-list order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Entity(schema) => schema.columns().iter().map(|column| column.column.as_str()).collect(),
            Self::Record(fields) => fields.iter().map(|(name, _)| name.as_str()).collect(),
            Self::Scalar(name, _) => vec![name.as_str()],
        }
    }
}

/// Compiles a query to `SELECT` text and reports the shape of its rows.
///
/// # Errors
///
/// Returns a translation error for expressions outside the supported node
/// kinds, or a usage error when sources from different sessions are mixed.
pub fn compile_select(
    dialect: &dyn Dialect, evaluator: &dyn Evaluator, ctx: &QueryContext,
) -> Result<(Query, RowShape)> {
    let mut translator = Translator::new(dialect, evaluator, ctx.session());
    let (parts, shape) = translator.select_parts(ctx, None)?;
    let sql = dialect.assemble(&parts);
    let params = values_to_parameters(translator.finish())?;

    tracing::debug!(table = root_table(ctx), sql = %sql, param_count = params.len(), "select generated SQL");
    Ok((Query { sql, params }, shape))
}

/// Compiles `SELECT COUNT(*)` over a query.
///
/// # Errors
///
/// As for [`compile_select`].
pub fn compile_count(dialect: &dyn Dialect, evaluator: &dyn Evaluator, ctx: &QueryContext) -> Result<Query> {
    let mut translator = Translator::new(dialect, evaluator, ctx.session());
    let parts = translator.count_parts(ctx)?;
    let sql = dialect.assemble(&parts);
    let params = values_to_parameters(translator.finish())?;

    tracing::debug!(table = root_table(ctx), sql = %sql, param_count = params.len(), "count generated SQL");
    Ok(Query { sql, params })
}

fn root_table(ctx: &QueryContext) -> &str {
    match ctx.from().first() {
        Some(TableInfo::Table { name, .. }) => name,
        Some(TableInfo::Subquery(inner)) => root_table(inner),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Action, SessionId};
    use crate::dialect::{SqlServerDialect, SqliteDialect};
    use crate::eval::JsonEvaluator;
    use crate::expr::{Lambda, asc, desc, lit, null};
    use crate::schema::ColumnSchema;

    fn users() -> TableInfo {
        let schema = EntitySchema::builder("User")
            .column(ColumnSchema::new("id", DataTypeTag::Int64).column_name("Id").primary_key().identity())
            .column(ColumnSchema::new("name", DataTypeTag::Text).column_name("Name"))
            .column(ColumnSchema::new("age", DataTypeTag::Int32).column_name("Age"))
            .build()
            .unwrap();
        TableInfo::Table {
            name: "User".to_string(),
            schema: Arc::new(schema),
        }
    }

    fn select(ctx: &QueryContext) -> Query {
        compile_select(&SqlServerDialect, &JsonEvaluator, ctx).unwrap().0
    }

    #[test]
    fn filter_order_project() {
        let session = SessionId::next();
        let mut ctx = QueryContext::from_table(session, users());

        ctx = ctx.snapshot(Action::Where).unwrap();
        ctx.add_where(Lambda::of1(|u| u.col("age").gt(18))).unwrap();
        ctx = ctx.snapshot(Action::OrderBy).unwrap();
        ctx.add_order_by(Lambda::of1(|u| desc(u.col("age")))).unwrap();
        ctx = ctx.snapshot(Action::Select).unwrap();
        ctx.set_select(Lambda::of1(|u| u.col("name"))).unwrap();

        let query = select(&ctx);
        assert_eq!(query.sql, "SELECT t0.[Name] FROM [User] t0 WHERE t0.[Age]>@p0 ORDER BY t0.[Age] DESC");
        assert_eq!(query.params.len(), 1);
        assert_eq!(query.params[0].name, "@p0");
    }

    #[test]
    fn null_comparison_has_no_parameter() {
        let mut ctx = QueryContext::from_table(SessionId::next(), users()).snapshot(Action::Where).unwrap();
        ctx.add_where(Lambda::of1(|u| u.col("name").eq(null()))).unwrap();

        let query = select(&ctx);
        assert!(query.sql.ends_with("WHERE t0.[Name] IS NULL"), "{}", query.sql);
        assert!(query.params.is_empty());
    }

    #[test]
    fn constant_filter_folds() {
        let mut ctx = QueryContext::from_table(SessionId::next(), users()).snapshot(Action::Where).unwrap();
        ctx.add_where(Lambda::of1(|_| (lit(2) + 3).eq(5))).unwrap();
        let query = select(&ctx);
        assert!(!query.sql.contains("WHERE"), "{}", query.sql);
        assert!(query.params.is_empty());

        let mut ctx = QueryContext::from_table(SessionId::next(), users()).snapshot(Action::Where).unwrap();
        ctx.add_where(Lambda::of1(|_| lit(1).gt(2))).unwrap();
        let query = select(&ctx);
        assert!(query.sql.ends_with("WHERE 1=0"), "{}", query.sql);
        assert!(query.params.is_empty());
    }

    #[test]
    fn filter_after_ordering_nests() {
        let mut ctx = QueryContext::from_table(SessionId::next(), users()).snapshot(Action::OrderBy).unwrap();
        ctx.add_order_by(Lambda::of1(|u| asc(u.col("age")))).unwrap();
        ctx = ctx.snapshot(Action::Where).unwrap();
        ctx.add_where(Lambda::of1(|u| u.col("name").starts_with("A"))).unwrap();

        let query = compile_select(&SqliteDialect, &JsonEvaluator, &ctx).unwrap().0;
        assert_eq!(
            query.sql,
            "SELECT t0.\"Id\", t0.\"Name\", t0.\"Age\" FROM (SELECT t1.\"Id\", t1.\"Name\", t1.\"Age\" \
             FROM \"User\" t1 ORDER BY t1.\"Age\" ASC) t0 WHERE t0.\"Name\" LIKE @p0 ESCAPE '\\'"
        );
    }

    #[test]
    fn count_ignores_ordering_and_projection() {
        let mut ctx = QueryContext::from_table(SessionId::next(), users()).snapshot(Action::Where).unwrap();
        ctx.add_where(Lambda::of1(|u| u.col("age").ge(21))).unwrap();
        ctx = ctx.snapshot(Action::OrderBy).unwrap();
        ctx.add_order_by(Lambda::of1(|u| asc(u.col("name")))).unwrap();

        let query = compile_count(&SqlServerDialect, &JsonEvaluator, &ctx).unwrap();
        assert_eq!(query.sql, "SELECT COUNT(*) FROM [User] t0 WHERE t0.[Age]>=@p0");
    }

    #[test]
    fn distinct_count_wraps() {
        let mut ctx = QueryContext::from_table(SessionId::next(), users()).snapshot(Action::Select).unwrap();
        ctx.set_select(Lambda::of1(|u| u.col("age"))).unwrap();
        ctx = ctx.snapshot(Action::Distinct).unwrap();
        ctx.set_distinct().unwrap();

        let query = compile_count(&SqlServerDialect, &JsonEvaluator, &ctx).unwrap();
        assert_eq!(query.sql, "SELECT COUNT(*) FROM (SELECT DISTINCT t0.[Age] FROM [User] t0) t1");
    }
}
