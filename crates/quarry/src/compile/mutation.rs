//! `INSERT`, `UPDATE` and `DELETE` statements.
//!
//! Mutations never alias their table: conditions and assignments bind the
//! entity to bare column names. Each refuses to run without a filter or a
//! column list.

use std::sync::Arc;

use sea_query::Value;

use super::translate::{Binding, Condition, Scope, Translator};
use super::{Query, RowShape};
use crate::context::SessionId;
use crate::convert::values_to_parameters;
use crate::dialect::Dialect;
use crate::error::{Result, usage};
use crate::eval::Evaluator;
use crate::expr::{Expr, Lambda};
use crate::schema::EntitySchema;

/// `INSERT` of one row. `values` are `(property, value)` pairs; identity
/// columns are never written.
///
/// # Errors
///
/// Returns a usage error when no insertable column has a value.
pub fn compile_insert(
    dialect: &dyn Dialect, table: &str, schema: &EntitySchema, values: Vec<(String, Value)>,
) -> Result<Query> {
    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());

    for (property, value) in values {
        let Some(column) = schema.column(&property) else {
            return Err(usage!("`{property}` is not a mapped property of `{table}`"));
        };
        if column.identity {
            continue;
        }
        let name = dialect.parameter_name(params.len());
        params.push((name.clone(), value));
        columns.push(column.column.clone());
        placeholders.push(name);
    }
    if columns.is_empty() {
        return Err(usage!("insert into `{table}` has no columns"));
    }

    let sql = dialect.insert(table, &columns, &placeholders);
    let params = values_to_parameters(params)?;
    tracing::debug!(table, sql = %sql, param_count = params.len(), "insert generated SQL");
    Ok(Query { sql, params })
}

/// `UPDATE table SET ... WHERE ...`.
///
/// `set` is a record lambda (`Expr::New`) over the entity whose fields name
/// properties; each value goes through the expression compiler, so it may
/// reference the row's current columns. `filter` is a predicate over the
/// same row.
///
/// # Errors
///
/// Returns a usage error for an empty assignment list, an identity or
/// unmapped property, or a filter that matches every row.
pub fn compile_update(
    dialect: &dyn Dialect, evaluator: &dyn Evaluator, session: SessionId, table: &str,
    schema: &Arc<EntitySchema>, set: &Lambda, filter: &Lambda,
) -> Result<Query> {
    let Expr::New(fields) = &set.body else {
        return Err(usage!("update assignments must be a record of property values"));
    };
    if fields.is_empty() {
        return Err(usage!("update of `{table}` has no assignments"));
    }

    let mut translator = Translator::new(dialect, evaluator, session);
    let row = [unaliased(schema)];
    let scope = Scope::bind(&set.params, &row, None)?;

    let mut assignments = Vec::with_capacity(fields.len());
    for (property, expr) in fields {
        let Some(column) = schema.column(property) else {
            return Err(usage!("`{property}` is not a mapped property of `{table}`"));
        };
        if column.identity {
            return Err(usage!("identity column `{}` cannot be updated", column.column));
        }
        // literals fall back to a parameter
        let result = translator.translate(expr, &scope)?;
        let value = translator.value(result)?;
        assignments.push((column.column.clone(), value.text));
    }

    let filter = required_filter(&mut translator, table, &row, filter)?;
    let sql = dialect.update(table, &assignments, &filter);
    let params = values_to_parameters(translator.finish())?;
    tracing::debug!(table, sql = %sql, param_count = params.len(), "update generated SQL");
    Ok(Query { sql, params })
}

/// `DELETE FROM table WHERE ...`.
///
/// # Errors
///
/// Returns a usage error for a filter that matches every row.
pub fn compile_delete(
    dialect: &dyn Dialect, evaluator: &dyn Evaluator, session: SessionId, table: &str,
    schema: &Arc<EntitySchema>, filter: &Lambda,
) -> Result<Query> {
    let mut translator = Translator::new(dialect, evaluator, session);
    let row = [unaliased(schema)];
    let filter = required_filter(&mut translator, table, &row, filter)?;

    let sql = dialect.delete(table, &filter);
    let params = values_to_parameters(translator.finish())?;
    tracing::debug!(table, sql = %sql, param_count = params.len(), "delete generated SQL");
    Ok(Query { sql, params })
}

fn unaliased(schema: &Arc<EntitySchema>) -> Binding {
    Binding {
        alias: None,
        shape: RowShape::Entity(Arc::clone(schema)),
    }
}

fn required_filter(translator: &mut Translator<'_>, table: &str, row: &[Binding], filter: &Lambda) -> Result<String> {
    match translator.condition(filter, row, None)? {
        Condition::Always(true) => Err(usage!("refusing to modify every row of `{table}`; the filter is always true")),
        condition => Ok(translator.condition_text(&condition)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqlServerDialect;
    use crate::error::Error;
    use crate::eval::JsonEvaluator;
    use crate::expr::{lit, record};
    use crate::schema::{ColumnSchema, DataTypeTag};

    fn schema() -> Arc<EntitySchema> {
        let schema = EntitySchema::builder("User")
            .column(ColumnSchema::new("id", DataTypeTag::Int64).column_name("Id").primary_key().identity())
            .column(ColumnSchema::new("name", DataTypeTag::Text).column_name("Name"))
            .column(ColumnSchema::new("age", DataTypeTag::Int32).column_name("Age"))
            .build()
            .unwrap();
        Arc::new(schema)
    }

    #[test]
    fn insert_skips_identity() {
        let values = vec![
            ("id".to_string(), Value::from(7_i64)),
            ("name".to_string(), Value::from("Ann")),
            ("age".to_string(), Value::from(30)),
        ];
        let query = compile_insert(&SqlServerDialect, "User", &schema(), values).unwrap();
        assert_eq!(query.sql, "INSERT INTO [User] ([Name], [Age]) VALUES (@p0, @p1)");
        assert_eq!(query.params.len(), 2);
    }

    #[test]
    fn insert_needs_columns() {
        let values = vec![("id".to_string(), Value::from(7_i64))];
        let err = compile_insert(&SqlServerDialect, "User", &schema(), values).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn update_with_column_reference() {
        let set = Lambda::of1(|u| record([("age", u.col("age") + 1)]));
        let filter = Lambda::of1(|u| u.col("id").eq(7_i64));
        let query =
            compile_update(&SqlServerDialect, &JsonEvaluator, SessionId::next(), "User", &schema(), &set, &filter)
                .unwrap();
        assert_eq!(query.sql, "UPDATE [User] SET [Age]=[Age]+@p0 WHERE [Id]=@p1");
        assert_eq!(query.params.len(), 2);
    }

    #[test]
    fn update_requires_filter() {
        let set = Lambda::of1(|_| record([("name", lit("x"))]));
        let filter = Lambda::of1(|_| lit(true));
        let err =
            compile_update(&SqlServerDialect, &JsonEvaluator, SessionId::next(), "User", &schema(), &set, &filter)
                .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn update_rejects_identity() {
        let set = Lambda::of1(|_| record([("id", lit(1_i64))]));
        let filter = Lambda::of1(|u| u.col("id").eq(7_i64));
        let err =
            compile_update(&SqlServerDialect, &JsonEvaluator, SessionId::next(), "User", &schema(), &set, &filter)
                .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn delete_renders_bare_columns() {
        let filter = Lambda::of1(|u| u.col("name").contains("o").and(u.col("age").lt(30)));
        let query =
            compile_delete(&SqlServerDialect, &JsonEvaluator, SessionId::next(), "User", &schema(), &filter).unwrap();
        assert_eq!(query.sql, "DELETE FROM [User] WHERE [Name] LIKE @p0 ESCAPE '\\' AND [Age]<@p1");
    }

    #[test]
    fn delete_with_false_filter_is_allowed() {
        let filter = Lambda::of1(|_| lit(false));
        let query =
            compile_delete(&SqlServerDialect, &JsonEvaluator, SessionId::next(), "User", &schema(), &filter).unwrap();
        assert_eq!(query.sql, "DELETE FROM [User] WHERE 1=0");
    }
}
