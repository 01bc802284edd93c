//! Statement-level compilation: a [`QueryContext`] becomes [`SelectParts`].

use std::sync::Arc;

use super::RowShape;
use super::translate::{Binding, Condition, Scope, Translator};
use crate::context::{JoinMode, QueryContext, TableInfo};
use crate::dialect::{Aggregate, SelectParts};
use crate::error::{Result, translation};
use crate::expr::{Expr, Lambda, Method};

impl Translator<'_> {
    /// Compiles every clause of `ctx`. Aliases continue from the enclosing
    /// statement so nested queries never reuse one.
    pub fn select_parts(&mut self, ctx: &QueryContext, parent: Option<&Scope<'_>>) -> Result<(SelectParts, RowShape)> {
        self.clauses(ctx, parent, true)
    }

    /// `SELECT COUNT(*)` over `ctx`. Grouped, distinct, paged and union
    /// queries are counted as a derived table.
    pub fn count_parts(&mut self, ctx: &QueryContext) -> Result<SelectParts> {
        let count = self.dialect.aggregate(Aggregate::Count, None);
        let simple = ctx.group_by().is_none()
            && !ctx.is_distinct()
            && ctx.unions().is_empty()
            && ctx.paging().is_none()
            && !ctx.is_first_only();

        if simple {
            let (mut parts, _) = self.clauses(&ctx.unordered(), None, false)?;
            parts.columns = vec![count];
            return Ok(parts);
        }

        let inner = if ctx.paging().is_some() || ctx.is_first_only() { ctx.clone() } else { ctx.unordered() };
        let (parts, _) = self.select_parts(&inner, None)?;
        let alias = self.alias();
        Ok(SelectParts {
            columns: vec![count],
            from: vec![format!("({}) {alias}", self.dialect.assemble(&parts))],
            ..SelectParts::default()
        })
    }

    fn clauses(&mut self, ctx: &QueryContext, parent: Option<&Scope<'_>>, project: bool) -> Result<(SelectParts, RowShape)> {
        ctx.check()?;
        if ctx.from().is_empty() {
            return Err(translation!("query has no source"));
        }
        let mut parts = SelectParts {
            distinct: ctx.is_distinct(),
            paging: ctx.paging(),
            first_only: ctx.is_first_only(),
            ..SelectParts::default()
        };

        let mut sources = Vec::with_capacity(ctx.from().len() + ctx.joins().len());
        for table in ctx.from() {
            let alias = self.alias();
            let (sql, shape) = self.source(table)?;
            parts.from.push(format!("{sql} {alias}"));
            sources.push(Binding { alias: Some(alias), shape });
        }

        for join in ctx.joins() {
            let alias = self.alias();
            let (sql, shape) = self.source(&join.table)?;
            sources.push(Binding {
                alias: Some(alias.clone()),
                shape,
            });
            let on = self.condition(&join.on, &sources, parent)?;
            let keyword = match join.mode {
                JoinMode::Inner => "INNER JOIN",
                JoinMode::Left => "LEFT JOIN",
            };
            parts.joins.push(format!("{keyword} {sql} {alias} ON {}", self.condition_text(&on)));
        }

        let mut conditions = Vec::with_capacity(ctx.wheres().len());
        for predicate in ctx.wheres() {
            conditions.push(self.condition(predicate, &sources, parent)?);
        }
        parts.filter = self.clause_text(self.conjoin(conditions));

        if let Some(keys) = ctx.group_by() {
            parts.group_by = self.keys(keys, &sources, parent)?;
        }
        if let Some(having) = ctx.having() {
            let condition = self.condition(having, &sources, parent)?;
            parts.having = self.clause_text(condition);
        }

        let shape = if project {
            let (columns, shape) = self.projection(ctx.select(), &sources, parent)?;
            parts.columns = columns;
            shape
        } else {
            RowShape::Scalar("Count".to_string(), None)
        };

        for union in ctx.unions() {
            self.check_session(&union.context)?;
            // ordering inside an operand only survives as a derived table
            let operand = if union.context.is_ordered() { union.context.wrap() } else { (*union.context).clone() };
            let (operand, _) = self.select_parts(&operand, None)?;
            parts.unions.push((union.mode, self.dialect.assemble(&operand)));
        }

        // after a union, order keys name result columns rather than sources
        let order_sources = if ctx.unions().is_empty() {
            sources
        } else {
            vec![Binding {
                alias: None,
                shape: shape.clone(),
            }]
        };
        for keys in ctx.order_by() {
            let ordered = self.order_keys(keys, &order_sources, parent)?;
            parts.order_by.extend(ordered);
        }

        Ok((parts, shape))
    }

    fn clause_text(&self, condition: Condition) -> Option<String> {
        match condition {
            Condition::Always(true) => None,
            other => Some(self.condition_text(&other)),
        }
    }

    fn source(&mut self, table: &TableInfo) -> Result<(String, RowShape)> {
        match table {
            TableInfo::Table { name, schema } => Ok((self.dialect.quote(name), RowShape::Entity(Arc::clone(schema)))),
            TableInfo::Subquery(inner) => {
                self.check_session(inner)?;
                let (parts, shape) = self.select_parts(inner, None)?;
                Ok((format!("({})", self.dialect.assemble(&parts)), shape))
            }
        }
    }

    fn projection(
        &mut self, select: Option<&Lambda>, sources: &[Binding], parent: Option<&Scope<'_>>,
    ) -> Result<(Vec<String>, RowShape)> {
        let Some(lambda) = select else {
            return Ok(self.whole_row(&sources[0]));
        };
        let scope = Scope::bind(&lambda.params, sources, parent)?;

        match &lambda.body {
            Expr::New(fields) => {
                let mut columns = Vec::with_capacity(fields.len());
                let mut shape = Vec::with_capacity(fields.len());
                for (name, expr) in fields {
                    if matches!(expr, Expr::Param(_) | Expr::New(_)) {
                        return Err(translation!("field `{name}` is a nested row; projections are flat"));
                    }
                    let result = self.translate(expr, &scope)?;
                    let fragment = self.value(result)?;
                    columns.push(format!("{} AS {}", fragment.text, self.dialect.quote(name)));
                    shape.push((name.clone(), fragment.tag));
                }
                Ok((columns, RowShape::Record(shape)))
            }
            Expr::Param(param) => {
                let index = lambda.params.iter().position(|p| p == param);
                match index.and_then(|index| sources.get(index)) {
                    Some(binding) => Ok(self.whole_row(binding)),
                    None => Err(translation!("projected row is not a source of this query")),
                }
            }
            body => {
                let result = self.translate(body, &scope)?;
                let fragment = self.value(result)?;
                match fragment.column {
                    Some(column) => Ok((vec![fragment.text], RowShape::Scalar(column, fragment.tag))),
                    None => {
                        let column = format!("{} AS {}", fragment.text, self.dialect.quote("Value"));
                        Ok((vec![column], RowShape::Scalar("Value".to_string(), fragment.tag)))
                    }
                }
            }
        }
    }

    fn whole_row(&self, binding: &Binding) -> (Vec<String>, RowShape) {
        let alias = binding.alias.as_deref();
        let columns = match &binding.shape {
            RowShape::Entity(schema) => {
                schema.columns().iter().map(|column| self.qualify(alias, &column.column)).collect()
            }
            RowShape::Record(fields) => fields.iter().map(|(name, _)| self.qualify(alias, name)).collect(),
            RowShape::Scalar(name, _) => vec![self.qualify(alias, name)],
        };
        (columns, binding.shape.clone())
    }

    fn keys(&mut self, lambda: &Lambda, sources: &[Binding], parent: Option<&Scope<'_>>) -> Result<Vec<String>> {
        let scope = Scope::bind(&lambda.params, sources, parent)?;
        let items: Vec<&Expr> = match &lambda.body {
            Expr::New(fields) => fields.iter().map(|(_, expr)| expr).collect(),
            Expr::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let result = self.translate(item, &scope)?;
            if !result.contains_sql() {
                return Err(translation!("group-by key {item:?} does not reference a column"));
            }
            keys.push(self.value(result)?.text);
        }
        Ok(keys)
    }

    fn order_keys(&mut self, lambda: &Lambda, sources: &[Binding], parent: Option<&Scope<'_>>) -> Result<Vec<String>> {
        let scope = Scope::bind(&lambda.params, sources, parent)?;
        let items: Vec<&Expr> = match &lambda.body {
            Expr::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let Expr::Call {
                method: method @ (Method::Asc | Method::Desc),
                target: None,
                args,
            } = item
            else {
                return Err(translation!("order-by keys must be wrapped in asc() or desc()"));
            };
            let [key] = args.as_slice() else {
                return Err(translation!("an order-by marker takes one key"));
            };
            let result = self.translate(key, &scope)?;
            if !result.contains_sql() {
                return Err(translation!("order-by key {key:?} does not reference a column"));
            }
            let fragment = self.value(result)?;
            let direction = if *method == Method::Asc { "ASC" } else { "DESC" };
            keys.push(format!("{} {direction}", fragment.text));
        }
        Ok(keys)
    }
}
