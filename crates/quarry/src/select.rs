//! # Query sets
//!
//! A [`QuerySet`] is a frozen, typed handle over one [`QueryContext`]. Every
//! builder call snapshots the context for the clause it adds and returns a
//! new handle; the receiver is never modified, so a query set can be cloned
//! and extended in several directions.
//!
//! The stage parameter mirrors the clause state machine at the type level:
//! only a [`Sorted`] query exposes paging, only a [`Grouped`] one exposes
//! `having`. Calls that SQL would not accept in sequence (filtering a
//! projection, sorting a union operand) compile to a derived table.
//!
//! ```ignore
//! let names: Vec<String> = users
//!     .query()
//!     .filter(|u| u.col("age").gt(18))
//!     .order_by_desc(|u| u.col("age"))
//!     .select(|u| u.col("name"))
//!     .to_list()?;
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::compile::{Query, RowShape, compile_count, compile_select};
use crate::context::{Action, JoinMode, JoinTarget, Paging, QueryContext, TableInfo, UnionMode, UnionTarget};
use crate::error::{Result, usage};
use crate::expr::{Expr, IntoExpr, Lambda, Method, Param, asc, desc};
use crate::join::Join2;
use crate::materialize::{Materializer, materialize};
use crate::schema::DataTypeTag;
use crate::session::{Session, fetch};

/// Stage: a root query or one with filters.
#[derive(Debug, Clone, Copy)]
pub struct Filtered;

/// Stage: ordered.
#[derive(Debug, Clone, Copy)]
pub struct Sorted;

/// Stage: ordered and paged.
#[derive(Debug, Clone, Copy)]
pub struct Paged;

/// Stage: grouped.
#[derive(Debug, Clone, Copy)]
pub struct Grouped;

/// Stage: grouped with a `HAVING` filter.
#[derive(Debug, Clone, Copy)]
pub struct Having;

/// Stage: projected, distinct or combined by a union.
#[derive(Debug, Clone, Copy)]
pub struct Projected;

/// Stage: joined, before any other clause.
#[derive(Debug, Clone, Copy)]
pub struct Joined;

/// The untyped engine behind every query-set and join type: a session, a
/// context and the connection shard it executes on.
#[derive(Clone)]
pub struct QueryCore {
    session: Arc<dyn Session>,
    ctx: QueryContext,
    shard: String,
}

impl fmt::Debug for QueryCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCore")
            .field("session", &self.ctx.session())
            .field("state", &self.ctx.state())
            .field("shard", &self.shard)
            .finish_non_exhaustive()
    }
}

impl QueryCore {
    pub(crate) const fn new(session: Arc<dyn Session>, ctx: QueryContext, shard: String) -> Self {
        Self { session, ctx, shard }
    }

    /// The clauses collected so far.
    #[must_use]
    pub const fn context(&self) -> &QueryContext {
        &self.ctx
    }

    /// Snapshots for `next` and applies `clause`. A refused transition is
    /// recorded on the context and reported when it is compiled.
    pub(crate) fn apply(&self, next: Action, clause: impl FnOnce(&mut QueryContext) -> Result<()>) -> Self {
        let applied = self.ctx.snapshot(next).and_then(|mut ctx| clause(&mut ctx).map(|()| ctx));
        let ctx = match applied {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::debug!(error = %err, "clause refused");
                self.ctx.faulted(err)
            }
        };
        Self {
            session: Arc::clone(&self.session),
            ctx,
            shard: self.shard.clone(),
        }
    }

    pub(crate) fn filter(&self, predicate: Lambda) -> Self {
        self.apply(Action::Where, |ctx| ctx.add_where(predicate))
    }

    pub(crate) fn order(&self, keys: Lambda) -> Self {
        self.apply(Action::OrderBy, |ctx| ctx.add_order_by(keys))
    }

    pub(crate) fn group(&self, keys: Lambda) -> Self {
        self.apply(Action::GroupBy, |ctx| ctx.set_group_by(keys))
    }

    pub(crate) fn having(&self, predicate: Lambda) -> Self {
        self.apply(Action::Having, |ctx| ctx.set_having(predicate))
    }

    pub(crate) fn paging(&self, offset: u64, count: u64) -> Self {
        self.apply(Action::Paging, |ctx| ctx.set_paging(Paging { offset, count }))
    }

    pub(crate) fn select(&self, projection: Lambda) -> Self {
        self.apply(Action::Select, |ctx| ctx.set_select(projection))
    }

    pub(crate) fn distinct(&self) -> Self {
        self.apply(Action::Distinct, QueryContext::set_distinct)
    }

    /// Joins `other` as the next source.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub(crate) fn join(&self, other: &Self, mode: JoinMode, on: Lambda) -> Result<Self> {
        self.same_session(other)?;
        let table = other.source();
        Ok(self.apply(Action::Join, |ctx| ctx.add_join(JoinTarget { mode, table, on })))
    }

    pub(crate) fn union(&self, other: &Self, mode: UnionMode) -> Result<Self> {
        self.same_session(other)?;
        let context = Arc::new(other.ctx.clone());
        Ok(self.apply(Action::Union, |ctx| ctx.add_union(UnionTarget { mode, context })))
    }

    fn same_session(&self, other: &Self) -> Result<()> {
        if self.ctx.session() == other.ctx.session() {
            Ok(())
        } else {
            Err(usage!("query sets from different sessions cannot be combined"))
        }
    }

    /// This query as a source of another: the base table itself when no
    /// clause has been applied, otherwise a derived table.
    fn source(&self) -> TableInfo {
        match self.ctx.from() {
            [table @ TableInfo::Table { .. }] if self.ctx.state() == Action::From => table.clone(),
            _ => TableInfo::Subquery(Arc::new(self.ctx.clone())),
        }
    }

    fn nested(&self) -> Box<Expr> {
        Box::new(Expr::Query(Arc::new(self.ctx.clone())))
    }

    /// `EXISTS (<this query>)`.
    pub(crate) fn exists(&self) -> Expr {
        Expr::Call {
            method: Method::Exists,
            target: Some(self.nested()),
            args: Vec::new(),
        }
    }

    /// `value IN (<this query>)`.
    pub(crate) fn contains(&self, value: Expr) -> Expr {
        Expr::Call {
            method: Method::Contains,
            target: Some(self.nested()),
            args: vec![value],
        }
    }

    /// Compiles without executing.
    ///
    /// # Errors
    ///
    /// Returns a translation, usage or state error from compilation.
    pub fn build(&self) -> Result<Query> {
        Ok(self.compile(&self.ctx)?.0)
    }

    fn compile(&self, ctx: &QueryContext) -> Result<(Query, RowShape)> {
        compile_select(self.session.dialect(), self.session.evaluator(), ctx)
    }

    pub(crate) fn to_list<R: DeserializeOwned>(&self) -> Result<Vec<R>> {
        let (query, shape) = self.compile(&self.ctx)?;
        let rows = fetch(self.session.as_ref(), &self.shard, &query)?;
        materialize(&shape, &rows)
    }

    pub(crate) fn first<R: DeserializeOwned>(&self) -> Result<Option<R>> {
        let (query, shape) = self.compile(&self.ctx.first_only())?;
        let rows = fetch(self.session.as_ref(), &self.shard, &query)?;
        rows.first().map(|row| Materializer::new(&shape).row(row)).transpose()
    }

    pub(crate) fn count(&self) -> Result<u64> {
        let query = compile_count(self.session.dialect(), self.session.evaluator(), &self.ctx)?;
        let rows = fetch(self.session.as_ref(), &self.shard, &query)?;
        let shape = RowShape::Scalar("Count".to_string(), Some(DataTypeTag::Int64));
        let row = rows.first().ok_or_else(|| crate::error::materialize!("count returned no rows"))?;
        Materializer::new(&shape).row(row)
    }
}

/// A typed query over rows of `T`.
pub struct QuerySet<T, S = Filtered> {
    core: QueryCore,
    _marker: PhantomData<fn() -> (T, S)>,
}

/// A query set with ordering applied.
pub type SortedQuerySet<T> = QuerySet<T, Sorted>;

/// A grouped query set.
pub type GroupedQuerySet<T> = QuerySet<T, Grouped>;

impl<T, S> Clone for QuerySet<T, S> {
    fn clone(&self) -> Self {
        Self::from_core(self.core.clone())
    }
}

impl<T, S> fmt::Debug for QuerySet<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet").field("core", &self.core).finish()
    }
}

impl<T, S> QuerySet<T, S> {
    pub(crate) const fn from_core(core: QueryCore) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    pub(crate) const fn core(&self) -> &QueryCore {
        &self.core
    }

    fn next<R, N>(core: QueryCore) -> QuerySet<R, N> {
        QuerySet::from_core(core)
    }

    /// The clauses collected so far.
    #[must_use]
    pub const fn context(&self) -> &QueryContext {
        &self.core.ctx
    }

    /// Projects each row. The selector returns a column, an expression, a
    /// [`record`](crate::record) of named columns, or the row itself.
    #[must_use]
    pub fn select<R>(&self, selector: impl FnOnce(Param) -> Expr) -> QuerySet<R, Projected> {
        Self::next(self.core.select(Lambda::of1(selector)))
    }

    /// `SELECT DISTINCT`.
    #[must_use]
    pub fn distinct(&self) -> QuerySet<T, Projected> {
        Self::next(self.core.distinct())
    }

    /// `EXISTS (<this query>)`, for use inside another query's predicate.
    /// The nested query may reference the enclosing query's parameters.
    #[must_use]
    pub fn exists(&self) -> Expr {
        self.core.exists()
    }

    /// `value IN (<this query>)`. This query should project one column.
    #[must_use]
    pub fn contains(&self, value: impl IntoExpr) -> Expr {
        self.core.contains(value.into_expr())
    }

    /// Compiles the query without executing it.
    ///
    /// # Errors
    ///
    /// Returns a translation error for unsupported expressions, a usage
    /// error for sources from different sessions, or a state error for a
    /// refused clause.
    pub fn build(&self) -> Result<Query> {
        self.core.build()
    }

    /// Number of rows the query returns.
    ///
    /// # Errors
    ///
    /// Returns compilation errors, the provider's error, or a
    /// materialization error for a malformed count.
    pub fn count(&self) -> Result<u64> {
        self.core.count()
    }
}

impl<T: DeserializeOwned, S> QuerySet<T, S> {
    /// Executes the query and converts every row.
    ///
    /// # Errors
    ///
    /// Returns compilation errors, the provider's error, or a
    /// materialization error when a row does not fit `T`.
    pub fn to_list(&self) -> Result<Vec<T>> {
        self.core.to_list()
    }

    /// Executes the query limited to one row.
    ///
    /// # Errors
    ///
    /// As for [`to_list`](Self::to_list).
    pub fn first(&self) -> Result<Option<T>> {
        self.core.first()
    }
}

/// Ordering entry points shared by the stages that may start an `ORDER BY`.
macro_rules! ordering {
    ($($stage:ty),* $(,)?) => {
        $(
            impl<T> QuerySet<T, $stage> {
                /// Ascending order on `key`.
                #[must_use]
                pub fn order_by(&self, key: impl FnOnce(Param) -> Expr) -> QuerySet<T, Sorted> {
                    Self::next(self.core.order(Lambda::of1(|p| asc(key(p)))))
                }

                /// Descending order on `key`.
                #[must_use]
                pub fn order_by_desc(&self, key: impl FnOnce(Param) -> Expr) -> QuerySet<T, Sorted> {
                    Self::next(self.core.order(Lambda::of1(|p| desc(key(p)))))
                }

                /// Orders by explicit [`asc`]/[`desc`] keys, one or an
                /// [`array`](crate::array) of several.
                #[must_use]
                pub fn sort(&self, keys: impl FnOnce(Param) -> Expr) -> QuerySet<T, Sorted> {
                    Self::next(self.core.order(Lambda::of1(keys)))
                }
            }
        )*
    };
}

ordering!(Filtered, Grouped, Having, Projected);

/// Filtering entry points: a filtered stage stays filtered.
macro_rules! filtering {
    ($($stage:ty),* $(,)?) => {
        $(
            impl<T> QuerySet<T, $stage> {
                /// Adds a `WHERE` conjunct.
                #[must_use]
                pub fn filter(&self, predicate: impl FnOnce(Param) -> Expr) -> QuerySet<T, Filtered> {
                    Self::next(self.core.filter(Lambda::of1(predicate)))
                }

                /// `UNION` with `other`, removing duplicates.
                ///
                /// # Errors
                ///
                /// Returns a usage error when `other` belongs to a
                /// different session.
                pub fn union<S2>(&self, other: &QuerySet<T, S2>) -> Result<QuerySet<T, Projected>> {
                    Ok(Self::next(self.core.union(&other.core, UnionMode::Distinct)?))
                }

                /// `UNION ALL` with `other`.
                ///
                /// # Errors
                ///
                /// Returns a usage error when `other` belongs to a
                /// different session.
                pub fn union_all<S2>(&self, other: &QuerySet<T, S2>) -> Result<QuerySet<T, Projected>> {
                    Ok(Self::next(self.core.union(&other.core, UnionMode::All)?))
                }
            }
        )*
    };
}

filtering!(Filtered, Projected);

impl<T> QuerySet<T, Filtered> {
    /// Groups rows by one key, or by a [`record`](crate::record) or
    /// [`array`](crate::array) of keys.
    #[must_use]
    pub fn group_by(&self, keys: impl FnOnce(Param) -> Expr) -> QuerySet<T, Grouped> {
        Self::next(self.core.group(Lambda::of1(keys)))
    }

    /// `INNER JOIN` with `other` on a condition over both rows.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub fn join<U, S2>(
        &self, other: &QuerySet<U, S2>, on: impl FnOnce(Param, Param) -> Expr,
    ) -> Result<Join2<T, U, Joined>> {
        Ok(Join2::from_core(self.core.join(&other.core, JoinMode::Inner, Lambda::of2(on))?))
    }

    /// `LEFT JOIN` with `other` on a condition over both rows.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub fn left_join<U, S2>(
        &self, other: &QuerySet<U, S2>, on: impl FnOnce(Param, Param) -> Expr,
    ) -> Result<Join2<T, U, Joined>> {
        Ok(Join2::from_core(self.core.join(&other.core, JoinMode::Left, Lambda::of2(on))?))
    }
}

impl<T> QuerySet<T, Sorted> {
    /// Adds an ascending key after the existing ones.
    #[must_use]
    pub fn then_by(&self, key: impl FnOnce(Param) -> Expr) -> Self {
        Self::next(self.core.order(Lambda::of1(|p| asc(key(p)))))
    }

    /// Adds a descending key after the existing ones.
    #[must_use]
    pub fn then_by_desc(&self, key: impl FnOnce(Param) -> Expr) -> Self {
        Self::next(self.core.order(Lambda::of1(|p| desc(key(p)))))
    }

    /// Skips `offset` rows and returns at most `count`.
    #[must_use]
    pub fn paging(&self, offset: u64, count: u64) -> QuerySet<T, Paged> {
        Self::next(self.core.paging(offset, count))
    }

    /// Page `index` (zero-based) of `size` rows.
    #[must_use]
    pub fn page(&self, index: u64, size: u64) -> QuerySet<T, Paged> {
        self.paging(index.saturating_mul(size), size)
    }
}

impl<T> QuerySet<T, Grouped> {
    /// Filters groups.
    #[must_use]
    pub fn having(&self, predicate: impl FnOnce(Param) -> Expr) -> QuerySet<T, Having> {
        Self::next(self.core.having(Lambda::of1(predicate)))
    }
}
