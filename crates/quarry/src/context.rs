//! # Query context
//!
//! A [`QueryContext`] holds the clauses of one query before rendering. Clause
//! order is governed by a small state machine: each builder call asks for a
//! [snapshot](QueryContext::snapshot) for the next [`Action`]. When the
//! transition is legal the context is cloned; when it is not, the current
//! query is wrapped as a derived table and the clause is applied to the new
//! outer query. Filtering after paging therefore yields
//! `SELECT … FROM (<paged query>) t0 WHERE …` instead of an error.
//!
//! Clause lists are `Arc`-shared, so a snapshot costs one reference count
//! per list until the list is written.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::expr::Lambda;
use crate::schema::EntitySchema;

/// State-machine cursor: the clause most recently applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Action {
    None,
    Distinct,
    Select,
    From,
    Join,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Paging,
    Union,
}

impl Action {
    /// Every action, for exhaustive checks.
    pub const ALL: [Self; 11] = [
        Self::None,
        Self::Distinct,
        Self::Select,
        Self::From,
        Self::Join,
        Self::Where,
        Self::GroupBy,
        Self::Having,
        Self::OrderBy,
        Self::Paging,
        Self::Union,
    ];

    /// The transition table. `has_joins` only matters for `Where → Union`.
    #[must_use]
    pub const fn allows(self, next: Self, has_joins: bool) -> bool {
        use Action::{Distinct, From, GroupBy, Having, Join, OrderBy, Paging, Select, Union, Where};

        match self {
            Self::None => matches!(next, From),
            From => {
                matches!(next, Join | Where | GroupBy | OrderBy | Select | Distinct | Union)
            }
            Join => matches!(next, Join | Where | GroupBy | OrderBy | Select | Distinct),
            Where => {
                matches!(next, Where | GroupBy | OrderBy | Select | Distinct)
                    || (matches!(next, Union) && !has_joins)
            }
            GroupBy => matches!(next, Having | OrderBy | Select | Distinct),
            Having => matches!(next, OrderBy | Select | Distinct),
            OrderBy => matches!(next, OrderBy | Paging | Select | Distinct),
            Paging => matches!(next, Select | Distinct),
            Select => matches!(next, Distinct | Union),
            Distinct => matches!(next, Union),
            Union => matches!(next, Union | OrderBy),
        }
    }
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identity of the session a context was created by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// An id no other session in the process has.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Row source of a query.
#[derive(Debug, Clone)]
pub enum TableInfo {
    /// A physical table.
    Table {
        /// Physical name, shard and partition suffixes included.
        name: String,
        /// Schema of the mapped entity.
        schema: Arc<EntitySchema>,
    },
    /// A nested query used as a derived table.
    Subquery(Arc<QueryContext>),
}

/// Join mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// `INNER JOIN`.
    Inner,
    /// `LEFT JOIN`.
    Left,
}

/// A joined source and its `ON` predicate.
#[derive(Debug, Clone)]
pub struct JoinTarget {
    /// Join mode.
    pub mode: JoinMode,
    /// Joined source.
    pub table: TableInfo,
    /// Predicate over every source joined so far, this one last.
    pub on: Lambda,
}

/// Union mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionMode {
    /// `UNION`.
    Distinct,
    /// `UNION ALL`.
    All,
}

/// A query appended with `UNION`.
#[derive(Debug, Clone)]
pub struct UnionTarget {
    /// Union mode.
    pub mode: UnionMode,
    /// The appended query.
    pub context: Arc<QueryContext>,
}

/// Rows to skip and rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// Rows skipped.
    pub offset: u64,
    /// Rows returned.
    pub count: u64,
}

/// A refused builder call, replayed when the context is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fault {
    Transition { from: Action, to: Action },
    Usage(String),
    Translation(String),
    Schema(String),
}

impl From<Error> for Fault {
    fn from(err: Error) -> Self {
        match err {
            Error::State { from, to } => Self::Transition { from, to },
            Error::Usage(message) => Self::Usage(message),
            Error::Translation(message) => Self::Translation(message),
            Error::Schema(message) => Self::Schema(message),
            other => Self::Usage(other.to_string()),
        }
    }
}

/// The clauses of one query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    session: SessionId,
    state: Action,
    distinct: bool,
    first_only: bool,
    paging: Option<Paging>,
    from: Arc<Vec<TableInfo>>,
    select: Option<Lambda>,
    wheres: Arc<Vec<Lambda>>,
    group_by: Option<Lambda>,
    having: Option<Lambda>,
    order_by: Arc<Vec<Lambda>>,
    joins: Arc<Vec<JoinTarget>>,
    unions: Arc<Vec<UnionTarget>>,
    fault: Option<Fault>,
}

impl QueryContext {
    /// An empty context. The only legal first clause is `From`.
    #[must_use]
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            state: Action::None,
            distinct: false,
            first_only: false,
            paging: None,
            from: Arc::default(),
            select: None,
            wheres: Arc::default(),
            group_by: None,
            having: None,
            order_by: Arc::default(),
            joins: Arc::default(),
            unions: Arc::default(),
            fault: None,
        }
    }

    /// A context selecting from `table`.
    #[must_use]
    pub fn from_table(session: SessionId, table: TableInfo) -> Self {
        let mut ctx = Self::new(session);
        ctx.state = Action::From;
        ctx.from = Arc::new(vec![table]);
        ctx
    }

    /// Whether `next` may follow the current clause.
    #[must_use]
    pub fn allows(&self, next: Action) -> bool {
        if next == Action::Union && self.is_ordered() {
            return false;
        }
        self.state.allows(next, !self.joins.is_empty())
    }

    /// Clone-or-wrap: a copy positioned at `next`, or a fresh outer query
    /// over this one as a derived table when `next` may not follow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when `next` is illegal even on a fresh
    /// outer query (`None`, `From`, `Having`, `Paging`), or when the context
    /// has no source to wrap.
    pub fn snapshot(&self, next: Action) -> Result<Self> {
        if self.allows(next) {
            let mut ctx = self.clone();
            ctx.state = next;
            return Ok(ctx);
        }

        let illegal = Error::State {
            from: self.state,
            to: next,
        };
        if self.state == Action::None {
            return Err(illegal);
        }
        let mut outer = self.wrap();
        if !outer.allows(next) {
            return Err(illegal);
        }
        tracing::trace!(from = ?self.state, to = ?next, "nesting query as derived table");
        outer.state = next;
        Ok(outer)
    }

    /// A fresh outer query whose only source is this query.
    #[must_use]
    pub fn wrap(&self) -> Self {
        Self::from_table(self.session, TableInfo::Subquery(Arc::new(self.clone())))
    }

    fn expect(&self, action: Action) -> Result<()> {
        if self.state == action {
            Ok(())
        } else {
            Err(Error::State {
                from: self.state,
                to: action,
            })
        }
    }

    /// Adds a join. The cursor must be at `Join`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn add_join(&mut self, join: JoinTarget) -> Result<()> {
        self.expect(Action::Join)?;
        Arc::make_mut(&mut self.joins).push(join);
        Ok(())
    }

    /// Adds a conjunct to `WHERE`. The cursor must be at `Where`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn add_where(&mut self, predicate: Lambda) -> Result<()> {
        self.expect(Action::Where)?;
        Arc::make_mut(&mut self.wheres).push(predicate);
        Ok(())
    }

    /// Sets `GROUP BY`. The cursor must be at `GroupBy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn set_group_by(&mut self, keys: Lambda) -> Result<()> {
        self.expect(Action::GroupBy)?;
        self.group_by = Some(keys);
        Ok(())
    }

    /// Sets `HAVING`. The cursor must be at `Having`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn set_having(&mut self, predicate: Lambda) -> Result<()> {
        self.expect(Action::Having)?;
        self.having = Some(predicate);
        Ok(())
    }

    /// Appends `ORDER BY` keys. The cursor must be at `OrderBy`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn add_order_by(&mut self, keys: Lambda) -> Result<()> {
        self.expect(Action::OrderBy)?;
        Arc::make_mut(&mut self.order_by).push(keys);
        Ok(())
    }

    /// Sets paging. The cursor must be at `Paging`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn set_paging(&mut self, paging: Paging) -> Result<()> {
        self.expect(Action::Paging)?;
        self.paging = Some(paging);
        Ok(())
    }

    /// Sets the projection. The cursor must be at `Select`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn set_select(&mut self, projection: Lambda) -> Result<()> {
        self.expect(Action::Select)?;
        self.select = Some(projection);
        Ok(())
    }

    /// Marks the query `DISTINCT`. The cursor must be at `Distinct`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn set_distinct(&mut self) -> Result<()> {
        self.expect(Action::Distinct)?;
        self.distinct = true;
        Ok(())
    }

    /// Appends a union operand. The cursor must be at `Union`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the cursor is elsewhere.
    pub fn add_union(&mut self, union: UnionTarget) -> Result<()> {
        self.expect(Action::Union)?;
        Arc::make_mut(&mut self.unions).push(union);
        Ok(())
    }

    /// A copy limited to one row.
    ///
    /// A `TOP 1` would bind to the first operand of a union, so an unpaged
    /// union is moved into a derived table and its ordering re-applied on
    /// the outer query.
    #[must_use]
    pub fn first_only(&self) -> Self {
        if self.unions.is_empty() || self.paging.is_some() {
            let mut ctx = self.clone();
            ctx.first_only = true;
            return ctx;
        }

        let mut outer = self.unordered().wrap();
        outer.state = self.state;
        outer.order_by = Arc::clone(&self.order_by);
        outer.first_only = true;
        outer
    }

    /// Owning session.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Cursor position.
    #[must_use]
    pub const fn state(&self) -> Action {
        self.state
    }

    /// Whether ordering, paging or a one-row limit is present.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        !self.order_by.is_empty() || self.paging.is_some() || self.first_only
    }

    /// `DISTINCT` flag.
    #[must_use]
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// One-row limit flag.
    #[must_use]
    pub const fn is_first_only(&self) -> bool {
        self.first_only
    }

    /// Paging, if set.
    #[must_use]
    pub const fn paging(&self) -> Option<Paging> {
        self.paging
    }

    /// Sources, root first.
    #[must_use]
    pub fn from(&self) -> &[TableInfo] {
        &self.from
    }

    /// Projection, if set.
    #[must_use]
    pub const fn select(&self) -> Option<&Lambda> {
        self.select.as_ref()
    }

    /// `WHERE` conjuncts.
    #[must_use]
    pub fn wheres(&self) -> &[Lambda] {
        &self.wheres
    }

    /// `GROUP BY` keys, if set.
    #[must_use]
    pub const fn group_by(&self) -> Option<&Lambda> {
        self.group_by.as_ref()
    }

    /// `HAVING` predicate, if set.
    #[must_use]
    pub const fn having(&self) -> Option<&Lambda> {
        self.having.as_ref()
    }

    /// `ORDER BY` keys in application order.
    #[must_use]
    pub fn order_by(&self) -> &[Lambda] {
        &self.order_by
    }

    /// Joins in application order.
    #[must_use]
    pub fn joins(&self) -> &[JoinTarget] {
        &self.joins
    }

    /// Union operands in application order.
    #[must_use]
    pub fn unions(&self) -> &[UnionTarget] {
        &self.unions
    }

    /// A copy that records a refused builder call. Compiling it (or any
    /// query embedding it) fails with the same error.
    #[must_use]
    pub fn faulted(&self, err: Error) -> Self {
        let mut ctx = self.clone();
        ctx.fault.get_or_insert_with(|| err.into());
        ctx
    }

    /// Fails with the first refused builder call, if any.
    ///
    /// # Errors
    ///
    /// Returns the error the refused call raised: [`Error::State`] for an
    /// illegal transition, otherwise the original usage, translation or
    /// schema error.
    pub fn check(&self) -> Result<()> {
        match self.fault.clone() {
            None => Ok(()),
            Some(Fault::Transition { from, to }) => Err(Error::State { from, to }),
            Some(Fault::Usage(message)) => Err(Error::Usage(message)),
            Some(Fault::Translation(message)) => Err(Error::Translation(message)),
            Some(Fault::Schema(message)) => Err(Error::Schema(message)),
        }
    }

    /// A copy without ordering, paging or a row limit, for counting.
    #[must_use]
    pub(crate) fn unordered(&self) -> Self {
        let mut ctx = self.clone();
        ctx.order_by = Arc::default();
        ctx.paging = None;
        ctx.first_only = false;
        ctx
    }
}
