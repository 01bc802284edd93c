//! Typed, shard-aware query builder for SQL databases.
//!
//! Queries are composed fluently over entity types; predicates and
//! selectors are closures that build expression trees, which are compiled
//! into parameterized SQL for the session's dialect. Literals always become
//! named parameters. Execution is synchronous and goes through a provider's
//! [`Session`].
//!
//! # Quick Start
//!
//! ## Define an Entity
//!
//! ```ignore
//! use quarry::entity;
//! use serde::{Deserialize, Serialize};
//!
//! entity! {
//!     table = "User",
//!     #[derive(Debug, Clone, Serialize, Deserialize)]
//!     pub struct User {
//!         pub id: i64 => "Id" [primary_key, identity],
//!         pub name: String => "Name",
//!         pub age: i32 => "Age",
//!     }
//! }
//! ```
//!
//! ## Query
//!
//! ```ignore
//! use quarry::SessionExt;
//!
//! let users = session.table::<User>()?;
//!
//! // SELECT t0.[Name] FROM [User] t0 WHERE t0.[Age]>@p0 ORDER BY t0.[Age] DESC
//! let names: Vec<String> = users
//!     .query()
//!     .filter(|u| u.col("age").gt(18))
//!     .order_by_desc(|u| u.col("age"))
//!     .select(|u| u.col("name"))
//!     .to_list()?;
//! ```
//!
//! Clauses requested in an order SQL does not allow, such as filtering a
//! paged query, compile to a derived table rather than failing.
//!
//! ## Subqueries
//!
//! ```ignore
//! let buyers = users.query().filter(|u| {
//!     orders.query().filter(|o| o.col("user_id").eq(u.col("id"))).exists()
//! });
//! ```
//!
//! ## Mutations
//!
//! ```ignore
//! let mut ann = User { id: 0, name: "Ann".into(), age: 30 };
//! users.insert(&mut ann)?; // ann.id now holds the generated identity
//!
//! users.update_with(|u| record([("age", u.col("age") + 1)]), |u| u.col("id").eq(ann.id))?;
//! users.delete(|u| u.col("age").lt(18))?;
//! ```
//!
//! Updates and deletes refuse filters that match every row.

mod compile;
mod connection;
mod context;
mod convert;
mod delete;
mod dialect;
mod entity;
mod error;
mod eval;
mod expr;
mod insert;
mod join;
mod materialize;
mod schema;
mod select;
mod session;
mod table;
mod update;

pub use compile::{Query, RowShape};
pub use connection::{Connection, DataType, Field, Intent, Parameter, Row, Transaction};
pub use context::{Action, JoinMode, JoinTarget, Paging, QueryContext, TableInfo, UnionMode, UnionTarget};
pub use dialect::{
    Aggregate, Clock, Dialect, PostgresDialect, SelectParts, SqlServerDialect, SqliteDialect,
};
pub use entity::{Entity, SqlType};
pub use error::{Error, Result};
pub use eval::{Evaluator, JsonEvaluator};
pub use expr::{
    BinaryOp, Expr, IntoExpr, Lambda, Literal, Method, Param, UnaryOp, array, asc, capture,
    coalesce, count, desc, list, lit, now, null, record, timestamp, utc_now,
};
pub use join::{Join2, Join3, Join4};
pub use materialize::{Materializer, materialize};
pub use schema::{ColumnSchema, DataTypeTag, EntitySchema, SchemaBuilder, SchemaRegistry};
pub use select::{
    Filtered, GroupedQuerySet, Grouped, Having, Joined, Paged, Projected, QueryCore, QuerySet,
    Sorted, SortedQuerySet,
};
pub use session::{
    ModuloSharding, NoSharding, Session, SessionExt, SessionId, ShardKey, ShardStrategy,
};
pub use table::Table;
