//! # Expression trees
//!
//! Predicates and selectors are plain values built by closures over [`Param`]
//! handles. A `Param` stands for one row of one query source; its identity is
//! what ties `u.col("Age")` inside a filter back to the table alias that
//! `u` is bound to when the statement is compiled.
//!
//! ```ignore
//! users.filter(|u| u.col("Age").gt(18).and(u.col("Name").starts_with("A")))
//! ```
//!
//! Values never need a `SeaQuery` import: any scalar with a `sea_query::Value`
//! conversion becomes a literal through [`IntoExpr`], and anything `Serialize`
//! can be captured with [`capture`].

use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_query::Value;
use serde::Serialize;

use crate::context::QueryContext;
use crate::convert::json_to_untyped;
use crate::error::Result;
use crate::schema::DataTypeTag;

static NEXT_PARAM: AtomicU64 = AtomicU64::new(0);

/// A lambda parameter: one row of one query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Param(u64);

impl Param {
    /// Creates a parameter distinct from every other parameter in the process.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_PARAM.fetch_add(1, Ordering::Relaxed))
    }

    /// Member access: the column mapped to `property`.
    #[must_use]
    pub fn col(self, property: &str) -> Expr {
        Expr::Member {
            target: Box::new(Expr::Param(self)),
            name: property.to_string(),
        }
    }

    /// The whole row. Expands to every column in a select list, and to the
    /// single column of a scalar source elsewhere.
    #[must_use]
    pub const fn value(self) -> Expr {
        Expr::Param(self)
    }
}

impl Default for Param {
    fn default() -> Self {
        Self::new()
    }
}

/// A value known before the statement is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A scalar.
    Value(Value),
    /// An in-memory collection of scalars.
    List(Vec<Value>),
    /// An object graph captured from a `Serialize` value.
    Object(serde_json::Value),
}

impl Literal {
    /// Classifies a JSON value: scalars become [`Literal::Value`], arrays of
    /// scalars become [`Literal::List`], everything else stays an object.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        if let Some(value) = json_to_untyped(&json) {
            return Self::Value(value);
        }
        if let serde_json::Value::Array(items) = &json {
            let scalars: Option<Vec<Value>> = items.iter().map(json_to_untyped).collect();
            if let Some(values) = scalars {
                return Self::List(values);
            }
        }
        Self::Object(json)
    }

    /// The scalar, if this is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// True for the six relational operators.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Neg,
}

/// Recognized method calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Substring match on text, or membership in a list or subquery.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Non-empty subquery.
    Exists,
    /// `COUNT`.
    Count,
    /// `SUM`.
    Sum,
    /// `MAX`.
    Max,
    /// `MIN`.
    Min,
    /// `AVG`.
    Avg,
    /// Local server time.
    Now,
    /// UTC server time.
    UtcNow,
    /// Current timestamp at the database's precision.
    Timestamp,
    /// First non-null of two values.
    Coalesce,
    /// Conversion to a storage type.
    Cast(DataTypeTag),
    /// Ascending order marker.
    Asc,
    /// Descending order marker.
    Desc,
    /// A named method evaluated against literals only.
    Invoke(String),
}

/// An expression tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A lambda parameter (a whole row).
    Param(Param),
    /// `target.name`.
    Member {
        /// Object the member is read from.
        target: Box<Self>,
        /// Property name.
        name: String,
    },
    /// A literal.
    Constant(Literal),
    /// `left op right`.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Self>,
        /// Right operand.
        right: Box<Self>,
    },
    /// `op operand`.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Self>,
    },
    /// A recognized method call.
    Call {
        /// Method.
        method: Method,
        /// Receiver, for instance-style calls.
        target: Option<Box<Self>>,
        /// Arguments.
        args: Vec<Self>,
    },
    /// Record construction: named fields of a projection.
    New(Vec<(String, Self)>),
    /// Ordered list of expressions (order-by and group-by keys).
    Array(Vec<Self>),
    /// A nested query.
    Query(Arc<QueryContext>),
}

/// Conversion into an expression node.
pub trait IntoExpr {
    /// Performs the conversion.
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for Param {
    fn into_expr(self) -> Expr {
        Expr::Param(self)
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Constant(Literal::Value(self))
    }
}

impl IntoExpr for &str {
    fn into_expr(self) -> Expr {
        Expr::Constant(Literal::Value(Value::from(self)))
    }
}

impl IntoExpr for serde_json::Value {
    fn into_expr(self) -> Expr {
        Expr::Constant(Literal::from_json(self))
    }
}

macro_rules! into_expr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Expr {
                    Expr::Constant(Literal::Value(Value::from(self)))
                }
            }

            impl IntoExpr for Option<$ty> {
                fn into_expr(self) -> Expr {
                    Expr::Constant(Literal::Value(Value::from(self)))
                }
            }
        )*
    };
}

into_expr!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    Vec<u8>,
    NaiveDate,
    NaiveDateTime,
    DateTime<Utc>,
);

#[allow(clippy::should_implement_trait)]
impl Expr {
    fn binary(self, op: BinaryOp, rhs: impl IntoExpr) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into_expr()),
        }
    }

    fn call(method: Method, target: Option<Self>, args: Vec<Self>) -> Self {
        Self::Call {
            method,
            target: target.map(Box::new),
            args,
        }
    }

    /// `self = rhs`; against `NULL` renders `IS NULL`.
    #[must_use]
    pub fn eq(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self <> rhs`; against `NULL` renders `IS NOT NULL`.
    #[must_use]
    pub fn ne(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self > rhs`.
    #[must_use]
    pub fn gt(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`.
    #[must_use]
    pub fn ge(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// `self < rhs`.
    #[must_use]
    pub fn lt(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`.
    #[must_use]
    pub fn le(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self AND rhs`.
    #[must_use]
    pub fn and(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    /// `self OR rhs`.
    #[must_use]
    pub fn or(self, rhs: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    /// `low <= self AND self <= high`.
    #[must_use]
    pub fn between(self, low: impl IntoExpr, high: impl IntoExpr) -> Self {
        self.clone().ge(low).and(self.le(high))
    }

    /// `self IS NULL`.
    #[must_use]
    pub fn is_null(self) -> Self {
        self.eq(null())
    }

    /// `self IS NOT NULL`.
    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.ne(null())
    }

    /// Text contains `pattern`; compiles to `LIKE '%pattern%'`. On a list or
    /// a nested query the roles flip: see [`Expr::in_list`].
    #[must_use]
    pub fn contains(self, pattern: impl IntoExpr) -> Self {
        Self::call(Method::Contains, Some(self), vec![pattern.into_expr()])
    }

    /// Text starts with `prefix`.
    #[must_use]
    pub fn starts_with(self, prefix: impl IntoExpr) -> Self {
        Self::call(Method::StartsWith, Some(self), vec![prefix.into_expr()])
    }

    /// Text ends with `suffix`.
    #[must_use]
    pub fn ends_with(self, suffix: impl IntoExpr) -> Self {
        Self::call(Method::EndsWith, Some(self), vec![suffix.into_expr()])
    }

    /// `self IN (v1, v2, ...)`. An empty list is constant false.
    #[must_use]
    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        list(values).contains(self)
    }

    /// `self NOT IN (v1, v2, ...)`. An empty list is constant true.
    #[must_use]
    pub fn not_in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        !self.in_list(values)
    }

    /// `COUNT(self)`.
    #[must_use]
    pub fn count(self) -> Self {
        Self::call(Method::Count, None, vec![self])
    }

    /// `SUM(self)`.
    #[must_use]
    pub fn sum(self) -> Self {
        Self::call(Method::Sum, None, vec![self])
    }

    /// `MAX(self)`.
    #[must_use]
    pub fn max(self) -> Self {
        Self::call(Method::Max, None, vec![self])
    }

    /// `MIN(self)`.
    #[must_use]
    pub fn min(self) -> Self {
        Self::call(Method::Min, None, vec![self])
    }

    /// `AVG(self)`.
    #[must_use]
    pub fn avg(self) -> Self {
        Self::call(Method::Avg, None, vec![self])
    }

    /// Converts to the given storage type.
    #[must_use]
    pub fn cast(self, tag: DataTypeTag) -> Self {
        Self::call(Method::Cast(tag), None, vec![self])
    }

    /// `self` unless it is null, otherwise `fallback`.
    #[must_use]
    pub fn coalesce(self, fallback: impl IntoExpr) -> Self {
        coalesce(self, fallback)
    }

    /// Ascending order key.
    #[must_use]
    pub fn asc(self) -> Self {
        asc(self)
    }

    /// Descending order key.
    #[must_use]
    pub fn desc(self) -> Self {
        desc(self)
    }

    /// Member access on an arbitrary expression. On a literal object graph
    /// the member is read when the statement is compiled.
    #[must_use]
    pub fn member(self, name: &str) -> Self {
        Self::Member {
            target: Box::new(self),
            name: name.to_string(),
        }
    }

    /// A named method on a literal receiver, evaluated at compile time.
    #[must_use]
    pub fn invoke(self, method: &str, args: Vec<Self>) -> Self {
        Self::call(Method::Invoke(method.to_string()), Some(self), args)
    }
}

macro_rules! operator {
    ($trait:ident, $fn:ident, $op:ident) => {
        impl<R: IntoExpr> $trait<R> for Expr {
            type Output = Self;

            fn $fn(self, rhs: R) -> Self {
                self.binary(BinaryOp::$op, rhs)
            }
        }
    };
}

operator!(Add, add, Add);
operator!(Sub, sub, Sub);
operator!(Mul, mul, Mul);
operator!(Div, div, Div);
operator!(Rem, rem, Mod);

impl Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self {
        Self::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(self),
        }
    }
}

/// A literal.
#[must_use]
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Constant(Literal::Value(value.into()))
}

/// The null literal.
#[must_use]
pub const fn null() -> Expr {
    Expr::Constant(Literal::Value(Value::String(None)))
}

/// An in-memory list literal.
#[must_use]
pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Expr {
    Expr::Constant(Literal::List(values.into_iter().map(Into::into).collect()))
}

/// Captures a local value as a literal object graph.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn capture(value: &impl Serialize) -> Result<Expr> {
    Ok(Expr::Constant(Literal::from_json(serde_json::to_value(value)?)))
}

/// A record with named fields, for projections and updates.
#[must_use]
pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, Expr)>) -> Expr {
    Expr::New(fields.into_iter().map(|(name, expr)| (name.into(), expr)).collect())
}

/// An ordered list of expressions.
#[must_use]
pub fn array(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Array(items.into_iter().collect())
}

/// `COUNT(*)`.
#[must_use]
pub const fn count() -> Expr {
    Expr::Call {
        method: Method::Count,
        target: None,
        args: Vec::new(),
    }
}

/// Local server time.
#[must_use]
pub const fn now() -> Expr {
    Expr::Call {
        method: Method::Now,
        target: None,
        args: Vec::new(),
    }
}

/// UTC server time.
#[must_use]
pub const fn utc_now() -> Expr {
    Expr::Call {
        method: Method::UtcNow,
        target: None,
        args: Vec::new(),
    }
}

/// Current timestamp at the database's precision.
#[must_use]
pub const fn timestamp() -> Expr {
    Expr::Call {
        method: Method::Timestamp,
        target: None,
        args: Vec::new(),
    }
}

/// First non-null of `value` and `fallback`.
#[must_use]
pub fn coalesce(value: impl IntoExpr, fallback: impl IntoExpr) -> Expr {
    Expr::call(Method::Coalesce, None, vec![value.into_expr(), fallback.into_expr()])
}

/// Ascending order key.
#[must_use]
pub fn asc(key: impl IntoExpr) -> Expr {
    Expr::call(Method::Asc, None, vec![key.into_expr()])
}

/// Descending order key.
#[must_use]
pub fn desc(key: impl IntoExpr) -> Expr {
    Expr::call(Method::Desc, None, vec![key.into_expr()])
}

/// An expression together with the parameters it is written over.
#[derive(Debug, Clone)]
pub struct Lambda {
    /// Parameters, bound positionally to the in-scope sources.
    pub params: Vec<Param>,
    /// Body.
    pub body: Expr,
}

impl Lambda {
    /// Wraps a body and its parameters.
    #[must_use]
    pub const fn new(params: Vec<Param>, body: Expr) -> Self {
        Self { params, body }
    }

    /// One-parameter lambda from a closure.
    #[must_use]
    pub fn of1(f: impl FnOnce(Param) -> Expr) -> Self {
        let p = Param::new();
        Self::new(vec![p], f(p))
    }

    /// Two-parameter lambda from a closure.
    #[must_use]
    pub fn of2(f: impl FnOnce(Param, Param) -> Expr) -> Self {
        let (a, b) = (Param::new(), Param::new());
        Self::new(vec![a, b], f(a, b))
    }

    /// Three-parameter lambda from a closure.
    #[must_use]
    pub fn of3(f: impl FnOnce(Param, Param, Param) -> Expr) -> Self {
        let (a, b, c) = (Param::new(), Param::new(), Param::new());
        Self::new(vec![a, b, c], f(a, b, c))
    }

    /// Four-parameter lambda from a closure.
    #[must_use]
    pub fn of4(f: impl FnOnce(Param, Param, Param, Param) -> Expr) -> Self {
        let (a, b, c, d) = (Param::new(), Param::new(), Param::new(), Param::new());
        Self::new(vec![a, b, c, d], f(a, b, c, d))
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[test]
    fn params_are_unique() {
        let (a, b) = (Param::new(), Param::new());
        assert_ne!(a, b);
    }

    #[test]
    fn operators_build_trees() {
        let p = Param::new();
        let expr = (p.col("Age") + 1).gt(18);
        let Expr::Binary { op: BinaryOp::Gt, left, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn in_list_targets_the_list() {
        let p = Param::new();
        let Expr::Call { method: Method::Contains, target, args } = p.col("Id").in_list([1, 2]) else {
            panic!("expected contains");
        };
        assert!(matches!(target.as_deref(), Some(Expr::Constant(Literal::List(items))) if items.len() == 2));
        assert!(matches!(args[0], Expr::Member { .. }));
    }

    #[test]
    fn capture_classifies() {
        #[derive(Serialize)]
        struct Filter {
            min: i32,
        }

        assert!(matches!(capture(&5).unwrap(), Expr::Constant(Literal::Value(_))));
        assert!(matches!(capture(&vec!["a", "b"]).unwrap(), Expr::Constant(Literal::List(_))));
        assert!(matches!(capture(&Filter { min: 3 }).unwrap(), Expr::Constant(Literal::Object(_))));
    }

    #[test]
    fn optional_values_become_nullable_literals() {
        let Expr::Constant(Literal::Value(value)) = None::<i32>.into_expr() else {
            panic!("expected literal");
        };
        assert_eq!(value, Value::Int(None));
    }
}
