//! Joined query sets of fixed arity.
//!
//! `Join2`, `Join3` and `Join4` are thin typed wrappers over the same
//! [`QueryCore`] a single-source [`QuerySet`] uses: their closures simply
//! take one [`Param`] per joined source, bound in join order. Another join
//! is only offered before any other clause; executing a join goes through
//! [`select`](Join2::select).
//!
//! ```ignore
//! let rows: Vec<Summary> = users
//!     .query()
//!     .join(&orders.query(), |u, o| u.col("id").eq(o.col("user_id")))?
//!     .filter(|_, o| o.col("total").gt(100))
//!     .select(|u, o| record([("name", u.col("name")), ("total", o.col("total"))]))
//!     .to_list()?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::compile::Query;
use crate::context::{JoinMode, QueryContext};
use crate::error::Result;
use crate::expr::{Expr, Lambda, Param, asc, desc};
use crate::select::{Filtered, Grouped, Having, Joined, Paged, Projected, QueryCore, QuerySet, Sorted};

macro_rules! param {
    ($ty:ident) => {
        Param
    };
}

/// Declares one join arity: the type, its shared operations and the
/// per-stage clauses.
macro_rules! join_arity {
    ($(#[$meta:meta])* $name:ident<$($ty:ident),+>($($p:ident),+)) => {
        $(#[$meta])*
        pub struct $name<$($ty,)+ S = Joined> {
            core: QueryCore,
            _marker: PhantomData<fn() -> ($($ty,)+ S)>,
        }

        impl<$($ty,)+ S> Clone for $name<$($ty,)+ S> {
            fn clone(&self) -> Self {
                Self::from_core(self.core.clone())
            }
        }

        impl<$($ty,)+ S> fmt::Debug for $name<$($ty,)+ S> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).field("core", &self.core).finish()
            }
        }

        impl<$($ty,)+ S> $name<$($ty,)+ S> {
            pub(crate) const fn from_core(core: QueryCore) -> Self {
                Self {
                    core,
                    _marker: PhantomData,
                }
            }

            fn next<N>(core: QueryCore) -> $name<$($ty,)+ N> {
                $name::from_core(core)
            }

            fn lambda(f: impl FnOnce($(param!($ty)),+) -> Expr) -> Lambda {
                $(let $p = Param::new();)+
                Lambda::new(vec![$($p),+], f($($p),+))
            }

            /// The clauses collected so far.
            #[must_use]
            pub const fn context(&self) -> &QueryContext {
                self.core.context()
            }

            /// Projects each joined row.
            #[must_use]
            pub fn select<R>(&self, selector: impl FnOnce($(param!($ty)),+) -> Expr) -> QuerySet<R, Projected> {
                QuerySet::from_core(self.core.select(Self::lambda(selector)))
            }

            /// Compiles the query without executing it.
            ///
            /// # Errors
            ///
            /// Returns compilation errors.
            pub fn build(&self) -> Result<Query> {
                self.core.build()
            }

            /// Number of joined rows.
            ///
            /// # Errors
            ///
            /// Returns compilation or provider errors.
            pub fn count(&self) -> Result<u64> {
                self.core.count()
            }
        }

        join_arity!(@filter $name<$($ty),+>, Joined);
        join_arity!(@filter $name<$($ty),+>, Filtered);
        join_arity!(@order $name<$($ty),+>, Joined);
        join_arity!(@order $name<$($ty),+>, Filtered);
        join_arity!(@order $name<$($ty),+>, Grouped);
        join_arity!(@order $name<$($ty),+>, Having);

        impl<$($ty),+> $name<$($ty,)+ Sorted> {
            /// Adds an ascending key after the existing ones.
            #[must_use]
            pub fn then_by(&self, key: impl FnOnce($(param!($ty)),+) -> Expr) -> Self {
                let keys = Self::lambda(key);
                Self::next(self.core.order(Lambda::new(keys.params, asc(keys.body))))
            }

            /// Adds a descending key after the existing ones.
            #[must_use]
            pub fn then_by_desc(&self, key: impl FnOnce($(param!($ty)),+) -> Expr) -> Self {
                let keys = Self::lambda(key);
                Self::next(self.core.order(Lambda::new(keys.params, desc(keys.body))))
            }

            /// Skips `offset` rows and returns at most `count`.
            #[must_use]
            pub fn paging(&self, offset: u64, count: u64) -> $name<$($ty,)+ Paged> {
                Self::next(self.core.paging(offset, count))
            }
        }

        impl<$($ty),+> $name<$($ty,)+ Grouped> {
            /// Filters groups.
            #[must_use]
            pub fn having(&self, predicate: impl FnOnce($(param!($ty)),+) -> Expr) -> $name<$($ty,)+ Having> {
                Self::next(self.core.having(Self::lambda(predicate)))
            }
        }
    };

    (@filter $name:ident<$($ty:ident),+>, $stage:ty) => {
        impl<$($ty),+> $name<$($ty,)+ $stage> {
            /// Adds a `WHERE` conjunct over the joined rows.
            #[must_use]
            pub fn filter(&self, predicate: impl FnOnce($(param!($ty)),+) -> Expr) -> $name<$($ty,)+ Filtered> {
                Self::next(self.core.filter(Self::lambda(predicate)))
            }

            /// Groups the joined rows.
            #[must_use]
            pub fn group_by(&self, keys: impl FnOnce($(param!($ty)),+) -> Expr) -> $name<$($ty,)+ Grouped> {
                Self::next(self.core.group(Self::lambda(keys)))
            }
        }
    };

    (@order $name:ident<$($ty:ident),+>, $stage:ty) => {
        impl<$($ty),+> $name<$($ty,)+ $stage> {
            /// Ascending order on `key`.
            #[must_use]
            pub fn order_by(&self, key: impl FnOnce($(param!($ty)),+) -> Expr) -> $name<$($ty,)+ Sorted> {
                let keys = Self::lambda(key);
                Self::next(self.core.order(Lambda::new(keys.params, asc(keys.body))))
            }

            /// Descending order on `key`.
            #[must_use]
            pub fn order_by_desc(&self, key: impl FnOnce($(param!($ty)),+) -> Expr) -> $name<$($ty,)+ Sorted> {
                let keys = Self::lambda(key);
                Self::next(self.core.order(Lambda::new(keys.params, desc(keys.body))))
            }

            /// Orders by explicit `asc`/`desc` keys.
            #[must_use]
            pub fn sort(&self, keys: impl FnOnce($(param!($ty)),+) -> Expr) -> $name<$($ty,)+ Sorted> {
                Self::next(self.core.order(Self::lambda(keys)))
            }
        }
    };
}

join_arity! {
    /// Two joined sources.
    Join2<A, B>(a, b)
}

join_arity! {
    /// Three joined sources.
    Join3<A, B, C>(a, b, c)
}

join_arity! {
    /// Four joined sources.
    Join4<A, B, C, D>(a, b, c, d)
}

impl<A, B> Join2<A, B, Joined> {
    /// `INNER JOIN` a third source.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub fn join<C, S>(
        &self, other: &QuerySet<C, S>, on: impl FnOnce(Param, Param, Param) -> Expr,
    ) -> Result<Join3<A, B, C, Joined>> {
        Ok(Join3::from_core(self.core.join(other.core(), JoinMode::Inner, Lambda::of3(on))?))
    }

    /// `LEFT JOIN` a third source.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub fn left_join<C, S>(
        &self, other: &QuerySet<C, S>, on: impl FnOnce(Param, Param, Param) -> Expr,
    ) -> Result<Join3<A, B, C, Joined>> {
        Ok(Join3::from_core(self.core.join(other.core(), JoinMode::Left, Lambda::of3(on))?))
    }
}

impl<A, B, C> Join3<A, B, C, Joined> {
    /// `INNER JOIN` a fourth source.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub fn join<D, S>(
        &self, other: &QuerySet<D, S>, on: impl FnOnce(Param, Param, Param, Param) -> Expr,
    ) -> Result<Join4<A, B, C, D, Joined>> {
        Ok(Join4::from_core(self.core.join(other.core(), JoinMode::Inner, Lambda::of4(on))?))
    }

    /// `LEFT JOIN` a fourth source.
    ///
    /// # Errors
    ///
    /// Returns a usage error when `other` belongs to a different session.
    pub fn left_join<D, S>(
        &self, other: &QuerySet<D, S>, on: impl FnOnce(Param, Param, Param, Param) -> Expr,
    ) -> Result<Join4<A, B, C, D, Joined>> {
        Ok(Join4::from_core(self.core.join(other.core(), JoinMode::Left, Lambda::of4(on))?))
    }
}
