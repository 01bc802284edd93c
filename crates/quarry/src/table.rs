//! # Tables
//!
//! A [`Table`] is the entry point for one entity: it resolves the entity's
//! schema and physical table name once (base name plus the shard and
//! partition suffixes the session's [`ShardStrategy`] picks for a key) and
//! hands out query sets and mutations over it.
//!
//! [`ShardStrategy`]: crate::ShardStrategy

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as Json;

use crate::context::{QueryContext, TableInfo};
use crate::entity::Entity;
use crate::error::{Result, usage};
use crate::expr::{Expr, Literal};
use crate::schema::EntitySchema;
use crate::select::{Filtered, QueryCore, QuerySet};
use crate::session::{Session, ShardKey};

/// The physical table of entity `T`.
pub struct Table<T> {
    pub(crate) session: Arc<dyn Session>,
    pub(crate) schema: Arc<EntitySchema>,
    pub(crate) name: String,
    pub(crate) shard: String,
    key: ShardKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            schema: Arc::clone(&self.schema),
            name: self.name.clone(),
            shard: self.shard.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.name).field("shard", &self.shard).finish_non_exhaustive()
    }
}

impl<T: Entity> Table<T> {
    /// Resolves `T`'s schema and physical name for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T`'s schema is invalid.
    pub fn new(session: Arc<dyn Session>, key: &ShardKey) -> Result<Self> {
        let schema = session.schemas().resolve::<T>()?;
        let strategy = session.shard_strategy();
        let base = schema.table();

        let name = format!(
            "{base}{}{}",
            strategy.table_shard(base, key).trim(),
            strategy.table_partition(base, key).trim()
        );
        let shard = strategy.connection_shard(key).trim().to_string();
        tracing::trace!(entity = T::TABLE, table = %name, shard = %shard, "resolved table");

        Ok(Self {
            session,
            schema,
            name,
            shard,
            key: key.clone(),
            _marker: PhantomData,
        })
    }

    /// The table for a related entity, in the same shard.
    ///
    /// # Errors
    ///
    /// Returns an error if `U`'s schema is invalid.
    pub fn related<U: Entity>(&self) -> Result<Table<U>> {
        Table::new(Arc::clone(&self.session), &self.key)
    }
}

impl<T> Table<T> {
    /// Physical table name, including shard and partition suffixes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity schema.
    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// A query over every row.
    #[must_use]
    pub fn query(&self) -> QuerySet<T, Filtered> {
        let table = TableInfo::Table {
            name: self.name.clone(),
            schema: Arc::clone(&self.schema),
        };
        let ctx = QueryContext::from_table(self.session.id(), table);
        QuerySet::from_core(QueryCore::new(Arc::clone(&self.session), ctx, self.shard.clone()))
    }

    /// Converts a serialized value object into typed `(property, value)`
    /// pairs, in schema order.
    pub(crate) fn property_values(&self, values: &impl Serialize) -> Result<Vec<(String, Expr)>> {
        let Json::Object(object) = serde_json::to_value(values)? else {
            return Err(usage!("values for `{}` must serialize to an object", self.name));
        };
        self.typed(object)
    }

    pub(crate) fn typed(&self, object: serde_json::Map<String, Json>) -> Result<Vec<(String, Expr)>> {
        if let Some(unknown) = object.keys().find(|property| self.schema.column(property).is_none()) {
            return Err(usage!("`{unknown}` is not a mapped property of `{}`", self.name));
        }
        let mut values = Vec::with_capacity(object.len());
        for column in self.schema.columns() {
            if let Some(json) = object.get(&column.property) {
                let value = column.bind(json)?;
                values.push((column.property.clone(), Expr::Constant(Literal::Value(value))));
            }
        }
        Ok(values)
    }
}
