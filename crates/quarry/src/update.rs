use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::compile::compile_update;
use crate::entity::Entity;
use crate::error::{Result, usage};
use crate::expr::{Expr, Lambda, Param};
use crate::session::execute;
use crate::table::Table;

impl<T: Entity> Table<T> {
    /// `UPDATE` from a value object: every mapped field it serializes is
    /// assigned, so a partial struct updates only its own fields. Identity
    /// columns are skipped.
    ///
    /// # Errors
    ///
    /// Returns a usage error for an unmapped field, an empty assignment
    /// list, or a filter that is always true; otherwise the provider's
    /// error.
    pub fn update(&self, values: &impl Serialize, filter: impl FnOnce(Param) -> Expr) -> Result<u64> {
        let assignments = self.without_identity(self.property_values(values)?);
        self.apply_update(Lambda::new(Vec::new(), Expr::New(assignments)), Lambda::of1(filter))
    }

    /// `UPDATE` from a dictionary of property names to values.
    ///
    /// # Errors
    ///
    /// As for [`update`](Self::update); identity properties are refused.
    pub fn update_map<K, V>(
        &self, values: impl IntoIterator<Item = (K, V)>, filter: impl FnOnce(Param) -> Expr,
    ) -> Result<u64>
    where
        K: Into<String>,
        V: Serialize,
    {
        let mut object = Map::new();
        for (property, value) in values {
            object.insert(property.into(), serde_json::to_value(value)?);
        }
        let assignments = self.typed(object)?;
        self.apply_update(Lambda::new(Vec::new(), Expr::New(assignments)), Lambda::of1(filter))
    }

    /// `UPDATE` from a selector returning a [`record`](crate::record) of
    /// property assignments. Values may reference the row's current
    /// columns:
    ///
    /// ```ignore
    /// users.update_with(|u| record([("age", u.col("age") + 1)]), |u| u.col("id").eq(7))?;
    /// ```
    ///
    /// # Errors
    ///
    /// As for [`update`](Self::update).
    pub fn update_with(
        &self, assignments: impl FnOnce(Param) -> Expr, filter: impl FnOnce(Param) -> Expr,
    ) -> Result<u64> {
        self.apply_update(Lambda::of1(assignments), Lambda::of1(filter))
    }

    /// Writes every non-key column of `entity` to the row with the same
    /// primary key.
    ///
    /// # Errors
    ///
    /// Returns a usage error when the schema declares no primary key.
    pub fn update_entity(&self, entity: &T) -> Result<u64> {
        let Json::Object(mut object) = serde_json::to_value(entity)? else {
            return Err(usage!("`{}` entities must serialize to an object", self.name));
        };

        let mut keys = Map::new();
        for key in self.schema.keys() {
            let value = object.remove(&key.property).unwrap_or(Json::Null);
            keys.insert(key.property.clone(), value);
        }
        let keys = self.typed(keys)?;
        let assignments = self.without_identity(self.typed(object)?);
        let row = Param::new();
        let filter = keys
            .into_iter()
            .map(|(property, value)| row.col(&property).eq(value))
            .reduce(|all, next| all.and(next))
            .ok_or_else(|| usage!("`{}` has no primary key to update by", self.name))?;

        self.apply_update(Lambda::new(Vec::new(), Expr::New(assignments)), Lambda::new(vec![row], filter))
    }

    fn without_identity(&self, values: Vec<(String, Expr)>) -> Vec<(String, Expr)> {
        values
            .into_iter()
            .filter(|(property, _)| self.schema.column(property).is_some_and(|column| !column.identity))
            .collect()
    }

    fn apply_update(&self, assignments: Lambda, filter: Lambda) -> Result<u64> {
        let session = self.session.as_ref();
        let query = compile_update(
            session.dialect(),
            session.evaluator(),
            session.id(),
            &self.name,
            &self.schema,
            &assignments,
            &filter,
        )?;
        execute(session, &self.shard, &query)
    }
}
