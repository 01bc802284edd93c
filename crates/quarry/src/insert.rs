use serde_json::Value as Json;

use crate::compile::{Query, compile_insert};
use crate::connection::Intent;
use crate::convert::datatype_to_json;
use crate::entity::Entity;
use crate::error::{Result, materialize, usage};
use crate::session::{connection_for, execute_on, fetch_on, transactional};
use crate::table::Table;

impl<T: Entity> Table<T> {
    /// Inserts one entity. Identity columns are left to the database; when
    /// the dialect can report the generated identity it is written back
    /// onto `entity`.
    ///
    /// # Errors
    ///
    /// Returns a usage error when the entity has no insertable column
    /// value or a value exceeds its column's maximum length, or the
    /// provider's error. Null properties take the column default.
    pub fn insert(&self, entity: &mut T) -> Result<u64> {
        let mut json = serde_json::to_value(&*entity)?;
        let Json::Object(object) = &json else {
            return Err(usage!("`{}` entities must serialize to an object", self.name));
        };

        let mut values = Vec::with_capacity(self.schema.columns().len());
        for column in self.schema.insertable() {
            let field = object.get(&column.property).unwrap_or(&Json::Null);
            values.push((column.property.clone(), column.bind_insert(field)?));
        }

        let dialect = self.session.dialect();
        let query = compile_insert(dialect, &self.name, &self.schema, values)?;

        // the identity query must run on the connection that inserted
        let conn = connection_for(self.session.as_ref(), Intent::Write, &self.shard)?;
        let affected = execute_on(conn.as_ref(), &query)?;

        if let (Some(identity), Some(sql)) = (self.schema.identity(), dialect.last_insert_id()) {
            let lookup = Query {
                sql: sql.to_string(),
                params: Vec::new(),
            };
            let rows = fetch_on(conn.as_ref(), &lookup)?;
            let value = rows
                .first()
                .and_then(|row| row.fields.first())
                .ok_or_else(|| materialize!("`{sql}` returned no identity"))?;
            let id = datatype_to_json(&value.value, Some(identity.data_type))?;

            self.session.evaluator().set_member(&mut json, &identity.property, id)?;
            *entity = serde_json::from_value(json)?;
        }
        Ok(affected)
    }

    /// Inserts every entity in one transaction: the session's current one,
    /// or a new one that commits after the last insert and rolls back on the
    /// first failure.
    ///
    /// # Errors
    ///
    /// Returns the first insert's error; nothing is committed in that case
    /// unless an outer transaction chooses to.
    pub fn insert_many(&self, entities: &mut [T]) -> Result<u64> {
        let count = entities.len();
        let affected = transactional(self.session.as_ref(), || {
            let mut affected = 0;
            for entity in entities.iter_mut() {
                affected += self.insert(entity)?;
            }
            Ok(affected)
        })?;
        tracing::debug!(table = %self.name, count, affected, "inserted batch");
        Ok(affected)
    }
}
