//! Result rows to typed values.
//!
//! Rows go through serde's data model: each row becomes a JSON value shaped
//! like the projection (an object keyed by property or field name, or a bare
//! value for single-column results) and is then deserialized into the
//! requested type. Column positions are resolved against the first row and
//! reused for the rest of the result set.

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::compile::RowShape;
use crate::connection::Row;
use crate::convert::{datatype_to_json, object};
use crate::error::{Result, materialize};
use crate::schema::{DataTypeTag, EntitySchema};

#[derive(Debug)]
struct Slot {
    index: usize,
    key: String,
    tag: Option<DataTypeTag>,
}

/// Converts the rows of one result set.
#[derive(Debug)]
pub struct Materializer<'a> {
    shape: &'a RowShape,
    slots: Option<Vec<Slot>>,
}

impl<'a> Materializer<'a> {
    /// A materializer for rows of `shape`.
    #[must_use]
    pub const fn new(shape: &'a RowShape) -> Self {
        Self { shape, slots: None }
    }

    /// Converts one row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Materialize`] when a column is missing or
    /// cannot be coerced to the target type.
    pub fn row<T: DeserializeOwned>(&mut self, row: &Row) -> Result<T> {
        let json = self.json(row)?;
        serde_json::from_value(json).map_err(|err| materialize!("cannot build row: {err}"))
    }

    fn json(&mut self, row: &Row) -> Result<Json> {
        if let RowShape::Scalar(name, tag) = self.shape {
            let field = row.fields.first().ok_or_else(|| materialize!("row has no `{name}` column"))?;
            return datatype_to_json(&field.value, *tag);
        }

        if self.slots.is_none() {
            self.slots = Some(resolve(self.shape, row)?);
        }
        let slots = self.slots.as_deref().unwrap_or_default();

        let mut fields = Vec::with_capacity(slots.len());
        for slot in slots {
            let field = row
                .fields
                .get(slot.index)
                .ok_or_else(|| materialize!("row is missing column `{}`", slot.key))?;
            let value = datatype_to_json(&field.value, slot.tag)
                .map_err(|err| materialize!("column `{}`: {err}", slot.key))?;
            fields.push((slot.key.clone(), value));
        }
        Ok(object(fields))
    }
}

/// Converts every row of a result set.
///
/// # Errors
///
/// Returns the first conversion failure.
pub fn materialize<T: DeserializeOwned>(shape: &RowShape, rows: &[Row]) -> Result<Vec<T>> {
    let mut materializer = Materializer::new(shape);
    rows.iter().map(|row| materializer.row(row)).collect()
}

// Column lookup by name, ignoring case, falling back to select-list position
// for providers that do not report names.
fn resolve(shape: &RowShape, row: &Row) -> Result<Vec<Slot>> {
    if let RowShape::Entity(schema) = shape
        && row.fields.iter().all(|field| !field.name.is_empty())
    {
        return entity_slots(schema, row);
    }

    let wanted: Vec<(String, &str, Option<DataTypeTag>)> = match shape {
        RowShape::Entity(schema) => schema
            .columns()
            .iter()
            .map(|column| (column.property.clone(), column.column.as_str(), Some(column.data_type)))
            .collect(),
        RowShape::Record(fields) => {
            fields.iter().map(|(name, tag)| (name.clone(), name.as_str(), *tag)).collect()
        }
        RowShape::Scalar(name, tag) => vec![(name.clone(), name.as_str(), *tag)],
    };

    wanted
        .into_iter()
        .enumerate()
        .map(|(position, (key, column, tag))| {
            let index = row
                .fields
                .iter()
                .position(|field| field.name.eq_ignore_ascii_case(column))
                .or_else(|| row.fields.get(position).filter(|field| field.name.is_empty()).map(|_| position))
                .ok_or_else(|| materialize!("result has no column `{column}`"))?;
            Ok(Slot { index, key, tag })
        })
        .collect()
}

// Named result columns mapped onto the schema. Unmapped columns are ignored
// and the first of two same-named columns wins.
fn entity_slots(schema: &EntitySchema, row: &Row) -> Result<Vec<Slot>> {
    let mut slots: Vec<Slot> = Vec::with_capacity(schema.columns().len());
    for (index, field) in row.fields.iter().enumerate() {
        let Some(column) = schema.by_column(&field.name) else {
            continue;
        };
        if slots.iter().all(|slot| slot.key != column.property) {
            slots.push(Slot {
                index,
                key: column.property.clone(),
                tag: Some(column.data_type),
            });
        }
    }
    if let Some(missing) = schema.columns().iter().find(|column| slots.iter().all(|slot| slot.key != column.property)) {
        return Err(materialize!("result has no column `{}`", missing.column));
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;
    use crate::connection::{DataType, Field};
    use crate::schema::ColumnSchema;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
        active: bool,
    }

    fn field(name: &str, value: DataType) -> Field {
        Field {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn entity_rows_map_columns_to_properties() {
        let schema = EntitySchema::builder("User")
            .column(ColumnSchema::new("id", DataTypeTag::Int64).column_name("Id"))
            .column(ColumnSchema::new("name", DataTypeTag::Text).column_name("Name"))
            .column(ColumnSchema::new("active", DataTypeTag::Bool).column_name("Active"))
            .build()
            .unwrap();
        let shape = RowShape::Entity(Arc::new(schema));

        // column order differs from the schema; sqlite reports booleans as integers
        let rows = vec![
            Row {
                fields: vec![
                    field("Name", DataType::Str(Some("Ann".into()))),
                    field("Id", DataType::Int64(Some(1))),
                    field("Active", DataType::Int64(Some(1))),
                ],
            },
            Row {
                fields: vec![
                    field("Name", DataType::Str(Some("Bob".into()))),
                    field("Id", DataType::Int64(Some(2))),
                    field("Active", DataType::Int64(Some(0))),
                ],
            },
        ];

        let users: Vec<User> = materialize(&shape, &rows).unwrap();
        assert_eq!(users[0], User { id: 1, name: "Ann".into(), active: true });
        assert_eq!(users[1], User { id: 2, name: "Bob".into(), active: false });
    }

    #[test]
    fn entity_rows_ignore_unmapped_columns() {
        let schema = EntitySchema::builder("User")
            .column(ColumnSchema::new("id", DataTypeTag::Int64).column_name("Id"))
            .column(ColumnSchema::new("name", DataTypeTag::Text).column_name("Name"))
            .column(ColumnSchema::new("active", DataTypeTag::Bool).column_name("Active"))
            .build()
            .unwrap();
        let shape = RowShape::Entity(Arc::new(schema));

        let rows = vec![Row {
            fields: vec![
                field("rowid", DataType::Int64(Some(99))),
                field("ACTIVE", DataType::Boolean(Some(true))),
                field("id", DataType::Int64(Some(4))),
                field("name", DataType::Str(Some("Dee".into()))),
                field("Id", DataType::Int64(Some(5))),
            ],
        }];
        let users: Vec<User> = materialize(&shape, &rows).unwrap();
        assert_eq!(users[0], User { id: 4, name: "Dee".into(), active: true });

        let rows = vec![Row {
            fields: vec![field("Id", DataType::Int64(Some(1))), field("Name", DataType::Str(None))],
        }];
        let err = materialize::<User>(&shape, &rows).unwrap_err();
        assert_eq!(err.to_string(), "materialize: result has no column `Active`");
    }

    #[test]
    fn scalars_and_records() {
        let shape = RowShape::Scalar("Count".to_string(), Some(DataTypeTag::Int64));
        let rows = vec![Row {
            fields: vec![field("COUNT(*)", DataType::Int64(Some(3)))],
        }];
        let counts: Vec<u64> = materialize(&shape, &rows).unwrap();
        assert_eq!(counts, vec![3]);

        #[derive(Debug, Deserialize)]
        struct Pair {
            name: String,
            total: Option<f64>,
        }
        let shape = RowShape::Record(vec![
            ("name".to_string(), Some(DataTypeTag::Text)),
            ("total".to_string(), Some(DataTypeTag::Double)),
        ]);
        let rows = vec![Row {
            fields: vec![field("name", DataType::Str(Some("x".into()))), field("total", DataType::Double(None))],
        }];
        let pairs: Vec<Pair> = materialize(&shape, &rows).unwrap();
        assert_eq!(pairs[0].name, "x");
        assert!(pairs[0].total.is_none());
    }

    #[test]
    fn missing_column_is_reported() {
        let shape = RowShape::Record(vec![("name".to_string(), None)]);
        let rows = vec![Row {
            fields: vec![field("other", DataType::Str(None))],
        }];
        let err = materialize::<Json>(&shape, &rows).unwrap_err();
        assert!(err.to_string().contains("`name`"));
    }
}
