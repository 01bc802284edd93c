//! # Schema model
//!
//! Declarative entity ↔ table metadata. An [`EntitySchema`] is immutable once
//! built and is resolved at most once per entity type through a
//! [`SchemaRegistry`].

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use sea_query::Value;
use serde_json::Value as Json;

use crate::convert::json_to_value;
use crate::entity::Entity;
use crate::error::{Result, schema_error, usage};

/// Storage type of a column. Drives parameter conversion on the way in and
/// value coercion on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTypeTag {
    /// Boolean.
    Bool,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Text.
    Text,
    /// Raw bytes.
    Binary,
    /// Calendar date.
    Date,
    /// Date and time without an offset.
    DateTime,
    /// Date and time (UTC).
    Timestamp,
    /// JSON document stored as text.
    Json,
}

/// Mapping of one entity property to one table column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    /// Property (struct field) name.
    pub property: String,
    /// Physical column name.
    pub column: String,
    /// Storage type.
    pub data_type: DataTypeTag,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Generated by the database on insert.
    pub identity: bool,
    /// `NOT NULL`.
    pub required: bool,
    /// Maximum length for text and binary columns.
    pub max_length: Option<usize>,
    /// Value used on insert when the property is null.
    pub default: Option<Value>,
}

impl ColumnSchema {
    /// Creates a required column whose name matches the property.
    #[must_use]
    pub fn new(property: impl Into<String>, data_type: DataTypeTag) -> Self {
        let property = property.into();
        Self {
            column: property.clone(),
            property,
            data_type,
            primary_key: false,
            identity: false,
            required: true,
            max_length: None,
            default: None,
        }
    }

    /// Maps the property to a differently named column.
    #[must_use]
    pub fn column_name(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as database generated. Identity columns are skipped
    /// on insert and written back afterwards.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Sets whether the column is `NOT NULL`.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Sets the insert default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Converts a property value to this column's storage type.
    ///
    /// # Errors
    ///
    /// Returns a usage error when text or bytes exceed `max_length`, or a
    /// materialize error when the value does not fit the storage type.
    pub fn bind(&self, json: &Json) -> Result<Value> {
        let value = json_to_value(json, self.data_type)?;
        let Some(max) = self.max_length else {
            return Ok(value);
        };
        let length = match &value {
            Value::String(Some(text)) => text.chars().count(),
            Value::Bytes(Some(bytes)) => bytes.len(),
            _ => 0,
        };
        if length > max {
            return Err(usage!("`{}` holds at most {max} characters, got {length}", self.property));
        }
        Ok(value)
    }

    /// Like [`bind`](Self::bind), but a null property takes the column
    /// default when one is declared.
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn bind_insert(&self, json: &Json) -> Result<Value> {
        match (&self.default, json) {
            (Some(default), Json::Null) => Ok(default.clone()),
            _ => self.bind(json),
        }
    }
}

/// Table name plus ordered column list for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    table: String,
    columns: Vec<ColumnSchema>,
}

impl EntitySchema {
    /// Starts a fluent schema registration for `table`.
    #[must_use]
    pub fn builder(table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Base table name (before shard or partition suffixes).
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Finds a column by property name.
    #[must_use]
    pub fn column(&self, property: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.property == property)
    }

    /// Finds a column by physical column name.
    #[must_use]
    pub fn by_column(&self, column: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.column.eq_ignore_ascii_case(column))
    }

    /// Primary key columns.
    pub fn keys(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|column| column.primary_key)
    }

    /// Columns an `INSERT` writes: every column but the identity.
    pub fn insertable(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|column| !column.identity)
    }

    /// The identity column, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.identity)
    }
}

/// Fluent [`EntitySchema`] registration.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    table: String,
    columns: Vec<ColumnSchema>,
}

impl SchemaBuilder {
    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// Validates and freezes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is blank, there are no columns,
    /// property names repeat, or more than one identity column is declared.
    pub fn build(self) -> Result<EntitySchema> {
        if self.table.trim().is_empty() {
            return Err(schema_error!("table name is blank"));
        }
        if self.columns.is_empty() {
            return Err(schema_error!("`{}` declares no columns", self.table));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.property.as_str()) {
                return Err(schema_error!(
                    "`{}` declares property `{}` more than once",
                    self.table,
                    column.property
                ));
            }
        }
        if self.columns.iter().filter(|column| column.identity).count() > 1 {
            return Err(schema_error!("`{}` declares more than one identity column", self.table));
        }

        Ok(EntitySchema {
            table: self.table,
            columns: self.columns,
        })
    }
}

static GLOBAL: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::default);

/// Per-type schema cache. Fluent registrations take precedence over the
/// schema an [`Entity`] declares for itself.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: DashMap<TypeId, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Registers (or replaces) the schema for `T`.
    pub fn register<T: 'static>(&self, schema: EntitySchema) {
        self.schemas.insert(TypeId::of::<T>(), Arc::new(schema));
    }

    /// Resolves the schema for `T`, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's declared schema is invalid.
    pub fn resolve<T: Entity>(&self) -> Result<Arc<EntitySchema>> {
        let type_id = TypeId::of::<T>();
        if let Some(schema) = self.schemas.get(&type_id) {
            return Ok(Arc::clone(schema.value()));
        }

        let schema = Arc::new(T::schema()?);
        tracing::debug!(table = schema.table(), columns = schema.columns().len(), "resolved schema");
        Ok(Arc::clone(self.schemas.entry(type_id).or_insert(schema).value()))
    }
}
