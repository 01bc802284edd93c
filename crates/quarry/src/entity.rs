use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::schema::{DataTypeTag, EntitySchema};

/// Trait for types that map to a database table.
///
/// Typically implemented via the `entity!` macro rather than manually. Entities
/// move in and out of the database through serde, so property names are the
/// serialized field names.
pub trait Entity: Serialize + DeserializeOwned + 'static {
    /// The base table name for this entity.
    const TABLE: &'static str;

    /// Declares the entity's schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared columns do not form a valid schema.
    fn schema() -> Result<EntitySchema>;
}

/// Rust types with a known column storage type.
pub trait SqlType {
    /// Storage type tag.
    const TAG: DataTypeTag;

    /// Whether the column is `NOT NULL`.
    const REQUIRED: bool = true;
}

macro_rules! sql_type {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl SqlType for $ty {
                const TAG: DataTypeTag = DataTypeTag::$tag;
            }
        )*
    };
}

sql_type! {
    bool => Bool,
    i8 => Int32,
    i16 => Int32,
    i32 => Int32,
    i64 => Int64,
    u8 => Int32,
    u16 => Int32,
    u32 => Int64,
    u64 => Int64,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Binary,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<Utc> => Timestamp,
    serde_json::Value => Json,
}

impl<T: SqlType> SqlType for Option<T> {
    const REQUIRED: bool = false;
    const TAG: DataTypeTag = T::TAG;
}

/// Declares an entity struct together with its schema.
///
/// Each field may be followed by `=> "Column"` to map it to a differently
/// named column and by `[flag, ...]` where each flag is a [`ColumnSchema`]
/// builder method (`primary_key`, `identity`).
///
/// [`ColumnSchema`]: crate::ColumnSchema
///
/// # Examples
///
/// ```ignore
/// entity! {
///     table = "User",
///     #[derive(Debug, Clone, Serialize, Deserialize)]
///     pub struct User {
///         pub id: i64 => "Id" [primary_key, identity],
///         pub name: String => "Name",
///         pub age: i32 => "Age",
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (
        table = $table:literal,
        $(#[$meta:meta])*
        $vis:vis struct $struct_name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field_name:ident : $field_type:ty
                    $(=> $column:literal)?
                    $([$($flag:ident),* $(,)?])?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $struct_name {
            $(
                $(#[$field_meta])*
                $field_vis $field_name : $field_type
            ),*
        }

        impl $crate::Entity for $struct_name {
            const TABLE: &'static str = $table;

            fn schema() -> $crate::Result<$crate::EntitySchema> {
                $crate::EntitySchema::builder($table)
                    $(
                        .column({
                            let column = $crate::ColumnSchema::new(
                                stringify!($field_name),
                                <$field_type as $crate::SqlType>::TAG,
                            )
                            .required(<$field_type as $crate::SqlType>::REQUIRED)
                            $(.column_name($column))?;
                            $($(let column = column.$flag();)*)?
                            column
                        })
                    )*
                    .build()
            }
        }
    };
}
