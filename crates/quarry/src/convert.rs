//! Value conversions between expression literals (`sea_query::Value`),
//! provider wire values ([`DataType`]) and serde's data model.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_query::Value;
use serde_json::{Map, Number, Value as Json};

use crate::connection::{DataType, Parameter};
use crate::error::{Result, materialize, translation, usage};
use crate::schema::DataTypeTag;

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// Outbound conversion
pub fn values_to_parameters(values: Vec<(String, Value)>) -> Result<Vec<Parameter>> {
    values
        .into_iter()
        .map(|(name, value)| Ok(Parameter { name, value: value_to_datatype(value)? }))
        .collect()
}

fn value_to_datatype(value: Value) -> Result<DataType> {
    let data_type = match value {
        Value::Bool(v) => DataType::Boolean(v),
        Value::TinyInt(v) => DataType::Int32(v.map(i32::from)),
        Value::SmallInt(v) => DataType::Int32(v.map(i32::from)),
        Value::Int(v) => DataType::Int32(v),
        Value::BigInt(v) => DataType::Int64(v),
        Value::TinyUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::SmallUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::Unsigned(v) => DataType::Uint32(v),
        Value::BigUnsigned(v) => DataType::Uint64(v),
        Value::Float(v) => DataType::Float(v),
        Value::Double(v) => DataType::Double(v),
        Value::String(v) => DataType::Str(v.map(|value| *value)),
        Value::Char(v) => DataType::Str(v.map(|ch| ch.to_string())),
        Value::Bytes(v) => DataType::Binary(v.map(|bytes| *bytes)),
        Value::ChronoDate(v) => DataType::Date(v.map(|value| value.to_string())),
        Value::ChronoTime(v) => DataType::Time(v.map(|value| value.to_string())),
        Value::ChronoDateTime(v) => {
            DataType::Timestamp(v.map(|value| value.format(NAIVE_FORMAT).to_string()))
        }
        Value::ChronoDateTimeUtc(v) => DataType::Timestamp(v.map(|value| value.to_rfc3339())),
        Value::ChronoDateTimeLocal(v) => DataType::Timestamp(v.map(|value| value.to_rfc3339())),
        Value::ChronoDateTimeWithTimeZone(v) => {
            DataType::Timestamp(v.map(|value| value.to_rfc3339()))
        }
        #[allow(unreachable_patterns)]
        other => return Err(translation!("unsupported parameter value {other:?}")),
    };
    Ok(data_type)
}

/// Storage tag a literal would be stored as, used for result-type inference.
pub const fn value_tag(value: &Value) -> Option<DataTypeTag> {
    let tag = match value {
        Value::Bool(_) => DataTypeTag::Bool,
        Value::TinyInt(_)
        | Value::SmallInt(_)
        | Value::Int(_)
        | Value::TinyUnsigned(_)
        | Value::SmallUnsigned(_) => DataTypeTag::Int32,
        Value::BigInt(_) | Value::Unsigned(_) | Value::BigUnsigned(_) => DataTypeTag::Int64,
        Value::Float(_) => DataTypeTag::Float,
        Value::Double(_) => DataTypeTag::Double,
        Value::String(_) | Value::Char(_) => DataTypeTag::Text,
        Value::Bytes(_) => DataTypeTag::Binary,
        Value::ChronoDate(_) => DataTypeTag::Date,
        Value::ChronoDateTime(_) => DataTypeTag::DateTime,
        Value::ChronoDateTimeUtc(_)
        | Value::ChronoDateTimeLocal(_)
        | Value::ChronoDateTimeWithTimeZone(_) => DataTypeTag::Timestamp,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(tag)
}

/// Renders a literal in serde's data model.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(v) => v.map_or(Json::Null, Json::Bool),
        Value::TinyInt(v) => v.map_or(Json::Null, Json::from),
        Value::SmallInt(v) => v.map_or(Json::Null, Json::from),
        Value::Int(v) => v.map_or(Json::Null, Json::from),
        Value::BigInt(v) => v.map_or(Json::Null, Json::from),
        Value::TinyUnsigned(v) => v.map_or(Json::Null, Json::from),
        Value::SmallUnsigned(v) => v.map_or(Json::Null, Json::from),
        Value::Unsigned(v) => v.map_or(Json::Null, Json::from),
        Value::BigUnsigned(v) => v.map_or(Json::Null, Json::from),
        Value::Float(v) => v.map_or(Json::Null, |f| float(f64::from(f))),
        Value::Double(v) => v.map_or(Json::Null, float),
        Value::String(v) => v.as_ref().map_or(Json::Null, |s| Json::String(s.to_string())),
        Value::Char(v) => v.map_or(Json::Null, |ch| Json::String(ch.to_string())),
        Value::Bytes(v) => v.as_ref().map_or(Json::Null, |bytes| Json::from(bytes.to_vec())),
        Value::ChronoDate(v) => v.as_ref().map_or(Json::Null, |d| Json::String(d.to_string())),
        Value::ChronoTime(v) => v.as_ref().map_or(Json::Null, |t| Json::String(t.to_string())),
        Value::ChronoDateTime(v) => v.as_ref().map_or(Json::Null, |dt| {
            Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        Value::ChronoDateTimeUtc(v) => {
            v.as_ref().map_or(Json::Null, |dt| Json::String(dt.to_rfc3339()))
        }
        Value::ChronoDateTimeLocal(v) => {
            v.as_ref().map_or(Json::Null, |dt| Json::String(dt.to_rfc3339()))
        }
        Value::ChronoDateTimeWithTimeZone(v) => {
            v.as_ref().map_or(Json::Null, |dt| Json::String(dt.to_rfc3339()))
        }
        #[allow(unreachable_patterns)]
        _ => Json::Null,
    }
}

fn float(value: f64) -> Json {
    Number::from_f64(value).map_or(Json::Null, Json::Number)
}

/// True when the literal is SQL `NULL`.
pub fn is_null(value: &Value) -> bool {
    value_to_json(value).is_null()
}

/// Converts a scalar JSON value to a literal without a declared storage type.
/// Returns `None` for arrays and objects.
pub fn json_to_untyped(json: &Json) -> Option<Value> {
    let value = match json {
        Json::Null => Value::String(None),
        Json::Bool(b) => Value::from(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::from(s.clone()),
        Json::Array(_) | Json::Object(_) => return None,
    };
    Some(value)
}

/// Converts a property value to a literal of the column's storage type.
pub fn json_to_value(json: &Json, tag: DataTypeTag) -> Result<Value> {
    if json.is_null() {
        return Ok(typed_null(tag));
    }

    let mismatch = || usage!("cannot store {json} as {tag:?}");
    let value = match tag {
        DataTypeTag::Bool => Value::from(json.as_bool().ok_or_else(mismatch)?),
        DataTypeTag::Int32 => {
            let n = json.as_i64().ok_or_else(mismatch)?;
            Value::from(i32::try_from(n).map_err(|_| mismatch())?)
        }
        DataTypeTag::Int64 => match json.as_i64() {
            Some(n) => Value::from(n),
            None => Value::from(json.as_u64().ok_or_else(mismatch)?),
        },
        #[allow(clippy::cast_possible_truncation)]
        DataTypeTag::Float => Value::from(json.as_f64().ok_or_else(mismatch)? as f32),
        DataTypeTag::Double => Value::from(json.as_f64().ok_or_else(mismatch)?),
        DataTypeTag::Text => match json {
            Json::String(s) => Value::from(s.clone()),
            other => Value::from(other.to_string()),
        },
        DataTypeTag::Binary => {
            let bytes: Vec<u8> = serde_json::from_value(json.clone()).map_err(|_| mismatch())?;
            Value::from(bytes)
        }
        DataTypeTag::Date => {
            let raw = json.as_str().ok_or_else(mismatch)?;
            Value::from(raw.parse::<NaiveDate>().map_err(|_| mismatch())?)
        }
        DataTypeTag::DateTime => {
            let raw = json.as_str().ok_or_else(mismatch)?;
            Value::from(parse_naive(raw).ok_or_else(mismatch)?)
        }
        DataTypeTag::Timestamp => {
            let raw = json.as_str().ok_or_else(mismatch)?;
            Value::from(parse_timestamp(raw).ok_or_else(mismatch)?)
        }
        DataTypeTag::Json => Value::from(json.to_string()),
    };
    Ok(value)
}

const fn typed_null(tag: DataTypeTag) -> Value {
    match tag {
        DataTypeTag::Bool => Value::Bool(None),
        DataTypeTag::Int32 => Value::Int(None),
        DataTypeTag::Int64 => Value::BigInt(None),
        DataTypeTag::Float => Value::Float(None),
        DataTypeTag::Double => Value::Double(None),
        DataTypeTag::Text | DataTypeTag::Json => Value::String(None),
        DataTypeTag::Binary => Value::Bytes(None),
        DataTypeTag::Date => Value::ChronoDate(None),
        DataTypeTag::DateTime => Value::ChronoDateTime(None),
        DataTypeTag::Timestamp => Value::ChronoDateTimeUtc(None),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    parse_naive(raw).map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

// Inbound conversion

/// Converts a result column into serde's data model, coercing towards the
/// expected storage type when one is known.
pub fn datatype_to_json(value: &DataType, tag: Option<DataTypeTag>) -> Result<Json> {
    if value.is_null() {
        return Ok(Json::Null);
    }
    match tag {
        None => Ok(natural(value)),
        Some(DataTypeTag::Bool) => as_bool(value).map(Json::Bool),
        Some(DataTypeTag::Int32 | DataTypeTag::Int64) => as_integer(value),
        Some(DataTypeTag::Float | DataTypeTag::Double) => as_f64(value).map(float),
        Some(DataTypeTag::Text) => Ok(match natural(value) {
            Json::String(s) => Json::String(s),
            other => Json::String(other.to_string()),
        }),
        Some(DataTypeTag::Binary) => as_binary(value).map(Json::from),
        Some(DataTypeTag::Date) => as_date(value).map(|d| Json::String(d.to_string())),
        Some(DataTypeTag::DateTime) => as_naive(value)
            .map(|dt| Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Some(DataTypeTag::Timestamp) => as_timestamp(value).map(|dt| Json::String(dt.to_rfc3339())),
        Some(DataTypeTag::Json) => as_json(value),
    }
}

fn natural(value: &DataType) -> Json {
    match value {
        DataType::Boolean(Some(v)) => Json::Bool(*v),
        DataType::Int32(Some(v)) => Json::from(*v),
        DataType::Int64(Some(v)) => Json::from(*v),
        DataType::Uint32(Some(v)) => Json::from(*v),
        DataType::Uint64(Some(v)) => Json::from(*v),
        DataType::Float(Some(v)) => float(f64::from(*v)),
        DataType::Double(Some(v)) => float(*v),
        DataType::Str(Some(s))
        | DataType::Date(Some(s))
        | DataType::Time(Some(s))
        | DataType::Timestamp(Some(s)) => Json::String(s.clone()),
        DataType::Binary(Some(bytes)) => Json::from(bytes.clone()),
        _ => Json::Null,
    }
}

fn as_bool(value: &DataType) -> Result<bool> {
    match value {
        DataType::Boolean(Some(v)) => Ok(*v),
        DataType::Int32(Some(v)) => Ok(*v != 0),
        DataType::Int64(Some(v)) => Ok(*v != 0),
        DataType::Uint32(Some(v)) => Ok(*v != 0),
        DataType::Uint64(Some(v)) => Ok(*v != 0),
        DataType::Str(Some(s)) => match s.as_str() {
            "1" | "true" | "TRUE" => Ok(true),
            "0" | "false" | "FALSE" => Ok(false),
            _ => Err(materialize!("expected boolean, found `{s}`")),
        },
        other => Err(materialize!("expected boolean data type, found {other:?}")),
    }
}

fn as_integer(value: &DataType) -> Result<Json> {
    match value {
        DataType::Boolean(Some(v)) => Ok(Json::from(i64::from(*v))),
        DataType::Int32(Some(v)) => Ok(Json::from(*v)),
        DataType::Int64(Some(v)) => Ok(Json::from(*v)),
        DataType::Uint32(Some(v)) => Ok(Json::from(*v)),
        DataType::Uint64(Some(v)) => Ok(Json::from(*v)),
        #[allow(clippy::cast_possible_truncation)]
        DataType::Double(Some(v)) if v.fract() == 0.0 => Ok(Json::from(*v as i64)),
        DataType::Str(Some(s)) => s
            .trim()
            .parse::<i64>()
            .map(Json::from)
            .map_err(|_| materialize!("expected integer, found `{s}`")),
        other => Err(materialize!("expected integer data type, found {other:?}")),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &DataType) -> Result<f64> {
    match value {
        DataType::Int32(Some(v)) => Ok(f64::from(*v)),
        DataType::Int64(Some(v)) => Ok(*v as f64),
        DataType::Uint32(Some(v)) => Ok(f64::from(*v)),
        DataType::Uint64(Some(v)) => Ok(*v as f64),
        DataType::Float(Some(v)) => Ok(f64::from(*v)),
        DataType::Double(Some(v)) => Ok(*v),
        DataType::Str(Some(s)) => {
            s.trim().parse::<f64>().map_err(|_| materialize!("expected number, found `{s}`"))
        }
        other => Err(materialize!("expected floating point data type, found {other:?}")),
    }
}

fn as_binary(value: &DataType) -> Result<Vec<u8>> {
    match value {
        DataType::Binary(Some(bytes)) => Ok(bytes.clone()),
        DataType::Str(Some(s)) => Ok(s.as_bytes().to_vec()),
        other => Err(materialize!("expected binary data type, found {other:?}")),
    }
}

fn as_date(value: &DataType) -> Result<NaiveDate> {
    match value {
        DataType::Date(Some(raw)) | DataType::Str(Some(raw)) | DataType::Timestamp(Some(raw)) => {
            let prefix = raw.get(..10).unwrap_or(raw);
            NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
                .map_err(|_| materialize!("unsupported date: {raw}; expected \"%Y-%m-%d\" format"))
        }
        other => Err(materialize!("expected date data type, found {other:?}")),
    }
}

fn as_naive(value: &DataType) -> Result<NaiveDateTime> {
    match value {
        DataType::Timestamp(Some(raw)) | DataType::Str(Some(raw)) => parse_naive(raw)
            .ok_or_else(|| materialize!("unsupported date time: {raw}; expected \"{NAIVE_FORMAT}\"")),
        DataType::Date(Some(raw)) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|_| materialize!("unsupported date: {raw}")),
        other => Err(materialize!("expected timestamp data type, found {other:?}")),
    }
}

fn as_timestamp(value: &DataType) -> Result<DateTime<Utc>> {
    match value {
        DataType::Timestamp(Some(raw)) | DataType::Str(Some(raw)) => {
            parse_timestamp(raw).ok_or_else(|| {
                materialize!(
                    "unsupported timestamp: {raw}; expected RFC3339 or \"{NAIVE_FORMAT}\" format"
                )
            })
        }
        DataType::Int64(Some(seconds)) => DateTime::from_timestamp(*seconds, 0)
            .ok_or_else(|| materialize!("timestamp {seconds} out of range")),
        other => Err(materialize!("expected timestamp data type, found {other:?}")),
    }
}

fn as_json(value: &DataType) -> Result<Json> {
    match value {
        DataType::Str(Some(raw)) => Ok(serde_json::from_str(raw)?),
        DataType::Binary(Some(bytes)) => Ok(serde_json::from_slice(bytes)?),
        other => Ok(natural(other)),
    }
}

/// Builds a JSON object from `(name, value)` pairs.
pub fn object(fields: impl IntoIterator<Item = (String, Json)>) -> Json {
    Json::Object(fields.into_iter().collect::<Map<_, _>>())
}
