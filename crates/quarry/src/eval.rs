//! Dynamic evaluation of literals: member access on captured object graphs,
//! method invocation, and constant folding of operators whose operands are
//! all known before the statement is rendered.

use std::cmp::Ordering;
use std::fmt::Debug;

use serde_json::{Number, Value as Json};

use crate::convert::value_to_json;
use crate::error::{Result, translation};
use crate::expr::{BinaryOp, Literal, UnaryOp};

/// Member and method access on literal values.
///
/// The compiler never inspects captured values itself; everything goes
/// through the session's evaluator.
pub trait Evaluator: Debug + Send + Sync {
    /// Reads `name` from `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the member does not exist.
    fn get_member(&self, target: &Literal, name: &str) -> Result<Literal>;

    /// Writes `value` to `name` on an object graph.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is not an object.
    fn set_member(&self, target: &mut Json, name: &str, value: Json) -> Result<()>;

    /// Invokes `method` on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the method is unknown for the receiver.
    fn invoke(&self, target: &Literal, method: &str, args: &[Literal]) -> Result<Literal>;
}

/// Evaluator over serde's data model.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEvaluator;

impl Evaluator for JsonEvaluator {
    fn get_member(&self, target: &Literal, name: &str) -> Result<Literal> {
        match target {
            Literal::Object(Json::Object(fields)) => fields
                .get(name)
                .cloned()
                .map(Literal::from_json)
                .ok_or_else(|| translation!("object has no member `{name}`")),
            Literal::List(items) if name == "len" => Ok(Literal::Value(len(items.len()))),
            other => Err(translation!("cannot read member `{name}` of {other:?}")),
        }
    }

    fn set_member(&self, target: &mut Json, name: &str, value: Json) -> Result<()> {
        let Json::Object(fields) = target else {
            return Err(translation!("cannot set member `{name}` on {target}"));
        };
        fields.insert(name.to_string(), value);
        Ok(())
    }

    fn invoke(&self, target: &Literal, method: &str, args: &[Literal]) -> Result<Literal> {
        let receiver = to_json(target);
        let result = match (&receiver, method, args) {
            (Json::String(s), "to_uppercase", []) => Json::String(s.to_uppercase()),
            (Json::String(s), "to_lowercase", []) => Json::String(s.to_lowercase()),
            (Json::String(s), "trim", []) => Json::String(s.trim().to_string()),
            (Json::String(s), "len", []) => Json::from(s.chars().count()),
            (Json::Array(items), "len", []) => Json::from(items.len()),
            (Json::Array(items), "first", []) => items.first().cloned().unwrap_or(Json::Null),
            (Json::Array(items), "last", []) => items.last().cloned().unwrap_or(Json::Null),
            (Json::Object(fields), "get", [key]) => {
                let key = to_json(key);
                let Json::String(key) = key else {
                    return Err(translation!("`get` expects a string key"));
                };
                fields.get(&key).cloned().unwrap_or(Json::Null)
            }
            _ => return Err(translation!("cannot invoke `{method}` on {receiver}")),
        };
        Ok(Literal::from_json(result))
    }
}

fn len(n: usize) -> sea_query::Value {
    sea_query::Value::from(u64::try_from(n).unwrap_or(u64::MAX))
}

fn to_json(literal: &Literal) -> Json {
    match literal {
        Literal::Value(value) => value_to_json(value),
        Literal::List(values) => Json::Array(values.iter().map(value_to_json).collect()),
        Literal::Object(json) => json.clone(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(json: &Json) -> Option<Self> {
        let Json::Number(n) = json else { return None };
        n.as_i64().map(Self::Int).or_else(|| n.as_f64().map(Self::Float))
    }

    #[allow(clippy::cast_precision_loss)]
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn json(self) -> Result<Json> {
        match self {
            Self::Int(i) => Ok(Json::from(i)),
            Self::Float(f) => Number::from_f64(f)
                .map(Json::Number)
                .ok_or_else(|| translation!("arithmetic produced a non-finite number")),
        }
    }
}

fn compare(left: &Json, right: &Json) -> Option<Ordering> {
    match (left, right) {
        (Json::Bool(l), Json::Bool(r)) => Some(l.cmp(r)),
        (Json::String(l), Json::String(r)) => Some(l.cmp(r)),
        _ => match (Num::of(left)?, Num::of(right)?) {
            (Num::Int(l), Num::Int(r)) => Some(l.cmp(&r)),
            (l, r) => l.as_f64().partial_cmp(&r.as_f64()),
        },
    }
}

fn equal(left: &Json, right: &Json) -> bool {
    match (Num::of(left), Num::of(right)) {
        (Some(l), Some(r)) => compare(&l.json().unwrap_or(Json::Null), &r.json().unwrap_or(Json::Null))
            == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn arithmetic(op: BinaryOp, left: Num, right: Num) -> Result<Num> {
    let overflow = || translation!("integer overflow folding {op:?}");
    match (left, right) {
        (Num::Int(l), Num::Int(r)) => {
            let value = match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div | BinaryOp::Mod if r == 0 => {
                    return Err(translation!("division by zero"));
                }
                BinaryOp::Div => l.checked_div(r),
                BinaryOp::Mod => l.checked_rem(r),
                _ => return Err(translation!("{op:?} is not arithmetic")),
            };
            value.map(Num::Int).ok_or_else(overflow)
        }
        (l, r) => {
            let (l, r) = (l.as_f64(), r.as_f64());
            let value = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Mod => l % r,
                _ => return Err(translation!("{op:?} is not arithmetic")),
            };
            Ok(Num::Float(value))
        }
    }
}

/// Executes `left op right` on two literals.
///
/// # Errors
///
/// Returns a translation error for operand types the operator does not
/// apply to, relational comparison against null, division by zero, and
/// integer overflow.
pub fn fold_binary(op: BinaryOp, left: &Literal, right: &Literal) -> Result<Literal> {
    let (l, r) = (to_json(left), to_json(right));
    let result = match op {
        BinaryOp::And | BinaryOp::Or => match (&l, &r) {
            (Json::Bool(a), Json::Bool(b)) => {
                Json::Bool(if op == BinaryOp::And { *a && *b } else { *a || *b })
            }
            _ => return Err(translation!("{op:?} expects booleans, found {l} and {r}")),
        },
        BinaryOp::Eq => Json::Bool(equal(&l, &r)),
        BinaryOp::Ne => Json::Bool(!equal(&l, &r)),
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            if l.is_null() || r.is_null() {
                return Err(translation!("{op:?} against null is not supported"));
            }
            let ordering =
                compare(&l, &r).ok_or_else(|| translation!("cannot compare {l} with {r}"))?;
            Json::Bool(match op {
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                BinaryOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
        BinaryOp::Add if l.is_string() || r.is_string() => {
            let text = |json: &Json| match json {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            Json::String(text(&l) + &text(&r))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match (Num::of(&l), Num::of(&r)) {
                (Some(a), Some(b)) => arithmetic(op, a, b)?.json()?,
                _ => return Err(translation!("{op:?} expects numbers, found {l} and {r}")),
            }
        }
    };
    Ok(Literal::from_json(result))
}

/// Executes `op operand` on a literal.
///
/// # Errors
///
/// Returns a translation error when the operand type does not fit the
/// operator.
pub fn fold_unary(op: UnaryOp, operand: &Literal) -> Result<Literal> {
    let json = to_json(operand);
    let result = match (op, &json) {
        (UnaryOp::Not, Json::Bool(b)) => Json::Bool(!b),
        (UnaryOp::Neg, _) => match Num::of(&json) {
            Some(Num::Int(i)) => Json::from(
                i.checked_neg().ok_or_else(|| translation!("integer overflow folding Neg"))?,
            ),
            Some(Num::Float(f)) => Num::Float(-f).json()?,
            None => return Err(translation!("Neg expects a number, found {json}")),
        },
        (UnaryOp::Not, other) => return Err(translation!("Not expects a boolean, found {other}")),
    };
    Ok(Literal::from_json(result))
}

/// Null-coalescing on two literals.
#[must_use]
pub fn fold_coalesce(value: &Literal, fallback: &Literal) -> Literal {
    if to_json(value).is_null() { fallback.clone() } else { value.clone() }
}

/// Substring, prefix, suffix, and membership tests on literals.
///
/// # Errors
///
/// Returns a translation error when the receiver is not text or a list.
pub fn fold_match(method: &str, target: &Literal, arg: &Literal) -> Result<Literal> {
    let (t, a) = (to_json(target), to_json(arg));
    let found = match (&t, &a, method) {
        (Json::String(s), Json::String(p), "contains") => s.contains(p.as_str()),
        (Json::String(s), Json::String(p), "starts_with") => s.starts_with(p.as_str()),
        (Json::String(s), Json::String(p), "ends_with") => s.ends_with(p.as_str()),
        (Json::Array(items), needle, "contains") => items.iter().any(|item| equal(item, needle)),
        _ => return Err(translation!("cannot evaluate `{method}` on {t} with {a}")),
    };
    Ok(Literal::Value(sea_query::Value::from(found)))
}

#[cfg(test)]
mod tests {
    use sea_query::Value;
    use serde_json::json;

    use super::*;

    fn v(value: impl Into<Value>) -> Literal {
        Literal::Value(value.into())
    }

    #[test]
    fn numeric_promotion() {
        assert_eq!(fold_binary(BinaryOp::Add, &v(1), &v(2)).unwrap(), v(3_i64));
        assert_eq!(fold_binary(BinaryOp::Mul, &v(2), &v(1.5)).unwrap(), v(3.0));
        assert_eq!(fold_binary(BinaryOp::Eq, &v(1), &v(1.0)).unwrap(), v(true));
        assert_eq!(fold_binary(BinaryOp::Lt, &v(1), &v(1.5)).unwrap(), v(true));
    }

    #[test]
    fn strings_concatenate_and_compare() {
        assert_eq!(fold_binary(BinaryOp::Add, &v("a"), &v("b")).unwrap(), v("ab"));
        assert_eq!(fold_binary(BinaryOp::Gt, &v("b"), &v("a")).unwrap(), v(true));
    }

    #[test]
    fn null_rules() {
        let null = Literal::Value(Value::String(None));
        assert_eq!(fold_binary(BinaryOp::Eq, &null, &Literal::Value(Value::Int(None))).unwrap(), v(true));
        assert_eq!(fold_binary(BinaryOp::Ne, &v(1), &null).unwrap(), v(true));
        fold_binary(BinaryOp::Gt, &v(1), &null).unwrap_err();
    }

    #[test]
    fn arithmetic_errors() {
        fold_binary(BinaryOp::Div, &v(1), &v(0)).unwrap_err();
        fold_binary(BinaryOp::Add, &v(i64::MAX), &v(1)).unwrap_err();
        fold_binary(BinaryOp::And, &v(1), &v(true)).unwrap_err();
        fold_unary(UnaryOp::Not, &v(1)).unwrap_err();
    }

    #[test]
    fn unary() {
        assert_eq!(fold_unary(UnaryOp::Not, &v(false)).unwrap(), v(true));
        assert_eq!(fold_unary(UnaryOp::Neg, &v(4)).unwrap(), v(-4_i64));
    }

    #[test]
    fn members_and_methods() {
        let evaluator = JsonEvaluator;
        let object = Literal::Object(json!({"min": 18, "tags": ["a", "b"]}));
        assert_eq!(evaluator.get_member(&object, "min").unwrap(), v(18_i64));
        assert!(matches!(evaluator.get_member(&object, "tags").unwrap(), Literal::List(_)));
        evaluator.get_member(&object, "max").unwrap_err();

        assert_eq!(evaluator.invoke(&v("ann"), "to_uppercase", &[]).unwrap(), v("ANN"));
        evaluator.invoke(&v(1), "to_uppercase", &[]).unwrap_err();

        let mut row = json!({"id": 0});
        evaluator.set_member(&mut row, "id", json!(7)).unwrap();
        assert_eq!(row, json!({"id": 7}));
    }

    #[test]
    fn matching() {
        assert_eq!(fold_match("contains", &v("hello"), &v("ell")).unwrap(), v(true));
        let list = Literal::List(vec![Value::from(1), Value::from(2)]);
        assert_eq!(fold_match("contains", &list, &v(2)).unwrap(), v(true));
        assert_eq!(fold_coalesce(&Literal::Value(Value::Int(None)), &v(3)), v(3));
    }
}
