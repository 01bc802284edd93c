//! Recursive translation of expression trees into SQL fragments.
//!
//! Each node produces a [`ParseResult`]: either rendered SQL or a literal
//! that has not been parameterized yet. Operators whose operands are all
//! literal are folded instead of rendered, so arithmetic closed over local
//! values never reaches the database.

use sea_query::Value;
use serde_json::Value as Json;

use super::RowShape;
use super::like;
use crate::context::{QueryContext, SessionId};
use crate::convert::{is_null, json_to_value, value_tag, value_to_json};
use crate::dialect::{Aggregate, Clock, Dialect};
use crate::error::{Result, translation, usage};
use crate::eval::{Evaluator, fold_binary, fold_coalesce, fold_match, fold_unary};
use crate::expr::{BinaryOp, Expr, Lambda, Literal, Method, Param, UnaryOp};
use crate::schema::DataTypeTag;

/// Binding strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    Or,
    And,
    Not,
    Cmp,
    Add,
    Mul,
    Neg,
    Atom,
}

const fn operator(op: BinaryOp) -> (Prec, &'static str) {
    match op {
        BinaryOp::Or => (Prec::Or, " OR "),
        BinaryOp::And => (Prec::And, " AND "),
        BinaryOp::Eq => (Prec::Cmp, "="),
        BinaryOp::Ne => (Prec::Cmp, "<>"),
        BinaryOp::Gt => (Prec::Cmp, ">"),
        BinaryOp::Ge => (Prec::Cmp, ">="),
        BinaryOp::Lt => (Prec::Cmp, "<"),
        BinaryOp::Le => (Prec::Cmp, "<="),
        BinaryOp::Add => (Prec::Add, "+"),
        BinaryOp::Sub => (Prec::Add, "-"),
        BinaryOp::Mul => (Prec::Mul, "*"),
        BinaryOp::Div => (Prec::Mul, "/"),
        BinaryOp::Mod => (Prec::Mul, "%"),
    }
}

/// Rendered SQL plus what the parent needs to know to embed it.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub text: String,
    pub prec: Prec,
    /// Operator at the root, for chain flattening.
    pub op: Option<BinaryOp>,
    /// Whether the fragment is a boolean condition rather than a value.
    pub predicate: bool,
    /// Inferred storage type.
    pub tag: Option<DataTypeTag>,
    /// Source column name when the fragment is a bare column reference.
    pub column: Option<String>,
}

impl Fragment {
    fn atom(text: String, tag: Option<DataTypeTag>) -> Self {
        Self {
            text,
            prec: Prec::Atom,
            op: None,
            predicate: false,
            tag,
            column: None,
        }
    }

    fn condition(text: String, prec: Prec, op: Option<BinaryOp>) -> Self {
        Self {
            text,
            prec,
            op,
            predicate: true,
            tag: Some(DataTypeTag::Bool),
            column: None,
        }
    }

    /// Text for embedding under an operator of precedence `outer`.
    fn embed(&self, outer: Prec, outer_op: Option<BinaryOp>, right: bool) -> String {
        let same_chain = matches!(outer_op, Some(BinaryOp::And | BinaryOp::Or)) && self.op == outer_op;
        // `a--b` would open a line comment
        let leading_minus = right && outer_op == Some(BinaryOp::Sub) && self.text.starts_with('-');
        let parens = self.prec < outer
            || (self.prec == outer && outer == Prec::Cmp)
            || (self.prec == outer && right && !same_chain)
            || leading_minus;
        if parens { format!("({})", self.text) } else { self.text.clone() }
    }
}

/// A translated node.
#[derive(Debug, Clone)]
pub enum ParseResult {
    Sql(Fragment),
    Literal(Literal),
}

impl ParseResult {
    /// True when the node rendered to SQL and needs no parameter.
    pub const fn contains_sql(&self) -> bool {
        matches!(self, Self::Sql(_))
    }

    fn is_null(&self) -> bool {
        matches!(self, Self::Literal(Literal::Value(value)) if is_null(value))
    }
}

/// A translated condition.
#[derive(Debug, Clone)]
pub enum Condition {
    Sql(Fragment),
    Always(bool),
}

/// What a lambda parameter is bound to.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Table alias; `None` renders bare column names.
    pub alias: Option<String>,
    pub shape: RowShape,
}

impl Binding {
    fn column(&self, property: &str) -> Option<(String, Option<DataTypeTag>)> {
        match &self.shape {
            RowShape::Entity(schema) => {
                schema.column(property).map(|column| (column.column.clone(), Some(column.data_type)))
            }
            RowShape::Record(fields) => {
                fields.iter().find(|(name, _)| name == property).map(|(name, tag)| (name.clone(), *tag))
            }
            RowShape::Scalar(..) => None,
        }
    }
}

/// Lambda parameters in scope, innermost query first.
#[derive(Debug)]
pub struct Scope<'a> {
    bindings: Vec<(Param, Binding)>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Binds `params` positionally to `sources`.
    pub fn bind(params: &[Param], sources: &[Binding], parent: Option<&'a Scope<'a>>) -> Result<Self> {
        if params.len() > sources.len() {
            return Err(translation!(
                "expression takes {} parameters but only {} sources are in scope",
                params.len(),
                sources.len()
            ));
        }
        Ok(Self {
            bindings: params.iter().copied().zip(sources.iter().cloned()).collect(),
            parent,
        })
    }

    fn lookup(&self, param: Param) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, binding)| binding)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(param)))
    }
}

/// Statement-wide translation state: parameters collected so far and the
/// next free table alias.
pub struct Translator<'s> {
    pub(super) dialect: &'s dyn Dialect,
    pub(super) evaluator: &'s dyn Evaluator,
    pub(super) session: SessionId,
    params: Vec<(String, Value)>,
    aliases: usize,
}

impl<'s> Translator<'s> {
    pub fn new(dialect: &'s dyn Dialect, evaluator: &'s dyn Evaluator, session: SessionId) -> Self {
        Self {
            dialect,
            evaluator,
            session,
            params: Vec::new(),
            aliases: 0,
        }
    }

    /// Parameters in placeholder order.
    pub fn finish(self) -> Vec<(String, Value)> {
        self.params
    }

    pub fn alias(&mut self) -> String {
        let alias = format!("t{}", self.aliases);
        self.aliases += 1;
        alias
    }

    pub fn parameter(&mut self, value: Value) -> String {
        let name = self.dialect.parameter_name(self.params.len());
        self.params.push((name.clone(), value));
        name
    }

    /// `alias.[column]`, or `[column]` without an alias.
    pub fn qualify(&self, alias: Option<&str>, column: &str) -> String {
        let quoted = self.dialect.quote(column);
        alias.map_or_else(|| quoted.clone(), |alias| format!("{alias}.{quoted}"))
    }

    pub(super) fn check_session(&self, ctx: &QueryContext) -> Result<()> {
        if ctx.session() == self.session {
            Ok(())
        } else {
            Err(usage!("queries from different sessions cannot be combined"))
        }
    }

    /// Renders a value; literals become parameters.
    pub fn value(&mut self, result: ParseResult) -> Result<Fragment> {
        match result {
            ParseResult::Sql(fragment) => Ok(fragment),
            ParseResult::Literal(Literal::Value(value)) => {
                let tag = value_tag(&value);
                Ok(Fragment::atom(self.parameter(value), tag))
            }
            ParseResult::Literal(Literal::Object(json)) => {
                Ok(Fragment::atom(self.parameter(Value::from(json.to_string())), Some(DataTypeTag::Json)))
            }
            ParseResult::Literal(Literal::List(_)) => {
                Err(translation!("a list cannot be used as a single value"))
            }
        }
    }

    /// Renders a condition; a SQL value becomes `value = true`.
    pub fn predicate(&mut self, result: ParseResult) -> Result<Fragment> {
        match result {
            ParseResult::Sql(fragment) if fragment.predicate => Ok(fragment),
            ParseResult::Sql(fragment) => {
                let truth = self.parameter(Value::from(true));
                let text = format!("{}={truth}", fragment.embed(Prec::Cmp, None, false));
                Ok(Fragment::condition(text, Prec::Cmp, Some(BinaryOp::Eq)))
            }
            ParseResult::Literal(literal) => {
                Err(translation!("constant {literal:?} used where a condition is required"))
            }
        }
    }

    /// Translates a boolean lambda over `sources`.
    pub fn condition(&mut self, lambda: &Lambda, sources: &[Binding], parent: Option<&Scope<'_>>) -> Result<Condition> {
        let scope = Scope::bind(&lambda.params, sources, parent)?;
        match self.translate(&lambda.body, &scope)? {
            ParseResult::Literal(Literal::Value(Value::Bool(Some(value)))) => Ok(Condition::Always(value)),
            ParseResult::Literal(other) => {
                Err(translation!("condition folds to non-boolean constant {other:?}"))
            }
            sql => Ok(Condition::Sql(self.predicate(sql)?)),
        }
    }

    /// Conjunction of several conditions. Rendered conditions are kept even
    /// next to a constant false so that every collected parameter appears in
    /// the text.
    pub fn conjoin(&self, conditions: Vec<Condition>) -> Condition {
        let mut rendered = Vec::new();
        let mut always_false = false;
        for condition in conditions {
            match condition {
                Condition::Always(true) => {}
                Condition::Always(false) => always_false = true,
                Condition::Sql(fragment) => rendered.push(fragment),
            }
        }
        if rendered.is_empty() {
            return Condition::Always(!always_false);
        }
        if always_false {
            let constant = self.dialect.constant_condition(false).to_string();
            rendered.push(Fragment::condition(constant, Prec::Cmp, None));
        }
        if rendered.len() == 1 {
            return Condition::Sql(rendered.remove(0));
        }
        let text = rendered
            .iter()
            .map(|fragment| fragment.embed(Prec::And, Some(BinaryOp::And), false))
            .collect::<Vec<_>>()
            .join(" AND ");
        Condition::Sql(Fragment::condition(text, Prec::And, Some(BinaryOp::And)))
    }

    /// Text of a condition for a clause that must not be empty.
    pub fn condition_text(&self, condition: &Condition) -> String {
        match condition {
            Condition::Sql(fragment) => fragment.text.clone(),
            Condition::Always(value) => self.dialect.constant_condition(*value).to_string(),
        }
    }

    /// The dispatcher.
    pub fn translate(&mut self, expr: &Expr, scope: &Scope<'_>) -> Result<ParseResult> {
        match expr {
            Expr::Param(param) => {
                let binding = bound(scope, *param)?;
                match &binding.shape {
                    RowShape::Scalar(name, tag) => {
                        let mut fragment =
                            Fragment::atom(self.qualify(binding.alias.as_deref(), name), *tag);
                        fragment.column = Some(name.clone());
                        Ok(ParseResult::Sql(fragment))
                    }
                    _ => Err(translation!("a whole row can only be used as a projection")),
                }
            }
            Expr::Member { target, name } => self.member(target, name, scope),
            Expr::Constant(literal) => Ok(ParseResult::Literal(literal.clone())),
            Expr::Binary { op, left, right } => self.binary(*op, left, right, scope),
            Expr::Unary { op: UnaryOp::Not, operand } => match operand.as_ref() {
                Expr::Call {
                    method: method @ (Method::Contains | Method::StartsWith | Method::EndsWith | Method::Exists),
                    target,
                    args,
                } => self.call(method, target.as_deref(), args, scope, true),
                operand => match self.translate(operand, scope)? {
                    ParseResult::Literal(literal) => {
                        Ok(ParseResult::Literal(fold_unary(UnaryOp::Not, &literal)?))
                    }
                    sql => {
                        let fragment = self.predicate(sql)?;
                        let text = format!("NOT {}", fragment.embed(Prec::Not, None, false));
                        Ok(ParseResult::Sql(Fragment::condition(text, Prec::Not, None)))
                    }
                },
            },
            Expr::Unary { op: UnaryOp::Neg, operand } => match self.translate(operand, scope)? {
                ParseResult::Literal(literal) => Ok(ParseResult::Literal(fold_unary(UnaryOp::Neg, &literal)?)),
                sql => {
                    let fragment = self.value(sql)?;
                    let text = if fragment.prec < Prec::Atom || fragment.text.starts_with('-') {
                        format!("-({})", fragment.text)
                    } else {
                        format!("-{}", fragment.text)
                    };
                    Ok(ParseResult::Sql(Fragment {
                        prec: Prec::Neg,
                        ..Fragment::atom(text, fragment.tag)
                    }))
                }
            },
            Expr::Call { method, target, args } => self.call(method, target.as_deref(), args, scope, false),
            Expr::New(_) | Expr::Array(_) => {
                Err(translation!("record and array construction is only supported in projections, keys and updates"))
            }
            Expr::Query(ctx) => {
                let (sql, shape) = self.nested(ctx, scope)?;
                let tag = match shape {
                    RowShape::Scalar(_, tag) => tag,
                    _ => None,
                };
                Ok(ParseResult::Sql(Fragment::atom(format!("({sql})"), tag)))
            }
        }
    }

    /// A correlated subquery: the nested query sees the outer parameters.
    fn nested(&mut self, ctx: &QueryContext, scope: &Scope<'_>) -> Result<(String, RowShape)> {
        self.check_session(ctx)?;
        let (parts, shape) = self.select_parts(ctx, Some(scope))?;
        Ok((self.dialect.assemble(&parts), shape))
    }

    fn member(&mut self, target: &Expr, name: &str, scope: &Scope<'_>) -> Result<ParseResult> {
        if let Expr::Param(param) = target {
            let binding = bound(scope, *param)?;
            let (column, tag) =
                binding.column(name).ok_or_else(|| translation!("`{name}` is not a mapped column"))?;
            let mut fragment = Fragment::atom(self.qualify(binding.alias.as_deref(), &column), tag);
            fragment.column = Some(column);
            return Ok(ParseResult::Sql(fragment));
        }

        match self.translate(target, scope)? {
            ParseResult::Literal(literal) => {
                Ok(ParseResult::Literal(self.evaluator.get_member(&literal, name)?))
            }
            ParseResult::Sql(_) => Err(translation!("member `{name}` of a SQL value cannot be translated")),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope<'_>) -> Result<ParseResult> {
        let mark = self.params.len();
        let l = self.translate(left, scope)?;
        let r = self.translate(right, scope)?;

        if let (ParseResult::Literal(a), ParseResult::Literal(b)) = (&l, &r) {
            return Ok(ParseResult::Literal(fold_binary(op, a, b)?));
        }
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.logical(op, l, r, mark);
        }
        if op.is_comparison() && (l.is_null() || r.is_null()) {
            let operand = match (op, l.is_null()) {
                (BinaryOp::Eq | BinaryOp::Ne, true) => r,
                (BinaryOp::Eq | BinaryOp::Ne, false) => l,
                _ => return Err(translation!("{op:?} against null is not supported")),
            };
            let operand = self.value(operand)?;
            let suffix = if op == BinaryOp::Eq { "IS NULL" } else { "IS NOT NULL" };
            let text = format!("{} {suffix}", operand.embed(Prec::Cmp, None, false));
            return Ok(ParseResult::Sql(Fragment::condition(text, Prec::Cmp, None)));
        }

        let (l, r) = (self.value(l)?, self.value(r)?);
        let (prec, symbol) = operator(op);
        let text = format!(
            "{}{symbol}{}",
            l.embed(prec, Some(op), false),
            r.embed(prec, Some(op), true)
        );
        if op.is_comparison() {
            Ok(ParseResult::Sql(Fragment::condition(text, prec, Some(op))))
        } else {
            if l.predicate || r.predicate {
                return Err(translation!("a condition cannot be used in arithmetic"));
            }
            Ok(ParseResult::Sql(Fragment {
                prec,
                op: Some(op),
                ..Fragment::atom(text, l.tag.or(r.tag))
            }))
        }
    }

    fn logical(&mut self, op: BinaryOp, l: ParseResult, r: ParseResult, mark: usize) -> Result<ParseResult> {
        let (literal, other) = match (l, r) {
            (ParseResult::Literal(literal), other) | (other, ParseResult::Literal(literal)) => (literal, other),
            (l, r) => {
                let (l, r) = (self.predicate(l)?, self.predicate(r)?);
                let (prec, symbol) = operator(op);
                let text = format!(
                    "{}{symbol}{}",
                    l.embed(prec, Some(op), false),
                    r.embed(prec, Some(op), true)
                );
                return Ok(ParseResult::Sql(Fragment::condition(text, prec, Some(op))));
            }
        };

        let Literal::Value(Value::Bool(Some(value))) = literal else {
            return Err(translation!("{op:?} expects a boolean, found {literal:?}"));
        };
        match (op, value) {
            (BinaryOp::And, false) | (BinaryOp::Or, true) => {
                // the SQL side is discarded, and with it any parameters it collected
                self.params.truncate(mark);
                Ok(ParseResult::Literal(Literal::Value(Value::from(value))))
            }
            _ => Ok(ParseResult::Sql(self.predicate(other)?)),
        }
    }

    fn call(
        &mut self, method: &Method, target: Option<&Expr>, args: &[Expr], scope: &Scope<'_>, negated: bool,
    ) -> Result<ParseResult> {
        match method {
            Method::Contains | Method::StartsWith | Method::EndsWith => {
                self.matching(method, target, args, scope, negated)
            }
            Method::Exists => {
                let Some(Expr::Query(ctx)) = target else {
                    return Err(translation!("exists requires a nested query"));
                };
                let (sql, _) = self.nested(ctx, scope)?;
                let (text, prec) = if negated {
                    (format!("NOT EXISTS ({sql})"), Prec::Not)
                } else {
                    (format!("EXISTS ({sql})"), Prec::Atom)
                };
                Ok(ParseResult::Sql(Fragment::condition(text, prec, None)))
            }
            Method::Count | Method::Sum | Method::Max | Method::Min | Method::Avg => {
                self.aggregate(method, args, scope)
            }
            Method::Now | Method::UtcNow | Method::Timestamp => {
                let (clock, tag) = match method {
                    Method::Now => (Clock::Now, DataTypeTag::DateTime),
                    Method::UtcNow => (Clock::UtcNow, DataTypeTag::DateTime),
                    _ => (Clock::Timestamp, DataTypeTag::Timestamp),
                };
                Ok(ParseResult::Sql(Fragment::atom(self.dialect.clock(clock), Some(tag))))
            }
            Method::Coalesce => {
                let [value, fallback] = args else {
                    return Err(translation!("coalesce takes two arguments"));
                };
                let value = self.translate(value, scope)?;
                let fallback = self.translate(fallback, scope)?;
                if let (ParseResult::Literal(a), ParseResult::Literal(b)) = (&value, &fallback) {
                    return Ok(ParseResult::Literal(fold_coalesce(a, b)));
                }
                let (value, fallback) = (self.value(value)?, self.value(fallback)?);
                let text = self.dialect.coalesce(&value.text, &fallback.text);
                Ok(ParseResult::Sql(Fragment::atom(text, value.tag.or(fallback.tag))))
            }
            Method::Cast(tag) => {
                let [value] = args else {
                    return Err(translation!("cast takes one argument"));
                };
                match self.translate(value, scope)? {
                    ParseResult::Literal(Literal::Value(value)) => {
                        let converted = json_to_value(&value_to_json(&value), *tag)
                            .map_err(|err| translation!("cannot cast literal: {err}"))?;
                        Ok(ParseResult::Literal(Literal::Value(converted)))
                    }
                    other => {
                        let fragment = self.value(other)?;
                        Ok(ParseResult::Sql(Fragment::atom(self.dialect.cast(&fragment.text, *tag), Some(*tag))))
                    }
                }
            }
            Method::Asc | Method::Desc => Err(translation!("ordering markers are only valid as order-by keys")),
            Method::Invoke(name) => {
                let receiver = target.ok_or_else(|| translation!("`{name}` requires a receiver"))?;
                let ParseResult::Literal(receiver) = self.translate(receiver, scope)? else {
                    return Err(translation!("`{name}` can only be evaluated on literals"));
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    let ParseResult::Literal(value) = self.translate(arg, scope)? else {
                        return Err(translation!("`{name}` can only be evaluated on literals"));
                    };
                    values.push(value);
                }
                Ok(ParseResult::Literal(self.evaluator.invoke(&receiver, name, &values)?))
            }
        }
    }

    fn matching(
        &mut self, method: &Method, target: Option<&Expr>, args: &[Expr], scope: &Scope<'_>, negated: bool,
    ) -> Result<ParseResult> {
        let target = target.ok_or_else(|| translation!("{method:?} requires a receiver"))?;
        let [arg] = args else {
            return Err(translation!("{method:?} takes one argument"));
        };
        let mark = self.params.len();

        if let (Method::Contains, Expr::Query(ctx)) = (method, target) {
            let needle = self.translate(arg, scope)?;
            let needle = self.value(needle)?;
            let (sql, _) = self.nested(ctx, scope)?;
            let keyword = if negated { "NOT IN" } else { "IN" };
            let text = format!("{} {keyword} ({sql})", needle.embed(Prec::Cmp, None, false));
            return Ok(ParseResult::Sql(Fragment::condition(text, Prec::Cmp, None)));
        }

        let name = match method {
            Method::Contains => "contains",
            Method::StartsWith => "starts_with",
            _ => "ends_with",
        };
        let receiver = self.translate(target, scope)?;
        let needle = self.translate(arg, scope)?;

        match (receiver, needle) {
            (ParseResult::Literal(receiver), ParseResult::Literal(needle)) => {
                negate(fold_match(name, &receiver, &needle)?, negated)
            }
            (ParseResult::Literal(Literal::List(values)), needle) => {
                if *method != Method::Contains {
                    return Err(translation!("{name} is not defined on a list"));
                }
                if values.is_empty() {
                    self.params.truncate(mark);
                    return Ok(ParseResult::Literal(Literal::Value(Value::from(negated))));
                }
                let needle = self.value(needle)?;
                let names: Vec<_> = values.into_iter().map(|value| self.parameter(value)).collect();
                let keyword = if negated { "NOT IN" } else { "IN" };
                let text = format!("{} {keyword} ({})", needle.embed(Prec::Cmp, None, false), names.join(", "));
                Ok(ParseResult::Sql(Fragment::condition(text, Prec::Cmp, None)))
            }
            (ParseResult::Literal(_), ParseResult::Sql(_)) => {
                Err(translation!("the receiver of {name} must be SQL-valued"))
            }
            (ParseResult::Sql(receiver), needle) => {
                let ParseResult::Literal(Literal::Value(value)) = needle else {
                    return Err(translation!("the {name} pattern must be a literal"));
                };
                let text = match value_to_json(&value) {
                    Json::String(text) => text,
                    Json::Null => return Err(translation!("the {name} pattern is null")),
                    other => other.to_string(),
                };
                let pattern = match method {
                    Method::Contains => like::contains(&text),
                    Method::StartsWith => like::starts_with(&text),
                    _ => like::ends_with(&text),
                };
                let placeholder = self.parameter(Value::from(pattern));
                let keyword = if negated { "NOT LIKE" } else { "LIKE" };
                let text = format!(
                    "{} {keyword} {placeholder}{}",
                    receiver.embed(Prec::Cmp, None, false),
                    self.dialect.like_escape()
                );
                Ok(ParseResult::Sql(Fragment::condition(text, Prec::Cmp, None)))
            }
        }
    }

    fn aggregate(&mut self, method: &Method, args: &[Expr], scope: &Scope<'_>) -> Result<ParseResult> {
        let func = match method {
            Method::Count => Aggregate::Count,
            Method::Sum => Aggregate::Sum,
            Method::Max => Aggregate::Max,
            Method::Min => Aggregate::Min,
            _ => Aggregate::Avg,
        };
        match args {
            [] if func == Aggregate::Count => Ok(ParseResult::Sql(Fragment::atom(
                self.dialect.aggregate(func, None),
                Some(DataTypeTag::Int64),
            ))),
            [arg] => {
                let ParseResult::Sql(fragment) = self.translate(arg, scope)? else {
                    return Err(translation!("{func:?} over a literal cannot be translated"));
                };
                let tag = match func {
                    Aggregate::Count => Some(DataTypeTag::Int64),
                    Aggregate::Avg => Some(DataTypeTag::Double),
                    _ => fragment.tag,
                };
                Ok(ParseResult::Sql(Fragment::atom(self.dialect.aggregate(func, Some(&fragment.text)), tag)))
            }
            _ => Err(translation!("{func:?} takes one argument")),
        }
    }
}

fn bound<'b>(scope: &'b Scope<'_>, param: Param) -> Result<&'b Binding> {
    scope.lookup(param).ok_or_else(|| translation!("parameter is not bound to a query source"))
}

fn negate(literal: Literal, negated: bool) -> Result<ParseResult> {
    if negated {
        Ok(ParseResult::Literal(fold_unary(UnaryOp::Not, &literal)?))
    } else {
        Ok(ParseResult::Literal(literal))
    }
}
