//! Query criteria builder
//!
//! Accumulates comparison criteria under `$and`/`$or` and compiles them
//! into a single filter document understood by the document store.

use std::fmt;

use crate::error::{OdmError, OdmResult};
use crate::value::{Document, ObjectId, Value};

/// Logical grouping for a criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn resolve(op: &str) -> OdmResult<Self> {
        match op {
            "and" | "$and" => Ok(LogicalOp::And),
            "or" | "$or" => Ok(LogicalOp::Or),
            other => Err(OdmError::InvalidLogicalOperator(other.to_string())),
        }
    }

    fn key(self) -> &'static str {
        match self {
            LogicalOp::And => "$and",
            LogicalOp::Or => "$or",
        }
    }
}

/// Map a comparison operator or its shorthand to canonical form
pub fn resolve_comparison_op(op: &str) -> OdmResult<&'static str> {
    match op {
        "=" | "eq" | "$eq" => Ok("$eq"),
        "!=" | "ne" | "$ne" => Ok("$ne"),
        ">" | "gt" | "$gt" => Ok("$gt"),
        ">=" | "gte" | "$gte" => Ok("$gte"),
        "<" | "lt" | "$lt" => Ok("$lt"),
        "<=" | "lte" | "$lte" => Ok("$lte"),
        "in" | "$in" => Ok("$in"),
        "nin" | "$nin" => Ok("$nin"),
        "regex" | "$regex" => Ok("$regex"),
        "regex_i" | "$regex_i" => Ok("$regex_i"),
        "near" | "$near" => Ok("$near"),
        "nearSphere" | "$nearSphere" => Ok("$nearSphere"),
        "minDistance" | "$minDistance" => Ok("$minDistance"),
        "maxDistance" | "$maxDistance" => Ok("$maxDistance"),
        other => Err(OdmError::InvalidComparisonOperator(other.to_string())),
    }
}

/// A geographic point, compiled to a GeoJSON geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lng: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lng: f64, lat: f64) -> Self {
        Point { lng, lat }
    }

    pub fn to_geo_json(self) -> Value {
        let mut geom = Document::new();
        geom.insert("type".to_string(), Value::from("Point"));
        geom.insert(
            "coordinates".to_string(),
            Value::List(vec![Value::Float(self.lng), Value::Float(self.lat)]),
        );
        Value::Dict(geom)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    and: Vec<Value>,
    or: Vec<Value>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn len(&self) -> usize {
        self.and.len() + self.or.len()
    }

    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty()
    }

    /// Append a criterion `{field: {op: arg}}` under the logical group.
    ///
    /// `_id` arguments given as strings are coerced to object ids, `$in`
    /// and `$nin` scalars are wrapped into one-element lists, and
    /// `$regex_i` expands to a case-insensitive `$regex`.
    pub fn add_criteria(
        &mut self,
        logical: LogicalOp,
        field: &str,
        comparison: &str,
        arg: Value,
    ) -> OdmResult<()> {
        let op = resolve_comparison_op(comparison)?;

        let mut arg = if field == "_id" {
            coerce_id_arg(arg)?
        } else {
            arg
        };

        if matches!(op, "$in" | "$nin") && !matches!(arg, Value::List(_)) {
            arg = Value::List(vec![arg]);
        }

        let mut cond = Document::new();
        if op == "$regex_i" {
            cond.insert("$regex".to_string(), arg);
            cond.insert("$options".to_string(), Value::from("i"));
        } else {
            cond.insert(op.to_string(), arg);
        }

        let mut criterion = Document::new();
        criterion.insert(field.to_string(), Value::Dict(cond));
        self.group_mut(logical).push(Value::Dict(criterion));

        Ok(())
    }

    /// Append a full-text criterion. The language tag, when recognized,
    /// selects the store's stemmer.
    pub fn add_text_search(
        &mut self,
        logical: LogicalOp,
        search: &str,
        language: Option<&str>,
    ) -> OdmResult<()> {
        let mut text = Document::new();
        text.insert("$search".to_string(), Value::from(search));
        if let Some(lang) = language {
            text.insert("$language".to_string(), Value::from(text_search_language(lang)));
        }

        let mut criterion = Document::new();
        criterion.insert("$text".to_string(), Value::Dict(text));
        self.group_mut(logical).push(Value::Dict(criterion));

        Ok(())
    }

    /// Drop every criterion on the named field from one group
    pub fn remove_criteria(&mut self, logical: LogicalOp, field: &str) {
        self.group_mut(logical).retain(|v| match v {
            Value::Dict(d) => !d.contains_key(field),
            _ => true,
        });
    }

    /// Drop every criterion on the named field from both groups
    pub fn remove_field(&mut self, field: &str) {
        self.remove_criteria(LogicalOp::And, field);
        self.remove_criteria(LogicalOp::Or, field);
    }

    /// Compile to the filter document passed to the store
    pub fn compile(&self) -> Value {
        let mut filter = Document::new();
        if !self.and.is_empty() {
            filter.insert("$and".to_string(), Value::List(self.and.clone()));
        }
        if !self.or.is_empty() {
            filter.insert("$or".to_string(), Value::List(self.or.clone()));
        }
        Value::Dict(filter)
    }

    fn group_mut(&mut self, logical: LogicalOp) -> &mut Vec<Value> {
        match logical {
            LogicalOp::And => &mut self.and,
            LogicalOp::Or => &mut self.or,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compile().to_json())
    }
}

/// `_id` criteria accept object ids as strings, singly or in lists
fn coerce_id_arg(arg: Value) -> OdmResult<Value> {
    match arg {
        Value::String(s) => Ok(Value::ObjectId(s.parse::<ObjectId>()?)),
        Value::List(items) => Ok(Value::List(
            items
                .into_iter()
                .map(coerce_id_arg)
                .collect::<OdmResult<Vec<_>>>()?,
        )),
        other => Ok(other),
    }
}

/// Stemmer selection for `$text`; unknown tags disable stemming
fn text_search_language(lang: &str) -> &'static str {
    match lang {
        "en" => "english",
        "ru" => "russian",
        _ => "none",
    }
}
