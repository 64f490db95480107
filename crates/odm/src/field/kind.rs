//! Field kind definitions and value coercion
//!
//! Kinds are an explicit tagged union: the schema of a model is data, not
//! a class hierarchy. Every kind owns its coercion rules; a field value is
//! always the output of its kind's [`FieldKind::coerce`], never a raw
//! caller value.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{OdmError, OdmResult};
use crate::value::{EntityRef, Value};

use super::RefResolver;

/// Element type constraint for list fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemKind {
    String,
    Int,
    Float,
    Decimal,
    Bool,
    List,
    Dict,
    Ref,
}

impl ElemKind {
    pub(crate) fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ElemKind::String, Value::String(_))
                | (ElemKind::Int, Value::Int(_))
                | (ElemKind::Float, Value::Float(_))
                | (ElemKind::Decimal, Value::Int(_))
                | (ElemKind::Decimal, Value::Float(_))
                | (ElemKind::Decimal, Value::Decimal(_))
                | (ElemKind::Bool, Value::Bool(_))
                | (ElemKind::List, Value::List(_))
                | (ElemKind::Dict, Value::Dict(_))
                | (ElemKind::Ref, Value::Ref(_))
                | (ElemKind::Ref, Value::String(_))
        )
    }
}

/// Options shared by all list-shaped kinds
#[derive(Debug, Clone, Default)]
pub struct ListOpts {
    pub allowed: Option<ElemKind>,
    pub unique: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub cleanup: bool,
}

/// Options shared by reference kinds
#[derive(Debug, Clone)]
pub struct RefOpts {
    /// Target model; `"*"` allows any
    pub model: String,
    /// Silently drop (or null out) dangling references instead of failing
    pub ignore_missing: bool,
}

/// The set of field kinds a model schema can declare
#[derive(Debug, Clone)]
pub enum FieldKind {
    String { max_length: Option<usize> },
    Integer,
    Decimal { round: u32 },
    Bool,
    DateTime,
    List(ListOpts),
    Dict { keys: Vec<String>, nonempty_keys: Vec<String> },
    Ref(RefOpts),
    RefsList { list: ListOpts, refs: RefOpts },
    Virtual,
}

impl FieldKind {
    /// Initial/reset value for the kind
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::String { .. } => Value::String(String::new()),
            FieldKind::Integer => Value::Int(0),
            FieldKind::Decimal { .. } => Value::Decimal(Decimal::ZERO),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::DateTime => Value::DateTime(chrono::DateTime::UNIX_EPOCH),
            FieldKind::List(_) | FieldKind::RefsList { .. } => Value::List(Vec::new()),
            FieldKind::Dict { .. } => Value::Dict(Default::default()),
            FieldKind::Ref(_) | FieldKind::Virtual => Value::Null,
        }
    }

    /// Coerce a raw value into the kind's canonical shape.
    ///
    /// `resolver` is consulted for reference existence only when present;
    /// values loaded back from the store skip resolution.
    pub fn coerce(
        &self,
        field: &str,
        value: Value,
        resolver: Option<&dyn RefResolver>,
    ) -> OdmResult<Value> {
        match self {
            FieldKind::String { max_length } => match value {
                Value::String(s) => {
                    let mut s = s.trim().to_string();
                    // max_length counts characters, not bytes
                    if let Some(max) = max_length {
                        if let Some((cut, _)) = s.char_indices().nth(*max) {
                            s.truncate(cut);
                        }
                    }
                    Ok(Value::String(s))
                }
                other => Err(mismatch(field, "string", &other)),
            },

            FieldKind::Integer => match value {
                Value::Int(i) => Ok(Value::Int(i)),
                other => Err(mismatch(field, "integer", &other)),
            },

            FieldKind::Decimal { round } => {
                coerce_decimal(field, value).map(|d| Value::Decimal(d.round_dp(*round)))
            }

            FieldKind::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(mismatch(field, "bool", &other)),
            },

            FieldKind::DateTime => match value {
                Value::DateTime(dt) => Ok(Value::DateTime(dt)),
                other => Err(mismatch(field, "datetime", &other)),
            },

            FieldKind::List(opts) => match value {
                Value::List(items) => {
                    let items = items
                        .into_iter()
                        .map(|v| coerce_elem(field, v, opts))
                        .collect::<OdmResult<Vec<_>>>()?;
                    finish_list(field, items, opts)
                }
                other => Err(mismatch(field, "list", &other)),
            },

            FieldKind::Dict { keys, nonempty_keys } => match value {
                Value::Dict(d) => {
                    for k in keys {
                        if !d.contains_key(k) {
                            return Err(OdmError::type_mismatch(format!(
                                "value of field '{field}' must contain key '{k}'"
                            )));
                        }
                    }
                    for k in nonempty_keys {
                        if d.get(k).map_or(true, Value::is_empty) {
                            return Err(OdmError::type_mismatch(format!(
                                "value of field '{field}' must contain non-empty key '{k}'"
                            )));
                        }
                    }
                    Ok(Value::Dict(d))
                }
                other => Err(mismatch(field, "dict", &other)),
            },

            FieldKind::Ref(opts) => {
                // A one-element list collapses to its first member
                let value = match value {
                    Value::List(mut items) => {
                        if items.is_empty() {
                            Value::Null
                        } else {
                            items.swap_remove(0)
                        }
                    }
                    v => v,
                };
                if value.is_null() {
                    return Ok(Value::Null);
                }

                let r = coerce_ref(field, value, opts)?;
                match resolver {
                    Some(resolver) if !resolver.ref_exists(&r)? => {
                        if opts.ignore_missing {
                            Ok(Value::Null)
                        } else {
                            Err(OdmError::ReferenceNotFound(r.to_string()))
                        }
                    }
                    _ => Ok(Value::Ref(r)),
                }
            }

            FieldKind::RefsList { list, refs } => match value {
                Value::List(items) => {
                    let mut clean = Vec::with_capacity(items.len());
                    for item in items {
                        let r = coerce_ref(field, item, refs)?;
                        match resolver {
                            Some(resolver) if !resolver.ref_exists(&r)? => {
                                if refs.ignore_missing {
                                    continue;
                                }
                                return Err(OdmError::ReferenceNotFound(r.to_string()));
                            }
                            _ => clean.push(Value::Ref(r)),
                        }
                    }
                    finish_list(field, clean, list)
                }
                other => Err(mismatch(field, "list of refs", &other)),
            },

            FieldKind::Virtual => Ok(value),
        }
    }

    /// Coerce a single element for `add_val`/`sub_val` on list kinds
    pub fn coerce_list_elem(
        &self,
        field: &str,
        value: Value,
        resolver: Option<&dyn RefResolver>,
    ) -> OdmResult<Option<Value>> {
        match self {
            FieldKind::List(opts) => coerce_elem(field, value, opts).map(Some),
            FieldKind::RefsList { refs, .. } => {
                let r = coerce_ref(field, value, refs)?;
                match resolver {
                    Some(resolver) if !resolver.ref_exists(&r)? => {
                        if refs.ignore_missing {
                            Ok(None)
                        } else {
                            Err(OdmError::ReferenceNotFound(r.to_string()))
                        }
                    }
                    _ => Ok(Some(Value::Ref(r))),
                }
            }
            _ => Err(OdmError::unsupported(field, "list element")),
        }
    }

    pub fn list_opts(&self) -> Option<&ListOpts> {
        match self {
            FieldKind::List(opts) => Some(opts),
            FieldKind::RefsList { list, .. } => Some(list),
            _ => None,
        }
    }

    pub fn ref_opts(&self) -> Option<&RefOpts> {
        match self {
            FieldKind::Ref(opts) => Some(opts),
            FieldKind::RefsList { refs, .. } => Some(refs),
            _ => None,
        }
    }
}

fn mismatch(field: &str, expected: &str, got: &Value) -> OdmError {
    OdmError::type_mismatch(format!(
        "field '{field}': {expected} expected, got {}",
        got.kind_name()
    ))
}

fn coerce_decimal(field: &str, value: Value) -> OdmResult<Decimal> {
    match value {
        Value::Int(i) => Ok(Decimal::from(i)),
        Value::Float(f) => Decimal::from_f64_retain(f)
            .ok_or_else(|| OdmError::type_mismatch(format!("field '{field}': non-finite float"))),
        Value::Decimal(d) => Ok(d),
        Value::String(s) => Decimal::from_str(&s)
            .map_err(|_| OdmError::type_mismatch(format!("field '{field}': '{s}' is not a decimal"))),
        other => Err(mismatch(field, "decimal", &other)),
    }
}

fn coerce_ref(field: &str, value: Value, opts: &RefOpts) -> OdmResult<EntityRef> {
    let r = match value {
        Value::Ref(r) => r,
        Value::String(s) => s.parse::<EntityRef>()?,
        other => return Err(mismatch(field, "ref or 'model:id' string", &other)),
    };

    if opts.model != "*" && r.model != opts.model {
        return Err(OdmError::type_mismatch(format!(
            "field '{field}': reference to model '{}' expected, got '{}'",
            opts.model, r.model
        )));
    }

    Ok(r)
}

fn coerce_elem(field: &str, value: Value, opts: &ListOpts) -> OdmResult<Value> {
    if let Some(allowed) = opts.allowed {
        if !allowed.accepts(&value) {
            return Err(OdmError::type_mismatch(format!(
                "field '{field}' cannot contain members of type {}",
                value.kind_name()
            )));
        }
        // Numeric members of a decimal list normalize to decimals
        if allowed == ElemKind::Decimal {
            return coerce_decimal(field, value).map(Value::Decimal);
        }
    }
    Ok(value)
}

/// Apply cleanup/uniqueness/length rules to an already-coerced list
fn finish_list(field: &str, items: Vec<Value>, opts: &ListOpts) -> OdmResult<Value> {
    let mut clean: Vec<Value> = Vec::with_capacity(items.len());
    for v in items {
        if opts.cleanup && v.is_empty() {
            continue;
        }
        if opts.unique && clean.contains(&v) {
            continue;
        }
        clean.push(v);
    }

    if let Some(min) = opts.min_len {
        if clean.len() < min {
            return Err(OdmError::type_mismatch(format!(
                "field '{field}': value length cannot be less than {min}"
            )));
        }
    }
    if let Some(max) = opts.max_len {
        if clean.len() > max {
            return Err(OdmError::type_mismatch(format!(
                "field '{field}': value length cannot be more than {max}"
            )));
        }
    }

    Ok(Value::List(clean))
}
