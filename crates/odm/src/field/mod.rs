//! Typed model fields
//!
//! A [`Field`] pairs a [`FieldKind`] with a current value, a default and a
//! per-field modified flag. All mutation goes through the coercion rules of
//! the kind, so a field's value is always in canonical shape.

mod kind;

pub use kind::{ElemKind, FieldKind, ListOpts, RefOpts};

use rust_decimal::Decimal;

use crate::error::{OdmError, OdmResult};
use crate::value::{decimal_to_f64, EntityRef, Value};

/// Reference existence checks at field mutation time.
///
/// Implemented by the registry core; tests substitute their own.
pub trait RefResolver {
    fn ref_exists(&self, r: &EntityRef) -> OdmResult<bool>;
}

/// A resolver that treats every reference as existing.
///
/// Used for values loaded back from the store, which were validated when
/// first written.
pub(crate) struct TrustingResolver;

impl RefResolver for TrustingResolver {
    fn ref_exists(&self, _r: &EntityRef) -> OdmResult<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    default: Value,
    value: Value,
    modified: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let default = kind.default_value();
        Field {
            name: name.into(),
            value: default.clone(),
            default,
            kind,
            required: false,
            modified: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::String { max_length: None })
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::Integer)
    }

    pub fn decimal(name: impl Into<String>, round: u32) -> Self {
        Field::new(name, FieldKind::Decimal { round })
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::Bool)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::DateTime)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::List(ListOpts::default()))
    }

    pub fn string_list(name: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::List(ListOpts { allowed: Some(ElemKind::String), ..Default::default() }),
        )
    }

    pub fn unique_string_list(name: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::List(ListOpts {
                allowed: Some(ElemKind::String),
                unique: true,
                ..Default::default()
            }),
        )
    }

    pub fn integer_list(name: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::List(ListOpts { allowed: Some(ElemKind::Int), ..Default::default() }),
        )
    }

    pub fn decimal_list(name: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::List(ListOpts { allowed: Some(ElemKind::Decimal), ..Default::default() }),
        )
    }

    pub fn dict(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::Dict { keys: Vec::new(), nonempty_keys: Vec::new() })
    }

    pub fn reference(name: impl Into<String>, model: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::Ref(RefOpts { model: model.into(), ignore_missing: false }),
        )
    }

    pub fn refs_list(name: impl Into<String>, model: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::RefsList {
                list: ListOpts { allowed: Some(ElemKind::Ref), ..Default::default() },
                refs: RefOpts { model: model.into(), ignore_missing: false },
            },
        )
    }

    pub fn refs_unique_list(name: impl Into<String>, model: impl Into<String>) -> Self {
        Field::new(
            name,
            FieldKind::RefsList {
                list: ListOpts {
                    allowed: Some(ElemKind::Ref),
                    unique: true,
                    ..Default::default()
                },
                refs: RefOpts { model: model.into(), ignore_missing: false },
            },
        )
    }

    pub fn virtual_field(name: impl Into<String>) -> Self {
        Field::new(name, FieldKind::Virtual)
    }

    // Builder-style schema modifiers. Each applies only to the kinds it
    // makes sense for and leaves other kinds untouched.

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.value = default.clone();
        self.default = default;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let FieldKind::String { max_length } = &mut self.kind {
            *max_length = Some(max);
        }
        self
    }

    pub fn unique(mut self) -> Self {
        if let Some(opts) = self.list_opts_mut() {
            opts.unique = true;
        }
        self
    }

    pub fn min_len(mut self, min: usize) -> Self {
        if let Some(opts) = self.list_opts_mut() {
            opts.min_len = Some(min);
        }
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        if let Some(opts) = self.list_opts_mut() {
            opts.max_len = Some(max);
        }
        self
    }

    pub fn cleanup(mut self) -> Self {
        if let Some(opts) = self.list_opts_mut() {
            opts.cleanup = true;
        }
        self
    }

    pub fn allowed_elems(mut self, elem: ElemKind) -> Self {
        if let Some(opts) = self.list_opts_mut() {
            opts.allowed = Some(elem);
        }
        self
    }

    pub fn required_keys(mut self, names: &[&str]) -> Self {
        if let FieldKind::Dict { keys, .. } = &mut self.kind {
            *keys = names.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn nonempty_keys(mut self, names: &[&str]) -> Self {
        if let FieldKind::Dict { nonempty_keys, .. } = &mut self.kind {
            *nonempty_keys = names.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn ignore_missing(mut self) -> Self {
        match &mut self.kind {
            FieldKind::Ref(opts) | FieldKind::RefsList { refs: opts, .. } => {
                opts.ignore_missing = true;
            }
            _ => {}
        }
        self
    }

    fn list_opts_mut(&mut self) -> Option<&mut ListOpts> {
        match &mut self.kind {
            FieldKind::List(opts) => Some(opts),
            FieldKind::RefsList { list, .. } => Some(list),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, FieldKind::Virtual)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn reset_modified(&mut self) {
        self.modified = false;
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn get_val(&self) -> Value {
        self.value.clone()
    }

    /// Current value with dangling references healed.
    ///
    /// When the kind allows missing targets, a dangling ref collapses to
    /// null (single ref) or is dropped from the list; otherwise an error
    /// is returned.
    pub fn get_val_resolved(&mut self, resolver: &dyn RefResolver) -> OdmResult<Value> {
        match (&self.kind, &self.value) {
            (FieldKind::Ref(opts), Value::Ref(r)) => {
                if resolver.ref_exists(r)? {
                    Ok(self.value.clone())
                } else if opts.ignore_missing {
                    self.value = Value::Null;
                    self.modified = true;
                    Ok(Value::Null)
                } else {
                    Err(OdmError::ReferenceNotFound(r.to_string()))
                }
            }
            (FieldKind::RefsList { refs, .. }, Value::List(items)) => {
                let mut alive = Vec::with_capacity(items.len());
                let mut dropped = false;
                for item in items {
                    if let Value::Ref(r) = item {
                        if !resolver.ref_exists(r)? {
                            if refs.ignore_missing {
                                dropped = true;
                                continue;
                            }
                            return Err(OdmError::ReferenceNotFound(r.to_string()));
                        }
                    }
                    alive.push(item.clone());
                }
                if dropped {
                    self.value = Value::List(alive.clone());
                    self.modified = true;
                }
                Ok(Value::List(alive))
            }
            _ => Ok(self.value.clone()),
        }
    }

    pub fn set_val(
        &mut self,
        value: Value,
        change_modified: bool,
        resolver: &dyn RefResolver,
    ) -> OdmResult<()> {
        self.value = if value.is_null() {
            self.default.clone()
        } else {
            self.kind.coerce(&self.name, value, Some(resolver))?
        };
        if change_modified {
            self.modified = true;
        }
        Ok(())
    }

    /// Accept a value coming back from the store or a cache snapshot.
    ///
    /// No reference resolution and no modified mark; the value was
    /// validated when first written.
    pub(crate) fn load_stored(&mut self, value: Value) -> OdmResult<()> {
        self.value = if value.is_null() {
            self.default.clone()
        } else {
            self.kind.coerce(&self.name, value, None)?
        };
        Ok(())
    }

    pub fn clr_val(&mut self, change_modified: bool) {
        self.value = self.default.clone();
        if change_modified {
            self.modified = true;
        }
    }

    pub fn add_val(
        &mut self,
        value: Value,
        change_modified: bool,
        resolver: &dyn RefResolver,
    ) -> OdmResult<()> {
        match &self.kind {
            FieldKind::Integer => {
                let rhs = match value {
                    Value::Int(i) => i,
                    other => {
                        return Err(OdmError::type_mismatch(format!(
                            "field '{}': cannot add {} to integer",
                            self.name,
                            other.kind_name()
                        )))
                    }
                };
                let cur = match self.value {
                    Value::Int(i) => i,
                    _ => 0,
                };
                let sum = cur.checked_add(rhs).ok_or_else(|| self.overflow())?;
                self.value = Value::Int(sum);
            }
            FieldKind::Decimal { round } => {
                let round = *round;
                let rhs = self.number_operand(value)?;
                let cur = match self.value {
                    Value::Decimal(d) => d,
                    _ => Decimal::ZERO,
                };
                let sum = cur.checked_add(rhs).ok_or_else(|| self.overflow())?;
                self.value = Value::Decimal(sum.round_dp(round));
            }
            FieldKind::List(_) | FieldKind::RefsList { .. } => {
                let elem = match self.kind.coerce_list_elem(&self.name, value, Some(resolver))? {
                    Some(elem) => elem,
                    None => return Ok(()),
                };
                let opts = self.kind.list_opts().cloned().unwrap_or_default();
                let items = match &mut self.value {
                    Value::List(items) => items,
                    _ => unreachable!("list field holds a list"),
                };
                if opts.unique && items.contains(&elem) {
                    return Ok(());
                }
                if let Some(max) = opts.max_len {
                    if items.len() + 1 > max {
                        return Err(OdmError::type_mismatch(format!(
                            "field '{}': value length cannot be more than {max}",
                            self.name
                        )));
                    }
                }
                items.push(elem);
            }
            FieldKind::Dict { .. } => {
                let rhs = match value {
                    Value::Dict(d) => d,
                    other => {
                        return Err(OdmError::type_mismatch(format!(
                            "field '{}': cannot merge {} into dict",
                            self.name,
                            other.kind_name()
                        )))
                    }
                };
                if let Value::Dict(cur) = &mut self.value {
                    cur.extend(rhs);
                }
            }
            _ => return Err(OdmError::unsupported(&self.name, "add")),
        }
        if change_modified {
            self.modified = true;
        }
        Ok(())
    }

    pub fn sub_val(&mut self, value: Value, change_modified: bool) -> OdmResult<()> {
        match &self.kind {
            FieldKind::Integer => {
                let rhs = match value {
                    Value::Int(i) => i,
                    other => {
                        return Err(OdmError::type_mismatch(format!(
                            "field '{}': cannot subtract {} from integer",
                            self.name,
                            other.kind_name()
                        )))
                    }
                };
                let cur = match self.value {
                    Value::Int(i) => i,
                    _ => 0,
                };
                let diff = cur.checked_sub(rhs).ok_or_else(|| self.overflow())?;
                self.value = Value::Int(diff);
            }
            FieldKind::Decimal { round } => {
                let round = *round;
                let rhs = self.number_operand(value)?;
                let cur = match self.value {
                    Value::Decimal(d) => d,
                    _ => Decimal::ZERO,
                };
                let diff = cur.checked_sub(rhs).ok_or_else(|| self.overflow())?;
                self.value = Value::Decimal(diff.round_dp(round));
            }
            FieldKind::List(_) | FieldKind::RefsList { .. } => {
                // Members of a disallowed element type are silently ignored
                let elem = match &self.kind {
                    FieldKind::RefsList { refs, .. } => {
                        match kind_coerce_ref_quiet(&self.name, value, refs) {
                            Some(r) => Value::Ref(r),
                            None => return Ok(()),
                        }
                    }
                    FieldKind::List(opts) => {
                        if opts.allowed.map_or(false, |a| !a.accepts(&value)) {
                            return Ok(());
                        }
                        value
                    }
                    _ => unreachable!(),
                };
                let opts = self.kind.list_opts().cloned().unwrap_or_default();
                let items = match &mut self.value {
                    Value::List(items) => items,
                    _ => unreachable!("list field holds a list"),
                };
                let remaining = items.iter().filter(|v| **v != elem).count();
                if remaining == items.len() {
                    return Ok(());
                }
                if let Some(min) = opts.min_len {
                    if remaining < min {
                        return Err(OdmError::type_mismatch(format!(
                            "field '{}': value length cannot be less than {min}",
                            self.name
                        )));
                    }
                }
                items.retain(|v| *v != elem);
            }
            _ => return Err(OdmError::unsupported(&self.name, "sub")),
        }
        if change_modified {
            self.modified = true;
        }
        Ok(())
    }

    pub fn inc_val(&mut self, change_modified: bool) -> OdmResult<()> {
        match &self.kind {
            FieldKind::Integer => {
                if let Value::Int(i) = self.value {
                    self.value = Value::Int(i.checked_add(1).ok_or_else(|| self.overflow())?);
                }
            }
            FieldKind::Decimal { round } => {
                let round = *round;
                if let Value::Decimal(d) = self.value {
                    let next = d.checked_add(Decimal::ONE).ok_or_else(|| self.overflow())?;
                    self.value = Value::Decimal(next.round_dp(round));
                }
            }
            _ => return Err(OdmError::unsupported(&self.name, "inc")),
        }
        if change_modified {
            self.modified = true;
        }
        Ok(())
    }

    pub fn dec_val(&mut self, change_modified: bool) -> OdmResult<()> {
        match &self.kind {
            FieldKind::Integer => {
                if let Value::Int(i) = self.value {
                    self.value = Value::Int(i.checked_sub(1).ok_or_else(|| self.overflow())?);
                }
            }
            FieldKind::Decimal { round } => {
                let round = *round;
                if let Value::Decimal(d) = self.value {
                    let next = d.checked_sub(Decimal::ONE).ok_or_else(|| self.overflow())?;
                    self.value = Value::Decimal(next.round_dp(round));
                }
            }
            _ => return Err(OdmError::unsupported(&self.name, "dec")),
        }
        if change_modified {
            self.modified = true;
        }
        Ok(())
    }

    /// Value as written to the store. Decimals are stored as floats.
    pub fn as_storable(&self) -> Value {
        storable(&self.value)
    }

    pub fn as_jsonable(&self) -> serde_json::Value {
        self.value.to_json()
    }

    /// Normalize a query argument against this field's kind.
    ///
    /// Ref fields accept 'model:id' strings, decimal fields numeric
    /// arguments in any form. Everything else passes through untouched.
    pub fn sanitize_finder_arg(&self, arg: Value) -> OdmResult<Value> {
        match &self.kind {
            FieldKind::Ref(_) | FieldKind::RefsList { .. } => match arg {
                Value::String(s) => Ok(Value::Ref(s.parse::<EntityRef>()?)),
                Value::List(items) => {
                    let items = items
                        .into_iter()
                        .map(|v| match v {
                            Value::String(s) => s.parse::<EntityRef>().map(Value::Ref),
                            Value::Ref(r) => Ok(Value::Ref(r)),
                            other => Ok(other),
                        })
                        .collect::<OdmResult<Vec<_>>>()?;
                    Ok(Value::List(items))
                }
                other => Ok(other),
            },
            FieldKind::Decimal { .. } => match arg {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Decimal(d) => Ok(Value::Float(decimal_to_f64(d))),
                Value::List(items) => Ok(Value::List(
                    items
                        .into_iter()
                        .map(|v| match v {
                            Value::Int(i) => Value::Float(i as f64),
                            Value::Decimal(d) => Value::Float(decimal_to_f64(d)),
                            other => other,
                        })
                        .collect(),
                )),
                other => Ok(other),
            },
            _ => Ok(arg),
        }
    }

    /// Called for every field of an entity being deleted. Override point
    /// for kinds that own external resources; the base kinds do nothing.
    pub fn on_entity_delete(&mut self) {}

    fn number_operand(&self, value: Value) -> OdmResult<Decimal> {
        match value {
            Value::Int(i) => Ok(Decimal::from(i)),
            Value::Float(f) => Decimal::from_f64_retain(f).ok_or_else(|| {
                OdmError::type_mismatch(format!("field '{}': non-finite float", self.name))
            }),
            Value::Decimal(d) => Ok(d),
            other => Err(OdmError::type_mismatch(format!(
                "field '{}': numeric operand expected, got {}",
                self.name,
                other.kind_name()
            ))),
        }
    }

    fn overflow(&self) -> OdmError {
        OdmError::type_mismatch(format!("field '{}': arithmetic overflow", self.name))
    }
}

fn kind_coerce_ref_quiet(field: &str, value: Value, refs: &RefOpts) -> Option<EntityRef> {
    match value {
        Value::Ref(r) => {
            if refs.model == "*" || r.model == refs.model {
                Some(r)
            } else {
                None
            }
        }
        Value::String(s) => {
            let r = s.parse::<EntityRef>().ok()?;
            if refs.model == "*" || r.model == refs.model {
                Some(r)
            } else {
                None
            }
        }
        _ => {
            let _ = field;
            None
        }
    }
}

fn storable(value: &Value) -> Value {
    match value {
        Value::Decimal(d) => Value::Float(decimal_to_f64(*d)),
        Value::List(items) => Value::List(items.iter().map(storable).collect()),
        Value::Dict(d) => {
            Value::Dict(d.iter().map(|(k, v)| (k.clone(), storable(v))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectId;
    use std::str::FromStr;

    struct NoRefs;

    impl RefResolver for NoRefs {
        fn ref_exists(&self, _r: &EntityRef) -> OdmResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn string_trims_and_truncates() {
        let mut f = Field::string("title").max_length(4);
        f.set_val(Value::from("  hello  "), true, &TrustingResolver).unwrap();
        assert_eq!(f.get_val(), Value::from("hell"));
        assert!(f.is_modified());
    }

    #[test]
    fn integer_rejects_strings() {
        let mut f = Field::integer("views");
        let err = f.set_val(Value::from("7"), true, &TrustingResolver).unwrap_err();
        assert!(matches!(err, OdmError::TypeMismatch(_)));
        assert!(!f.is_modified());
    }

    #[test]
    fn null_resets_to_default() {
        let mut f = Field::integer("views").with_default(Value::Int(3));
        f.set_val(Value::Int(9), true, &TrustingResolver).unwrap();
        f.set_val(Value::Null, true, &TrustingResolver).unwrap();
        assert_eq!(f.get_val(), Value::Int(3));
    }

    #[test]
    fn decimal_rounds_half_even() {
        let mut f = Field::decimal("price", 2);
        f.set_val(Value::from("1.005"), true, &TrustingResolver).unwrap();
        assert_eq!(f.get_val(), Value::Decimal(Decimal::from_str("1.00").unwrap()));
        f.set_val(Value::from("1.015"), true, &TrustingResolver).unwrap();
        assert_eq!(f.get_val(), Value::Decimal(Decimal::from_str("1.02").unwrap()));
    }

    #[test]
    fn unique_list_drops_duplicates() {
        let mut f = Field::unique_string_list("tags");
        f.set_val(
            Value::List(vec![Value::from("a"), Value::from("b"), Value::from("a")]),
            true,
            &TrustingResolver,
        )
        .unwrap();
        assert_eq!(f.get_val(), Value::List(vec![Value::from("a"), Value::from("b")]));
        f.add_val(Value::from("b"), true, &TrustingResolver).unwrap();
        assert_eq!(f.get_val(), Value::List(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn cleanup_list_drops_empty_members() {
        let mut f = Field::string_list("lines").cleanup();
        f.set_val(
            Value::List(vec![Value::from("a"), Value::from(""), Value::from("b")]),
            true,
            &TrustingResolver,
        )
        .unwrap();
        assert_eq!(f.get_val(), Value::List(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn sub_ignores_disallowed_elem_type() {
        let mut f = Field::string_list("tags");
        f.set_val(Value::List(vec![Value::from("a")]), true, &TrustingResolver).unwrap();
        f.reset_modified();
        f.sub_val(Value::Int(1), true).unwrap();
        assert_eq!(f.get_val(), Value::List(vec![Value::from("a")]));
    }

    #[test]
    fn min_len_blocks_removal() {
        let mut f = Field::string_list("tags").min_len(1);
        f.set_val(Value::List(vec![Value::from("a")]), true, &TrustingResolver).unwrap();
        assert!(f.sub_val(Value::from("a"), true).is_err());
    }

    #[test]
    fn inc_dec_only_for_numbers() {
        let mut f = Field::integer("views");
        f.inc_val(true).unwrap();
        f.inc_val(true).unwrap();
        f.dec_val(true).unwrap();
        assert_eq!(f.get_val(), Value::Int(1));
        assert!(Field::string("title").inc_val(true).is_err());
    }

    #[test]
    fn integer_arithmetic_refuses_overflow() {
        let mut f = Field::integer("views");
        f.set_val(Value::Int(i64::MAX), true, &TrustingResolver).unwrap();
        assert!(matches!(f.inc_val(true), Err(OdmError::TypeMismatch(_))));
        assert!(matches!(
            f.add_val(Value::Int(1), true, &TrustingResolver),
            Err(OdmError::TypeMismatch(_))
        ));
        // value survives the failed operation
        assert_eq!(f.get_val(), Value::Int(i64::MAX));

        f.set_val(Value::Int(i64::MIN), true, &TrustingResolver).unwrap();
        assert!(f.dec_val(true).is_err());
        assert!(f.sub_val(Value::Int(1), true).is_err());
        assert_eq!(f.get_val(), Value::Int(i64::MIN));
    }

    #[test]
    fn ref_model_mismatch_fails() {
        let mut f = Field::reference("author", "user");
        let r = EntityRef { model: "comment".into(), id: ObjectId::new() };
        let err = f.set_val(Value::Ref(r), true, &TrustingResolver).unwrap_err();
        assert!(matches!(err, OdmError::TypeMismatch(_)));
    }

    #[test]
    fn missing_ref_fails_or_heals() {
        let r = EntityRef { model: "user".into(), id: ObjectId::new() };

        let mut strict = Field::reference("author", "user");
        let err = strict.set_val(Value::Ref(r.clone()), true, &NoRefs).unwrap_err();
        assert!(matches!(err, OdmError::ReferenceNotFound(_)));

        let mut lax = Field::reference("author", "user").ignore_missing();
        lax.set_val(Value::Ref(r), true, &NoRefs).unwrap();
        assert_eq!(lax.get_val(), Value::Null);
    }

    #[test]
    fn refs_list_accepts_strings() {
        let id = ObjectId::new();
        let mut f = Field::refs_list("comments", "comment");
        f.set_val(
            Value::List(vec![Value::from(format!("comment:{id}"))]),
            true,
            &TrustingResolver,
        )
        .unwrap();
        let expected = EntityRef { model: "comment".into(), id };
        assert_eq!(f.get_val(), Value::List(vec![Value::Ref(expected)]));
    }

    #[test]
    fn stored_values_skip_resolution() {
        let r = EntityRef { model: "user".into(), id: ObjectId::new() };
        let mut f = Field::reference("author", "user");
        f.load_stored(Value::Ref(r.clone())).unwrap();
        assert_eq!(f.get_val(), Value::Ref(r));
        assert!(!f.is_modified());
    }

    #[test]
    fn dangling_ref_healed_on_read() {
        let r = EntityRef { model: "user".into(), id: ObjectId::new() };
        let mut f = Field::reference("author", "user").ignore_missing();
        f.load_stored(Value::Ref(r)).unwrap();
        assert_eq!(f.get_val_resolved(&NoRefs).unwrap(), Value::Null);
        assert!(f.is_modified());
    }

    #[test]
    fn storable_converts_decimals() {
        let mut f = Field::decimal("price", 2);
        f.set_val(Value::from("2.50"), true, &TrustingResolver).unwrap();
        assert_eq!(f.as_storable(), Value::Float(2.5));
    }

    #[test]
    fn finder_arg_sanitizing() {
        let f = Field::reference("author", "user");
        let id = ObjectId::new();
        let arg = f.sanitize_finder_arg(Value::from(format!("user:{id}"))).unwrap();
        assert_eq!(arg, Value::Ref(EntityRef { model: "user".into(), id }));

        let f = Field::decimal("price", 2);
        assert_eq!(f.sanitize_finder_arg(Value::Int(2)).unwrap(), Value::Float(2.0));
    }
}
