//! Entities and model behavior hooks
//!
//! An [`Entity`] is a typed, lockable unit of persistence: an ordered set
//! of [`Field`]s plus lifecycle state. Models contribute behavior through
//! the [`Model`] trait; structure comes from `setup_fields`, everything
//! else is optional hook overrides.
//!
//! Every field operation on a stored entity runs under the entity's
//! named lock and pulls the latest committed snapshot first, so
//! concurrent holders of the same stored entity converge; mutators push
//! the snapshot back before unlocking.

mod persist;

pub use persist::{DeleteOptions, SaveOptions};

use std::sync::Arc;

use chrono::Utc;

use crate::cache::Snapshot;
use crate::error::{OdmError, OdmResult};
use crate::field::{Field, RefResolver};
use crate::lock::LockGuard;
use crate::registry::OdmCore;
use crate::store::IndexSpec;
use crate::value::{EntityRef, ObjectId, Value};

/// Per-model structure and behavior.
///
/// `setup_fields` is the only required method; it declares the model's
/// fields on a freshly constructed entity. The remaining hooks default
/// to pass-through.
pub trait Model: Send + Sync {
    fn setup_fields(&self, entity: &mut Entity) -> OdmResult<()>;

    fn setup_indexes(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }

    /// Override the derived collection name
    fn collection_name(&self, model: &str) -> Option<String> {
        let _ = model;
        None
    }

    fn on_f_set(&self, entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    fn on_f_get(&self, entity: &Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    fn on_f_add(&self, entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    fn on_f_sub(&self, entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
        let _ = (entity, field);
        Ok(value)
    }

    /// Runs before the entity is written. An error aborts the save.
    fn pre_save(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }

    fn after_save(&self, entity: &mut Entity, first_save: bool) -> OdmResult<()> {
        let _ = (entity, first_save);
        Ok(())
    }

    /// Runs before the entity is removed. An error vetoes the deletion.
    fn pre_delete(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }

    fn after_delete(&self, entity: &mut Entity) -> OdmResult<()> {
        let _ = entity;
        Ok(())
    }
}

pub struct Entity {
    core: Arc<OdmCore>,
    hooks: Arc<dyn Model>,
    model: String,
    collection: String,
    id: Option<ObjectId>,
    is_new: bool,
    is_modified: bool,
    is_deleted: bool,
    fields: Vec<Field>,
    indexes: Vec<IndexSpec>,
}

impl Entity {
    /// Build an entity shell: system fields, then the model's own.
    /// Lifecycle state is set afterwards by the registry, depending on
    /// whether the entity is fresh or loaded.
    pub(crate) fn construct(
        core: Arc<OdmCore>,
        hooks: Arc<dyn Model>,
        model: &str,
        collection: &str,
    ) -> OdmResult<Entity> {
        let mut entity = Entity {
            core,
            hooks: Arc::clone(&hooks),
            model: model.to_string(),
            collection: collection.to_string(),
            id: None,
            is_new: true,
            is_modified: false,
            is_deleted: false,
            fields: Vec::new(),
            indexes: Vec::new(),
        };

        entity.define_field(Field::reference("_parent", model).ignore_missing())?;
        entity.define_field(Field::refs_unique_list("_children", model).ignore_missing())?;
        entity.define_field(Field::datetime("_created"))?;
        entity.define_field(Field::datetime("_modified"))?;

        hooks.setup_fields(&mut entity)?;
        hooks.setup_indexes(&mut entity)?;

        Ok(entity)
    }

    /// Stamp creation/modification times on a fresh entity. The entity
    /// becomes modified so that a subsequent save persists it.
    pub(crate) fn init_new(&mut self) -> OdmResult<()> {
        let now = Value::from(Utc::now());
        self.set_raw("_created", now.clone())?;
        self.set_raw("_modified", now)?;
        self.is_modified = true;
        Ok(())
    }

    pub fn define_field(&mut self, field: Field) -> OdmResult<()> {
        if self.has_field(field.name()) {
            return Err(OdmError::FieldAlreadyDefined {
                model: self.model.clone(),
                field: field.name().to_string(),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> OdmResult<()> {
        let idx = self.field_index(name)?;
        self.fields.remove(idx);
        Ok(())
    }

    /// Declare an index over already defined fields. Dotted paths reach
    /// into dict fields and are validated against their root segment.
    pub fn define_index(&mut self, index: IndexSpec) -> OdmResult<()> {
        for (name, _) in &index.fields {
            let root = name.split('.').next().unwrap_or(name.as_str());
            if root != "_id" && !self.has_field(root) {
                return Err(OdmError::field_not_defined(&self.model, root));
            }
        }
        self.indexes.push(index);
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    /// Read-only view of a field definition and its current value
    pub fn field(&self, name: &str) -> OdmResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| OdmError::field_not_defined(&self.model, name))
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Create every declared index on the store
    pub fn create_indexes(&self) -> OdmResult<()> {
        for index in &self.indexes {
            self.core.store().create_index(&self.collection, index)?;
        }
        Ok(())
    }

    /// Drop and re-create the collection's indexes
    pub fn reindex(&self) -> OdmResult<()> {
        self.core.store().drop_indexes(&self.collection)?;
        self.create_indexes()
    }

    pub fn has_text_index(&self) -> bool {
        self.indexes.iter().any(IndexSpec::is_text)
    }

    /// Reference to this entity; it must have been saved at least once
    pub fn make_ref(&self) -> OdmResult<EntityRef> {
        match self.id {
            Some(id) => Ok(EntityRef { model: self.model.clone(), id }),
            None => Err(OdmError::EntityNotStored(self.model.clone())),
        }
    }

    pub fn f_set(&mut self, field: &str, value: Value) -> OdmResult<&mut Self> {
        self.f_set_with(field, value, true)
    }

    /// Set a field's value. With `update_state` off the change does not
    /// mark the entity modified, so the next save will not pick it up.
    pub fn f_set_with(
        &mut self,
        field: &str,
        value: Value,
        update_state: bool,
    ) -> OdmResult<&mut Self> {
        self.with_mutation(|e| {
            let hooks = Arc::clone(&e.hooks);
            let value = hooks.on_f_set(e, field, value)?;
            let idx = e.field_index(field)?;
            let core = Arc::clone(&e.core);
            e.fields[idx].set_val(value, update_state, core.as_ref())?;
            if update_state {
                e.is_modified = true;
            }
            Ok(())
        })?;
        Ok(self)
    }

    /// Current field value.
    ///
    /// Stored entities lock and pull the latest snapshot first, so the
    /// read reflects concurrent writers. Dangling references are healed
    /// or reported per the field's options.
    pub fn f_get(&mut self, field: &str) -> OdmResult<Value> {
        self.check_not_deleted()?;

        let _guard = self.lock_guard()?;
        if _guard.is_some() {
            self.cache_pull()?;
        }

        let idx = self.field_index(field)?;
        let core = Arc::clone(&self.core);
        let value = self.fields[idx].get_val_resolved(core.as_ref())?;
        let hooks = Arc::clone(&self.hooks);
        hooks.on_f_get(self, field, value)
    }

    pub fn f_add(&mut self, field: &str, value: Value) -> OdmResult<&mut Self> {
        self.f_add_with(field, value, true)
    }

    pub fn f_add_with(
        &mut self,
        field: &str,
        value: Value,
        update_state: bool,
    ) -> OdmResult<&mut Self> {
        self.with_mutation(|e| {
            let hooks = Arc::clone(&e.hooks);
            let value = hooks.on_f_add(e, field, value)?;
            let idx = e.field_index(field)?;
            let core = Arc::clone(&e.core);
            e.fields[idx].add_val(value, update_state, core.as_ref())?;
            if update_state {
                e.is_modified = true;
            }
            Ok(())
        })?;
        Ok(self)
    }

    pub fn f_sub(&mut self, field: &str, value: Value) -> OdmResult<&mut Self> {
        self.f_sub_with(field, value, true)
    }

    pub fn f_sub_with(
        &mut self,
        field: &str,
        value: Value,
        update_state: bool,
    ) -> OdmResult<&mut Self> {
        self.with_mutation(|e| {
            let hooks = Arc::clone(&e.hooks);
            let value = hooks.on_f_sub(e, field, value)?;
            let idx = e.field_index(field)?;
            e.fields[idx].sub_val(value, update_state)?;
            if update_state {
                e.is_modified = true;
            }
            Ok(())
        })?;
        Ok(self)
    }

    pub fn f_inc(&mut self, field: &str) -> OdmResult<&mut Self> {
        self.with_mutation(|e| {
            let idx = e.field_index(field)?;
            e.fields[idx].inc_val(true)?;
            e.is_modified = true;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn f_dec(&mut self, field: &str) -> OdmResult<&mut Self> {
        self.with_mutation(|e| {
            let idx = e.field_index(field)?;
            e.fields[idx].dec_val(true)?;
            e.is_modified = true;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn f_clr(&mut self, field: &str) -> OdmResult<&mut Self> {
        self.with_mutation(|e| {
            let idx = e.field_index(field)?;
            e.fields[idx].clr_val(true);
            e.is_modified = true;
            Ok(())
        })?;
        Ok(self)
    }

    pub fn f_is_empty(&mut self, field: &str) -> OdmResult<bool> {
        self.check_not_deleted()?;
        let _guard = self.lock_guard()?;
        if _guard.is_some() {
            self.cache_pull()?;
        }
        Ok(self.field(field)?.is_empty())
    }

    pub fn f_is_modified(&self, field: &str) -> OdmResult<bool> {
        Ok(self.field(field)?.is_modified())
    }

    /// Attach a stored child to this stored entity
    pub fn append_child(&mut self, child: &mut Entity) -> OdmResult<()> {
        if self.id.is_none() {
            return Err(OdmError::EntityNotLocked(self.model.clone()));
        }
        let child_ref = child
            .make_ref()
            .map_err(|_| OdmError::EntityNotStored(child.model().to_string()))?;

        child.f_set("_parent", Value::Ref(self.make_ref()?))?;
        self.f_add("_children", Value::Ref(child_ref))?;
        Ok(())
    }

    pub fn remove_child(&mut self, child: &mut Entity) -> OdmResult<()> {
        if self.id.is_none() {
            return Err(OdmError::EntityNotLocked(self.model.clone()));
        }
        let child_ref = child
            .make_ref()
            .map_err(|_| OdmError::EntityNotStored(child.model().to_string()))?;

        self.f_sub("_children", Value::Ref(child_ref))?;
        child.f_clr("_parent")?;
        Ok(())
    }

    /// The parent entity, when one is set and still exists
    pub fn parent(&mut self) -> OdmResult<Option<Entity>> {
        match self.f_get("_parent")? {
            Value::Ref(r) => {
                let core = Arc::clone(&self.core);
                core.get_by_ref(&r).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn children(&mut self) -> OdmResult<Vec<Entity>> {
        let core = Arc::clone(&self.core);
        match self.f_get("_children")? {
            Value::List(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Ref(r) => Some(r),
                    _ => None,
                })
                .map(|r| core.get_by_ref(&r))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    pub(crate) fn child_refs(&self) -> Vec<EntityRef> {
        let Ok(field) = self.field("_children") else {
            return Vec::new();
        };
        match field.get_val() {
            Value::List(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Ref(r) => Some(r),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Bind a known id to a loaded entity shell
    pub(crate) fn fill_id(&mut self, id: ObjectId) {
        self.id = Some(id);
        self.is_new = false;
    }

    fn field_index(&self, name: &str) -> OdmResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| OdmError::field_not_defined(&self.model, name))
    }

    /// Set a field directly, bypassing hooks and the mutation guard
    fn set_raw(&mut self, field: &str, value: Value) -> OdmResult<()> {
        let idx = self.field_index(field)?;
        let core = Arc::clone(&self.core);
        self.fields[idx].set_val(value, true, core.as_ref())
    }

    fn lock_key(&self) -> Option<String> {
        self.id.map(|id| format!("{}:{}", self.model, id))
    }

    pub(crate) fn lock_guard(&self) -> OdmResult<Option<LockGuard>> {
        match self.lock_key() {
            Some(key) => {
                let guard = self
                    .core
                    .locks()
                    .acquire(&key, self.core.config().lock_timeout)?;
                Ok(Some(guard))
            }
            None => Ok(None),
        }
    }

    /// Lock/pull/mutate/push/unlock around a single mutation.
    ///
    /// Unstored entities have nothing to serialize against and skip the
    /// lock and cache traffic entirely.
    fn with_mutation<T>(&mut self, f: impl FnOnce(&mut Self) -> OdmResult<T>) -> OdmResult<T> {
        self.check_not_deleted()?;

        let guard = self.lock_guard()?;
        if guard.is_some() {
            self.cache_pull()?;
        }

        let out = f(self)?;

        if guard.is_some() && self.is_modified {
            self.cache_push();
        }

        Ok(out)
    }

    pub(crate) fn check_not_deleted(&self) -> OdmResult<()> {
        if self.is_deleted {
            let label = match self.id {
                Some(id) => format!("{}:{}", self.model, id),
                None => self.model.clone(),
            };
            return Err(OdmError::EntityDeleted(label));
        }
        Ok(())
    }

    /// Adopt the latest committed snapshot, if one exists. A dirty
    /// snapshot transfers its save obligation to this holder.
    pub(crate) fn cache_pull(&mut self) -> OdmResult<()> {
        let Some(id) = self.id else { return Ok(()) };
        let core = Arc::clone(&self.core);
        if let Some(snapshot) = core.entity_cache().get(&self.model, &id) {
            self.fill_fields_data(snapshot.data)?;
            self.is_modified = self.is_modified || snapshot.modified;
        }
        Ok(())
    }

    pub(crate) fn cache_push(&self) {
        let Some(id) = self.id else { return };
        let snapshot = Snapshot {
            data: self.fields_data(),
            modified: self.is_modified,
        };
        self.core.entity_cache().put(&self.model, &id, &snapshot);
    }
}

// OdmCore resolves refs against the cache and the store; field coercion
// borrows that through the resolver seam.
impl RefResolver for OdmCore {
    fn ref_exists(&self, r: &EntityRef) -> OdmResult<bool> {
        self.entity_exists(r)
    }
}
