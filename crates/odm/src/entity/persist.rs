//! Entity persistence: save, delete, load

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::Snapshot;
use crate::error::{OdmError, OdmResult};
use crate::events::EntityEvent;
use crate::field::TrustingResolver;
use crate::value::{Document, Value};

use super::Entity;

#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Skip model hooks and bus events
    pub skip_hooks: bool,
    /// Stamp `_modified` with the current time
    pub update_timestamp: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions { skip_hooks: false, update_timestamp: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub skip_hooks: bool,
}

impl Entity {
    pub fn save(&mut self) -> OdmResult<&mut Self> {
        self.save_with(SaveOptions::default())
    }

    /// Persist the entity.
    ///
    /// An unmodified entity is a no-op. Pre-save hooks may veto by
    /// returning an error; nothing is written in that case. After the
    /// write the entity's snapshot is published, the model's finder
    /// cache is dropped and modified children are saved in turn.
    pub fn save_with(&mut self, opts: SaveOptions) -> OdmResult<&mut Self> {
        self.check_not_deleted()?;
        if !self.is_modified {
            return Ok(self);
        }

        let first_save = self.is_new;
        let core = Arc::clone(&self.core);
        let hooks = Arc::clone(&self.hooks);

        let _guard = self.lock_guard()?;
        if _guard.is_some() {
            self.cache_pull()?;
        }

        if !opts.skip_hooks {
            hooks.pre_save(self)?;
            core.bus().fire(&mut EntityEvent::PreSave(self))?;
        }

        if opts.update_timestamp {
            let idx = self.field_index("_modified")?;
            self.fields[idx].set_val(Value::from(Utc::now()), true, &TrustingResolver)?;
        }

        let doc = self.as_db_object(true)?;

        if first_save {
            let id = core.store().insert_one(&self.collection, &doc)?;
            self.id = Some(id);
            self.is_new = false;
            debug!(model = %self.model, id = %id, "entity inserted");
        } else {
            // Safe: a non-new entity always carries an id
            let id = self.id.ok_or_else(|| OdmError::EntityNotStored(self.model.clone()))?;
            core.store().replace_one(&self.collection, &id, &doc)?;
            debug!(model = %self.model, id = %id, "entity replaced");
        }

        if !opts.skip_hooks {
            hooks.after_save(self, first_save)?;
            core.bus()
                .fire(&mut EntityEvent::Save { entity: self, first_save })?;
        }

        self.is_modified = false;
        for field in &mut self.fields {
            field.reset_modified();
        }

        self.cache_push();
        core.clear_finder_cache(&self.model)?;

        // Children that still carry unsaved data ride along, without
        // hooks and without touching their timestamps
        for child_ref in self.child_refs() {
            match core.get_by_ref(&child_ref) {
                Ok(mut child) => {
                    if child.is_modified() {
                        child.save_with(SaveOptions {
                            skip_hooks: true,
                            update_timestamp: false,
                        })?;
                    }
                }
                Err(OdmError::ReferenceNotFound(_)) | Err(OdmError::EntityNotFound { .. }) => {
                    warn!(parent = %self.model, child = %child_ref, "skipping missing child");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(self)
    }

    pub fn delete(&mut self) -> OdmResult<&mut Self> {
        self.delete_with(DeleteOptions::default())
    }

    /// Remove the entity from the store.
    ///
    /// Children are orphaned, not removed. Pre-delete hooks may veto;
    /// the entity is marked deleted only after the store write, and
    /// every operation on it afterwards fails.
    pub fn delete_with(&mut self, opts: DeleteOptions) -> OdmResult<&mut Self> {
        self.check_not_deleted()?;
        if self.is_new {
            return Err(OdmError::ForbidEntityDelete(format!(
                "entity of model '{}' has never been saved",
                self.model
            )));
        }

        let core = Arc::clone(&self.core);
        let hooks = Arc::clone(&self.hooks);
        let id = self.id.ok_or_else(|| OdmError::EntityNotStored(self.model.clone()))?;

        let _guard = self.lock_guard()?;
        self.cache_pull()?;

        if !opts.skip_hooks {
            hooks.pre_delete(self)?;
            core.bus().fire(&mut EntityEvent::PreDelete(self))?;
        }

        for field in &mut self.fields {
            field.on_entity_delete();
        }

        let children = self.child_refs();

        core.store().delete_one(&self.collection, &id)?;
        debug!(model = %self.model, id = %id, "entity deleted");

        for child_ref in children {
            match core.get_by_ref(&child_ref) {
                Ok(mut child) => {
                    child.f_clr("_parent")?;
                    child.save()?;
                }
                Err(OdmError::ReferenceNotFound(_)) | Err(OdmError::EntityNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        if !opts.skip_hooks {
            hooks.after_delete(self)?;
            core.bus().fire(&mut EntityEvent::Delete(self))?;
        }

        core.entity_cache().rm(&self.model, &id);
        core.clear_finder_cache(&self.model)?;

        self.is_deleted = true;
        Ok(self)
    }

    /// Storage form of the entity. Virtual fields are omitted; with
    /// `check_required` an empty required field aborts.
    pub fn as_db_object(&self, check_required: bool) -> OdmResult<Document> {
        let mut doc = Document::new();

        for field in self.fields.iter().filter(|f| !f.is_virtual()) {
            if check_required && field.is_required() && field.is_empty() {
                return Err(OdmError::FieldEmpty {
                    model: self.model.clone(),
                    field: field.name().to_string(),
                });
            }
            doc.insert(field.name().to_string(), field.as_storable());
        }

        if let Some(id) = self.id {
            doc.insert("_id".to_string(), Value::ObjectId(id));
        }
        doc.insert("_model".to_string(), Value::from(self.model.as_str()));

        Ok(doc)
    }

    pub fn as_jsonable(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "_id".to_string(),
            match self.id {
                Some(id) => serde_json::Value::String(id.to_string()),
                None => serde_json::Value::Null,
            },
        );
        map.insert(
            "_model".to_string(),
            serde_json::Value::String(self.model.clone()),
        );
        for field in self.fields.iter().filter(|f| !f.is_virtual()) {
            map.insert(field.name().to_string(), field.as_jsonable());
        }
        serde_json::Value::Object(map)
    }

    /// Field data as cached: every non-virtual field's current value
    pub(crate) fn fields_data(&self) -> Document {
        self.fields
            .iter()
            .filter(|f| !f.is_virtual())
            .map(|f| (f.name().to_string(), f.get_val()))
            .collect()
    }

    /// Absorb a stored document or snapshot. Unknown keys are ignored,
    /// `_id` sets the entity id, values skip reference validation.
    pub(crate) fn fill_fields_data(&mut self, data: Document) -> OdmResult<()> {
        for (name, value) in data {
            match name.as_str() {
                "_id" => {
                    if let Value::ObjectId(id) = value {
                        self.id = Some(id);
                        self.is_new = false;
                    }
                }
                "_model" => {}
                _ => {
                    if let Ok(idx) = self.field_index(&name) {
                        self.fields[idx].load_stored(value)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Adopt a cache snapshot for a known id
    pub(crate) fn load_snapshot(&mut self, snapshot: Snapshot) -> OdmResult<()> {
        self.fill_fields_data(snapshot.data)?;
        self.is_new = false;
        self.is_modified = snapshot.modified;
        Ok(())
    }

    /// Adopt a store document and publish it as the entity's snapshot
    pub(crate) fn load_document(&mut self, doc: Document) -> OdmResult<()> {
        self.fill_fields_data(doc)?;
        self.is_new = false;
        self.is_modified = false;
        for field in &mut self.fields {
            field.reset_modified();
        }
        self.cache_push();
        Ok(())
    }

    /// Discard local state and re-read the entity from the store
    pub fn reload(&mut self) -> OdmResult<&mut Self> {
        self.check_not_deleted()?;
        let id = self.id.ok_or_else(|| OdmError::EntityNotStored(self.model.clone()))?;

        let core = Arc::clone(&self.core);
        let doc = core
            .store()
            .find_one(&self.collection, &id)?
            .ok_or_else(|| OdmError::EntityNotFound {
                model: self.model.clone(),
                id: id.to_string(),
            })?;

        self.load_document(doc)?;
        Ok(self)
    }
}
