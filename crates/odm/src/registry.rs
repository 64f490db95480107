//! Model registry and ODM core
//!
//! [`Odm`] is the single owning handle: it carries the store, the event
//! bus, the entity snapshot cache, per-model finder caches and the lock
//! table. Everything an entity or finder needs reaches it through a
//! shared [`OdmCore`]; there is no global state, and dropping the handle
//! after [`Odm::shutdown`] tears the whole instance down.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::info;

use sitekit_cache::{Cache, CacheBackend, CacheConfig, MemoryBackend};

use crate::cache::EntityCache;
use crate::config::OdmConfig;
use crate::entity::{Entity, Model};
use crate::error::{OdmError, OdmResult};
use crate::events::{EntityEvent, EventBus};
use crate::finder::Finder;
use crate::lock::LockTable;
use crate::store::DocumentStore;
use crate::value::{EntityRef, ObjectId};

pub(crate) type FinderPool = Cache<Arc<dyn CacheBackend>>;

struct ModelEntry {
    hooks: Arc<dyn Model>,
    collection: String,
}

pub struct OdmCore {
    // Upheld by construction: the core only exists inside the Arc built
    // by Odm::new, so upgrading while a method runs cannot fail.
    self_ref: Weak<OdmCore>,
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn EventBus>,
    config: OdmConfig,
    models: DashMap<String, ModelEntry>,
    entity_cache: EntityCache,
    finder_pools: DashMap<String, Arc<FinderPool>>,
    locks: LockTable,
}

impl OdmCore {
    fn arc(&self) -> Arc<OdmCore> {
        self.self_ref.upgrade().expect("registry core outlives its Arc")
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub(crate) fn bus(&self) -> &dyn EventBus {
        self.bus.as_ref()
    }

    pub(crate) fn config(&self) -> &OdmConfig {
        &self.config
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub(crate) fn entity_cache(&self) -> &EntityCache {
        &self.entity_cache
    }

    pub(crate) fn finder_pool(&self, model: &str) -> Option<Arc<FinderPool>> {
        self.finder_pools.get(model).map(|p| Arc::clone(p.value()))
    }

    fn entry(&self, model: &str) -> OdmResult<(Arc<dyn Model>, String)> {
        self.models
            .get(model)
            .map(|e| (Arc::clone(&e.hooks), e.collection.clone()))
            .ok_or_else(|| OdmError::ModelNotRegistered(model.to_string()))
    }

    pub(crate) fn is_registered(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Fresh entity of a registered model
    pub(crate) fn dispense(&self, model: &str) -> OdmResult<Entity> {
        let (hooks, collection) = self.entry(model)?;
        let mut entity = Entity::construct(self.arc(), hooks, model, &collection)?;
        entity.init_new()?;
        Ok(entity)
    }

    /// Stored entity by id: cache snapshot first, then the store
    pub(crate) fn dispense_by_id(&self, model: &str, id: &ObjectId) -> OdmResult<Entity> {
        let (hooks, collection) = self.entry(model)?;
        let mut entity = Entity::construct(self.arc(), hooks, model, &collection)?;

        if let Some(snapshot) = self.entity_cache.get(model, id) {
            entity.fill_id(*id);
            entity.load_snapshot(snapshot)?;
            return Ok(entity);
        }

        let doc = self
            .store
            .find_one(&collection, id)?
            .ok_or_else(|| OdmError::EntityNotFound {
                model: model.to_string(),
                id: id.to_string(),
            })?;
        entity.fill_id(*id);
        entity.load_document(doc)?;
        Ok(entity)
    }

    /// Entity behind a reference; a missing target is a broken reference
    pub(crate) fn get_by_ref(&self, r: &EntityRef) -> OdmResult<Entity> {
        self.dispense_by_id(&r.model, &r.id).map_err(|err| match err {
            OdmError::EntityNotFound { .. } => OdmError::ReferenceNotFound(r.to_string()),
            other => other,
        })
    }

    pub(crate) fn entity_exists(&self, r: &EntityRef) -> OdmResult<bool> {
        let (_, collection) = self.entry(&r.model)?;
        if self.entity_cache.has(&r.model, &r.id) {
            return Ok(true);
        }
        Ok(self.store.find_one(&collection, &r.id)?.is_some())
    }

    /// Entity shell used for argument sanitizing; never persisted
    pub(crate) fn mock_entity(&self, model: &str) -> OdmResult<Entity> {
        let (hooks, collection) = self.entry(model)?;
        Entity::construct(self.arc(), hooks, model, &collection)
    }

    /// Drop the model's finder cache and notify listeners
    pub(crate) fn clear_finder_cache(&self, model: &str) -> OdmResult<()> {
        if let Some(pool) = self.finder_pool(model) {
            if let Err(err) = pool.flush() {
                return Err(OdmError::store(format!(
                    "finder cache flush failed for '{model}': {err}"
                )));
            }
        }
        self.bus.fire(&mut EntityEvent::FinderCacheClear { model })
    }
}

/// The owning ODM handle
pub struct Odm {
    core: Arc<OdmCore>,
}

impl Odm {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bus: Arc<dyn EventBus>,
        config: OdmConfig,
    ) -> Self {
        let entity_backend: Arc<dyn CacheBackend> =
            Arc::new(MemoryBackend::new(CacheConfig::default()));
        let entity_cache = EntityCache::new(entity_backend, config.entity_cache_ttl);

        let core = Arc::new_cyclic(|weak| OdmCore {
            self_ref: weak.clone(),
            store,
            bus,
            config,
            models: DashMap::new(),
            entity_cache,
            finder_pools: DashMap::new(),
            locks: LockTable::new(),
        });

        Odm { core }
    }

    /// Register a model under a unique name.
    ///
    /// The collection name comes from the model's override or is derived
    /// from the name. When the collection does not exist yet, the model's
    /// indexes are created. Listeners observe the registration.
    pub fn register_model(&self, model: &str, hooks: Arc<dyn Model>) -> OdmResult<()> {
        if self.core.is_registered(model) {
            return Err(OdmError::ModelAlreadyRegistered(model.to_string()));
        }

        let collection = hooks
            .collection_name(model)
            .unwrap_or_else(|| derive_collection_name(model));

        self.core.models.insert(
            model.to_string(),
            ModelEntry { hooks, collection: collection.clone() },
        );

        let finder_backend: Arc<dyn CacheBackend> =
            Arc::new(MemoryBackend::new(CacheConfig::default()));
        self.core
            .finder_pools
            .insert(model.to_string(), Arc::new(Cache::new(finder_backend)));

        let is_new_collection = !self
            .core
            .store
            .collection_names()?
            .iter()
            .any(|name| name == &collection);
        if is_new_collection {
            self.core.mock_entity(model)?.create_indexes()?;
        }

        self.core.bus.fire(&mut EntityEvent::Register { model })?;
        info!(model, collection, "model registered");
        Ok(())
    }

    pub fn unregister_model(&self, model: &str) -> OdmResult<()> {
        if self.core.models.remove(model).is_none() {
            return Err(OdmError::ModelNotRegistered(model.to_string()));
        }
        self.core.finder_pools.remove(model);
        info!(model, "model unregistered");
        Ok(())
    }

    pub fn is_registered(&self, model: &str) -> bool {
        self.core.is_registered(model)
    }

    /// Rebuild a model's indexes from its current declarations
    pub fn reindex(&self, model: &str) -> OdmResult<()> {
        self.core.mock_entity(model)?.reindex()
    }

    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.core.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// New, not yet stored entity of the model
    pub fn dispense(&self, model: &str) -> OdmResult<Entity> {
        self.core.dispense(model)
    }

    /// Stored entity by id
    pub fn dispense_by_id(&self, model: &str, id: &ObjectId) -> OdmResult<Entity> {
        self.core.dispense_by_id(model, id)
    }

    pub fn find(&self, model: &str) -> OdmResult<Finder> {
        let (_, collection) = self.core.entry(model)?;
        let mock = self.core.mock_entity(model)?;
        Ok(Finder::new(
            Arc::clone(&self.core),
            model,
            &collection,
            mock,
            self.core.config.finder_cache_ttl,
        ))
    }

    /// Parse a `"model:id"` string into a reference
    pub fn resolve_ref(&self, raw: &str) -> OdmResult<EntityRef> {
        let r: EntityRef = raw.parse()?;
        if !self.core.is_registered(&r.model) {
            return Err(OdmError::ModelNotRegistered(r.model));
        }
        Ok(r)
    }

    pub fn resolve_refs(&self, raw: &[&str]) -> OdmResult<Vec<EntityRef>> {
        raw.iter().map(|s| self.resolve_ref(s)).collect()
    }

    pub fn get_by_ref(&self, r: &EntityRef) -> OdmResult<Entity> {
        self.core.get_by_ref(r)
    }

    pub fn clear_finder_cache(&self, model: &str) -> OdmResult<()> {
        self.core.clear_finder_cache(model)
    }

    /// Drop all models and cached state. The store is left untouched.
    pub fn shutdown(&self) {
        for entry in self.core.finder_pools.iter() {
            let _ = entry.value().flush();
        }
        self.core.finder_pools.clear();
        self.core.entity_cache.flush();
        self.core.models.clear();
        info!("odm shut down");
    }
}

/// `"note"` becomes `"notes"`, `"status"` and `"dish"` take `"es"`
fn derive_collection_name(model: &str) -> String {
    if model.ends_with('s') || model.ends_with('h') {
        format!("{model}es")
    } else {
        format!("{model}s")
    }
}
