//! Entity finder
//!
//! A [`Finder`] composes a [`Query`] against one model, executes it
//! through the store and dispenses matching entities lazily. Result id
//! lists are cached per model under a TTL; any save or delete in the
//! model drops the whole pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::entity::Entity;
use crate::error::{OdmError, OdmResult};
use crate::query::{LogicalOp, Point, Query};
use crate::registry::OdmCore;
use crate::store::SortDirection;
use crate::value::{ObjectId, Value};

pub struct Finder {
    core: Arc<OdmCore>,
    model: String,
    collection: String,
    mock: Entity,
    query: Query,
    skip: u64,
    sort: Vec<(String, SortDirection)>,
    cache_ttl: Option<Duration>,
}

impl Finder {
    pub(crate) fn new(
        core: Arc<OdmCore>,
        model: &str,
        collection: &str,
        mock: Entity,
        cache_ttl: Duration,
    ) -> Self {
        Finder {
            core,
            model: model.to_string(),
            collection: collection.to_string(),
            mock,
            query: Query::new(),
            skip: 0,
            sort: Vec::new(),
            cache_ttl: Some(cache_ttl),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Add an AND criterion. Arguments are normalized against the
    /// field's kind before compilation.
    pub fn where_field(mut self, field: &str, op: &str, arg: Value) -> OdmResult<Self> {
        let arg = self.sanitize_arg(field, arg)?;
        self.query.add_criteria(LogicalOp::And, field, op, arg)?;
        Ok(self)
    }

    pub fn or_where_field(mut self, field: &str, op: &str, arg: Value) -> OdmResult<Self> {
        let arg = self.sanitize_arg(field, arg)?;
        self.query.add_criteria(LogicalOp::Or, field, op, arg)?;
        Ok(self)
    }

    pub fn eq(self, field: &str, arg: impl Into<Value>) -> OdmResult<Self> {
        self.where_field(field, "=", arg.into())
    }

    pub fn ne(self, field: &str, arg: impl Into<Value>) -> OdmResult<Self> {
        self.where_field(field, "!=", arg.into())
    }

    pub fn gt(self, field: &str, arg: impl Into<Value>) -> OdmResult<Self> {
        self.where_field(field, ">", arg.into())
    }

    pub fn gte(self, field: &str, arg: impl Into<Value>) -> OdmResult<Self> {
        self.where_field(field, ">=", arg.into())
    }

    pub fn lt(self, field: &str, arg: impl Into<Value>) -> OdmResult<Self> {
        self.where_field(field, "<", arg.into())
    }

    pub fn lte(self, field: &str, arg: impl Into<Value>) -> OdmResult<Self> {
        self.where_field(field, "<=", arg.into())
    }

    pub fn near(self, field: &str, point: Point) -> OdmResult<Self> {
        self.where_field(field, "near", point.to_geo_json())
    }

    pub fn where_text(mut self, search: &str, language: Option<&str>) -> OdmResult<Self> {
        self.query.add_text_search(LogicalOp::And, search, language)?;
        Ok(self)
    }

    pub fn or_where_text(mut self, search: &str, language: Option<&str>) -> OdmResult<Self> {
        self.query.add_text_search(LogicalOp::Or, search, language)?;
        Ok(self)
    }

    pub fn remove_where(mut self, field: &str) -> Self {
        self.query.remove_field(field);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Sort order; every named field must exist on the model
    pub fn sort(mut self, fields: &[(&str, SortDirection)]) -> OdmResult<Self> {
        for (name, _) in fields {
            if *name != "_id" && !name.contains('.') && !self.mock.has_field(name) {
                return Err(OdmError::field_not_defined(&self.model, *name));
            }
        }
        self.sort = fields
            .iter()
            .map(|(name, dir)| (name.to_string(), *dir))
            .collect();
        Ok(self)
    }

    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Bypass the result cache for this finder
    pub fn no_cache(mut self) -> Self {
        self.cache_ttl = None;
        self
    }

    /// Execute and return up to `limit` entities; zero means all
    pub fn get(&self, limit: u64) -> OdmResult<FinderResult> {
        let filter = self.query.compile();
        let cache_key = self.cache_key(&filter, limit);

        if let (Some(_), Some(pool)) = (self.cache_ttl, self.core.finder_pool(&self.model)) {
            if let Ok(Some(ids)) = pool.get::<Vec<ObjectId>>(&cache_key) {
                debug!(model = %self.model, key = %cache_key, "finder cache hit");
                return Ok(FinderResult::new(Arc::clone(&self.core), &self.model, ids));
            }
        }

        let ids = self
            .core
            .store()
            .find_ids(&self.collection, &filter, self.skip, limit, &self.sort)?;

        if let (Some(ttl), Some(pool)) = (self.cache_ttl, self.core.finder_pool(&self.model)) {
            if let Err(err) = pool.put(&cache_key, &ids, Some(ttl)) {
                debug!(model = %self.model, %err, "finder cache write failed");
            }
        }

        Ok(FinderResult::new(Arc::clone(&self.core), &self.model, ids))
    }

    pub fn first(&self) -> OdmResult<Option<Entity>> {
        self.get(1)?.next().transpose()
    }

    /// Matching document count, uncached. A configured skip reduces the
    /// count; the limit passed to `get` does not.
    pub fn count(&self) -> OdmResult<u64> {
        let total = self.core.store().count(&self.collection, &self.query.compile())?;
        Ok(total.saturating_sub(self.skip))
    }

    /// Distinct values of a field among matching documents
    pub fn distinct(&self, field: &str) -> OdmResult<Vec<Value>> {
        self.core
            .store()
            .distinct(&self.collection, &self.query.compile(), field)
    }

    fn sanitize_arg(&self, field: &str, arg: Value) -> OdmResult<Value> {
        // Id criteria and dotted paths pass through untouched
        if field == "_id" || field.contains('.') {
            return Ok(arg);
        }
        self.mock.field(field)?.sanitize_finder_arg(arg)
    }

    fn cache_key(&self, filter: &Value, limit: u64) -> String {
        let sort: Vec<(&str, bool)> = self
            .sort
            .iter()
            .map(|(f, d)| (f.as_str(), *d == SortDirection::Asc))
            .collect();
        let payload = serde_json::json!({
            "filter": filter.to_json(),
            "skip": self.skip,
            "limit": limit,
            "sort": sort,
        });
        hex::encode(blake3::hash(payload.to_string().as_bytes()).as_bytes())
    }
}

/// A lazily dispensing finder result. Iteration yields entities in the
/// order the store returned them; an entity that vanished after the id
/// list was cached surfaces as an error.
pub struct FinderResult {
    core: Arc<OdmCore>,
    model: String,
    ids: Vec<ObjectId>,
    pos: usize,
}

impl FinderResult {
    fn new(core: Arc<OdmCore>, model: &str, ids: Vec<ObjectId>) -> Self {
        FinderResult { core, model: model.to_string(), ids, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }
}

impl Iterator for FinderResult {
    type Item = OdmResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = *self.ids.get(self.pos)?;
        self.pos += 1;
        Some(self.core.dispense_by_id(&self.model, &id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ids.len() - self.pos;
        (remaining, Some(remaining))
    }
}
