//! Document store abstraction
//!
//! The ODM talks to persistence through [`DocumentStore`], a synchronous
//! collection-of-documents interface with Mongo-style filter documents.
//! [`MemoryStore`] is the bundled backend.

mod memory;

pub use memory::MemoryStore;

use crate::error::OdmResult;
use crate::value::{Document, ObjectId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Asc,
    Desc,
    Text,
    Geo2d,
    GeoSphere,
}

/// A single index definition over one or more fields
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub fields: Vec<(String, IndexType)>,
    pub unique: bool,
    pub language_override: Option<String>,
}

impl IndexSpec {
    pub fn new(fields: Vec<(String, IndexType)>) -> Self {
        IndexSpec { fields, unique: false, language_override: None }
    }

    pub fn single(field: impl Into<String>, index_type: IndexType) -> Self {
        IndexSpec::new(vec![(field.into(), index_type)])
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_text(&self) -> bool {
        self.fields.iter().any(|(_, t)| *t == IndexType::Text)
    }
}

/// Synchronous document persistence.
///
/// Filters are the compiled output of a query: a dict with optional
/// `$and`/`$or` lists of `{field: {op: arg}}` criteria.
pub trait DocumentStore: Send + Sync {
    /// Ids of matching documents, in sort order, after skip/limit.
    /// A limit of zero means no limit.
    fn find_ids(
        &self,
        collection: &str,
        filter: &Value,
        skip: u64,
        limit: u64,
        sort: &[(String, SortDirection)],
    ) -> OdmResult<Vec<ObjectId>>;

    fn find_one(&self, collection: &str, id: &ObjectId) -> OdmResult<Option<Document>>;

    fn count(&self, collection: &str, filter: &Value) -> OdmResult<u64>;

    /// Distinct values of a field among matching documents
    fn distinct(&self, collection: &str, filter: &Value, field: &str) -> OdmResult<Vec<Value>>;

    fn insert_one(&self, collection: &str, doc: &Document) -> OdmResult<ObjectId>;

    fn replace_one(&self, collection: &str, id: &ObjectId, doc: &Document) -> OdmResult<()>;

    fn delete_one(&self, collection: &str, id: &ObjectId) -> OdmResult<()>;

    fn create_index(&self, collection: &str, index: &IndexSpec) -> OdmResult<()>;

    fn drop_indexes(&self, collection: &str) -> OdmResult<()>;

    fn collection_names(&self) -> OdmResult<Vec<String>>;
}
