//! # sitekit-odm
//!
//! A synchronous object-document mapper over a pluggable document store.
//!
//! Models are registered with an [`Odm`] handle and describe their
//! structure through typed [`Field`]s. Entities are dispensed from the
//! registry, mutated through checked field operations and persisted with
//! lifecycle hooks and events around every write. Stored entities share
//! committed state through a process-wide snapshot cache and serialize
//! their mutations on named reentrant locks; finders compile criteria to
//! store filters and cache their result id lists per model.
//!
//! ```
//! use std::sync::Arc;
//! use sitekit_odm::{
//!     Entity, Field, MemoryStore, Model, NullBus, Odm, OdmConfig, OdmResult, Value,
//! };
//!
//! struct Note;
//!
//! impl Model for Note {
//!     fn setup_fields(&self, entity: &mut Entity) -> OdmResult<()> {
//!         entity.define_field(Field::string("title").required())?;
//!         entity.define_field(Field::unique_string_list("tags"))?;
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> OdmResult<()> {
//! let odm = Odm::new(Arc::new(MemoryStore::new()), Arc::new(NullBus), OdmConfig::default());
//! odm.register_model("note", Arc::new(Note))?;
//!
//! let mut note = odm.dispense("note")?;
//! note.f_set("title", Value::from("hello"))?;
//! note.save()?;
//!
//! let found = odm.find("note")?.eq("title", "hello")?.first()?;
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod field;
pub mod finder;
pub mod lock;
pub mod query;
pub mod registry;
pub mod store;
pub mod value;

pub use cache::Snapshot;
pub use config::OdmConfig;
pub use entity::{DeleteOptions, Entity, Model, SaveOptions};
pub use error::{OdmError, OdmResult};
pub use events::{EntityEvent, EventBus, HandlerBus, NullBus};
pub use field::{ElemKind, Field, FieldKind, ListOpts, RefOpts, RefResolver};
pub use finder::{Finder, FinderResult};
pub use query::{LogicalOp, Point, Query};
pub use registry::Odm;
pub use store::{DocumentStore, IndexSpec, IndexType, MemoryStore, SortDirection};
pub use value::{Document, EntityRef, ObjectId, Value};

#[cfg(test)]
mod tests;
