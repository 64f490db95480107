//! End-to-end scenarios over the in-memory store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::entity::{Entity, Model};
use crate::error::{OdmError, OdmResult};
use crate::events::{HandlerBus, NullBus};
use crate::registry::Odm;
use crate::store::{DocumentStore, IndexSpec, IndexType, MemoryStore, SortDirection};
use crate::value::Value;
use crate::OdmConfig;

struct Note;

impl Model for Note {
    fn setup_fields(&self, entity: &mut Entity) -> OdmResult<()> {
        entity.define_field(crate::Field::string("title").required())?;
        entity.define_field(crate::Field::unique_string_list("tags"))?;
        entity.define_field(crate::Field::integer("views"))?;
        entity.define_field(crate::Field::decimal("price", 2))?;
        entity.define_field(crate::Field::reference("author", "user"))?;
        entity.define_field(crate::Field::virtual_field("summary"))?;
        Ok(())
    }

    fn setup_indexes(&self, entity: &mut Entity) -> OdmResult<()> {
        entity.define_index(IndexSpec::single("title", IndexType::Asc))
    }
}

struct User;

impl Model for User {
    fn setup_fields(&self, entity: &mut Entity) -> OdmResult<()> {
        entity.define_field(crate::Field::string("name").required())?;
        Ok(())
    }
}

fn setup() -> (Odm, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let odm = Odm::new(store.clone(), Arc::new(NullBus), OdmConfig::default());
    odm.register_model("note", Arc::new(Note)).unwrap();
    odm.register_model("user", Arc::new(User)).unwrap();
    (odm, store)
}

fn saved_note(odm: &Odm, title: &str) -> Entity {
    let mut note = odm.dispense("note").unwrap();
    note.f_set("title", Value::from(title)).unwrap();
    note.save().unwrap();
    note
}

#[test]
fn dispense_mutate_save_and_find() {
    let (odm, _) = setup();

    let mut note = odm.dispense("note").unwrap();
    assert!(note.is_new());
    assert!(note.is_modified());
    assert!(note.id().is_none());

    note.f_set("title", Value::from("first")).unwrap();
    note.f_add("tags", Value::from("rust")).unwrap();
    note.f_add("tags", Value::from("odm")).unwrap();
    note.f_add("tags", Value::from("rust")).unwrap();
    note.save().unwrap();

    assert!(!note.is_new());
    assert!(!note.is_modified());
    assert!(note.id().is_some());

    let mut found = odm.find("note").unwrap().eq("title", "first").unwrap().first().unwrap().unwrap();
    assert_eq!(found.id(), note.id());
    assert_eq!(
        found.f_get("tags").unwrap(),
        Value::List(vec![Value::from("rust"), Value::from("odm")])
    );
}

#[test]
fn required_field_blocks_save() {
    let (odm, store) = setup();

    let mut note = odm.dispense("note").unwrap();
    assert!(matches!(note.save(), Err(OdmError::FieldEmpty { .. })));
    assert_eq!(store.count("notes", &Value::Dict(Default::default())).unwrap(), 0);
}

#[test]
fn unmodified_save_is_a_no_op() {
    let (odm, store) = setup();
    let mut note = saved_note(&odm, "quiet");

    let before = store
        .find_one("notes", note.id().unwrap())
        .unwrap()
        .unwrap();
    note.save().unwrap();
    let after = store
        .find_one("notes", note.id().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(before.get("_modified"), after.get("_modified"));
}

#[test]
fn stored_document_shape() {
    let (odm, store) = setup();
    let note = saved_note(&odm, "shape");

    let doc = store.find_one("notes", note.id().unwrap()).unwrap().unwrap();
    assert_eq!(doc.get("_model"), Some(&Value::from("note")));
    assert_eq!(doc.get("title"), Some(&Value::from("shape")));
    // Decimals go to the store as floats
    assert_eq!(doc.get("price"), Some(&Value::Float(0.0)));
    assert!(matches!(doc.get("_created"), Some(Value::DateTime(_))));
    // Virtual fields never reach the store
    assert!(!doc.contains_key("summary"));
}

#[test]
fn deleted_entity_rejects_everything() {
    let (odm, _) = setup();
    let mut note = saved_note(&odm, "doomed");

    note.delete().unwrap();
    assert!(note.is_deleted());
    assert!(matches!(
        note.f_set("title", Value::from("x")),
        Err(OdmError::EntityDeleted(_))
    ));
    assert!(matches!(note.f_get("title"), Err(OdmError::EntityDeleted(_))));
    assert!(matches!(note.save(), Err(OdmError::EntityDeleted(_))));
    assert!(matches!(note.delete(), Err(OdmError::EntityDeleted(_))));
}

#[test]
fn update_state_false_leaves_entity_clean() {
    let (odm, store) = setup();
    let mut note = saved_note(&odm, "quiet");

    note.f_set_with("views", Value::Int(9), false).unwrap();
    assert!(!note.is_modified());

    // Nothing to save, so the unmarked change never reaches the store
    note.save().unwrap();
    let doc = store.find_one("notes", note.id().unwrap()).unwrap().unwrap();
    assert_eq!(doc.get("views"), Some(&Value::Int(0)));
}

#[test]
fn new_entity_cannot_be_deleted() {
    let (odm, _) = setup();
    let mut note = odm.dispense("note").unwrap();
    assert!(matches!(note.delete(), Err(OdmError::ForbidEntityDelete(_))));
}

#[test]
fn duplicate_registration_fails() {
    let (odm, _) = setup();
    let err = odm.register_model("note", Arc::new(Note)).unwrap_err();
    assert!(matches!(err, OdmError::ModelAlreadyRegistered(_)));
    assert!(matches!(
        odm.dispense("ghost"),
        Err(OdmError::ModelNotRegistered(_))
    ));
}

#[test]
fn concurrent_holders_converge_through_the_cache() {
    let (odm, store) = setup();
    let note = saved_note(&odm, "shared");
    let id = *note.id().unwrap();

    let mut a = odm.dispense_by_id("note", &id).unwrap();
    let mut b = odm.dispense_by_id("note", &id).unwrap();

    a.f_set("views", Value::Int(7)).unwrap();
    // b's mutation pulls a's committed snapshot first
    b.f_set("title", Value::from("renamed")).unwrap();
    b.save().unwrap();

    let doc = store.find_one("notes", &id).unwrap().unwrap();
    assert_eq!(doc.get("views"), Some(&Value::Int(7)));
    assert_eq!(doc.get("title"), Some(&Value::from("renamed")));
}

#[test]
fn emptiness_checks_see_concurrent_writes() {
    let (odm, _) = setup();
    let note = saved_note(&odm, "shared");
    let id = *note.id().unwrap();

    let mut a = odm.dispense_by_id("note", &id).unwrap();
    let mut b = odm.dispense_by_id("note", &id).unwrap();
    assert!(b.f_is_empty("tags").unwrap());

    // a's mutation lands in the snapshot cache; b must not report stale emptiness
    a.f_add("tags", Value::from("rust")).unwrap();
    assert!(!b.f_is_empty("tags").unwrap());
}

#[test]
fn parent_saves_cascade_to_modified_children() {
    let (odm, store) = setup();
    let mut parent = saved_note(&odm, "parent");
    let mut child = saved_note(&odm, "child");
    parent.append_child(&mut child).unwrap();
    parent.save().unwrap();
    child.save().unwrap();

    // A different holder leaves the child dirty without saving it
    let mut dirty = odm.dispense_by_id("note", child.id().unwrap()).unwrap();
    dirty.f_set("views", Value::Int(42)).unwrap();

    let mut parent = odm.dispense_by_id("note", parent.id().unwrap()).unwrap();
    parent.f_set("title", Value::from("parent v2")).unwrap();
    parent.save().unwrap();

    let doc = store.find_one("notes", child.id().unwrap()).unwrap().unwrap();
    assert_eq!(doc.get("views"), Some(&Value::Int(42)));
}

#[test]
fn deleting_a_parent_orphans_children() {
    let (odm, _) = setup();
    let mut parent = saved_note(&odm, "parent");
    let mut child = saved_note(&odm, "child");
    parent.append_child(&mut child).unwrap();
    parent.save().unwrap();
    child.save().unwrap();

    parent.delete().unwrap();

    let mut child = odm.dispense_by_id("note", child.id().unwrap()).unwrap();
    assert_eq!(child.f_get("_parent").unwrap(), Value::Null);
}

#[test]
fn relations_require_stored_entities() {
    let (odm, _) = setup();
    let mut stored = saved_note(&odm, "stored");
    let mut fresh = odm.dispense("note").unwrap();

    assert!(matches!(
        stored.append_child(&mut fresh),
        Err(OdmError::EntityNotStored(_))
    ));

    let mut unstored_parent = odm.dispense("note").unwrap();
    assert!(matches!(
        unstored_parent.append_child(&mut stored),
        Err(OdmError::EntityNotLocked(_))
    ));
}

#[test]
fn references_must_point_at_live_entities() {
    let (odm, _) = setup();
    let mut user = odm.dispense("user").unwrap();
    user.f_set("name", Value::from("jane")).unwrap();
    user.save().unwrap();

    let mut note = odm.dispense("note").unwrap();
    note.f_set("author", Value::Ref(user.make_ref().unwrap())).unwrap();

    let ghost = crate::EntityRef { model: "user".into(), id: crate::ObjectId::new() };
    assert!(matches!(
        note.f_set("author", Value::Ref(ghost)),
        Err(OdmError::ReferenceNotFound(_))
    ));

    let wrong_model = user.make_ref().unwrap();
    let wrong_model = crate::EntityRef { model: "note".into(), id: wrong_model.id };
    assert!(matches!(
        note.f_set("author", Value::Ref(wrong_model)),
        Err(OdmError::TypeMismatch(_))
    ));
}

#[test]
fn finder_sees_saves_immediately() {
    let (odm, _) = setup();
    saved_note(&odm, "one");

    assert_eq!(odm.find("note").unwrap().get(0).unwrap().len(), 1);

    // The id list was cached; the save drops the model's pool
    saved_note(&odm, "two");
    assert_eq!(odm.find("note").unwrap().get(0).unwrap().len(), 2);
}

#[test]
fn finder_sort_skip_and_count() {
    let (odm, _) = setup();
    for (title, views) in [("a", 3i64), ("b", 1), ("c", 2)] {
        let mut note = odm.dispense("note").unwrap();
        note.f_set("title", Value::from(title)).unwrap();
        note.f_set("views", Value::Int(views)).unwrap();
        note.save().unwrap();
    }

    let finder = odm
        .find("note")
        .unwrap()
        .gt("views", 0i64)
        .unwrap()
        .sort(&[("views", SortDirection::Desc)])
        .unwrap()
        .skip(1);
    // the skipped head is excluded from the count as well
    assert_eq!(finder.count().unwrap(), 2);
    assert_eq!(odm.find("note").unwrap().count().unwrap(), 3);

    let titles: Vec<Value> = finder
        .get(0)
        .unwrap()
        .map(|e| e.unwrap().f_get("title").unwrap())
        .collect();
    assert_eq!(titles, vec![Value::from("c"), Value::from("b")]);

    assert!(matches!(
        odm.find("note").unwrap().sort(&[("bogus", SortDirection::Asc)]),
        Err(OdmError::FieldNotDefined { .. })
    ));
}

#[test]
fn finder_distinct() {
    let (odm, _) = setup();
    for title in ["x", "x", "y"] {
        saved_note(&odm, title);
    }
    let values = odm.find("note").unwrap().distinct("title").unwrap();
    assert_eq!(values.len(), 2);
}

#[test]
fn pre_save_handlers_can_veto() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(HandlerBus::new());
    bus.on("pre_save:note", 0, |event| {
        if let crate::EntityEvent::PreSave(entity) = event {
            if entity.f_is_empty("tags")? {
                return Err(OdmError::event("untagged notes are not welcome"));
            }
        }
        Ok(())
    });

    let odm = Odm::new(store.clone(), bus, OdmConfig::default());
    odm.register_model("note", Arc::new(Note)).unwrap();

    let mut note = odm.dispense("note").unwrap();
    note.f_set("title", Value::from("bare")).unwrap();
    assert!(matches!(note.save(), Err(OdmError::Event(_))));
    assert_eq!(store.count("notes", &Value::Dict(Default::default())).unwrap(), 0);

    note.f_add("tags", Value::from("ok")).unwrap();
    note.save().unwrap();
    assert_eq!(store.count("notes", &Value::Dict(Default::default())).unwrap(), 1);
}

#[test]
fn save_events_carry_first_save() {
    let bus = Arc::new(HandlerBus::new());
    let first_saves = Arc::new(AtomicUsize::new(0));
    let saves = Arc::new(AtomicUsize::new(0));

    let f = Arc::clone(&first_saves);
    let s = Arc::clone(&saves);
    bus.on("save", 0, move |event| {
        if let crate::EntityEvent::Save { first_save, .. } = event {
            s.fetch_add(1, Ordering::SeqCst);
            if *first_save {
                f.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    });

    let odm = Odm::new(Arc::new(MemoryStore::new()), bus, OdmConfig::default());
    odm.register_model("note", Arc::new(Note)).unwrap();

    let mut note = saved_note(&odm, "evented");
    note.f_set("title", Value::from("evented v2")).unwrap();
    note.save().unwrap();

    assert_eq!(saves.load(Ordering::SeqCst), 2);
    assert_eq!(first_saves.load(Ordering::SeqCst), 1);
}

#[test]
fn model_hooks_shape_values() {
    struct ShoutingNote;

    impl Model for ShoutingNote {
        fn setup_fields(&self, entity: &mut Entity) -> OdmResult<()> {
            entity.define_field(crate::Field::string("title"))?;
            Ok(())
        }

        fn on_f_set(&self, _entity: &mut Entity, field: &str, value: Value) -> OdmResult<Value> {
            if field == "title" {
                if let Value::String(s) = &value {
                    return Ok(Value::from(s.to_uppercase()));
                }
            }
            Ok(value)
        }
    }

    let odm = Odm::new(Arc::new(MemoryStore::new()), Arc::new(NullBus), OdmConfig::default());
    odm.register_model("shout", Arc::new(ShoutingNote)).unwrap();

    let mut e = odm.dispense("shout").unwrap();
    e.f_set("title", Value::from("quiet")).unwrap();
    assert_eq!(e.f_get("title").unwrap(), Value::from("QUIET"));
}

#[test]
fn reload_discards_local_changes() {
    let (odm, _) = setup();
    let mut note = saved_note(&odm, "stable");

    note.f_set("title", Value::from("drifted")).unwrap();
    note.reload().unwrap();
    assert_eq!(note.f_get("title").unwrap(), Value::from("stable"));
    assert!(!note.is_modified());
}

#[test]
fn registry_lists_and_unregisters() {
    let (odm, _) = setup();
    assert_eq!(odm.models(), vec!["note".to_string(), "user".to_string()]);

    odm.unregister_model("user").unwrap();
    assert!(!odm.is_registered("user"));
    assert!(matches!(
        odm.unregister_model("user"),
        Err(OdmError::ModelNotRegistered(_))
    ));

    odm.shutdown();
    assert!(odm.models().is_empty());
}

#[test]
fn indexes_validate_fields_and_can_be_rebuilt() {
    let (odm, _) = setup();

    let mut note = odm.dispense("note").unwrap();
    assert!(matches!(
        note.define_index(IndexSpec::single("missing", IndexType::Asc)),
        Err(OdmError::FieldNotDefined { .. })
    ));

    odm.reindex("note").unwrap();
}

#[test]
fn resolve_refs_roundtrip() {
    let (odm, _) = setup();
    let note = saved_note(&odm, "referenced");
    let raw = note.make_ref().unwrap().to_string();

    let r = odm.resolve_ref(&raw).unwrap();
    let mut back = odm.get_by_ref(&r).unwrap();
    assert_eq!(back.f_get("title").unwrap(), Value::from("referenced"));

    assert!(matches!(
        odm.resolve_ref("ghost_model:00000000000000000000000000000000"),
        Err(OdmError::ModelNotRegistered(_))
    ));
    assert!(matches!(
        odm.resolve_ref("garbage"),
        Err(OdmError::InvalidReference(_))
    ));
}
