//! In-memory document store
//!
//! Collections live in a process-wide map guarded by a [`RwLock`]. The
//! filter matcher implements the comparison, logical and text operators
//! the query builder can produce; geo operators are rejected.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use regex::RegexBuilder;
use tracing::debug;

use crate::error::{OdmError, OdmResult};
use crate::value::{Document, ObjectId, Value};

use super::{DocumentStore, IndexSpec, SortDirection};

#[derive(Default)]
struct Collection {
    docs: BTreeMap<ObjectId, Document>,
    indexes: Vec<IndexSpec>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl DocumentStore for MemoryStore {
    fn find_ids(
        &self,
        collection: &str,
        filter: &Value,
        skip: u64,
        limit: u64,
        sort: &[(String, SortDirection)],
    ) -> OdmResult<Vec<ObjectId>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(&ObjectId, &Document)> = Vec::new();
        for (id, doc) in &coll.docs {
            if matches_filter(doc, filter)? {
                matched.push((id, doc));
            }
        }

        if !sort.is_empty() {
            matched.sort_by(|(_, a), (_, b)| compare_docs(a, b, sort));
        }

        let skip = skip as usize;
        let ids = matched
            .into_iter()
            .skip(skip)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .map(|(id, _)| *id)
            .collect();

        Ok(ids)
    }

    fn find_one(&self, collection: &str, id: &ObjectId) -> OdmResult<Option<Document>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|coll| coll.docs.get(id))
            .cloned())
    }

    fn count(&self, collection: &str, filter: &Value) -> OdmResult<u64> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(0);
        };

        let mut n = 0;
        for doc in coll.docs.values() {
            if matches_filter(doc, filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    fn distinct(&self, collection: &str, filter: &Value, field: &str) -> OdmResult<Vec<Value>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<Value> = Vec::new();
        for doc in coll.docs.values() {
            if !matches_filter(doc, filter)? {
                continue;
            }
            match lookup(doc, field) {
                Some(Value::List(items)) => {
                    for v in items {
                        if !values.contains(v) {
                            values.push(v.clone());
                        }
                    }
                }
                Some(v) => {
                    if !values.contains(v) {
                        values.push(v.clone());
                    }
                }
                None => {}
            }
        }
        Ok(values)
    }

    fn insert_one(&self, collection: &str, doc: &Document) -> OdmResult<ObjectId> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        let id = match doc.get("_id") {
            Some(Value::ObjectId(id)) => *id,
            _ => ObjectId::new(),
        };

        check_unique(coll, &id, doc)?;

        let mut doc = doc.clone();
        doc.insert("_id".to_string(), Value::ObjectId(id));
        coll.docs.insert(id, doc);

        debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    fn replace_one(&self, collection: &str, id: &ObjectId, doc: &Document) -> OdmResult<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();

        check_unique(coll, id, doc)?;

        let mut doc = doc.clone();
        doc.insert("_id".to_string(), Value::ObjectId(*id));
        coll.docs.insert(*id, doc);

        debug!(collection, id = %id, "document replaced");
        Ok(())
    }

    fn delete_one(&self, collection: &str, id: &ObjectId) -> OdmResult<()> {
        let mut collections = self.collections.write();
        if let Some(coll) = collections.get_mut(collection) {
            coll.docs.remove(id);
            debug!(collection, id = %id, "document deleted");
        }
        Ok(())
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> OdmResult<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        coll.indexes.push(index.clone());
        Ok(())
    }

    fn drop_indexes(&self, collection: &str) -> OdmResult<()> {
        let mut collections = self.collections.write();
        if let Some(coll) = collections.get_mut(collection) {
            coll.indexes.clear();
        }
        Ok(())
    }

    fn collection_names(&self) -> OdmResult<Vec<String>> {
        let collections = self.collections.read();
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Enforce unique indexes against every other document in the collection
fn check_unique(coll: &Collection, id: &ObjectId, doc: &Document) -> OdmResult<()> {
    for index in coll.indexes.iter().filter(|i| i.unique) {
        let key: Vec<Option<&Value>> =
            index.fields.iter().map(|(f, _)| lookup(doc, f)).collect();
        if key.iter().all(Option::is_none) {
            continue;
        }
        for (other_id, other) in &coll.docs {
            if other_id == id {
                continue;
            }
            let other_key: Vec<Option<&Value>> =
                index.fields.iter().map(|(f, _)| lookup(other, f)).collect();
            if key == other_key {
                return Err(OdmError::store(format!(
                    "duplicate key for unique index on {:?}",
                    index.fields.iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>()
                )));
            }
        }
    }
    Ok(())
}

/// Resolve a possibly dotted field path against a document
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        match current {
            Value::Dict(d) => current = d.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

fn matches_filter(doc: &Document, filter: &Value) -> OdmResult<bool> {
    let Value::Dict(criteria) = filter else {
        return Err(OdmError::query("filter must be a dict"));
    };

    for (key, cond) in criteria {
        let ok = match key.as_str() {
            "$and" => {
                let Value::List(items) = cond else {
                    return Err(OdmError::query("$and expects a list"));
                };
                let mut all = true;
                for item in items {
                    if !matches_filter(doc, item)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let Value::List(items) = cond else {
                    return Err(OdmError::query("$or expects a list"));
                };
                let mut any = items.is_empty();
                for item in items {
                    if matches_filter(doc, item)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$text" => matches_text(doc, cond)?,
            field => matches_criterion(lookup(doc, field), cond)?,
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn matches_criterion(value: Option<&Value>, cond: &Value) -> OdmResult<bool> {
    let Value::Dict(ops) = cond else {
        return Err(OdmError::query("criterion condition must be a dict of operators"));
    };

    let options = match ops.get("$options") {
        Some(Value::String(s)) => s.as_str(),
        _ => "",
    };

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => eq_match(value, arg),
            "$ne" => !eq_match(value, arg),
            "$gt" => ordered_match(value, arg, |o| o == Ordering::Greater),
            "$gte" => ordered_match(value, arg, |o| o != Ordering::Less),
            "$lt" => ordered_match(value, arg, |o| o == Ordering::Less),
            "$lte" => ordered_match(value, arg, |o| o != Ordering::Greater),
            "$in" => in_match(value, arg)?,
            "$nin" => !in_match(value, arg)?,
            "$regex" => regex_match(value, arg, options)?,
            "$options" => true,
            "$near" | "$nearSphere" | "$minDistance" | "$maxDistance" => {
                return Err(OdmError::store(
                    "geo operators require a geo-capable document store",
                ))
            }
            other => return Err(OdmError::InvalidComparisonOperator(other.to_string())),
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Equality with array semantics: a list value matches when it contains
/// the argument
fn eq_match(value: Option<&Value>, arg: &Value) -> bool {
    match value {
        None => arg.is_null(),
        Some(Value::List(items)) => {
            items.contains(arg) || matches!(arg, Value::List(_)) && Some(arg) == value
        }
        Some(v) => v == arg,
    }
}

fn ordered_match(value: Option<&Value>, arg: &Value, test: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(Value::List(items)) => items
            .iter()
            .any(|v| v.compare(arg).map_or(false, &test)),
        Some(v) => v.compare(arg).map_or(false, test),
        None => false,
    }
}

fn in_match(value: Option<&Value>, arg: &Value) -> OdmResult<bool> {
    let Value::List(candidates) = arg else {
        return Err(OdmError::query("$in/$nin expects a list"));
    };
    Ok(match value {
        None => candidates.contains(&Value::Null),
        Some(Value::List(items)) => items.iter().any(|v| candidates.contains(v)),
        Some(v) => candidates.contains(v),
    })
}

fn regex_match(value: Option<&Value>, arg: &Value, options: &str) -> OdmResult<bool> {
    let Value::String(pattern) = arg else {
        return Err(OdmError::query("$regex expects a string pattern"));
    };
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .build()
        .map_err(|e| OdmError::query(format!("invalid $regex pattern: {e}")))?;

    Ok(match value {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::List(items)) => items.iter().any(|v| match v {
            Value::String(s) => re.is_match(s),
            _ => false,
        }),
        _ => false,
    })
}

/// Case-insensitive token search over every string in the document.
/// Any matching token qualifies the document.
fn matches_text(doc: &Document, cond: &Value) -> OdmResult<bool> {
    let Value::Dict(spec) = cond else {
        return Err(OdmError::query("$text expects a dict"));
    };
    let Some(Value::String(search)) = spec.get("$search") else {
        return Err(OdmError::query("$text requires a $search string"));
    };

    let mut haystack = String::new();
    collect_strings(doc, &mut haystack);
    let haystack = haystack.to_lowercase();

    Ok(search
        .split_whitespace()
        .any(|token| haystack.contains(&token.to_lowercase())))
}

fn collect_strings(doc: &Document, out: &mut String) {
    fn walk(value: &Value, out: &mut String) {
        match value {
            Value::String(s) => {
                out.push_str(s);
                out.push(' ');
            }
            Value::List(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Dict(d) => d.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    doc.values().for_each(|v| walk(v, out));
}

fn compare_docs(a: &Document, b: &Document, sort: &[(String, SortDirection)]) -> Ordering {
    for (field, direction) in sort {
        let va = lookup(a, field).unwrap_or(&Value::Null);
        let vb = lookup(b, field).unwrap_or(&Value::Null);
        let ord = va.compare(vb).unwrap_or(Ordering::Equal);
        let ord = match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{LogicalOp, Query};
    use crate::store::IndexType;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn filter(field: &str, op: &str, arg: Value) -> Value {
        let mut q = Query::new();
        q.add_criteria(LogicalOp::And, field, op, arg).unwrap();
        q.compile()
    }

    #[test]
    fn insert_find_replace_delete() {
        let store = MemoryStore::new();
        let id = store
            .insert_one("notes", &doc(&[("title", Value::from("first"))]))
            .unwrap();

        let found = store.find_one("notes", &id).unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&Value::from("first")));
        assert_eq!(found.get("_id"), Some(&Value::ObjectId(id)));

        store
            .replace_one("notes", &id, &doc(&[("title", Value::from("second"))]))
            .unwrap();
        let found = store.find_one("notes", &id).unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&Value::from("second")));

        store.delete_one("notes", &id).unwrap();
        assert!(store.find_one("notes", &id).unwrap().is_none());
    }

    #[test]
    fn comparison_operators() {
        let store = MemoryStore::new();
        for views in [1i64, 5, 10] {
            store
                .insert_one("notes", &doc(&[("views", Value::Int(views))]))
                .unwrap();
        }

        let count = |f: Value| store.count("notes", &f).unwrap();
        assert_eq!(count(filter("views", ">", Value::Int(1))), 2);
        assert_eq!(count(filter("views", ">=", Value::Int(5))), 2);
        assert_eq!(count(filter("views", "<", Value::Int(5))), 1);
        assert_eq!(count(filter("views", "!=", Value::Int(5))), 2);
        assert_eq!(
            count(filter("views", "in", Value::List(vec![Value::Int(1), Value::Int(10)]))),
            2
        );
        assert_eq!(
            count(filter("views", "nin", Value::List(vec![Value::Int(1), Value::Int(10)]))),
            1
        );
    }

    #[test]
    fn numbers_compare_across_kinds() {
        let store = MemoryStore::new();
        store
            .insert_one("notes", &doc(&[("price", Value::Float(2.5))]))
            .unwrap();
        assert_eq!(store.count("notes", &filter("price", ">", Value::Int(2))).unwrap(), 1);
    }

    #[test]
    fn list_values_use_contains_semantics() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "notes",
                &doc(&[("tags", Value::List(vec![Value::from("a"), Value::from("b")]))]),
            )
            .unwrap();
        assert_eq!(store.count("notes", &filter("tags", "=", Value::from("a"))).unwrap(), 1);
        assert_eq!(store.count("notes", &filter("tags", "=", Value::from("c"))).unwrap(), 0);
    }

    #[test]
    fn case_insensitive_regex() {
        let store = MemoryStore::new();
        store
            .insert_one("notes", &doc(&[("title", Value::from("Hello World"))]))
            .unwrap();

        let mut q = Query::new();
        q.add_criteria(LogicalOp::And, "title", "regex_i", Value::from("^hello")).unwrap();
        assert_eq!(store.count("notes", &q.compile()).unwrap(), 1);

        assert_eq!(store.count("notes", &filter("title", "regex", Value::from("^hello"))).unwrap(), 0);
    }

    #[test]
    fn text_search_matches_any_token() {
        let store = MemoryStore::new();
        store
            .insert_one("notes", &doc(&[("body", Value::from("the quick brown fox"))]))
            .unwrap();

        let mut q = Query::new();
        q.add_text_search(LogicalOp::And, "FOX elephant", None).unwrap();
        assert_eq!(store.count("notes", &q.compile()).unwrap(), 1);

        let mut q = Query::new();
        q.add_text_search(LogicalOp::And, "elephant", None).unwrap();
        assert_eq!(store.count("notes", &q.compile()).unwrap(), 0);
    }

    #[test]
    fn or_group_matches_either() {
        let store = MemoryStore::new();
        store.insert_one("notes", &doc(&[("status", Value::from("draft"))])).unwrap();
        store.insert_one("notes", &doc(&[("status", Value::from("trash"))])).unwrap();
        store.insert_one("notes", &doc(&[("status", Value::from("live"))])).unwrap();

        let mut q = Query::new();
        q.add_criteria(LogicalOp::Or, "status", "=", Value::from("draft")).unwrap();
        q.add_criteria(LogicalOp::Or, "status", "=", Value::from("trash")).unwrap();
        assert_eq!(store.count("notes", &q.compile()).unwrap(), 2);
    }

    #[test]
    fn sort_skip_limit() {
        let store = MemoryStore::new();
        for views in [5i64, 1, 10, 7] {
            store
                .insert_one("notes", &doc(&[("views", Value::Int(views))]))
                .unwrap();
        }

        let sort = vec![("views".to_string(), SortDirection::Desc)];
        let ids = store
            .find_ids("notes", &Value::Dict(Document::new()), 1, 2, &sort)
            .unwrap();
        assert_eq!(ids.len(), 2);
        let views: Vec<Value> = ids
            .iter()
            .map(|id| {
                store.find_one("notes", id).unwrap().unwrap().get("views").cloned().unwrap()
            })
            .collect();
        assert_eq!(views, vec![Value::Int(7), Value::Int(5)]);
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let store = MemoryStore::new();
        store
            .create_index("users", &IndexSpec::single("email", IndexType::Asc).unique())
            .unwrap();

        store
            .insert_one("users", &doc(&[("email", Value::from("a@b.c"))]))
            .unwrap();
        let err = store
            .insert_one("users", &doc(&[("email", Value::from("a@b.c"))]))
            .unwrap_err();
        assert!(matches!(err, OdmError::Store(_)));
    }

    #[test]
    fn geo_operators_are_rejected() {
        let store = MemoryStore::new();
        store.insert_one("places", &doc(&[("name", Value::from("x"))])).unwrap();
        let err = store
            .count("places", &filter("geo", "near", Value::Null))
            .unwrap_err();
        assert!(matches!(err, OdmError::Store(_)));
    }

    #[test]
    fn distinct_flattens_lists() {
        let store = MemoryStore::new();
        store
            .insert_one(
                "notes",
                &doc(&[("tags", Value::List(vec![Value::from("a"), Value::from("b")]))]),
            )
            .unwrap();
        store
            .insert_one(
                "notes",
                &doc(&[("tags", Value::List(vec![Value::from("b"), Value::from("c")]))]),
            )
            .unwrap();

        let values = store
            .distinct("notes", &Value::Dict(Document::new()), "tags")
            .unwrap();
        assert_eq!(values.len(), 3);
        for tag in ["a", "b", "c"] {
            assert!(values.contains(&Value::from(tag)));
        }
    }
}
