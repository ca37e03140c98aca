//! Tests for Collection and Store
//!
//! These tests verify:
//! - Identifier index stays consistent with the row list
//! - Replacement keeps position, removal shifts later rows
//! - Query matching over a collection
//! - Store drop/clear semantics

use std::collections::HashMap;

use folio::document::{Meta, Row};
use folio::registry::{CollectionConfig, Registry};
use folio::store::{Collection, Store};
use folio::Query;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => Row::new(map, Meta::new()),
        _ => panic!("test rows must be objects"),
    }
}

fn ids(collection: &Collection) -> Vec<&str> {
    collection.iter().filter_map(Row::id).collect()
}

fn setup_collection() -> Collection {
    let mut collection = Collection::new();
    for (id, name) in [("a", "Shoe"), ("b", "Hat"), ("c", "Shoe")] {
        assert!(collection.insert(row(json!({ "_id": id, "name": name }))));
    }
    collection
}

// =============================================================================
// Insert / Lookup Tests
// =============================================================================

#[test]
fn test_insert_and_get() {
    let collection = setup_collection();

    assert_eq!(collection.len(), 3);
    assert!(collection.contains("b"));
    assert_eq!(collection.get("b").unwrap().record["name"], "Hat");
    assert!(collection.get("zzz").is_none());
}

#[test]
fn test_insert_duplicate_id_rejected() {
    let mut collection = setup_collection();

    let inserted = collection.insert(row(json!({ "_id": "a", "name": "Other" })));

    assert!(!inserted);
    assert_eq!(collection.len(), 3);
    assert_eq!(collection.get("a").unwrap().record["name"], "Shoe");
}

#[test]
fn test_insert_without_id_rejected() {
    let mut collection = Collection::new();
    assert!(!collection.insert(row(json!({ "name": "anonymous" }))));
    assert!(collection.is_empty());
}

// =============================================================================
// Replace / Remove Tests
// =============================================================================

#[test]
fn test_replace_keeps_position() {
    let mut collection = setup_collection();

    assert!(collection.replace(row(json!({ "_id": "a", "name": "Boot" }))));

    assert_eq!(ids(&collection), vec!["a", "b", "c"]);
    assert_eq!(collection.get("a").unwrap().record["name"], "Boot");
}

#[test]
fn test_replace_missing_row() {
    let mut collection = setup_collection();
    assert!(!collection.replace(row(json!({ "_id": "nope" }))));
    assert_eq!(collection.len(), 3);
}

#[test]
fn test_put_inserts_or_replaces() {
    let mut collection = setup_collection();

    collection.put(row(json!({ "_id": "b", "name": "Cap" })));
    collection.put(row(json!({ "_id": "d", "name": "Sock" })));

    assert_eq!(ids(&collection), vec!["a", "b", "c", "d"]);
    assert_eq!(collection.get("b").unwrap().record["name"], "Cap");
}

#[test]
fn test_remove_reindexes_later_rows() {
    let mut collection = setup_collection();

    let removed = collection.remove("a").unwrap();

    assert_eq!(removed.id(), Some("a"));
    assert_eq!(ids(&collection), vec!["b", "c"]);
    // Index lookups still land on the right rows after the shift
    assert_eq!(collection.get("c").unwrap().id(), Some("c"));
    assert_eq!(collection.get("b").unwrap().id(), Some("b"));
    assert!(collection.remove("a").is_none());
}

#[test]
fn test_from_rows_skips_rows_without_id() {
    let collection = Collection::from_rows(vec![
        row(json!({ "_id": "x" })),
        row(json!({ "name": "no id" })),
        row(json!({ "_id": "y" })),
    ]);

    assert_eq!(ids(&collection), vec!["x", "y"]);
}

// =============================================================================
// Query Matching Tests
// =============================================================================

#[test]
fn test_matching_by_field() {
    let collection = setup_collection();
    let query = Query::all().field("name", "Shoe");

    let matched: Vec<&str> = collection.matching(&query).filter_map(Row::id).collect();

    assert_eq!(matched, vec!["a", "c"]);
}

#[test]
fn test_empty_query_matches_all() {
    let collection = setup_collection();
    assert_eq!(collection.matching(&Query::all()).count(), 3);
}

#[test]
fn test_query_requires_field_presence_and_strict_equality() {
    let mut collection = Collection::new();
    collection.insert(row(json!({ "_id": "1", "n": 1 })));
    collection.insert(row(json!({ "_id": "2", "n": "1" })));
    collection.insert(row(json!({ "_id": "3" })));

    let query = Query::all().field("n", 1);
    let matched: Vec<&str> = collection.matching(&query).filter_map(Row::id).collect();
    assert_eq!(matched, vec!["1"]);

    let null_query = Query::all().field("n", Value::Null);
    assert_eq!(collection.matching(&null_query).count(), 0);
}

#[test]
fn test_query_compares_numbers_by_value() {
    let mut collection = Collection::new();
    collection.insert(row(json!({ "_id": "1", "n": 1.0, "tags": [2.0] })));
    collection.insert(row(json!({ "_id": "2", "n": 1.5 })));
    collection.insert(row(json!({ "_id": "3", "n": -1 })));

    let ones_query = Query::all().field("n", 1);
    let ones: Vec<&str> = collection
        .matching(&ones_query)
        .filter_map(Row::id)
        .collect();
    assert_eq!(ones, vec!["1"]);
    assert_eq!(collection.matching(&Query::all().field("tags", json!([2]))).count(), 1);
    assert_eq!(collection.matching(&Query::all().field("n", -1.0)).count(), 1);
    assert_eq!(collection.matching(&Query::all().field("n", u64::MAX)).count(), 0);
}

// =============================================================================
// Store Tests
// =============================================================================

#[test]
fn test_store_drop_collection_keeps_it_empty() {
    let mut store = Store::new();
    store.collection_mut("people").insert(row(json!({ "_id": "p1" })));

    store.drop_collection("people");

    assert_eq!(store.collection("people").unwrap().len(), 0);
    assert_eq!(store.collection_names(), vec!["people"]);
}

#[test]
fn test_store_clear_keeps_registry() {
    let mut store = Store::new();
    store.registry_mut().configure("people", CollectionConfig::new("email"));
    store.collection_mut("people").insert(row(json!({ "_id": "p1" })));
    store.collection_mut("pets").insert(row(json!({ "_id": "d1" })));

    store.clear();

    assert!(store.collection_names().is_empty());
    assert_eq!(store.row_count(), 0);
    assert!(store.registry().get("people").is_some());
}

#[test]
fn test_store_dump_is_a_copy() {
    let mut store = Store::new();
    store.collection_mut("b").insert(row(json!({ "_id": "2" })));
    store.collection_mut("a").insert(row(json!({ "_id": "1" })));

    let mut dump = store.dump();
    dump.get_mut("a").unwrap().clear();

    assert_eq!(dump.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(store.collection("a").unwrap().len(), 1);
}

#[test]
fn test_store_from_parts() {
    let mut collections = HashMap::new();
    collections.insert(
        "people".to_string(),
        vec![row(json!({ "_id": "p1" })), row(json!({ "_id": "p2" }))],
    );

    let store = Store::from_parts(collections, Registry::new());

    assert_eq!(store.row_count(), 2);
    assert!(store.collection("people").unwrap().contains("p2"));
}
