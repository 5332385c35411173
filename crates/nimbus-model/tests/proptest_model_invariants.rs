//! Property-based invariant tests for models and collections.
//!
//! 1. `parse` is all or nothing.
//! 2. After `reconcile`, membership and order match the listing exactly.
//! 3. Members that survive a reconcile keep their handle.

use std::collections::HashMap;
use std::rc::Rc;

use nimbus_core::FieldType;
use nimbus_model::{Collection, FieldSpec, Model, Schema};
use proptest::prelude::*;
use serde_json::{Value as Json, json};

fn schema() -> Rc<Schema> {
    Schema::builder("disk")
        .field(FieldSpec::new("id", FieldType::Number).required())
        .field(FieldSpec::new("size", FieldType::Number).required().default_value(0))
        .field(FieldSpec::new("label", FieldType::String))
        .field(FieldSpec::new("zone", FieldType::String).wire_path(["placement", "zone"]))
        .build()
        .unwrap()
}

fn field_value() -> impl Strategy<Value = Json> {
    prop_oneof![
        Just(Json::Null),
        any::<i32>().prop_map(Json::from),
        "[a-z]{0,5}".prop_map(Json::String),
        any::<bool>().prop_map(Json::Bool),
    ]
}

fn ids(collection: &Collection) -> Vec<String> {
    collection.with_models(|models| models.iter().filter_map(Model::id).collect())
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Atomic parse
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn failed_parse_changes_nothing(
        size in field_value(),
        label in field_value(),
        zone in field_value(),
    ) {
        let model = Model::from_wire(&schema(), &json!({"id": 1, "size": 5, "label": "a"})).unwrap();
        let before = model.to_wire();
        let payload = json!({"size": size, "label": label, "placement": {"zone": zone}});
        match model.parse(&payload) {
            Ok(()) => {
                prop_assert_eq!(&model.to_wire()["size"], &payload["size"]);
                prop_assert_eq!(&model.to_wire()["placement"]["zone"], &payload["placement"]["zone"]);
            }
            Err(_) => prop_assert_eq!(model.to_wire(), before),
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2 + 3. Reconcile follows the server listing
// ═════════════════════════════════════════════════════════════════════════

fn listing() -> impl Strategy<Value = Vec<u32>> {
    proptest::sample::subsequence((0u32..12).collect::<Vec<_>>(), 0..12).prop_shuffle()
}

proptest! {
    #[test]
    fn reconcile_matches_listing(first in listing(), second in listing()) {
        let collection = Collection::new(&schema());
        let wire = |ids: &[u32]| -> Vec<Json> {
            ids.iter().map(|id| json!({"id": id, "size": id * 10})).collect()
        };

        collection.reconcile(&wire(&first)).unwrap();
        let handles: HashMap<String, Model> = collection
            .models()
            .into_iter()
            .filter_map(|m| m.id().map(|id| (id, m)))
            .collect();

        collection.reconcile(&wire(&second)).unwrap();
        let expected: Vec<String> = second.iter().map(u32::to_string).collect();
        prop_assert_eq!(ids(&collection), expected);
        for model in collection.models() {
            if let Some(old) = model.id().and_then(|id| handles.get(&id)) {
                prop_assert!(old.same_as(&model));
            }
        }
    }
}
