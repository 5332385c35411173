#![no_main]

//! Feed arbitrary JSON documents to `Model::parse`.
//!
//! A failed parse must leave every field untouched.

use libfuzzer_sys::fuzz_target;
use nimbus_core::FieldType;
use nimbus_model::{FieldSpec, Model, Schema};

fuzz_target!(|data: &[u8]| {
    let Ok(wire) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(schema) = Schema::builder("fuzz")
        .field(FieldSpec::new("id", FieldType::String))
        .field(FieldSpec::new("count", FieldType::Number).required().default_value(0))
        .field(FieldSpec::new("tags", FieldType::list_of(FieldType::String)))
        .field(FieldSpec::new("when", FieldType::Date).wire_path(["meta", "created"]))
        .field(FieldSpec::new("extra", FieldType::dictionary_of(FieldType::Number)))
        .build()
    else {
        return;
    };
    let Ok(model) = Model::new(&schema) else {
        return;
    };
    let before = model.to_wire();
    if model.parse(&wire).is_err() {
        assert_eq!(model.to_wire(), before, "failed parse mutated the model");
    } else {
        // Whatever parsed must parse again from its own wire form.
        let again = model.to_wire();
        assert!(model.parse(&again).is_ok());
    }
});
