#![no_main]

//! Typed decoding never panics, and what it accepts re-encodes to a value
//! the same type accepts.

use libfuzzer_sys::fuzz_target;
use nimbus_core::FieldType;
use nimbus_core::wire::{decode, decode_untyped, encode};

fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let _ = decode_untyped(&json);
    for ty in [
        FieldType::String,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::File,
        FieldType::List(None),
        FieldType::list_of(FieldType::Number),
        FieldType::Dictionary(None),
    ] {
        if let Ok(value) = decode(&ty, &json) {
            assert!(ty.admits(&value));
            assert!(decode(&ty, &encode(&value)).is_ok());
        }
    }
});
