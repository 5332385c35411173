//! JSON wire encoding for [`Value`].
//!
//! | Tag | Wire form |
//! |-----|-----------|
//! | `string` | JSON string |
//! | `number` | JSON number, integer/float representation preserved |
//! | `boolean` | JSON bool |
//! | `date` | RFC 3339 string, UTC, `Z` suffix, fractional seconds only when non-zero |
//! | `list` | JSON array |
//! | `dictionary` | JSON object, key order preserved |
//! | `file` | `{"name": .., "type": .., "content": <base64>}` |
//!
//! JSON `null` decodes to [`Value::Null`] for every declared type; whether
//! null is acceptable is the cell's decision, not the codec's.
//!
//! # Invariants
//!
//! 1. `encode(decode(ty, w)?) == w` for every `w` already in canonical form.
//! 2. `decode_untyped(w)` never fails and `encode(decode_untyped(w)) == w` for
//!    any JSON document that contains no date or file shapes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::error::WireError;
use crate::value::{FieldType, FileBlob, Value};

/// Encode a value into its wire form.
#[must_use]
pub fn encode(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::String(s) => Json::String(s.clone()),
        Value::Number(n) => Json::Number(n.clone()),
        Value::Boolean(b) => Json::Bool(*b),
        Value::Date(d) => Json::String(format_date(d)),
        Value::List(items) => Json::Array(items.iter().map(encode).collect()),
        Value::Dictionary(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect::<Map<String, Json>>(),
        ),
        Value::File(file) => {
            let mut obj = Map::new();
            obj.insert("name".into(), Json::String(file.name.clone()));
            obj.insert("type".into(), Json::String(file.media_type.clone()));
            obj.insert("content".into(), Json::String(STANDARD.encode(&file.content)));
            Json::Object(obj)
        }
    }
}

/// Decode `json` as an instance of `ty`.
pub fn decode(ty: &FieldType, json: &Json) -> Result<Value, WireError> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        FieldType::String => match json {
            Json::String(s) => Ok(Value::String(s.clone())),
            other => Err(mismatch(ty, other)),
        },
        FieldType::Number => match json {
            Json::Number(n) => Ok(Value::Number(n.clone())),
            other => Err(mismatch(ty, other)),
        },
        FieldType::Boolean => match json {
            Json::Bool(b) => Ok(Value::Boolean(*b)),
            other => Err(mismatch(ty, other)),
        },
        FieldType::Date => match json {
            Json::String(raw) => parse_date(raw).map(Value::Date),
            other => Err(mismatch(ty, other)),
        },
        FieldType::List(elem) => match json {
            Json::Array(items) => items
                .iter()
                .map(|item| match elem {
                    Some(elem) => decode(elem, item),
                    None => Ok(decode_untyped(item)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(mismatch(ty, other)),
        },
        FieldType::Dictionary(elem) => match json {
            Json::Object(entries) => entries
                .iter()
                .map(|(k, item)| -> Result<(String, Value), WireError> {
                    let value = match elem {
                        Some(elem) => decode(elem, item)?,
                        None => decode_untyped(item),
                    };
                    Ok((k.clone(), value))
                })
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(Value::Dictionary),
            other => Err(mismatch(ty, other)),
        },
        FieldType::File => decode_file(json).map(Value::File),
    }
}

/// Decode arbitrary JSON by shape, without a declared type.
///
/// Strings stay strings; dates and files are only recognised through a
/// declared type.
#[must_use]
pub fn decode_untyped(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.clone()),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(decode_untyped).collect()),
        Json::Object(entries) => Value::Dictionary(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), decode_untyped(v)))
                .collect(),
        ),
    }
}

/// Name of a JSON value's shape, for error messages.
#[must_use]
pub const fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(ty: &FieldType, found: &Json) -> WireError {
    WireError::TypeMismatch {
        expected: ty.to_string(),
        found: json_kind(found),
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, WireError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|err| WireError::InvalidDate {
            raw: raw.to_owned(),
            reason: err.to_string(),
        })
}

fn decode_file(json: &Json) -> Result<FileBlob, WireError> {
    let Json::Object(obj) = json else {
        return Err(mismatch(&FieldType::File, json));
    };
    let content = STANDARD
        .decode(file_text(obj, "content")?)
        .map_err(|err| WireError::InvalidFile(err.to_string()))?;
    Ok(FileBlob {
        name: file_text(obj, "name")?.to_owned(),
        media_type: file_text(obj, "type")?.to_owned(),
        content,
    })
}

fn file_text<'a>(obj: &'a Map<String, Json>, key: &str) -> Result<&'a str, WireError> {
    obj.get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| WireError::InvalidFile(format!("missing string `{key}`")))
}
