use std::collections::HashMap;

use serde_json::{Map as JsonMap, Number, Value};
use tandem_core::backend::Prelim;
use tandem_core::Result;
use yrs::{
    Any, Array, ArrayPrelim, ArrayRef, Map, MapPrelim, MapRef, Out, Text, TextPrelim, TextRef,
    TransactionMut,
};

/// Content of one yrs map entry or array slot, detached from the
/// transaction it was read in.
#[derive(Clone, PartialEq)]
pub(crate) enum Slot {
    Json(Value),
    Map(MapRef),
    Vector(ArrayRef),
    Text(TextRef),
    /// XML types, sub-documents and anything else this binding does not model.
    Unsupported,
}

impl From<Out> for Slot {
    fn from(out: Out) -> Self {
        match out {
            Out::Any(any) => Slot::Json(any_to_json(&any)),
            Out::YMap(map) => Slot::Map(map),
            Out::YArray(array) => Slot::Vector(array),
            Out::YText(text) => Slot::Text(text),
            _ => Slot::Unsupported,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// JSON ↔ Any
// ───────────────────────────────────────────────────────────────────

// Plain values are stored as native `Any`, so other Yjs clients read and
// write them without knowing about this binding.
pub(crate) fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(b) => Any::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) if (i as f64).abs() <= MAX_SAFE => Any::Number(i as f64),
            Some(i) => Any::BigInt(i),
            None => Any::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Any::String(s.as_str().into()),
        Value::Array(items) => Any::Array(items.iter().map(json_to_any).collect::<Vec<_>>().into()),
        Value::Object(entries) => Any::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_any(v)))
                .collect::<HashMap<String, Any>>()
                .into(),
        ),
    }
}

pub(crate) fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(b) => Value::Bool(*b),
        Any::Number(n) => number(*n),
        Any::BigInt(n) => Value::from(*n),
        Any::String(s) => Value::String(s.to_string()),
        Any::Buffer(bytes) => Value::from(bytes.to_vec()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), any_to_json(v)))
                .collect::<JsonMap<String, Value>>(),
        ),
    }
}

const MAX_SAFE: f64 = 9_007_199_254_740_991.0;

// Integral doubles come back as integers (JS clients only have doubles).
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

// ───────────────────────────────────────────────────────────────────
// Prelim → yrs
// ───────────────────────────────────────────────────────────────────

pub(crate) fn insert_into_map(
    map: &MapRef,
    txn: &mut TransactionMut,
    key: &str,
    value: Prelim,
) -> Result<()> {
    match value {
        Prelim::Json(v) => {
            map.insert(txn, key, json_to_any(&v));
        }
        Prelim::Map(entries) => {
            let nested = map.insert(txn, key, MapPrelim::default());
            for (k, v) in entries {
                insert_into_map(&nested, txn, &k, v)?;
            }
        }
        Prelim::Vector(items) => {
            let nested = map.insert(txn, key, ArrayPrelim::default());
            fill_array(&nested, txn, 0, items)?;
        }
        Prelim::Text(text) => {
            map.insert(txn, key, TextPrelim::new(text.as_str()));
        }
    }
    Ok(())
}

pub(crate) fn insert_into_array(
    array: &ArrayRef,
    txn: &mut TransactionMut,
    index: u32,
    value: Prelim,
) -> Result<()> {
    match value {
        Prelim::Json(v) => {
            array.insert(txn, index, json_to_any(&v));
        }
        Prelim::Map(entries) => {
            let nested = array.insert(txn, index, MapPrelim::default());
            for (k, v) in entries {
                insert_into_map(&nested, txn, &k, v)?;
            }
        }
        Prelim::Vector(items) => {
            let nested = array.insert(txn, index, ArrayPrelim::default());
            fill_array(&nested, txn, 0, items)?;
        }
        Prelim::Text(text) => {
            array.insert(txn, index, TextPrelim::new(text.as_str()));
        }
    }
    Ok(())
}

pub(crate) fn fill_array(
    array: &ArrayRef,
    txn: &mut TransactionMut,
    start: u32,
    items: Vec<Prelim>,
) -> Result<()> {
    for (offset, item) in (start..).zip(items) {
        insert_into_array(array, txn, offset, item)?;
    }
    Ok(())
}
