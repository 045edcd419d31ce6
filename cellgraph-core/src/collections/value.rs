//! Dynamic records.
//!
//! [`Value`] is the untyped counterpart of the container wrappers: a JSON
//! document whose arrays and objects become [`ReactiveVec`] and
//! [`ReactiveMap`] handles. Wrapping is lazy and deep: a nested array or
//! object stays plain JSON until the first time it is read through a
//! non-shallow handle, at which point it is wrapped and stored back, so every
//! later read returns the same handle.

use std::collections::HashSet;
use std::fmt;
use std::mem;

use serde_json::{Map, Value as Json};

use super::traverse::Traverse;
use super::{Nested, ReactiveMap, ReactiveVec, WrapOptions};
use crate::reactive::untracked;

/// A JSON-shaped value with reactive containers.
#[derive(Clone)]
pub enum Value {
    /// A scalar, or a nested array/object not read yet.
    Json(Json),
    Array(ReactiveVec<Value>),
    Object(ReactiveMap<String, Value>),
}

const NESTED: Nested<Value> = Nested {
    wrap: wrap_in_place,
    readonly: readonly_view,
};

fn wrap_in_place(value: &mut Value) {
    if let Value::Json(json) = value {
        if json.is_array() || json.is_object() {
            let json = mem::take(json);
            *value = Value::from_json(json);
        }
    }
}

fn readonly_view(value: &Value) -> Value {
    value.readonly()
}

impl Value {
    /// Wrap a JSON document deeply.
    pub fn from_json(json: Json) -> Self {
        Self::wrap(json, WrapOptions::default())
    }

    /// Wrap a JSON document with explicit access rules. A shallow wrap leaves
    /// nested arrays and objects as plain JSON.
    pub fn wrap(json: Json, options: WrapOptions) -> Self {
        match json {
            Json::Array(items) => Value::Array(ReactiveVec::build(
                items.into_iter().map(Value::Json).collect(),
                options,
                Some(NESTED),
            )),
            Json::Object(entries) => Value::Object(ReactiveMap::build(
                entries.into_iter().map(|(key, value)| (key, Value::Json(value))).collect(),
                options,
                Some(NESTED),
            )),
            scalar => Value::Json(scalar),
        }
    }

    /// A read-only view. Scalars are returned as they are.
    pub fn readonly(&self) -> Self {
        match self {
            Value::Array(list) => Value::Array(list.readonly()),
            Value::Object(map) => Value::Object(map.readonly()),
            Value::Json(json) => Value::Json(json.clone()),
        }
    }

    /// Whether this value is a reactive container.
    pub fn is_reactive(&self) -> bool {
        !matches!(self, Value::Json(_))
    }

    /// Read a field of an object.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Read an element of an array.
    pub fn at(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(list) => list.get(index),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveVec<Value>> {
        match self {
            Value::Array(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(Json::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(Json::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Json::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Json::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Json(Json::Null))
    }

    /// Convert back to plain JSON, tracking every container on the way.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Json(json) => json.clone(),
            Value::Array(list) => Json::Array(list.to_vec().iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.entries()
                    .into_iter()
                    .map(|(key, value)| (key, value.to_json()))
                    .collect::<Map<String, Json>>(),
            ),
        }
    }

    /// Convert back to plain JSON without tracking.
    pub fn to_json_untracked(&self) -> Json {
        untracked(|| self.to_json())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Json(Json::Null)
    }
}

/// Scalars compare by value, containers by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(json)
    }
}

macro_rules! from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Json(Json::from(value))
                }
            }
        )*
    };
}

from_scalar!(bool, i32, i64, u32, u64, f64, String, &str);

impl Traverse for Value {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        match self {
            Value::Json(_) => {}
            Value::Array(list) => list.traverse(depth, seen),
            Value::Object(map) => map.traverse(depth, seen),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Json(json) => write!(f, "{json}"),
            Value::Array(list) => fmt::Debug::fmt(list, f),
            Value::Object(map) => fmt::Debug::fmt(map, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::graph::scheduler::flush;
    use crate::reactive::Effect;

    #[test]
    fn nested_objects_wrap_on_first_read() {
        let state = Value::from_json(json!({ "user": { "name": "ada" } }));

        let first = state.get("user").unwrap();
        let second = state.get("user").unwrap();
        assert!(first.is_reactive());
        assert_eq!(first, second);
    }

    #[test]
    fn nested_writes_reach_readers() {
        let state = Value::from_json(json!({ "user": { "name": "ada" } }));
        let names = Rc::new(RefCell::new(Vec::new()));

        let s = state.clone();
        let names_clone = names.clone();
        Effect::new(move || {
            let name = s.get("user").and_then(|user| user.get("name"));
            names_clone
                .borrow_mut()
                .push(name.and_then(|n| n.as_str().map(String::from)));
        });

        let user = state.get("user").unwrap();
        user.as_object().unwrap().insert("name".into(), "grace".into());
        flush().unwrap();

        assert_eq!(
            *names.borrow(),
            vec![Some("ada".to_string()), Some("grace".to_string())]
        );
    }

    #[test]
    fn shallow_wrap_keeps_nested_json() {
        let state = Value::wrap(
            json!({ "items": [1, 2] }),
            WrapOptions {
                shallow: true,
                ..WrapOptions::default()
            },
        );
        let items = state.get("items").unwrap();
        assert!(!items.is_reactive());
        assert_eq!(items.as_json(), Some(&json!([1, 2])));
    }

    #[test]
    fn readonly_is_deep() {
        let state = Value::from_json(json!({ "list": [1] })).readonly();
        let list = state.get("list").unwrap();
        let list = list.as_array().unwrap();
        assert!(list.options().readonly);
        list.push(Value::from(2));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn round_trips_to_json() {
        let doc = json!({ "a": [1, { "b": true }], "c": null });
        let value = Value::from_json(doc.clone());
        assert_eq!(value.to_json(), doc);
    }

    #[test]
    fn scalars_compare_by_value() {
        assert_eq!(Value::from(3), Value::from_json(json!(3)));
        assert_ne!(Value::from("a"), Value::from("b"));
        assert_ne!(Value::from_json(json!([])), Value::from_json(json!([])));
    }
}
