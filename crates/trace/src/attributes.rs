use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub const CIRCULAR_PLACEHOLDER: &str = "[Circular ~]";

pub type Attributes = BTreeMap<String, AttrValue>;

pub type SharedAttributes = Arc<Mutex<Attributes>>;

#[derive(Debug, Clone)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    Shared(SharedAttributes),
}

impl AttrValue {
    pub fn shared(attrs: Attributes) -> (Self, SharedAttributes) {
        let handle = Arc::new(Mutex::new(attrs));
        (Self::Shared(handle.clone()), handle)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut path = Vec::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut Vec<*const Mutex<Attributes>>) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::Json(v) => v.clone(),
            Self::Shared(handle) => {
                let ptr = Arc::as_ptr(handle);
                // checked before locking: re-locking a map on the current path would deadlock
                if path.contains(&ptr) {
                    return Value::String(CIRCULAR_PLACEHOLDER.to_string());
                }
                let Ok(guard) = handle.lock() else {
                    return Value::Null;
                };
                path.push(ptr);
                let mut out = Map::new();
                for (key, value) in guard.iter() {
                    out.insert(key.clone(), value.to_json_inner(path));
                }
                path.pop();
                Value::Object(out)
            }
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_json() == other.to_json()
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u16> for AttrValue {
    fn from(v: u16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Value> for AttrValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

pub fn attributes_to_json(attrs: &Attributes) -> Value {
    Value::Object(
        attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}
