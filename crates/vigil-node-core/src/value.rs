//! The self-describing value tree carried by every node request and response.
//!
//! Every payload that crosses a node socket is a [`Value`]. Capabilities never
//! see wire bytes and the dispatcher never sees capability-specific types;
//! both sides meet at this model.
//!
//! Accessors are deliberately permissive: reading a variant as the wrong type
//! yields that type's default (`""`, `0`, `false`, empty sequence) instead of
//! an error. Callers that need to distinguish "missing" from "present but
//! null" use [`Mapping::get`], which returns `Option`.

use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A tagged union over the seven wire-representable shapes.
///
/// A value's variant is fixed at construction; operations that would change
/// the type construct a new `Value` instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(Mapping),
}

static EMPTY_MAP: Mapping = Mapping {
    entries: Vec::new(),
};

impl Value {
    /// Short tag for error messages (`"null"`, `"bool"`, `"int"`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `false` unless the value is a Bool.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            _ => false,
        }
    }

    /// `0` unless the value is an Int (Floats do not coerce).
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Int(n) => *n,
            _ => 0,
        }
    }

    /// `0.0` unless the value is a Float or an Int.
    pub fn as_float(&self) -> f64 {
        match self {
            Self::Float(x) => *x,
            Self::Int(n) => *n as f64,
            _ => 0.0,
        }
    }

    /// `""` unless the value is a Str.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Str(s) => s,
            _ => "",
        }
    }

    /// Empty slice unless the value is a Seq.
    pub fn as_seq(&self) -> &[Value] {
        match self {
            Self::Seq(items) => items,
            _ => &[],
        }
    }

    /// Empty mapping unless the value is a Map.
    pub fn as_map(&self) -> &Mapping {
        match self {
            Self::Map(m) => m,
            _ => &EMPTY_MAP,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Seq(items)
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Self::Map(m)
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// An insertion-ordered string-keyed mapping with unique keys.
///
/// Order is preserved so serialization is stable; `set` on an existing key
/// overwrites the entry in place rather than moving it to the end.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(String, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// `None` means the key is absent, which is distinct from a present
    /// [`Value::Null`].
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Chainable [`set`](Self::set), for building literals.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// Serde (hand-written to preserve mapping order and int/float identity)
// ---------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(x) => {
                if !x.is_finite() {
                    // NaN/inf have no lossless text form.
                    return Err(serde::ser::Error::custom("non-finite float"));
                }
                serializer.serialize_f64(*x)
            }
            Self::Str(s) => serializer.serialize_str(s),
            Self::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a null, bool, number, string, sequence, or string-keyed mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Int(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        // The Integer variant is signed; wider values narrow to Float.
        match i64::try_from(n) {
            Ok(n) => Ok(Value::Int(n)),
            Err(_) => Ok(Value::Float(n as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<Value, E> {
        Ok(Value::Float(x))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::Str(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::Str(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(item) = access.next_element()? {
            items.push(item);
        }
        Ok(Value::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut m = Mapping::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            // Duplicate keys on the wire collapse to the last occurrence.
            m.set(key, value);
        }
        Ok(Value::Map(m))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Mapping, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Map(m) => Ok(m),
            other => Err(de::Error::custom(format!(
                "expected a mapping, got {}",
                other.type_name()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_defaults_on_mismatch() {
        let v = Value::Map(Mapping::new().with("k", 1i64));
        assert_eq!(v.as_str(), "");
        assert_eq!(v.as_int(), 0);
        assert_eq!(v.as_float(), 0.0);
        assert!(!v.as_bool());
        assert!(v.as_seq().is_empty());

        let s = Value::from("hello");
        assert!(s.as_map().is_empty());
        assert!(s.as_seq().is_empty());
    }

    #[test]
    fn int_reads_as_float_but_not_vice_versa() {
        assert_eq!(Value::Int(3).as_float(), 3.0);
        assert_eq!(Value::Float(3.7).as_int(), 0);
    }

    #[test]
    fn mapping_set_overwrites_in_place() {
        let mut m = Mapping::new();
        m.set("a", 1i64);
        m.set("b", 2i64);
        m.set("a", 10i64);

        assert_eq!(m.len(), 2);
        assert_eq!(m.get("a"), Some(&Value::Int(10)));
        // "a" keeps its original position.
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn absent_key_is_distinct_from_null() {
        let m = Mapping::new().with("present", Value::Null);
        assert_eq!(m.get("present"), Some(&Value::Null));
        assert_eq!(m.get("missing"), None);
        assert!(m.contains_key("present"));
        assert!(!m.contains_key("missing"));
    }

    #[test]
    fn values_are_deeply_cloneable_and_comparable() {
        let v = Value::Map(
            Mapping::new()
                .with("xs", vec![Value::Int(1), Value::Str("two".into())])
                .with("nested", Mapping::new().with("ok", true)),
        );
        let copy = v.clone();
        assert_eq!(v, copy);
    }
}
