use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Variable bindings consulted by interpolation and `resolve`.
pub type Bindings = IndexMap<String, Value>;

/// Custom string conversion for values stored in bindings.
///
/// Any `Display + Debug` type qualifies; wrap it with [`Value::custom`].
pub trait Displayable: fmt::Display + fmt::Debug + Send + Sync {}

impl<T: fmt::Display + fmt::Debug + Send + Sync> Displayable for T {}

/// One step of a variable path: `.key` or `[index]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Deferred variable reference (`$page.title`), produced by the tag grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub path: Vec<PathSegment>,
}

/// Deferred function call (`upper($name)`), produced by the tag grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub parameters: IndexMap<String, Value>,
}

/// Attribute and binding value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Self>),
    Map(IndexMap<String, Self>),
    Variable(Variable),
    Function(Function),
    /// Value with its own string conversion.
    Custom(Arc<dyn Displayable>),
}

impl Value {
    /// Wrap a value that knows how to render itself.
    #[must_use]
    pub fn custom<T: Displayable + 'static>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// Build a `Value::Map` from key/value pairs, keeping their order.
    #[must_use]
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a `Value::Array` from items.
    #[must_use]
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Self>,
        I: IntoIterator<Item = V>,
    {
        Self::Array(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&IndexMap<String, Self>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Variable(a), Self::Variable(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Textual form used when a value is substituted into a string.
///
/// Maps render as compact JSON. Numbers format the same inside and
/// outside a map: whole numbers without a fractional part.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
            Self::Variable(v) => write!(f, "{v}"),
            Self::Function(func) => write!(f, "{func}"),
            Self::Custom(c) => write!(f, "{c}"),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for (i, segment) in self.path.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (key, value)) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if key.parse::<usize>().is_err() {
                write!(f, "{key}=")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Variable(v) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("$$mdtype", "Variable")?;
                map.serialize_entry("path", &v.path)?;
                map.end()
            }
            Self::Function(func) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("$$mdtype", "Function")?;
                map.serialize_entry("name", &func.name)?;
                map.serialize_entry("parameters", &func.parameters)?;
                map.end()
            }
            Self::Custom(c) => serializer.collect_str(c),
        }
    }
}

/// `n` as an integer when it has no fractional part and is exactly
/// representable, so whole numbers print the same in JSON as in text.
#[allow(clippy::cast_possible_truncation)]
fn integral(n: f64) -> Option<i64> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    (n.fract() == 0.0 && n.abs() <= EXACT).then(|| n as i64)
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON-like value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Number(n as f64))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        Ok(Value::Number(n as f64))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<Value, E> {
        Ok(Value::Number(n))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut entries = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            entries.insert(key, value);
        }
        Ok(Value::Map(entries))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl From<IndexMap<String, Self>> for Value {
    fn from(entries: IndexMap<String, Self>) -> Self {
        Self::Map(entries)
    }
}

impl From<Variable> for Value {
    fn from(v: Variable) -> Self {
        Self::Variable(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-1).to_string(), "-1");
    }

    #[test]
    fn display_structured() {
        let arr = Value::array(["a", "b", "c"]);
        assert_eq!(arr.to_string(), "a,b,c");
        let map = Value::map([("k", 1)]);
        assert_eq!(map.to_string(), r#"{"k":1}"#);
    }

    #[test]
    fn numbers_format_alike_inside_maps() {
        for n in [1.0, -3.0, 2.5, 0.0] {
            let map = Value::map([("n", n)]);
            assert_eq!(map.to_string(), format!(r#"{{"n":{}}}"#, Value::from(n)));
        }
    }

    #[test]
    fn display_variable_path() {
        let var = Variable {
            path: vec![
                PathSegment::Key("arr".into()),
                PathSegment::Index(1),
                PathSegment::Key("key".into()),
            ],
        };
        assert_eq!(var.to_string(), "$arr[1].key");
    }

    #[test]
    fn custom_values_compare_by_identity() {
        let a = Value::custom("x");
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Value::custom("x"));
        assert_eq!(a.to_string(), "x");
    }

    #[test]
    fn deserialize_keeps_key_order() {
        let value: Value =
            serde_json::from_str(r#"{"b": 1, "a": [true, null]}"#).expect("valid json");
        let keys: Vec<_> = value.as_map().expect("map").keys().cloned().collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
