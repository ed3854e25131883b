//! Typed values a throttle decision is keyed on.

use regex::Regex;
use serde_json::Number;
use std::collections::BTreeMap;

/// A value a caller throttles on.
///
/// Composite fields are kept sorted by name, so two composites built from the
/// same fields in a different order are indistinguishable to the hasher.
#[derive(Debug, Clone)]
pub enum Context {
    Null,
    String(String),
    Number(Number),
    Boolean(bool),
    Pattern(Regex),
    List(Vec<Context>),
    Composite(BTreeMap<String, Context>),
}

impl Context {
    /// Build a composite from `(field, value)` pairs.
    pub fn composite<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Context>,
        I: IntoIterator<Item = (K, V)>,
    {
        Context::Composite(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Look up a field of a composite. Other variants have no fields.
    pub fn field(&self, name: &str) -> Option<&Context> {
        match self {
            Context::Composite(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Context::String(_) | Context::Number(_) | Context::Boolean(_) | Context::Pattern(_)
        )
    }

    /// Direct string rendering of a primitive value.
    pub fn render(&self) -> Option<String> {
        match self {
            Context::String(s) => Some(s.clone()),
            Context::Number(n) => Some(n.to_string()),
            Context::Boolean(b) => Some(b.to_string()),
            Context::Pattern(re) => Some(format!("/{}/", re.as_str())),
            _ => None,
        }
    }
}

impl From<&str> for Context {
    fn from(value: &str) -> Self {
        Context::String(value.to_string())
    }
}

impl From<String> for Context {
    fn from(value: String) -> Self {
        Context::String(value)
    }
}

impl From<&String> for Context {
    fn from(value: &String) -> Self {
        Context::String(value.clone())
    }
}

impl From<bool> for Context {
    fn from(value: bool) -> Self {
        Context::Boolean(value)
    }
}

impl From<i64> for Context {
    fn from(value: i64) -> Self {
        Context::Number(value.into())
    }
}

impl From<i32> for Context {
    fn from(value: i32) -> Self {
        Context::Number(value.into())
    }
}

impl From<u64> for Context {
    fn from(value: u64) -> Self {
        Context::Number(value.into())
    }
}

/// Non-finite floats have no number representation and become `Null`.
impl From<f64> for Context {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Context::Number)
            .unwrap_or(Context::Null)
    }
}

impl From<Regex> for Context {
    fn from(value: Regex) -> Self {
        Context::Pattern(value)
    }
}

impl<T: Into<Context>> From<Vec<T>> for Context {
    fn from(values: Vec<T>) -> Self {
        Context::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Context>> From<Option<T>> for Context {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Context::Null)
    }
}

impl From<serde_json::Value> for Context {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Context::Null,
            Value::Bool(b) => Context::Boolean(b),
            Value::Number(n) => Context::Number(n),
            Value::String(s) => Context::String(s),
            Value::Array(items) => Context::List(items.into_iter().map(Context::from).collect()),
            Value::Object(map) => {
                Context::Composite(map.into_iter().map(|(k, v)| (k, Context::from(v))).collect())
            }
        }
    }
}

impl<K: Into<String>, V: Into<Context>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Context::composite(iter)
    }
}
