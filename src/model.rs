//! Value model shared by the parser, the flattener and the renderers.
//!
//! The parser produces a [`Node`] tree whose mappings keep the order the
//! keys appeared in the tool output. Flattening turns that tree into a
//! [`VariableSet`] of scalar [`Value`]s. Sequences survive flattening as
//! [`Value::Sequence`] so each renderer decides whether it can show them.

use std::collections::HashMap;
use std::fmt;

/// An ordered mapping as produced by the parser.
pub type Mapping = Vec<(String, Node)>;

/// A parsed payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integer too wide for `i64`, kept as its exact decimal digits
    BigInt(String),
    Float(f64),
    String(String),
    List(Vec<Node>),
    Map(Mapping),
}

impl Node {
    /// Short name of the node kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Integer(_) | Node::BigInt(_) => "integer",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::List(_) => "list",
            Node::Map(_) => "mapping",
        }
    }

    /// Convert to a JSON value, keeping mapping order.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Null => serde_json::Value::Null,
            Node::Bool(b) => serde_json::Value::Bool(*b),
            Node::Integer(i) => serde_json::Value::from(*i),
            Node::BigInt(digits) => digits
                .parse::<serde_json::Number>()
                .map(serde_json::Value::Number)
                .unwrap_or_else(|_| serde_json::Value::String(digits.clone())),
            Node::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Node::String(s) => serde_json::Value::String(s.clone()),
            Node::List(items) => {
                serde_json::Value::Array(items.iter().map(Node::to_json).collect())
            }
            Node::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Node::Integer(i);
                }
                // arbitrary_precision keeps the literal text of the number
                let text = n.to_string();
                if text.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
                    Node::BigInt(text)
                } else {
                    Node::Float(text.parse().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Node::String(s),
            serde_json::Value::Array(items) => {
                Node::List(items.into_iter().map(Node::from).collect())
            }
            serde_json::Value::Object(map) => {
                Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

/// A flattened leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    BigInt(String),
    Float(f64),
    String(String),
    /// A list kept as-is; not every render format can show it.
    Sequence(Vec<Node>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) | Value::BigInt(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "list",
        }
    }

    /// Back to a tree node. Used to re-flatten an already flat set.
    pub fn to_node(&self) -> Node {
        match self {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Integer(i) => Node::Integer(*i),
            Value::BigInt(digits) => Node::BigInt(digits.clone()),
            Value::Float(f) => Node::Float(*f),
            Value::String(s) => Node::String(s.clone()),
            Value::Sequence(items) => Node::List(items.clone()),
        }
    }
}

/// Bare (unquoted) form of a value. Strings are printed verbatim.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::BigInt(digits) => f.write_str(digits),
            Value::Float(x) if x.is_nan() => f.write_str("nan"),
            // Debug keeps the decimal point: 1.0 stays "1.0", infinities print as inf
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => f.write_str(s),
            Value::Sequence(items) => {
                let json = serde_json::Value::Array(items.iter().map(Node::to_json).collect());
                write!(f, "{}", json)
            }
        }
    }
}

/// One key/value pair of a [`VariableSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct VariableEntry {
    pub key: String,
    pub value: Value,
}

/// Ordered, unique-key collection of flattened variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSet {
    entries: Vec<VariableEntry>,
    index: HashMap<String, usize>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable.
    ///
    /// A key that is already present keeps its original position and takes
    /// the new value. The replaced value is returned.
    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        if let Some(&pos) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[pos].value, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(VariableEntry { key, value });
        None
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&pos| &self.entries[pos].value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    /// The set as a single-level mapping.
    pub fn to_mapping(&self) -> Mapping {
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.to_node()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a VariableSet {
    type Item = &'a VariableEntry;
    type IntoIter = std::slice::Iter<'a, VariableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
