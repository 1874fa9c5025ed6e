//! Filtering of tool-internal variables and flattening of nested mappings.
//!
//! The synthetic inventory makes the tool report a number of variables the
//! user never defined (`ansible_*`, `inventory_hostname`, `groups`, ...).
//! Which names those are depends on the tool version, so they live in a
//! [`DenyList`] that configuration can extend.

use crate::model::{Mapping, Node, Value, VariableSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Version tag of the built-in deny-list.
pub const DENY_LIST_VERSION: &str = "ansible-2";

const INTERNAL_PREFIXES: &[&str] = &["ansible_"];

const INTERNAL_NAMES: &[&str] = &[
    "group_names",
    "groups",
    "inventory_dir",
    "inventory_file",
    "inventory_hostname",
    "inventory_hostname_short",
    "omit",
    "playbook_dir",
];

/// Top-level keys that belong to the tool rather than the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyList {
    /// Identifies which tool release the list was written against
    pub version: String,

    /// Keys starting with any of these are dropped
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Keys equal to any of these are dropped
    #[serde(default)]
    pub names: Vec<String>,
}

impl Default for DenyList {
    fn default() -> Self {
        Self {
            version: DENY_LIST_VERSION.to_string(),
            prefixes: INTERNAL_PREFIXES.iter().map(|s| s.to_string()).collect(),
            names: INTERNAL_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DenyList {
    /// An empty list that keeps every key.
    pub fn empty() -> Self {
        Self {
            version: "custom".to_string(),
            prefixes: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Add prefixes and names, skipping ones already present.
    pub fn extend(&mut self, prefixes: &[String], names: &[String]) {
        for prefix in prefixes {
            if !self.prefixes.contains(prefix) {
                self.prefixes.push(prefix.clone());
            }
        }
        for name in names {
            if !self.names.contains(name) {
                self.names.push(name.clone());
            }
        }
    }

    /// Whether `key` is a tool-internal variable.
    pub fn is_internal(&self, key: &str) -> bool {
        self.names.iter().any(|name| name == key)
            || self.prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
    }
}

/// Drop the deny-listed top-level keys, keeping the order of the rest.
pub fn filter(variables: Mapping, deny: &DenyList) -> Mapping {
    let before = variables.len();
    let kept: Mapping = variables
        .into_iter()
        .filter(|(key, _)| !deny.is_internal(key))
        .collect();

    debug!(
        dropped = before - kept.len(),
        kept = kept.len(),
        deny_list = %deny.version,
        "filtered internal variables"
    );
    kept
}

/// Options for [`flatten`].
#[derive(Debug, Clone, Copy)]
pub struct FlattenOptions {
    /// Joins a parent key to its child key
    pub separator: char,
    /// Trim surrounding whitespace from string leaves
    pub strip_strings: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            separator: '_',
            strip_strings: true,
        }
    }
}

/// Flatten nested mappings into single-level keys.
///
/// `{db: {host: x}}` becomes `db_host: x` with the default separator. Lists
/// are kept whole. When two paths flatten to the same key the later value
/// wins and a warning is logged.
pub fn flatten(variables: Mapping, options: FlattenOptions) -> VariableSet {
    let mut set = VariableSet::new();
    for (key, node) in variables {
        flatten_into(&mut set, key, node, options);
    }
    set
}

fn flatten_into(set: &mut VariableSet, key: String, node: Node, options: FlattenOptions) {
    let value = match node {
        Node::Map(children) => {
            for (child, node) in children {
                let path = format!("{}{}{}", key, options.separator, child);
                flatten_into(set, path, node, options);
            }
            return;
        }
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(b),
        Node::Integer(i) => Value::Integer(i),
        Node::BigInt(digits) => Value::BigInt(digits),
        Node::Float(f) => Value::Float(f),
        Node::String(s) if options.strip_strings => Value::String(s.trim().to_string()),
        Node::String(s) => Value::String(s),
        Node::List(items) => Value::Sequence(items),
    };

    if let Some(previous) = set.insert(key.clone(), value) {
        warn!(
            key = %key,
            replaced = previous.kind(),
            "key collision while flattening, keeping the last value"
        );
    }
}
