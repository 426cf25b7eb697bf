//! Schema layer.
//!
//! Resource and data source schemas describe the host's attribute tree:
//! names, value types, nested block cardinality, force-new flags, computed
//! values, validators and state functions. Attribute trees are plain
//! `serde_json::Value` objects; nested blocks are lists of objects.
//!
//! The reconcilers never read the tree directly. [`crate::flatten`] turns a
//! validated tree into typed models.

mod datasource;
mod instance;
mod lke;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::StateHasher;
use crate::error::{ProviderError, SchemaError};

pub use datasource::{instances_data_source_schema, lke_cluster_data_source_schema};
pub use instance::instance_schema;
pub use lke::lke_cluster_schema;

/// Value type of an attribute.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeType {
    /// UTF-8 string.
    String,
    /// 64-bit integer.
    Int,
    /// Boolean.
    Bool,
    /// Floating point number.
    Float,
    /// Ordered list.
    List {
        /// Element type.
        element: Box<AttributeType>,
    },
    /// Unordered set; stored sorted.
    Set {
        /// Element type.
        element: Box<AttributeType>,
    },
    /// String-keyed map.
    Map {
        /// Value type.
        element: Box<AttributeType>,
    },
    /// Nested block, stored as a list of objects.
    Block {
        /// Nested attributes.
        block: Block,
        /// Maximum number of entries.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
}

impl AttributeType {
    /// Short type name for messages and listings.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Bool => "bool",
            Self::Float => "number",
            Self::List { .. } => "list",
            Self::Set { .. } => "set",
            Self::Map { .. } => "map",
            Self::Block { .. } => "block",
        }
    }
}

/// Per-value validator.
#[derive(Debug, Clone, Copy)]
pub enum Validator {
    /// String length within bounds, inclusive.
    LengthBetween(usize, usize),
    /// String is one of the listed values.
    OneOf(&'static [&'static str]),
    /// Integer within bounds, inclusive.
    IntRange(i64, i64),
    /// Arbitrary check returning a message on failure.
    Custom(fn(&Value) -> Option<String>),
}

impl Validator {
    fn check(&self, value: &Value) -> Option<String> {
        match self {
            Self::LengthBetween(min, max) => value.as_str().and_then(|s| {
                let len = s.chars().count();
                (len < *min || len > *max)
                    .then(|| format!("length must be between {min} and {max}, got {len}"))
            }),
            Self::OneOf(allowed) => value.as_str().and_then(|s| {
                (!allowed.contains(&s)).then(|| format!("'{s}' must be one of: {}", allowed.join(", ")))
            }),
            Self::IntRange(min, max) => value.as_i64().and_then(|n| {
                (n < *min || n > *max).then(|| format!("{n} must be between {min} and {max}"))
            }),
            Self::Custom(check) => check(value),
        }
    }
}

/// Transformation applied before a value is stored in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFunc {
    /// SHA-256 hex digest; already hashed values are kept.
    Sha256,
    /// Surrounding whitespace removed.
    TrimSpace,
}

impl StateFunc {
    fn apply(self, value: &Value) -> Value {
        match (self, value) {
            (Self::Sha256, Value::String(s)) => Value::String(StateHasher::new().state_secret(s)),
            (Self::TrimSpace, Value::String(s)) => Value::String(s.trim().to_string()),
            (_, Value::Array(items)) => Value::Array(items.iter().map(|v| self.apply(v)).collect()),
            (_, other) => other.clone(),
        }
    }
}

/// One attribute in a block.
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Filled in by the provider when not set.
    pub computed: bool,
    /// Changing it requires replacing the resource.
    pub force_new: bool,
    /// Never shown in plan output.
    pub sensitive: bool,
    /// Value used when the configuration leaves it unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Applied before storing in state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_func: Option<StateFunc>,
    /// Human readable description.
    pub description: &'static str,
    /// Value validators.
    #[serde(skip)]
    pub validators: Vec<Validator>,
}

impl Attribute {
    /// Creates an optional attribute of the given type.
    #[must_use]
    pub const fn new(name: &'static str, attr_type: AttributeType) -> Self {
        Self {
            name,
            attr_type,
            required: false,
            optional: true,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            state_func: None,
            description: "",
            validators: Vec::new(),
        }
    }

    /// String attribute.
    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, AttributeType::String)
    }

    /// Integer attribute.
    #[must_use]
    pub const fn int(name: &'static str) -> Self {
        Self::new(name, AttributeType::Int)
    }

    /// Boolean attribute.
    #[must_use]
    pub const fn bool(name: &'static str) -> Self {
        Self::new(name, AttributeType::Bool)
    }

    /// List of strings.
    #[must_use]
    pub fn string_list(name: &'static str) -> Self {
        Self::new(
            name,
            AttributeType::List {
                element: Box::new(AttributeType::String),
            },
        )
    }

    /// Set of strings.
    #[must_use]
    pub fn string_set(name: &'static str) -> Self {
        Self::new(
            name,
            AttributeType::Set {
                element: Box::new(AttributeType::String),
            },
        )
    }

    /// Map of strings.
    #[must_use]
    pub fn string_map(name: &'static str) -> Self {
        Self::new(
            name,
            AttributeType::Map {
                element: Box::new(AttributeType::String),
            },
        )
    }

    /// Nested block list.
    #[must_use]
    pub const fn block(name: &'static str, block: Block) -> Self {
        Self::new(
            name,
            AttributeType::Block {
                block,
                max_items: None,
            },
        )
    }

    /// Nested block holding at most one entry.
    #[must_use]
    pub const fn single(name: &'static str, block: Block) -> Self {
        Self::new(
            name,
            AttributeType::Block {
                block,
                max_items: Some(1),
            },
        )
    }

    /// Marks the attribute required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    /// Marks the attribute provider-computed. Combine with
    /// [`Attribute::optional_computed`] when the user may also set it.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Settable by the user, computed when unset.
    #[must_use]
    pub const fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self
    }

    /// Changes force replacement.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Hidden from plan output.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// State function.
    #[must_use]
    pub const fn state(mut self, func: StateFunc) -> Self {
        self.state_func = Some(func);
        self
    }

    /// Description.
    #[must_use]
    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Adds a validator.
    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    const fn user_settable(&self) -> bool {
        self.required || self.optional
    }
}

/// A set of attributes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Block {
    /// Attributes in declaration order.
    pub attributes: Vec<Attribute>,
}

impl Block {
    /// Creates a block.
    #[must_use]
    pub const fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Validates a configuration tree against this block.
    ///
    /// Values for computed-only attributes are accepted and ignored, since
    /// proposed states carry them over from prior state.
    pub fn validate(&self, tree: &Value, path: &str, errors: &mut Vec<ProviderError>) {
        let empty = Map::new();
        let object = match tree {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                errors.push(type_mismatch(path, "object", other));
                return;
            }
        };

        for key in object.keys() {
            if self.attribute(key).is_none() {
                errors.push(
                    SchemaError::Invalid {
                        path: join(path, key),
                        message: String::from("unsupported attribute"),
                    }
                    .into(),
                );
            }
        }

        for attr in &self.attributes {
            let attr_path = join(path, attr.name);
            match object.get(attr.name) {
                None | Some(Value::Null) => {
                    if attr.required {
                        errors.push(SchemaError::Missing { path: attr_path }.into());
                    }
                }
                Some(value) => {
                    if attr.user_settable() {
                        check_value(&attr.attr_type, &attr.validators, value, &attr_path, errors);
                    }
                }
            }
        }
    }

    /// Applies defaults, state functions and canonical ordering.
    ///
    /// Single objects given for nested blocks are wrapped in a list.
    #[must_use]
    pub fn normalize(&self, tree: &Value) -> Value {
        self.transform(tree, true)
    }

    /// Applies defaults and canonical ordering but keeps raw values, so
    /// secrets can still be sent to the API.
    #[must_use]
    pub fn with_defaults(&self, tree: &Value) -> Value {
        self.transform(tree, false)
    }

    /// Planned state: `proposed` with computed attributes it leaves unset
    /// taken from `prior`. Nested blocks are merged entry by entry.
    #[must_use]
    pub fn merge_prior(&self, prior: &Value, proposed: &Value) -> Value {
        let Value::Object(object) = proposed else {
            return proposed.clone();
        };
        let mut out = object.clone();
        for attr in &self.attributes {
            let before = prior.get(attr.name).unwrap_or(&Value::Null);
            let after = object.get(attr.name).unwrap_or(&Value::Null);
            if after.is_null() {
                if attr.computed && !before.is_null() {
                    out.insert(attr.name.to_string(), before.clone());
                }
                continue;
            }
            if let (AttributeType::Block { block, .. }, Some(before), Some(after)) =
                (&attr.attr_type, before.as_array(), after.as_array())
            {
                let merged = after
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| {
                        before
                            .get(index)
                            .map_or_else(|| entry.clone(), |b| block.merge_prior(b, entry))
                    })
                    .collect();
                out.insert(attr.name.to_string(), Value::Array(merged));
            }
        }
        Value::Object(out)
    }

    fn transform(&self, tree: &Value, apply_state: bool) -> Value {
        let Value::Object(object) = tree else {
            return tree.clone();
        };

        let mut out = Map::new();
        for (key, value) in object {
            let normalized = match self.attribute(key) {
                Some(attr) => normalize_value(attr, value, apply_state),
                None => value.clone(),
            };
            out.insert(key.clone(), normalized);
        }
        for attr in &self.attributes {
            let unset = out.get(attr.name).is_none_or(Value::is_null);
            if unset {
                if let Some(default) = &attr.default {
                    out.insert(attr.name.to_string(), default.clone());
                }
            }
        }
        Value::Object(out)
    }

    /// Paths of force-new attributes whose value changes.
    ///
    /// An attribute that is computed and left unset in `proposed` keeps its
    /// prior value and never forces replacement.
    #[must_use]
    pub fn requires_replace(&self, prior: &Value, proposed: &Value, path: &str) -> Vec<String> {
        let mut paths = Vec::new();
        for attr in &self.attributes {
            let before = prior.get(attr.name).unwrap_or(&Value::Null);
            let after = proposed.get(attr.name).unwrap_or(&Value::Null);
            let attr_path = join(path, attr.name);

            if attr.force_new {
                let unset_computed = attr.computed && after.is_null();
                if !unset_computed && !equivalent(before, after) {
                    paths.push(attr_path);
                    continue;
                }
            }

            if let AttributeType::Block { block, .. } = &attr.attr_type {
                let (Some(before), Some(after)) = (before.as_array(), after.as_array()) else {
                    continue;
                };
                for (index, (b, a)) in before.iter().zip(after).enumerate() {
                    paths.extend(block.requires_replace(b, a, &format!("{attr_path}.{index}")));
                }
            }
        }
        paths
    }

    /// Paths of sensitive attributes, for masking output.
    #[must_use]
    pub fn sensitive_paths(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|a| a.sensitive)
            .map(|a| a.name)
            .collect()
    }
}

/// Schema of one resource or data source type.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSchema {
    /// Type name, e.g. `linode_instance`.
    pub type_name: &'static str,
    /// Schema version.
    pub version: u32,
    /// Description.
    pub description: &'static str,
    /// Top-level block.
    pub block: Block,
}

impl ResourceSchema {
    /// Validates a configuration tree.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self, tree: &Value) -> std::result::Result<(), Vec<ProviderError>> {
        let mut errors = Vec::new();
        self.block.validate(tree, "", &mut errors);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Normalizes a tree for storage and comparison.
    #[must_use]
    pub fn normalize(&self, tree: &Value) -> Value {
        self.block.normalize(tree)
    }

    /// Defaults and canonical ordering without state functions.
    #[must_use]
    pub fn with_defaults(&self, tree: &Value) -> Value {
        self.block.with_defaults(tree)
    }

    /// Planned state from a prior state and a normalized proposal.
    #[must_use]
    pub fn merge_prior(&self, prior: &Value, proposed: &Value) -> Value {
        self.block.merge_prior(prior, proposed)
    }

    /// Force-new paths that change between two normalized trees.
    #[must_use]
    pub fn requires_replace(&self, prior: &Value, proposed: &Value) -> Vec<String> {
        self.block.requires_replace(prior, proposed, "")
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn type_mismatch(path: &str, expected: &str, found: &Value) -> ProviderError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    };
    SchemaError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        message: format!("found {found}"),
    }
    .into()
}

fn check_value(
    attr_type: &AttributeType,
    validators: &[Validator],
    value: &Value,
    path: &str,
    errors: &mut Vec<ProviderError>,
) {
    let type_ok = match attr_type {
        AttributeType::String => value.is_string(),
        AttributeType::Int => value.is_i64() || value.is_u64(),
        AttributeType::Bool => value.is_boolean(),
        AttributeType::Float => value.is_number(),
        AttributeType::List { element } | AttributeType::Set { element } => {
            if let Value::Array(items) = value {
                for (index, item) in items.iter().enumerate() {
                    check_value(element, validators, item, &format!("{path}.{index}"), errors);
                }
                return;
            }
            false
        }
        AttributeType::Map { element } => {
            if let Value::Object(map) = value {
                for (key, item) in map {
                    check_value(element, validators, item, &join(path, key), errors);
                }
                return;
            }
            false
        }
        AttributeType::Block { block, max_items } => {
            let entries: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Object(_) => vec![value],
                _ => Vec::new(),
            };
            if entries.is_empty() && !value.is_array() {
                errors.push(type_mismatch(path, "block", value));
                return;
            }
            if let Some(max) = max_items {
                if entries.len() > *max {
                    errors.push(
                        SchemaError::Cardinality {
                            path: path.to_string(),
                            max: *max,
                            found: entries.len(),
                        }
                        .into(),
                    );
                    return;
                }
            }
            for (index, entry) in entries.into_iter().enumerate() {
                block.validate(entry, &format!("{path}.{index}"), errors);
            }
            return;
        }
    };

    if !type_ok {
        errors.push(type_mismatch(path, attr_type.describe(), value));
        return;
    }
    for validator in validators {
        if let Some(message) = validator.check(value) {
            errors.push(
                SchemaError::Invalid {
                    path: path.to_string(),
                    message,
                }
                .into(),
            );
        }
    }
}

fn normalize_value(attr: &Attribute, value: &Value, apply_state: bool) -> Value {
    let value = match attr.state_func {
        Some(func) if apply_state && !value.is_null() => func.apply(value),
        _ => value.clone(),
    };
    match (&attr.attr_type, value) {
        (AttributeType::Set { .. }, Value::Array(mut items)) => {
            items.sort_by_key(ToString::to_string);
            items.dedup();
            Value::Array(items)
        }
        (AttributeType::Block { block, .. }, Value::Object(map)) => {
            Value::Array(vec![block.transform(&Value::Object(map), apply_state)])
        }
        (AttributeType::Block { block, .. }, Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| block.transform(item, apply_state))
                .collect(),
        ),
        (_, other) => other,
    }
}

/// Equality that treats null, empty strings and empty collections alike.
#[must_use]
pub fn equivalent(a: &Value, b: &Value) -> bool {
    fn is_empty(v: &Value) -> bool {
        match v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
    (is_empty(a) && is_empty(b)) || a == b
}
