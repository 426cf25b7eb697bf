//! Filter serializer.
//!
//! Turns `{name, values}` clauses into the API's JSON filter grammar:
//! clauses are AND-ed, the values of one clause are OR-ed.
//!
//! ```text
//! [{deprecated: [false]}, {is_public: [true, false]}]
//!   => {"+and": [{"+or": [{"deprecated": false}]},
//!                {"+or": [{"is_public": true}, {"is_public": false}]}]}
//! ```
//!
//! Data sources additionally describe which fields the API can filter on;
//! the remaining clauses (and every non-exact match) are applied to the
//! flattened results client side.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{FilterError, Result};

/// How a clause compares values.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchBy {
    /// Equality after type coercion.
    #[default]
    Exact,
    /// Substring of a string attribute.
    #[serde(alias = "sub")]
    Substring,
}

impl FromStr for MatchBy {
    type Err = FilterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "exact" => Ok(Self::Exact),
            "substring" | "sub" => Ok(Self::Substring),
            other => Err(FilterError::UnsupportedMatch {
                mode: other.to_string(),
            }),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// One filter clause.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterClause {
    /// Attribute name.
    pub name: String,
    /// Accepted values; any one may match.
    pub values: Vec<String>,
    /// Comparison mode.
    #[serde(default)]
    pub match_by: MatchBy,
}

impl FilterClause {
    /// Exact-match clause.
    #[must_use]
    pub fn exact(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(ToString::to_string).collect(),
            match_by: MatchBy::Exact,
        }
    }

    /// Parses the `name=v1,v2` command-line form.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` when there is no `=`.
    pub fn parse_arg(arg: &str) -> Result<Self> {
        let (name, values) = arg.split_once('=').ok_or_else(|| FilterError::Malformed {
            message: format!("'{arg}' is not of the form name=value[,value...]"),
        })?;
        Ok(Self {
            name: name.trim().to_string(),
            values: values.split(',').map(|v| v.trim().to_string()).collect(),
            match_by: MatchBy::Exact,
        })
    }
}

/// Type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Kept as text.
    String,
    /// Parsed as a signed integer.
    Int,
    /// Parsed as `true`/`false`.
    Bool,
}

impl FieldType {
    const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }

    /// Coerces a raw filter value.
    ///
    /// # Errors
    ///
    /// Returns `Coercion` if the value does not parse.
    pub fn coerce(self, name: &str, raw: &str) -> Result<Value> {
        let coercion = || FilterError::Coercion {
            name: name.to_string(),
            value: raw.to_string(),
            expected: self.name(),
        };
        match self {
            Self::String => Ok(Value::String(raw.to_string())),
            Self::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| coercion().into()),
            Self::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "t" => Ok(Value::Bool(true)),
                "false" | "0" | "f" => Ok(Value::Bool(false)),
                _ => Err(coercion().into()),
            },
        }
    }
}

/// Serializes clauses into the API filter tree.
///
/// Every clause is serialized; empty input gives `{}`.
///
/// # Errors
///
/// Returns the coercer's error for the first value that does not coerce.
pub fn serialize<F>(clauses: &[FilterClause], coerce: F) -> Result<Value>
where
    F: Fn(&str, &str) -> Result<Value>,
{
    if clauses.is_empty() {
        return Ok(json!({}));
    }

    let mut and = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let mut or = Vec::with_capacity(clause.values.len());
        for raw in &clause.values {
            let mut term = Map::new();
            term.insert(clause.name.clone(), coerce(&clause.name, raw)?);
            or.push(Value::Object(term));
        }
        and.push(json!({ "+or": or }));
    }
    Ok(json!({ "+and": and }))
}

/// Parses a filter tree produced by [`serialize`] back into clauses.
///
/// # Errors
///
/// Returns `Malformed` when the tree does not have the `+and`/`+or` shape.
pub fn parse(tree: &Value) -> Result<Vec<FilterClause>> {
    let malformed = |message: &str| FilterError::Malformed {
        message: message.to_string(),
    };

    let Some(root) = tree.as_object() else {
        return Err(malformed("filter must be an object").into());
    };
    let Some(and) = root.get("+and") else {
        return Ok(Vec::new());
    };
    let and = and.as_array().ok_or_else(|| malformed("+and must be a list"))?;

    let mut clauses = Vec::with_capacity(and.len());
    for group in and {
        let or = group
            .get("+or")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("each +and entry must hold a +or list"))?;
        let mut clause = FilterClause::default();
        for term in or {
            let (name, value) = term
                .as_object()
                .filter(|t| t.len() == 1)
                .and_then(|t| t.iter().next())
                .ok_or_else(|| malformed("each +or entry must have exactly one key"))?;
            if clause.name.is_empty() {
                clause.name.clone_from(name);
            } else if clause.name != *name {
                return Err(malformed("a +or group mixes attribute names").into());
            }
            clause.values.push(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        clauses.push(clause);
    }
    Ok(clauses)
}

/// One field a data source can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterField {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    pub field_type: FieldType,
    /// Whether the API accepts it in `X-Filter`.
    pub api_filterable: bool,
}

/// Filterable fields of a data source.
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    fields: &'static [FilterField],
}

impl FilterConfig {
    /// Creates a config over a static field table.
    #[must_use]
    pub const fn new(fields: &'static [FilterField]) -> Self {
        Self { fields }
    }

    /// Looks up a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FilterField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn supported(&self, api_only: bool) -> String {
        self.fields
            .iter()
            .filter(|f| !api_only || f.api_filterable)
            .map(|f| f.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Coerces a value for a known field.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedField` or `Coercion`.
    pub fn coerce(&self, name: &str, raw: &str) -> Result<Value> {
        let field = self.field(name).ok_or_else(|| FilterError::UnsupportedField {
            name: name.to_string(),
            supported: self.supported(false),
        })?;
        field.field_type.coerce(name, raw)
    }

    /// Checks that every clause and the sort key name known fields.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedField` for unknown names, or for a sort key the
    /// API cannot order by.
    pub fn validate(&self, clauses: &[FilterClause], order_by: Option<&str>) -> Result<()> {
        for clause in clauses {
            if self.field(&clause.name).is_none() {
                return Err(FilterError::UnsupportedField {
                    name: clause.name.clone(),
                    supported: self.supported(false),
                }
                .into());
            }
        }
        if let Some(order_by) = order_by {
            if !self.field(order_by).is_some_and(|f| f.api_filterable) {
                return Err(FilterError::UnsupportedField {
                    name: order_by.to_string(),
                    supported: self.supported(true),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Builds the `X-Filter` tree from the clauses the API can evaluate.
    ///
    /// # Errors
    ///
    /// Returns coercion errors.
    pub fn api_filter(
        &self,
        clauses: &[FilterClause],
        order_by: Option<&str>,
        order: SortOrder,
    ) -> Result<Value> {
        let server_side: Vec<FilterClause> = clauses
            .iter()
            .filter(|c| self.is_server_side(c))
            .cloned()
            .collect();

        let mut tree = serialize(&server_side, |name, raw| self.coerce(name, raw))?;
        if let (Some(order_by), Some(map)) = (order_by, tree.as_object_mut()) {
            map.insert("+order_by".to_string(), json!(order_by));
            map.insert("+order".to_string(), json!(order.to_string()));
        }
        Ok(tree)
    }

    /// True when the API evaluates `clause` itself.
    fn is_server_side(&self, clause: &FilterClause) -> bool {
        clause.match_by == MatchBy::Exact && self.field(&clause.name).is_some_and(|f| f.api_filterable)
    }

    /// True if a flattened item satisfies every clause the API did not
    /// already evaluate.
    ///
    /// List attributes match when any element matches. Scalars compare as
    /// strings; null compares as the empty string.
    ///
    /// # Errors
    ///
    /// Returns coercion errors, or `UnsupportedField` if the item lacks the
    /// attribute.
    pub fn matches(&self, item: &Value, clauses: &[FilterClause]) -> Result<bool> {
        for clause in clauses.iter().filter(|c| !self.is_server_side(c)) {
            let Some(actual) = item.get(&clause.name) else {
                return Err(FilterError::UnsupportedField {
                    name: clause.name.clone(),
                    supported: self.supported(false),
                }
                .into());
            };
            if !self.clause_matches(clause, actual)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn clause_matches(&self, clause: &FilterClause, actual: &Value) -> Result<bool> {
        if let Value::Array(items) = actual {
            for item in items {
                if self.clause_matches(clause, item)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        let Some(haystack) = scalar_text(actual) else {
            return Err(FilterError::Coercion {
                name: clause.name.clone(),
                value: actual.to_string(),
                expected: "scalar attribute",
            }
            .into());
        };
        for raw in &clause.values {
            let hit = match clause.match_by {
                MatchBy::Exact => {
                    let expected = self.coerce(&clause.name, raw)?;
                    scalar_text(&expected).is_some_and(|needle| needle == haystack)
                }
                MatchBy::Substring => haystack.contains(raw.as_str()),
            };
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Text form of a scalar for comparison.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
