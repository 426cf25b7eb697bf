//! Diff engine for comparing prior and planned attribute trees.
//!
//! Walks both trees side by side and reports every leaf that changed, using
//! dotted attribute paths (`disk.0.size`). Sensitive values are masked.

use serde_json::Value;
use tracing::debug;

use crate::schema::equivalent;

/// Engine for computing diffs between prior and planned states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Top-level attributes whose values are never shown.
    sensitive: Vec<&'static str>,
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource type name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Changed attributes.
    pub details: Vec<DiffDetail>,
    /// Paths forcing replacement.
    pub requires_replace: Vec<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource needs to be created.
    Create,
    /// Resource is updated in place.
    Update,
    /// Resource must be destroyed and created again.
    Replace,
    /// Resource needs to be deleted.
    Delete,
    /// Resource is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Attribute path.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

const MASK: &str = "(sensitive)";

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sensitive: Vec::new(),
        }
    }

    /// Masks the given top-level attributes.
    #[must_use]
    pub fn with_sensitive(mut self, paths: Vec<&'static str>) -> Self {
        self.sensitive = paths;
        self
    }

    /// Computes the diff between a prior and a planned state.
    ///
    /// A missing prior means create, a missing plan means delete.
    #[must_use]
    pub fn compute_diff(
        &self,
        name: &str,
        prior: Option<&Value>,
        planned: Option<&Value>,
        requires_replace: Vec<String>,
    ) -> ResourceDiff {
        let empty = Value::Null;
        let mut details = Vec::new();
        self.walk(
            "",
            prior.unwrap_or(&empty),
            planned.unwrap_or(&empty),
            &mut details,
        );

        let diff_type = match (prior, planned) {
            (None | Some(Value::Null), Some(_)) => DiffType::Create,
            (Some(_), None | Some(Value::Null)) => DiffType::Delete,
            _ if !requires_replace.is_empty() => DiffType::Replace,
            _ if details.is_empty() => DiffType::NoChange,
            _ => DiffType::Update,
        };

        debug!("{name}: {diff_type} ({} attributes)", details.len());
        ResourceDiff {
            name: name.to_string(),
            diff_type,
            details,
            requires_replace,
        }
    }

    fn walk(&self, path: &str, old: &Value, new: &Value, details: &mut Vec<DiffDetail>) {
        if equivalent(old, new) {
            return;
        }

        let masked = self
            .sensitive
            .iter()
            .any(|s| path == *s || path.starts_with(&format!("{s}.")));

        match (old, new) {
            (Value::Object(a), Value::Object(b)) if !masked => {
                let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
                keys.sort();
                keys.dedup();
                for key in keys {
                    let child = join(path, key);
                    self.walk(
                        &child,
                        a.get(key).unwrap_or(&Value::Null),
                        b.get(key).unwrap_or(&Value::Null),
                        details,
                    );
                }
            }
            (Value::Array(a), Value::Array(b)) if !masked && is_block_list(a) && is_block_list(b) => {
                for index in 0..a.len().max(b.len()) {
                    let child = join(path, &index.to_string());
                    self.walk(
                        &child,
                        a.get(index).unwrap_or(&Value::Null),
                        b.get(index).unwrap_or(&Value::Null),
                        details,
                    );
                }
            }
            _ => details.push(DiffDetail {
                field: path.to_string(),
                old_value: render(old, masked),
                new_value: render(new, masked),
            }),
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn is_block_list(items: &[Value]) -> bool {
    items.iter().all(Value::is_object)
}

fn render(value: &Value, masked: bool) -> Option<String> {
    match value {
        Value::Null => None,
        _ if masked => Some(MASK.to_string()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ResourceDiff {
    /// Returns true if anything changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diff_type != DiffType::NoChange
    }

    /// True when an attribute at or below `path` changed.
    #[must_use]
    pub fn touches(&self, path: &str) -> bool {
        self.details
            .iter()
            .any(|d| d.field == path || d.field.starts_with(&format!("{path}.")))
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_block_changes_use_dotted_paths() {
        let prior = json!({"label": "a", "disk": [{"label": "boot", "size": 100}]});
        let planned = json!({"label": "a", "disk": [{"label": "boot", "size": 200}]});
        let diff = DiffEngine::new().compute_diff("linode_instance", Some(&prior), Some(&planned), vec![]);

        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(diff.details.len(), 1);
        assert_eq!(diff.details[0].field, "disk.0.size");
        assert_eq!(diff.details[0].old_value.as_deref(), Some("100"));
        assert!(diff.touches("disk"));
        assert!(!diff.touches("label"));
    }

    #[test]
    fn test_empty_and_missing_are_equal() {
        let prior = json!({"tags": [], "group": ""});
        let planned = json!({});
        let diff = DiffEngine::new().compute_diff("x", Some(&prior), Some(&planned), vec![]);
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_sensitive_values_are_masked() {
        let prior = json!({"root_pass": "aaa"});
        let planned = json!({"root_pass": "bbb"});
        let diff = DiffEngine::new()
            .with_sensitive(vec!["root_pass"])
            .compute_diff("x", Some(&prior), Some(&planned), vec![]);
        assert_eq!(diff.details[0].new_value.as_deref(), Some(MASK));
    }

    #[test]
    fn test_diff_types() {
        let tree = json!({"region": "us-east"});
        let engine = DiffEngine::new();
        assert_eq!(engine.compute_diff("x", None, Some(&tree), vec![]).diff_type, DiffType::Create);
        assert_eq!(engine.compute_diff("x", Some(&tree), None, vec![]).diff_type, DiffType::Delete);

        let moved = json!({"region": "eu-west"});
        let replace = engine.compute_diff("x", Some(&tree), Some(&moved), vec!["region".to_string()]);
        assert_eq!(replace.diff_type, DiffType::Replace);
        assert_eq!(replace.to_string(), "x: replace (region)");
    }
}
