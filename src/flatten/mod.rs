//! Flatten/expand layer.
//!
//! Typed models sit between the attribute tree and the API structures.
//! [`expand`] decodes a tree into a model, the `expand_*`/`flatten_*`
//! functions in the submodules translate between models and API types, and
//! [`flatten`] encodes a model back into a tree. Reconcilers work on models
//! only.

mod instance;
mod lke;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

pub use instance::{
    BackupsModel, ConfigModel, DeviceModel, DevicesModel, DiskModel, ExtraIpModel, InstanceModel,
    InstanceSnapshot, InstanceView, expand_config_request, expand_create_request,
    expand_disk_request, flatten_instance, flatten_instance_view, parse_instance_id,
};
pub use lke::{
    AutoscalerModel, ClusterSnapshot, ControlPlaneModel, LkeClusterModel, NodeModel, PoolModel,
    expand_cluster_create, expand_pool_request, flatten_cluster, parse_cluster_id,
};

/// Decodes an attribute tree into a typed model.
///
/// Null entries are dropped first so that unset attributes take the model's
/// defaults.
///
/// # Errors
///
/// Returns `TypeMismatch` when the tree does not fit the model.
pub fn expand<T: DeserializeOwned>(tree: &Value, path: &str) -> Result<T> {
    let tree = match prune_nulls(tree) {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(tree).map_err(|e| {
        SchemaError::TypeMismatch {
            path: path.to_string(),
            expected: std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or("model")
                .to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Encodes a typed model into an attribute tree.
///
/// # Errors
///
/// Returns an internal error if the model cannot be encoded.
pub fn flatten<T: Serialize>(model: &T) -> Result<Value> {
    serde_json::to_value(model)
        .map(|v| prune_nulls(&v))
        .map_err(|e| crate::error::ProviderError::internal(format!("cannot encode state: {e}")))
}

/// Removes null object entries, recursively.
#[must_use]
pub fn prune_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), prune_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(prune_nulls).collect()),
        other => other.clone(),
    }
}

/// Serde adapter for nested blocks holding at most one entry.
///
/// Accepts `null`, `[]`, `[{..}]` or a bare object and stores an `Option`.
/// Encodes `Some` as a one-element list.
pub mod single_block {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    /// Encodes the block.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => serializer.collect_seq(std::iter::once(inner)),
            None => serializer.serialize_none(),
        }
    }

    /// Decodes the block.
    ///
    /// # Errors
    ///
    /// Fails on more than one entry or a malformed entry.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let item = match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(mut items)) => match items.len() {
                0 => return Ok(None),
                1 => items.remove(0),
                n => return Err(D::Error::custom(format!("expected at most one block, found {n}"))),
            },
            Some(other) => other,
        };
        serde_json::from_value(item).map(Some).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
        inner: Option<Inner>,
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Inner {
        cpu: u32,
    }

    #[test]
    fn test_single_block_accepts_list_object_and_null() {
        let listed: Sample = expand(&json!({"name": "a", "inner": [{"cpu": 1}]}), "").unwrap();
        let bare: Sample = expand(&json!({"name": "a", "inner": {"cpu": 1}}), "").unwrap();
        let empty: Sample = expand(&json!({"name": "a", "inner": []}), "").unwrap();
        let null: Sample = expand(&json!({"name": "a", "inner": null}), "").unwrap();
        assert_eq!(listed, bare);
        assert_eq!(listed.inner, Some(Inner { cpu: 1 }));
        assert!(empty.inner.is_none());
        assert!(null.inner.is_none());
    }

    #[test]
    fn test_single_block_rejects_two_entries() {
        let err = expand::<Sample>(&json!({"inner": [{"cpu": 1}, {"cpu": 2}]}), "alerts").unwrap_err();
        assert!(err.to_string().contains("at most one"));
        assert_eq!(err.attribute_path().as_deref(), Some("alerts"));
    }

    #[test]
    fn test_flatten_wraps_block_and_drops_unset() {
        let tree = flatten(&Sample {
            name: "a".to_string(),
            inner: Some(Inner { cpu: 3 }),
        })
        .unwrap();
        assert_eq!(tree, json!({"name": "a", "inner": [{"cpu": 3}]}));

        let bare = flatten(&Sample::default()).unwrap();
        assert_eq!(bare, json!({"name": ""}));
    }
}
