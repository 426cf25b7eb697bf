//! Read-only data sources.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{ProviderConfig, StateHasher};
use crate::error::{ApiError, Result};
use crate::filter::{FieldType, FilterClause, FilterConfig, FilterField, SortOrder};
use crate::flatten::{self, LkeClusterModel, flatten_instance_view};
use crate::linode::ApiSession;

use super::lke::LkeReconciler;

/// Fields `linode_instances` can filter on.
pub const INSTANCE_FILTER_FIELDS: &[FilterField] = &[
    FilterField {
        name: "id",
        field_type: FieldType::Int,
        api_filterable: true,
    },
    FilterField {
        name: "label",
        field_type: FieldType::String,
        api_filterable: true,
    },
    FilterField {
        name: "group",
        field_type: FieldType::String,
        api_filterable: true,
    },
    FilterField {
        name: "region",
        field_type: FieldType::String,
        api_filterable: true,
    },
    FilterField {
        name: "tags",
        field_type: FieldType::String,
        api_filterable: true,
    },
    FilterField {
        name: "type",
        field_type: FieldType::String,
        api_filterable: true,
    },
    FilterField {
        name: "image",
        field_type: FieldType::String,
        api_filterable: true,
    },
    FilterField {
        name: "status",
        field_type: FieldType::String,
        api_filterable: false,
    },
    FilterField {
        name: "watchdog_enabled",
        field_type: FieldType::Bool,
        api_filterable: false,
    },
];

/// Arguments of the `linode_instances` data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstancesQuery {
    /// Clauses, AND-ed together.
    pub filter: Vec<FilterClause>,
    /// Sort key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    /// Sort direction.
    pub order: SortOrder,
}

impl InstancesQuery {
    /// Stable id of the query.
    #[must_use]
    pub fn id(&self) -> String {
        let canonical = serde_json::to_value(self).unwrap_or(Value::Null);
        StateHasher::new().filter_id(&canonical)
    }
}

/// Lists the instances matching `query`.
///
/// Exact clauses on API-filterable fields go to the API; the rest are
/// checked on the flattened views.
///
/// # Errors
///
/// Returns `UnsupportedField` for unknown clause names or sort keys, and
/// API errors from the list call.
pub async fn read_instances(session: ApiSession<'_>, query: &InstancesQuery) -> Result<Value> {
    let fields = FilterConfig::new(INSTANCE_FILTER_FIELDS);
    fields.validate(&query.filter, query.order_by.as_deref())?;

    let api_filter = fields.api_filter(&query.filter, query.order_by.as_deref(), query.order)?;
    let header = api_filter
        .as_object()
        .is_some_and(|m| !m.is_empty())
        .then(|| api_filter.to_string());
    debug!("Instance filter: {}", header.as_deref().unwrap_or("(none)"));

    let instances = session.list_instances(header.as_deref()).await?;
    let listed = instances.len();

    let mut views = Vec::with_capacity(listed);
    for instance in &instances {
        let view = flatten::flatten(&flatten_instance_view(instance))?;
        if fields.matches(&view, &query.filter)? {
            views.push(view);
        }
    }
    info!("linode_instances: {} of {listed} instance(s) matched", views.len());

    let mut tree = flatten::flatten(query)?;
    if let Some(map) = tree.as_object_mut() {
        map.insert("id".to_string(), json!(query.id()));
        map.insert("instances".to_string(), Value::Array(views));
    }
    Ok(tree)
}

/// Reads the `linode_lke_cluster` data source.
///
/// # Errors
///
/// Returns `NotFound` when the cluster does not exist.
pub async fn read_lke_cluster(
    session: ApiSession<'_>,
    config: &ProviderConfig,
    id: u64,
) -> Result<Value> {
    let model = LkeReconciler::new(session, config)
        .read(id, &LkeClusterModel::default())
        .await?
        .ok_or_else(|| ApiError::NotFound {
            path: format!("/lke/clusters/{id}"),
        })?;

    let mut tree = flatten::flatten(&model)?;
    if let Some(map) = tree.as_object_mut() {
        map.insert("id".to_string(), json!(id));
        if let Some(pools) = map.remove("pool") {
            map.insert("pools".to_string(), pools);
        }
    }
    Ok(tree)
}
