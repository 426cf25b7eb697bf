//! Host boundary.
//!
//! The [`Provider`] holds the resource registry and the configured client.
//! Every callback runs inside its own [`OperationContext`] and tracing span;
//! errors become [`Diagnostic`]s only here.

mod context;
mod diagnostic;
mod resources;
mod server;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::config::{ConfigParser, ConfigValidator, ProviderConfig, Timeouts};
use crate::error::{ConfigError, Result, SchemaError};
use crate::linode::LinodeClient;
use crate::planner::{DiffEngine, ResourceDiff};
use crate::schema::ResourceSchema;

pub use context::OperationContext;
pub use diagnostic::{Diagnostic, Failure, Severity};
pub use resources::{InstanceResource, InstancesDataSource, LkeClusterDataSource, LkeClusterResource};
pub use server::{Call, Request, Response, serve};

/// Outcome of a callback that may leave partial state behind.
pub type Applied = std::result::Result<Value, Failure>;

/// Configured provider state shared by every callback.
#[derive(Debug)]
pub struct ProviderMeta {
    /// Resolved configuration.
    pub config: ProviderConfig,
    /// Shared API client.
    pub client: LinodeClient,
}

impl ProviderMeta {
    /// Builds the client for a resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or has no token.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        ConfigValidator::new().validate(&config)?;
        let client = LinodeClient::new(&config)?;
        Ok(Self { config, client })
    }
}

/// Callbacks of one managed resource type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Attribute schema.
    fn schema(&self) -> ResourceSchema;

    /// Per-operation time budgets.
    fn timeouts(&self) -> Timeouts;

    /// Creates the resource from its configuration with defaults applied.
    async fn create(&self, meta: &ProviderMeta, ctx: &OperationContext, config: &Value) -> Applied;

    /// Reads the resource; `None` when it is gone.
    async fn read(&self, meta: &ProviderMeta, ctx: &OperationContext, prior: &Value) -> Result<Option<Value>>;

    /// Moves the resource from `prior` to `planned`.
    async fn update(
        &self,
        meta: &ProviderMeta,
        ctx: &OperationContext,
        prior: &Value,
        planned: &Value,
    ) -> Applied;

    /// Deletes the resource.
    async fn delete(&self, meta: &ProviderMeta, ctx: &OperationContext, prior: &Value) -> Result<()>;

    /// Builds the initial state from an id string.
    async fn import(&self, meta: &ProviderMeta, ctx: &OperationContext, id: &str) -> Result<Value>;

    /// Adjusts a planned state; `prior` is null for creates.
    ///
    /// Removing a computed attribute marks it as recomputed.
    fn customize_diff(&self, prior: &Value, planned: &mut Value) -> Result<Vec<Diagnostic>>;
}

/// Callbacks of one data source type.
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    /// Attribute schema.
    fn schema(&self) -> ResourceSchema;

    /// Reads the data source for a configuration.
    async fn read(&self, meta: &ProviderMeta, ctx: &OperationContext, config: &Value) -> Result<Value>;
}

/// Result of planning one resource change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Planned state; `None` for deletes.
    pub planned: Option<Value>,
    /// Force-new paths that change.
    pub requires_replace: Vec<String>,
    /// Attribute level diff.
    pub diff: ResourceDiff,
    /// Warnings raised while planning.
    pub diagnostics: Vec<Diagnostic>,
}

/// Resource registry and configured client.
pub struct Provider {
    resources: BTreeMap<&'static str, Arc<dyn ResourceHandler>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSourceHandler>>,
    meta: RwLock<Option<Arc<ProviderMeta>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    /// Provider with every Linode resource and data source registered.
    #[must_use]
    pub fn new() -> Self {
        let mut provider = Self::empty();
        provider.register_resource(Arc::new(InstanceResource));
        provider.register_resource(Arc::new(LkeClusterResource));
        provider.register_data_source(Arc::new(InstancesDataSource));
        provider.register_data_source(Arc::new(LkeClusterDataSource));
        provider
    }

    /// Provider with nothing registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            meta: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers a resource under its schema's type name.
    pub fn register_resource(&mut self, handler: Arc<dyn ResourceHandler>) {
        let name = handler.schema().type_name;
        debug!("Registering resource {name}");
        self.resources.insert(name, handler);
    }

    /// Registers a data source under its schema's type name.
    pub fn register_data_source(&mut self, handler: Arc<dyn DataSourceHandler>) {
        let name = handler.schema().type_name;
        debug!("Registering data source {name}");
        self.data_sources.insert(name, handler);
    }

    /// Installs an already built client, bypassing credential resolution.
    pub async fn install(&self, meta: ProviderMeta) {
        *self.meta.write().await = Some(Arc::new(meta));
    }

    /// Resolves the configuration and builds the shared client.
    ///
    /// Environment overrides apply first, then the credential file fills
    /// anything still unset.
    ///
    /// # Errors
    ///
    /// Returns configuration errors, including a missing token.
    pub async fn configure(&self, mut config: ProviderConfig) -> Result<()> {
        ConfigParser::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        ConfigParser::apply_credential_file(&mut config)?;
        let meta = ProviderMeta::new(config)?;
        info!("Provider configured for {}", meta.client.base_url());
        self.install(meta).await;
        Ok(())
    }

    /// Token cancelling every in-flight operation.
    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Schemas of every registered resource.
    #[must_use]
    pub fn resource_schemas(&self) -> Vec<ResourceSchema> {
        self.resources.values().map(|handler| handler.schema()).collect()
    }

    /// Schemas of every registered data source.
    #[must_use]
    pub fn data_source_schemas(&self) -> Vec<ResourceSchema> {
        self.data_sources.values().map(|handler| handler.schema()).collect()
    }

    /// Every schema, keyed by type name.
    #[must_use]
    pub fn schemas(&self) -> Value {
        let keyed = |schemas: Vec<ResourceSchema>| -> Map<String, Value> {
            schemas
                .into_iter()
                .map(|schema| {
                    let name = schema.type_name.to_string();
                    (name, serde_json::to_value(schema).unwrap_or(Value::Null))
                })
                .collect()
        };
        json!({
            "resources": keyed(self.resource_schemas()),
            "data_sources": keyed(self.data_source_schemas()),
        })
    }

    /// Registered resource type names.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    /// Schema of a resource or data source.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for unregistered names.
    pub fn schema_of(&self, name: &str) -> Result<ResourceSchema> {
        if let Some(handler) = self.resources.get(name) {
            return Ok(handler.schema());
        }
        self.data_source(name).map(|handler| handler.schema())
    }

    fn resource(&self, name: &str) -> Result<Arc<dyn ResourceHandler>> {
        self.resources.get(name).cloned().ok_or_else(|| {
            SchemaError::UnknownType {
                kind: "resource",
                name: name.to_string(),
            }
            .into()
        })
    }

    fn data_source(&self, name: &str) -> Result<Arc<dyn DataSourceHandler>> {
        self.data_sources.get(name).cloned().ok_or_else(|| {
            SchemaError::UnknownType {
                kind: "data source",
                name: name.to_string(),
            }
            .into()
        })
    }

    async fn meta(&self) -> Result<Arc<ProviderMeta>> {
        self.meta
            .read()
            .await
            .clone()
            .ok_or_else(|| ConfigError::NotConfigured.into())
    }

    fn context(&self, resource: &str, operation: &str, budget: std::time::Duration) -> OperationContext {
        OperationContext::with_cancel(
            format!("{resource}.{operation}"),
            budget,
            self.shutdown.child_token(),
        )
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Validates a configuration without contacting the API.
    #[must_use]
    pub fn validate(&self, resource: &str, config: &Value) -> Vec<Diagnostic> {
        let handler = match self.resource(resource) {
            Ok(handler) => handler,
            Err(e) => return vec![Diagnostic::from_error(&e)],
        };
        let schema = handler.schema();
        if let Err(errors) = schema.validate(config) {
            return errors.iter().map(Diagnostic::from_error).collect();
        }
        let mut planned = schema.normalize(config);
        handler
            .customize_diff(&Value::Null, &mut planned)
            .unwrap_or_else(|e| vec![Diagnostic::from_error(&e)])
    }

    /// Plans a change from `prior` towards `config`.
    ///
    /// A missing prior plans a create, a missing config plans a delete.
    ///
    /// # Errors
    ///
    /// Returns the first schema error, or the plan error the resource
    /// raised.
    pub fn plan_change(&self, resource: &str, prior: Option<&Value>, config: Option<&Value>) -> Result<PlannedChange> {
        let handler = self.resource(resource)?;
        let schema = handler.schema();
        let engine = DiffEngine::new().with_sensitive(schema.block.sensitive_paths());

        let Some(config) = config else {
            return Ok(PlannedChange {
                planned: None,
                requires_replace: Vec::new(),
                diff: engine.compute_diff(schema.type_name, prior, None, Vec::new()),
                diagnostics: Vec::new(),
            });
        };

        if let Err(mut errors) = schema.validate(config) {
            return Err(errors.swap_remove(0));
        }

        let proposed = schema.normalize(config);
        let (mut planned, requires_replace) = match prior {
            Some(prior) if !prior.is_null() => {
                let planned = schema.merge_prior(prior, &proposed);
                let replace = schema.requires_replace(prior, &planned);
                (planned, replace)
            }
            _ => (proposed, Vec::new()),
        };

        let diagnostics = if requires_replace.is_empty() {
            handler.customize_diff(prior.unwrap_or(&Value::Null), &mut planned)?
        } else {
            handler.customize_diff(&Value::Null, &mut planned)?
        };
        let diff = engine.compute_diff(schema.type_name, prior, Some(&planned), requires_replace.clone());
        debug!("Planned {diff}");

        Ok(PlannedChange {
            planned: Some(planned),
            requires_replace,
            diff,
            diagnostics,
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Creates a resource from its raw configuration.
    ///
    /// # Errors
    ///
    /// Returns the failure with any state that exists remotely.
    pub async fn create(&self, resource: &str, config: &Value) -> Applied {
        let handler = self.resource(resource)?;
        let meta = self.meta().await?;
        let schema = handler.schema();
        let ctx = self.context(resource, "create", handler.timeouts().create);
        let span = info_span!("create", resource, operation_id = %ctx.operation_id());

        let raw = schema.with_defaults(config);
        async {
            info!("Creating {resource}");
            handler
                .create(&meta, &ctx, &raw)
                .await
                .map(|state| schema.normalize(&state))
                .map_err(|failure| normalize_failure(&schema, failure))
        }
        .instrument(span)
        .await
    }

    /// Refreshes a resource; `None` when it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns API errors other than 404.
    pub async fn read(&self, resource: &str, prior: &Value) -> Result<Option<Value>> {
        let handler = self.resource(resource)?;
        let meta = self.meta().await?;
        let schema = handler.schema();
        let ctx = self.context(resource, "read", handler.timeouts().read);
        let span = info_span!("read", resource, operation_id = %ctx.operation_id());

        async {
            let state = handler.read(&meta, &ctx, prior).await?;
            Ok(state.map(|s| schema.normalize(&s)))
        }
        .instrument(span)
        .await
    }

    /// Updates a resource towards its raw configuration.
    ///
    /// # Errors
    ///
    /// Returns the failure with the state observed after it.
    pub async fn update(&self, resource: &str, prior: &Value, config: &Value) -> Applied {
        let handler = self.resource(resource)?;
        let meta = self.meta().await?;
        let schema = handler.schema();
        let ctx = self.context(resource, "update", handler.timeouts().update);
        let span = info_span!("update", resource, operation_id = %ctx.operation_id());

        let planned = schema.merge_prior(prior, &schema.with_defaults(config));
        async {
            info!("Updating {resource}");
            handler
                .update(&meta, &ctx, prior, &planned)
                .await
                .map(|state| schema.normalize(&state))
                .map_err(|failure| normalize_failure(&schema, failure))
        }
        .instrument(span)
        .await
    }

    /// Deletes a resource.
    ///
    /// # Errors
    ///
    /// Returns API errors other than 404, or a poll failure.
    pub async fn delete(&self, resource: &str, prior: &Value) -> Result<()> {
        let handler = self.resource(resource)?;
        let meta = self.meta().await?;
        let ctx = self.context(resource, "delete", handler.timeouts().delete);
        let span = info_span!("delete", resource, operation_id = %ctx.operation_id());

        async {
            info!("Deleting {resource}");
            handler.delete(&meta, &ctx, prior).await
        }
        .instrument(span)
        .await
    }

    /// Imports a resource by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing has the id.
    pub async fn import(&self, resource: &str, id: &str) -> Result<Value> {
        let handler = self.resource(resource)?;
        let meta = self.meta().await?;
        let schema = handler.schema();
        let ctx = self.context(resource, "import", handler.timeouts().read);
        let span = info_span!("import", resource, operation_id = %ctx.operation_id());

        async {
            let state = handler.import(&meta, &ctx, id).await?;
            Ok(schema.normalize(&state))
        }
        .instrument(span)
        .await
    }

    /// Reads a data source.
    ///
    /// # Errors
    ///
    /// Returns schema, filter and API errors.
    pub async fn read_data_source(&self, name: &str, config: &Value) -> Result<Value> {
        let handler = self.data_source(name)?;
        let meta = self.meta().await?;
        let schema = handler.schema();
        schema.validate(config).map_err(|mut errors| errors.swap_remove(0))?;
        let ctx = self.context(name, "read", Timeouts::DATA_SOURCE.read);
        let span = info_span!("read_data_source", data_source = name, operation_id = %ctx.operation_id());

        let config = schema.with_defaults(config);
        async { handler.read(&meta, &ctx, &config).await }
            .instrument(span)
            .await
    }
}

fn normalize_failure(schema: &ResourceSchema, failure: Failure) -> Failure {
    Failure::with_state(failure.error, failure.state.map(|s| schema.normalize(&s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlanError, ProviderError};

    fn mock_with_schema() -> MockResourceHandler {
        let mut mock = MockResourceHandler::new();
        mock.expect_schema().returning(crate::schema::instance_schema);
        mock.expect_timeouts().returning(|| Timeouts::INSTANCE);
        mock
    }

    fn declared() -> Value {
        json!({
            "label": "web",
            "region": "us-east",
            "type": "g6-standard-1",
            "image": "linode/debian12",
            "root_pass": "hunter2"
        })
    }

    #[test]
    fn test_registry_has_linode_types() {
        let provider = Provider::new();
        assert_eq!(provider.resource_names(), vec!["linode_instance", "linode_lke_cluster"]);
        let schemas = provider.schemas();
        assert!(schemas["resources"].get("linode_instance").is_some());
        assert!(schemas["data_sources"].get("linode_instances").is_some());
        assert!(provider.schema_of("linode_lke_cluster").is_ok());
        assert!(provider.schema_of("linode_nodebalancer").is_err());
    }

    #[test]
    fn test_plan_create_hashes_secrets() {
        let mut mock = mock_with_schema();
        mock.expect_customize_diff().returning(|_, _| Ok(Vec::new()));
        let mut provider = Provider::empty();
        provider.register_resource(Arc::new(mock));

        let change = provider
            .plan_change("linode_instance", None, Some(&declared()))
            .unwrap();
        let planned = change.planned.unwrap();
        assert_eq!(change.diff.diff_type, crate::planner::DiffType::Create);
        assert_ne!(planned["root_pass"], json!("hunter2"));
        assert_eq!(planned["watchdog_enabled"], json!(true));
    }

    #[test]
    fn test_plan_region_change_requires_replace() {
        let provider = Provider::new();
        let prior = provider
            .plan_change("linode_instance", None, Some(&declared()))
            .unwrap()
            .planned
            .unwrap();
        let mut moved = declared();
        moved["region"] = json!("eu-west");

        let change = provider
            .plan_change("linode_instance", Some(&prior), Some(&moved))
            .unwrap();
        assert_eq!(change.requires_replace, vec!["region".to_string()]);
        assert_eq!(change.diff.diff_type, crate::planner::DiffType::Replace);
    }

    #[test]
    fn test_plan_propagates_customize_diff_errors() {
        let mut mock = mock_with_schema();
        mock.expect_customize_diff()
            .returning(|_, _| Err(PlanError::PrivateIpDisable.into()));
        let mut provider = Provider::empty();
        provider.register_resource(Arc::new(mock));

        let err = provider
            .plan_change("linode_instance", Some(&declared()), Some(&declared()))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Plan(PlanError::PrivateIpDisable)));
    }

    #[test]
    fn test_validate_reports_schema_errors() {
        let provider = Provider::new();
        let diagnostics = provider.validate("linode_instance", &json!({"label": "web"}));
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(Diagnostic::is_error));
    }

    #[tokio::test]
    async fn test_callbacks_need_configuration() {
        let provider = Provider::new();
        let err = provider.read("linode_instance", &json!({"id": "1"})).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
