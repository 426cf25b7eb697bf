//! JSON-lines RPC over stdio.
//!
//! One request object per input line, one response object per output line.
//! Requests run concurrently; responses are written as they complete and
//! carry the request id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};

use super::{Applied, Diagnostic, Provider};

/// One request line.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Request {
    /// Correlation id echoed in the response.
    pub id: u64,
    /// The call.
    #[serde(flatten)]
    pub call: Call,
}

/// Calls the host can make.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Call {
    /// Every schema.
    GetSchema,
    /// Provider configuration.
    Configure {
        /// Options; unset ones come from the environment or credential file.
        #[serde(default)]
        config: ProviderConfig,
    },
    /// Offline validation of a resource configuration.
    Validate {
        /// Resource type.
        resource: String,
        /// Raw configuration.
        config: Value,
    },
    /// Plan a change.
    PlanChange {
        /// Resource type.
        resource: String,
        /// Stored state, absent for creates.
        #[serde(default)]
        prior: Option<Value>,
        /// Raw configuration, absent for deletes.
        #[serde(default)]
        config: Option<Value>,
    },
    /// Create a resource.
    Create {
        /// Resource type.
        resource: String,
        /// Raw configuration.
        config: Value,
    },
    /// Refresh a resource.
    Read {
        /// Resource type.
        resource: String,
        /// Stored state.
        prior: Value,
    },
    /// Update a resource.
    Update {
        /// Resource type.
        resource: String,
        /// Stored state.
        prior: Value,
        /// Raw configuration.
        config: Value,
    },
    /// Delete a resource.
    Delete {
        /// Resource type.
        resource: String,
        /// Stored state.
        prior: Value,
    },
    /// Import a resource by id.
    Import {
        /// Resource type.
        resource: String,
        /// Remote id.
        import_id: String,
    },
    /// Read a data source.
    ReadDataSource {
        /// Data source type.
        data_source: String,
        /// Raw configuration.
        config: Value,
    },
    /// Cancel everything in flight and stop serving.
    Stop,
}

impl Call {
    /// Method name, for logs.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::GetSchema => "get_schema",
            Self::Configure { .. } => "configure",
            Self::Validate { .. } => "validate",
            Self::PlanChange { .. } => "plan_change",
            Self::Create { .. } => "create",
            Self::Read { .. } => "read",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Import { .. } => "import",
            Self::ReadDataSource { .. } => "read_data_source",
            Self::Stop => "stop",
        }
    }

    /// True for calls that talk to the Linode API.
    #[must_use]
    pub const fn needs_client(&self) -> bool {
        matches!(
            self,
            Self::Create { .. }
                | Self::Read { .. }
                | Self::Update { .. }
                | Self::Delete { .. }
                | Self::Import { .. }
                | Self::ReadDataSource { .. }
        )
    }
}

/// One response line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request id.
    pub id: u64,
    /// Resulting state or payload. Null after a delete or when the
    /// resource is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Errors and warnings.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Force-new paths, for `plan_change`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_replace: Vec<String>,
}

impl Response {
    fn ok(id: u64, state: Option<Value>) -> Self {
        Self {
            id,
            state,
            ..Self::default()
        }
    }

    fn error(id: u64, error: &ProviderError, state: Option<Value>) -> Self {
        Self {
            id,
            state,
            diagnostics: vec![Diagnostic::from_error(error)],
            ..Self::default()
        }
    }

    fn applied(id: u64, result: Applied) -> Self {
        match result {
            Ok(state) => Self::ok(id, Some(state)),
            Err(failure) => Self::error(id, &failure.error, failure.state),
        }
    }

    /// True when any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

impl Provider {
    /// Runs one call and builds its response.
    pub async fn dispatch(&self, id: u64, call: Call) -> Response {
        debug!("Dispatching request {id} ({})", call.method());
        match call {
            Call::GetSchema => Response::ok(id, Some(self.schemas())),
            Call::Configure { config } => match self.configure(config).await {
                Ok(()) => Response::ok(id, None),
                Err(e) => Response::error(id, &e, None),
            },
            Call::Validate { resource, config } => Response {
                id,
                diagnostics: self.validate(&resource, &config),
                ..Response::default()
            },
            Call::PlanChange {
                resource,
                prior,
                config,
            } => match self.plan_change(&resource, prior.as_ref(), config.as_ref()) {
                Ok(change) => Response {
                    id,
                    state: change.planned,
                    diagnostics: change.diagnostics,
                    requires_replace: change.requires_replace,
                },
                Err(e) => Response::error(id, &e, None),
            },
            Call::Create { resource, config } => Response::applied(id, self.create(&resource, &config).await),
            Call::Read { resource, prior } => match self.read(&resource, &prior).await {
                Ok(state) => Response::ok(id, state),
                Err(e) => Response::error(id, &e, Some(prior)),
            },
            Call::Update {
                resource,
                prior,
                config,
            } => Response::applied(id, self.update(&resource, &prior, &config).await),
            Call::Delete { resource, prior } => match self.delete(&resource, &prior).await {
                Ok(()) => Response::ok(id, None),
                Err(e) => Response::error(id, &e, Some(prior)),
            },
            Call::Import { resource, import_id } => match self.import(&resource, &import_id).await {
                Ok(state) => Response::ok(id, Some(state)),
                Err(e) => Response::error(id, &e, None),
            },
            Call::ReadDataSource { data_source, config } => {
                match self.read_data_source(&data_source, &config).await {
                    Ok(state) => Response::ok(id, Some(state)),
                    Err(e) => Response::error(id, &e, None),
                }
            }
            Call::Stop => {
                info!("Stop requested, cancelling in-flight operations");
                self.shutdown_token().cancel();
                Response::ok(id, None)
            }
        }
    }
}

fn encode_line(response: &Response) -> Result<String> {
    let mut line = serde_json::to_string(response)
        .map_err(|e| ProviderError::internal(format!("cannot encode response: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// Serves requests from `input` until EOF or `stop`.
///
/// Every request runs on its own task. Malformed lines are answered with an
/// error diagnostic and id 0.
///
/// # Errors
///
/// Returns I/O errors on the streams.
pub async fn serve<R, W>(provider: Arc<Provider>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let line = encode_line(&response)?;
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, ProviderError>(())
    });

    let mut tasks = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed request: {e}");
                let error = ProviderError::internal(format!("malformed request: {e}"));
                let _ = tx.send(Response::error(0, &error, None));
                continue;
            }
        };

        let stop = request.call == Call::Stop;
        let provider = Arc::clone(&provider);
        let tx = tx.clone();
        tasks.spawn(async move {
            let response = provider.dispatch(request.id, request.call).await;
            let _ = tx.send(response);
        });
        if stop {
            break;
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Request task failed: {e}");
        }
    }
    drop(tx);
    writer
        .await
        .map_err(|e| ProviderError::internal(format!("writer task failed: {e}")))??;
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_decodes_tagged_call() {
        let request: Request = serde_json::from_value(json!({
            "id": 3,
            "method": "import",
            "resource": "linode_instance",
            "import_id": "1234"
        }))
        .unwrap();
        assert_eq!(request.id, 3);
        assert_eq!(
            request.call,
            Call::Import {
                resource: "linode_instance".into(),
                import_id: "1234".into()
            }
        );

        let read: Request = serde_json::from_value(json!({
            "id": 4,
            "method": "read",
            "resource": "linode_instance",
            "prior": {"id": "9"}
        }))
        .unwrap();
        assert_eq!(read.call.method(), "read");
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let value = serde_json::to_value(Response::ok(1, None)).unwrap();
        assert_eq!(value, json!({"id": 1, "diagnostics": []}));
    }

    #[tokio::test]
    async fn test_serve_answers_schema_and_stops() {
        let provider = Arc::new(Provider::new());
        let input = b"{\"id\": 1, \"method\": \"get_schema\"}\nnot json\n{\"id\": 2, \"method\": \"stop\"}\n{\"id\": 3, \"method\": \"get_schema\"}\n";
        let (client, server) = tokio::io::duplex(1 << 20);
        serve(Arc::clone(&provider), &input[..], server).await.unwrap();

        let mut lines = tokio::io::BufReader::new(client).lines();
        let mut responses = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            responses.push(serde_json::from_str::<Response>(&line).unwrap());
        }
        responses.sort_by_key(|r| r.id);

        let ids: Vec<u64> = responses.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(responses[0].has_errors());
        assert!(responses[1].state.as_ref().unwrap()["resources"].get("linode_instance").is_some());
        assert!(provider.shutdown_token().is_cancelled());
    }
}
