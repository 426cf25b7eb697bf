//! Linode provider CLI entrypoint.
//!
//! `serve` runs the JSON-lines protocol used by the host; the other commands
//! are offline or one-shot tools built on the same provider.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use linode_provider::cli::{Cli, Commands, LogFormat, OutputFormatter};
use linode_provider::config::ConfigParser;
use linode_provider::error::{ConfigError, ProviderError, Result, SchemaError};
use linode_provider::filter::{self, FilterClause, FilterConfig};
use linode_provider::provider::{Call, Diagnostic, Provider, ProviderMeta, Request, serve};
use linode_provider::reconciler::INSTANCE_FILTER_FIELDS;

use clap::Parser;
use serde_json::Value;
use tokio::io::BufReader;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs always go to stderr; stdout carries protocol and command output.
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point. `Ok(false)` means an error diagnostic was
/// reported.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    ConfigParser::new().load_dotenv()?;

    match cli.command {
        Commands::Serve => cmd_serve(cli.config.as_deref()).await,
        Commands::Invoke { file } => cmd_invoke(cli.config.as_deref(), &file, &formatter).await,
        Commands::Schema { resource } => cmd_schema(resource.as_deref(), &formatter),
        Commands::Validate { resource, file } => cmd_validate(&resource, &file, &formatter),
        Commands::Diff {
            resource,
            prior,
            proposed,
        } => cmd_diff(&resource, prior.as_deref(), proposed.as_deref(), &formatter),
        Commands::Filter { clauses } => cmd_filter(&clauses, &formatter),
    }
}

/// Serve requests on stdio until EOF or `stop`.
async fn cmd_serve(config_path: Option<&Path>) -> Result<bool> {
    let provider = Arc::new(Provider::new());

    // A config file preconfigures the provider; otherwise the host sends
    // `configure` first.
    if let Some(path) = config_path {
        let config = ConfigParser::new().resolve(Some(path))?;
        provider.install(ProviderMeta::new(config)?).await;
        info!("Provider preconfigured from {}", path.display());
    }

    let signal_provider = Arc::clone(&provider);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            signal_provider.shutdown_token().cancel();
        }
    });

    info!("Serving on stdio");
    serve(provider, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(true)
}

/// Run the requests in a file, one after another.
async fn cmd_invoke(config_path: Option<&Path>, file: &Path, formatter: &OutputFormatter) -> Result<bool> {
    let requests: Vec<Request> = match read_tree(file)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Request>, _>>(),
        single => serde_json::from_value(single).map(|request| vec![request]),
    }
    .map_err(|e| SchemaError::Invalid {
        path: file.display().to_string(),
        message: format!("not a request: {e}"),
    })?;

    let provider = Provider::new();
    let configures = requests
        .iter()
        .any(|r| matches!(r.call, Call::Configure { .. }));
    if !configures && requests.iter().any(|r| r.call.needs_client()) {
        let config = ConfigParser::new().resolve(config_path)?;
        provider.install(ProviderMeta::new(config)?).await;
    }

    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        debug!("Invoking request {} ({})", request.id, request.call.method());
        responses.push(provider.dispatch(request.id, request.call).await);
    }

    emit(&formatter.format_responses(&responses))?;
    Ok(!responses.iter().any(|r| r.has_errors()))
}

/// Show schemas.
fn cmd_schema(resource: Option<&str>, formatter: &OutputFormatter) -> Result<bool> {
    let provider = Provider::new();
    let mut schemas = provider.resource_schemas();
    schemas.extend(provider.data_source_schemas());

    if let Some(name) = resource {
        schemas.retain(|schema| schema.type_name == name);
        if schemas.is_empty() {
            return Err(SchemaError::UnknownType {
                kind: "resource or data source",
                name: name.to_string(),
            }
            .into());
        }
    }

    emit(&formatter.format_schemas(&schemas))?;
    Ok(true)
}

/// Validate attributes offline.
fn cmd_validate(resource: &str, file: &Path, formatter: &OutputFormatter) -> Result<bool> {
    info!("Validating {resource} attributes from {}", file.display());
    let tree = read_tree(file)?;
    let diagnostics = Provider::new().validate(resource, &tree);

    emit(&formatter.format_diagnostics(&diagnostics))?;
    Ok(!diagnostics.iter().any(Diagnostic::is_error))
}

/// Plan a change offline.
fn cmd_diff(
    resource: &str,
    prior: Option<&Path>,
    proposed: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let prior = prior.map(read_tree).transpose()?;
    let proposed = proposed.map(read_tree).transpose()?;

    match Provider::new().plan_change(resource, prior.as_ref(), proposed.as_ref()) {
        Ok(change) => {
            emit(&formatter.format_diff(&change.diff, &change.diagnostics))?;
            Ok(!change.diagnostics.iter().any(Diagnostic::is_error))
        }
        Err(e) => {
            emit(&formatter.format_diagnostics(&[Diagnostic::from_error(&e)]))?;
            Ok(false)
        }
    }
}

/// Print the instance list filter for command-line clauses.
fn cmd_filter(args: &[String], formatter: &OutputFormatter) -> Result<bool> {
    let clauses = args
        .iter()
        .map(|arg| FilterClause::parse_arg(arg))
        .collect::<Result<Vec<_>>>()?;

    let fields = FilterConfig::new(INSTANCE_FILTER_FIELDS);
    fields.validate(&clauses, None)?;
    let tree = filter::serialize(&clauses, |name, raw| fields.coerce(name, raw))?;

    emit(&formatter.format_filter(&tree))?;
    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Reads a YAML or JSON attribute file.
fn read_tree(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: PathBuf::from(path),
        }
        .into());
    }
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        ProviderError::Config(ConfigError::ParseError {
            message: e.to_string(),
            location: Some(path.display().to_string()),
        })
    })
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
