//! Layer Provisioner CLI
//!
//! The `provision-layer` command is the hosting adapter for the lifecycle
//! framework: it reads one event, runs the provisioner against the real
//! services and prints the response document.
//!
//! ## Commands
//!
//! - `handle`: process a lifecycle event (file or stdin)
//! - `package`: write the build source archive locally
//! - `buildspec`: print the generated build instructions

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use clap::{Parser, Subcommand};
use layer_clients::{CodeBuildService, LambdaLayerRegistry, ObjectStoreArtifacts, SsmConfigStore};
use layer_provisioner::config::LAYER_SUFFIX;
use layer_provisioner::packager::render_buildspec;
use layer_provisioner::{
    ArchiveFormat, LayerRecipe, LifecycleAction, LifecycleEvent, PackagedSource, ProvisionReport,
    Provisioner, ProvisionerClients, ProvisionerConfig, ProvisioningResponse, SourcePackager,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "provision-layer")]
#[command(author = "Stevedores Org")]
#[command(version = layer_provisioner::VERSION)]
#[command(about = "Build and publish the native runtime layer", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one lifecycle event and print the response
    Handle {
        /// Event JSON file (default: read stdin)
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// Print the full provisioning report instead of the response
        #[arg(long)]
        report: bool,
    },

    /// Write the build source archive to a file
    Package {
        /// Output path
        #[arg(short, long)]
        out: PathBuf,

        /// Archive format: zip or tar-gz
        #[arg(short, long, default_value = "zip")]
        format: String,
    },

    /// Print the generated build instructions
    Buildspec,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    layer_provisioner::init_tracing(cli.json, level);

    match cli.command {
        Commands::Handle { event, report } => cmd_handle(event.as_deref(), report).await,
        Commands::Package { out, format } => {
            let packaged = cmd_package(&out, &format)?;
            println!("{}  {}", packaged.digest, out.display());
            Ok(())
        }
        Commands::Buildspec => {
            print!("{}", render_buildspec(&LayerRecipe::default()));
            Ok(())
        }
    }
}

/// Read a lifecycle event from `path`, or from stdin when absent.
fn read_event(path: Option<&Path>) -> Result<LifecycleEvent> {
    let body = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read event from stdin")?;
            body
        }
    };
    LifecycleEvent::from_json(&body).context("Failed to parse lifecycle event")
}

async fn build_clients(config: &ProvisionerConfig) -> Result<ProvisionerClients> {
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let artifacts = ObjectStoreArtifacts::s3(&config.artifact_bucket)
        .with_context(|| format!("Failed to open bucket {}", config.artifact_bucket))?;

    Ok(ProvisionerClients {
        artifacts: Arc::new(artifacts),
        builds: Arc::new(CodeBuildService::from_conf(&sdk_config)),
        registry: Arc::new(LambdaLayerRegistry::from_conf(&sdk_config)),
        config_store: Arc::new(SsmConfigStore::from_conf(&sdk_config)),
    })
}

/// Response for a Delete event, resolved without the service configuration.
///
/// Only a Delete that carries no physical id needs `ENVIRONMENT_NAME`, to
/// name the layer it would have created.
fn delete_response<F>(event: &LifecycleEvent, lookup: F) -> Result<Option<ProvisioningResponse>>
where
    F: Fn(&str) -> Option<String>,
{
    let request = event.request();
    if request.action != LifecycleAction::Delete {
        return Ok(None);
    }
    let physical_id = match request.prior_id {
        Some(id) => id,
        None => {
            let non_blank = |name: String| Some(name.trim().to_string()).filter(|n| !n.is_empty());
            let environment = event
                .resource_properties
                .environment_name
                .clone()
                .and_then(non_blank)
                .or_else(|| lookup("ENVIRONMENT_NAME").and_then(non_blank))
                .context("Delete without PhysicalResourceId needs ENVIRONMENT_NAME")?;
            format!("{environment}-{LAYER_SUFFIX}")
        }
    };
    Ok(Some(ProvisioningResponse::for_layer(&physical_id)))
}

async fn cmd_handle(event_path: Option<&Path>, full_report: bool) -> Result<()> {
    let event = read_event(event_path)?;
    if let Some(response) = delete_response(&event, |key| std::env::var(key).ok())? {
        info!(physical_id = %response.physical_resource_id, "delete leaves published layers in place");
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    let config = ProvisionerConfig::from_env_and_properties(&event.resource_properties)
        .context("Invalid provisioner configuration")?;
    info!(
        project = %config.build_project_name,
        bucket = %config.artifact_bucket,
        layer = %config.layer_name(),
        "provisioner configured"
    );

    let clients = build_clients(&config).await?;
    let provisioner = Provisioner::new(config, LayerRecipe::default(), clients);
    let report = provisioner
        .handle(event.request())
        .await
        .with_context(|| format!("{} request failed", event.request_type))?;

    println!("{}", render_output(&report, full_report)?);
    Ok(())
}

/// The response document, or the whole report.
fn render_output(report: &ProvisionReport, full_report: bool) -> Result<String> {
    let rendered = if full_report {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(&report.response)?
    };
    Ok(rendered)
}

fn cmd_package(out: &Path, format: &str) -> Result<PackagedSource> {
    let format: ArchiveFormat = format.parse()?;
    let packaged = SourcePackager::new(format)
        .package(&LayerRecipe::default())
        .context("Failed to package build source")?;
    std::fs::write(out, &packaged.archive)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(path = %out.display(), format = %format, bytes = packaged.archive.len(), "build source written");
    Ok(packaged)
}
