//! Brigade build controller.

use anyhow::Context;
use brigade_config::{ControllerConfig, load_controller_config};
use brigade_controller::BuildController;
use brigade_core::Substrate;
use brigade_executor::{KubernetesSubstrate, watch_builds};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brigade-controller")]
#[command(about = "Turns Brigade build records into worker pods", long_about = None)]
struct Cli {
    /// Path to a KDL configuration file
    #[arg(long, env = "BRIGADE_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace to watch for builds
    #[arg(long, env = "BRIGADE_NAMESPACE")]
    namespace: Option<String>,

    /// Number of concurrent reconcile workers
    #[arg(long, env = "BRIGADE_WORKERS")]
    workers: Option<usize>,

    /// Emit logs as JSON
    #[arg(long, env = "BRIGADE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller (default)
    Run,
    /// Validate the configuration and exit
    Validate,
}

impl Cli {
    /// Defaults, then the config file, then flags and environment.
    fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => load_controller_config(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ControllerConfig::default(),
        };
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.controller_config()?;
    if let Some(Commands::Validate) = cli.command {
        println!("Configuration is valid");
        return Ok(());
    }

    let substrate = KubernetesSubstrate::new()
        .await
        .context("connecting to the cluster")?;
    info!(
        substrate = substrate.name(),
        namespace = %config.namespace,
        workers = config.workers,
        "Starting Brigade controller"
    );

    let events = watch_builds(substrate.client().clone(), &config.namespace);
    let controller = BuildController::new(Arc::new(substrate), Arc::new(config));
    controller
        .run(events, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await;

    Ok(())
}
