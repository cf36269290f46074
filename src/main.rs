//! Rolesweep CLI entrypoint.
//!
//! Each workflow phase is a subcommand; `pipeline` chains all five.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rolesweep::cloud::{S3ArtifactStore, SsmSecretStore, StsSessionBroker};
use rolesweep::config::Settings;
use rolesweep::error::{Result, RolesweepError};
use rolesweep::notify::Notifier;
use rolesweep::phases::{Executor, Finalizer, PhaseInput, Planner, Quarantine, Refine};
use rolesweep::store::{DynamoCleanupStore, DynamoInventoryStore};

/// Stateful cleanup of unused CloudFormation-managed IAM roles.
#[derive(Debug, Parser)]
#[command(name = "rolesweep", version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Derive cleanup plans from the upstream inventory
    Plan(PhaseArgs),
    /// Back up and deny the trust policy of every planned unused role
    Quarantine(PhaseArgs),
    /// Stage stack deletion or an update change set per quarantined plan
    Refine(PhaseArgs),
    /// Execute staged actions and wait for terminal stack statuses
    Execute(PhaseArgs),
    /// Settle successfully executed plans into their terminal state
    Finalize(PhaseArgs),
    /// Run all five phases in order
    Pipeline(PhaseArgs),
}

/// Arguments shared by every phase.
#[derive(Debug, Args)]
struct PhaseArgs {
    /// Target account IDs, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    accounts: Vec<String>,

    /// Run identifier namespacing backup artifacts
    #[arg(long)]
    run_id: Option<String>,
}

impl PhaseArgs {
    fn input(&self) -> PhaseInput {
        PhaseInput {
            accounts: self.accounts.clone(),
            run_id: self.run_id.clone(),
        }
    }
}

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Wired-up production components.
struct App {
    inventory: DynamoInventoryStore,
    cleanup: DynamoCleanupStore,
    broker: StsSessionBroker,
    artifacts: S3ArtifactStore,
    notifier: Option<Notifier>,
}

impl App {
    async fn from_settings(settings: Settings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = settings.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        debug!("AWS configuration loaded");

        let dynamo = aws_sdk_dynamodb::Client::new(&shared);
        let notifier = settings.webhook_param.as_ref().map(|param| {
            Notifier::new(
                Arc::new(SsmSecretStore::new(aws_sdk_ssm::Client::new(&shared))),
                param.clone(),
            )
        });

        Self {
            inventory: DynamoInventoryStore::new(dynamo.clone(), settings.input_table),
            cleanup: DynamoCleanupStore::new(dynamo, settings.cleanup_table),
            broker: StsSessionBroker::new(&shared, settings.execution_role),
            artifacts: S3ArtifactStore::new(
                aws_sdk_s3::Client::new(&shared),
                settings.artifact_bucket,
            ),
            notifier,
        }
    }

    /// Prints a phase report and forwards it to the webhook.
    async fn emit<R: Serialize>(&self, heading: &str, report: &R) -> Result<()> {
        let rendered = serde_json::to_string_pretty(report)
            .map_err(|e| RolesweepError::internal(e.to_string()))?;
        println!("{rendered}");

        if let Some(notifier) = &self.notifier {
            let compact = serde_json::to_string(report)
                .map_err(|e| RolesweepError::internal(e.to_string()))?;
            notifier.notify(heading, &compact).await;
        }
        Ok(())
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env()?;
    let app = App::from_settings(settings).await;

    match cli.command {
        Commands::Plan(args) => cmd_plan(&app, &args.input()).await,
        Commands::Quarantine(args) => cmd_quarantine(&app, &args.input()).await,
        Commands::Refine(args) => cmd_refine(&app, &args.input()).await,
        Commands::Execute(args) => cmd_execute(&app, &args.input()).await,
        Commands::Finalize(args) => cmd_finalize(&app, &args.input()).await,
        Commands::Pipeline(args) => cmd_pipeline(&app, &args.input()).await,
    }
}

async fn cmd_plan(app: &App, input: &PhaseInput) -> Result<()> {
    let report = Planner::new(&app.inventory, &app.cleanup).run(input).await?;
    app.emit("Cleanup planned", &report).await
}

async fn cmd_quarantine(app: &App, input: &PhaseInput) -> Result<()> {
    let report = Quarantine::new(&app.cleanup, &app.broker, &app.artifacts)
        .run(input)
        .await?;
    app.emit("Roles quarantined", &report).await
}

async fn cmd_refine(app: &App, input: &PhaseInput) -> Result<()> {
    let report = Refine::new(&app.cleanup, &app.broker).run(input).await?;
    app.emit("Plans refined", &report).await
}

async fn cmd_execute(app: &App, input: &PhaseInput) -> Result<()> {
    let report = Executor::new(&app.cleanup, &app.broker).run(input).await?;
    app.emit("Stacks executed", &report).await
}

async fn cmd_finalize(app: &App, input: &PhaseInput) -> Result<()> {
    let report = Finalizer::new(&app.cleanup).run(input).await?;
    app.emit("Plans finalized", &report).await
}

async fn cmd_pipeline(app: &App, input: &PhaseInput) -> Result<()> {
    info!("Running full cleanup pipeline");
    cmd_plan(app, input).await?;
    cmd_quarantine(app, input).await?;
    cmd_refine(app, input).await?;
    cmd_execute(app, input).await?;
    cmd_finalize(app, input).await
}
