mod config;

use clap::{Parser, Subcommand};
use config::MaestroConfig;
use maestro_agent::StagedReasoner;
use maestro_orchestrator::OrchestrationCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: multi-agent orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query by orchestrating the configured specialists
    Run {
        query: String,
        /// Maximum reasoning steps (overrides config)
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Print the full answer with its turn history as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect specialists
    Specialists {
        #[command(subcommand)]
        action: SpecialistAction,
    },
}

#[derive(Subcommand)]
enum SpecialistAction {
    /// List registered specialists
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = MaestroConfig::load(&cli.config).await?;
    let registry = config.build_registry()?;

    match cli.command {
        Commands::Run {
            query,
            max_iterations,
            json,
        } => {
            if let Some(n) = max_iterations {
                config.run.max_iterations = n;
            }
            info!(
                specialists = registry.len(),
                max_iterations = config.run.max_iterations,
                "Starting run"
            );

            let reasoner = Arc::new(StagedReasoner::new(config.reasoner.clone()));
            let coordinator = OrchestrationCoordinator::new(registry, reasoner, config.run.clone())?;

            let token = CancellationToken::new();
            let on_interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling run");
                    on_interrupt.cancel();
                }
            });

            let answer = coordinator.submit_with_cancel(query, token).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                println!(
                    "\n[{} step(s), contributors: {}]",
                    answer.iterations,
                    answer.contributors.join(", ")
                );
            }
        }
        Commands::Specialists { action } => match action {
            SpecialistAction::List => {
                if registry.is_empty() {
                    println!("No specialists registered.");
                    println!("Configure specialists in maestro.toml under [[catalogs]]");
                } else {
                    println!("Registered specialists:");
                    for binding in registry.list() {
                        println!("  {} ({}): {}", binding.id, binding.name, binding.description);
                    }
                    println!("\nTotal: {} specialist(s)", registry.len());
                }
            }
        },
    }

    Ok(())
}
