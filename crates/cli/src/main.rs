//! Command-line entrypoint: `serve` (default) starts the gateway, `routes`
//! prints the resolved configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdgate_core::raw_config::RawConfig;
use cmdgate_core::route::resolve;
use tracing::error;

#[derive(Parser)]
#[command(name = "cmdgate", about = "A declarative HTTP-to-command gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default).
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Rebuild the router from the on-disk config on every request.
        #[arg(short, long)]
        reload: bool,
    },
    /// Print the parsed and resolved configuration.
    Routes,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %e, "exiting");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Serve {
        port: 8080,
        reload: false,
    }) {
        Command::Serve { port, reload } => {
            cmdgate_server::run(cli.config, port, reload).await
        }
        Command::Routes => print_routes(&cli.config),
    }
}

fn print_routes(config_path: &std::path::Path) -> Result<()> {
    let raw = RawConfig::from_file(config_path).context("failed to read config")?;
    let resolved = resolve(raw).context("failed to resolve routes")?;
    let mut endpoints = cmdgate_core::collect_endpoints(&resolved.root).context("failed to build routes")?;
    endpoints.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.method.as_str().cmp(b.method.as_str())));
    for endpoint in endpoints {
        let pipeline: Vec<&str> = endpoint.pipeline.iter().map(|c| c.name.as_str()).collect();
        println!("{:<7} {:<40} {}", endpoint.method, endpoint.path, pipeline.join(" -> "));
    }
    Ok(())
}
