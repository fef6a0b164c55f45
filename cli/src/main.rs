//! Command-line entry point: runs the gateway's HTTP server, or composes the
//! configured subgraphs and prints the result without starting one.
//!
//! Grounded on `apollo-harness/src/bin/load_and_plan.rs`'s clap `Cli` +
//! `#[tokio::main]` shape.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use federation_gateway::config::GatewayConfig;
use federation_gateway::{server, Gateway};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "federation-gateway", about = "A GraphQL Federation v2 gateway")]
struct Cli {
    /// Path to the gateway's YAML configuration file.
    #[arg(short, long, default_value = "gateway.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Composes the configured subgraphs and prints the result, without
    /// starting the HTTP server. Exits non-zero on a composition error.
    Compose,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_dir = cli
        .config
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = match GatewayConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let gateway = match Gateway::compose(&config_dir, &config) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Compose) => {
            println!("{}", gateway.describe());
            ExitCode::SUCCESS
        }
        None => {
            let router = server::build_router(Arc::new(gateway), &config);
            let addr = format!("0.0.0.0:{}", config.listen_port());
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    eprintln!("error: failed to bind {addr}: {e}");
                    return ExitCode::FAILURE;
                }
            };
            tracing::info!(%addr, "gateway listening");
            if let Err(e) = axum::serve(listener, router).await {
                eprintln!("error: server exited: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}
