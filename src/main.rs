use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use stackprobe::config::{init_config, Config};
use stackprobe::fixture::Fixture;

#[derive(Parser)]
#[command(name = "stackprobe")]
#[command(
    about = "Integration harness for OpenStack-style cloud APIs",
    long_about = "stackprobe exercises a live cloud deployment over HTTP: it creates real\nservers, volumes, snapshots and networks, observes their behavior, and\ntears everything down afterward.\n\nCommands:\n  - precheck: validate configuration against the deployment without creating resources\n  - smoke: create a minimal resource set per service, verify it, clean it up"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize harness configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = ".stackprobe.toml")]
        output: PathBuf,
    },
    /// Validate configuration and credentials against the deployment
    Precheck,
    /// Create, verify and tear down a minimal resource set
    Smoke {
        /// Also exercise compute and volume (network-only by default)
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stackprobe=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stackprobe=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init { output } => init_config(&output),
        Commands::Precheck => {
            let config = Config::load(cli.config.as_deref())?;
            precheck(config).await
        }
        Commands::Smoke { full } => {
            let config = Config::load(cli.config.as_deref())?;
            smoke(config, full).await
        }
    }
}

async fn precheck(config: Config) -> Result<()> {
    let mut fixture = Fixture::setup(config).await.map_err(anyhow::Error::from)?;
    fixture.teardown().await;
    println!("Precheck passed: credentials, services and image references verified");
    Ok(())
}

/// Minimal end-to-end pass: create resources, confirm they answer to GET
/// and appear in listings, then clean up. Teardown runs even when the
/// verification phase fails.
async fn smoke(config: Config, full: bool) -> Result<()> {
    let mut fixture = Fixture::setup(config).await.map_err(anyhow::Error::from)?;
    let outcome = run_smoke(&mut fixture, full).await;
    fixture.teardown().await;

    outcome.map_err(anyhow::Error::from)?;
    println!("Smoke run passed");
    Ok(())
}

async fn run_smoke(fixture: &mut Fixture, full: bool) -> stackprobe::Result<()> {
    let network = fixture.create_network(None).await?;
    let network_id = attr(&network, "id");
    fixture.create_subnet(&network_id, "10.100.0.0/24").await?;
    fixture.create_port(&network_id).await?;

    let shown = fixture.network.show_network(&network_id).await?;
    println!("  network {} -> {}", network_id, attr(&shown, "name"));

    let listed = fixture.network.list_networks(&[]).await?;
    if !listed.iter().any(|n| n.get("id") == network.get("id")) {
        return Err(stackprobe::HarnessError::Precheck(format!(
            "created network {} missing from listing",
            network_id
        )));
    }

    if full {
        let server = fixture.create_server(None, None, None).await?;
        println!("  server {} ACTIVE", attr(&server, "id"));

        let volume = fixture
            .create_volume(1, serde_json::Map::new())
            .await?;
        println!("  volume {} available", attr(&volume, "id"));
    }

    Ok(())
}

fn attr(attrs: &serde_json::Map<String, Value>, key: &str) -> String {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}
