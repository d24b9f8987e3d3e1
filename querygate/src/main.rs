use anyhow::Context;
use clap::{Parser, Subcommand};
use querygate_core::conf::load_config;
use querygate_core::logging::init_logging;
use querygate_core::state::GatewayState;

#[derive(Parser, Debug)]
#[command(
    name = "querygate",
    version,
    about = "Querygate: load-aware routing core for analytical-query gateways"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the routing core (default)
    Run {
        /// Path to the Querygate config file
        #[arg(long, default_value = "config/querygate.toml")]
        config: String,
    },

    /// Validate a config file and print the resulting route table
    Check {
        #[arg(long, default_value = "config/querygate.toml")]
        config: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Check { config }) => check(&config),
        Some(Command::Run { config }) => run(&config),
        None => run("config/querygate.toml"),
    }
}

fn run(path: &str) -> anyhow::Result<()> {
    init_logging();

    let config = load_config(path).with_context(|| format!("loading config from {path}"))?;
    let state = GatewayState::new(&config);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let sweeper = state.start_background();

        tracing::info!(groups = ?state.registry().snapshot(), "querygate routing core started");
        tokio::signal::ctrl_c()
            .await
            .context("waiting for shutdown signal")?;

        sweeper.abort();
        anyhow::Ok(())
    })?;

    tracing::info!("querygate stopped");
    Ok(())
}

fn check(path: &str) -> anyhow::Result<()> {
    let config = load_config(path).with_context(|| format!("loading config from {path}"))?;
    let state = GatewayState::new(&config);

    for (service_id, servers) in state.registry().snapshot() {
        println!("{service_id}: {servers}");
    }
    Ok(())
}
