mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cli::Cli;
use skedsync::config::{Config, FileConfig};
use skedsync::cycle::Cycle;
use skedsync::daemon::{self, CycleService};
use skedsync::invoker::{DrudgInvoker, ProcessingInvoker};
use skedsync::logging;
use skedsync::sync::http::HttpRetrievalClient;
use skedsync::sync::retrieval::RetrievalClient;

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let config = Config::build(file, cli.overrides())?;
    config.validate_paths()?;
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let client: Arc<dyn RetrievalClient> =
        Arc::new(
            HttpRetrievalClient::with_auth(
                config.netrc_file.as_deref(),
                config.cookies_file.as_deref(),
            )
            .context("failed to build HTTP client")?,
        );
    let invoker: Arc<dyn ProcessingInvoker> = Arc::new(DrudgInvoker::from_config(&config));
    let command = cli.command();

    if cli.once || cli.check {
        Cycle::new(&config, client.as_ref(), invoker.as_ref())
            .run(command)
            .await?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    daemon::watch_signals(shutdown.clone());
    let service = CycleService {
        config,
        client,
        invoker,
        command,
    };
    daemon::run_continuous(service, cli.quiet, shutdown).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("skedsync: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = match logging::init_logging(&config.log_dir, cli.quiet, cli.verbose) {
        Ok(guard) => {
            if !cli.quiet {
                println!("Writing to log files in {}.", guard.log_dir.display());
            }
            guard
        }
        Err(e) => {
            eprintln!(
                "skedsync: cannot open log file in {}: {e}",
                config.log_dir.display()
            );
            return ExitCode::FAILURE;
        }
    };
    info!("Starting skedsync {}", env!("CARGO_PKG_VERSION"));

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
