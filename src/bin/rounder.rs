use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rounder::app::App;
use rounder::server;
use rounder::utils::config_loader;
use rounder::utils::logging;
use rounder::utils::logging::LogLevel;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "rounder.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// run a single poll cycle and exit
    #[arg(long)]
    once: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Exchange an authorization code for the first token pair of an account
    Exchange {
        #[arg(long)]
        account: String,
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, start logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Connect cache backend and account store
    // -------------------------------

    let app = App::build(&service_config).await?;
    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    // -------------------------------
    // 3. One-shot authorization code exchange
    // -------------------------------

    if let Some(Command::Exchange { account, code }) = args.command {
        let grant = app.refresher.exchange_code(&account, &code, &cancel).await?;
        info!(account = %account, expires_in = grant.expires_in, "account linked");
        return Ok(());
    }

    // -------------------------------
    // 4. Poll
    // -------------------------------

    if args.once {
        let report = app.poller.run_cycle(&cancel).await?;
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            published = report.published,
            "poll cycle finished"
        );
        return Ok(());
    }

    let interval = Duration::from_secs(service_config.settings.poll_interval_seconds);
    let metrics_server = server::server::start(&service_config.settings, cancel.clone());
    let poller = async {
        let outcome = app.poller.run(interval, &cancel).await;
        // stop the metrics server with the poller
        cancel.cancel();
        outcome.map_err(anyhow::Error::from)
    };

    info!("Service starting...");
    tokio::try_join!(poller, metrics_server)?;
    Ok(())
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!("unable to listen for shutdown signal: {e}"),
        }
        cancel.cancel();
    });
}
