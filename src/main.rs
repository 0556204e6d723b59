use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use acme_txt_sync::{
    config::Config,
    logging,
    metrics::{self, MetricsSink, NoopMetrics, PrometheusMetrics},
    reconcile::Driver,
    scheduler::{self, Shutdown, ShutdownSignals},
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

#[derive(Parser)]
#[command(
    name = "acme-txt-sync",
    version,
    about = "Publishes edge certificate validation TXT records at the authoritative DNS provider"
)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    /// Log every change instead of applying it
    #[arg(long)]
    dry_run: bool,

    /// Run a single reconciliation pass immediately and exit
    #[arg(long)]
    once: bool,

    /// Validate the configuration file and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("acme-txt-sync: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("acme-txt-sync: cannot initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    if args.check_config {
        info!("configuration file {} is valid", args.config.display());
        return ExitCode::SUCCESS;
    }

    match run(args, config).await {
        Ok(shutdown) => {
            if let Shutdown::Fatal(fatal) = &shutdown {
                error!("{fatal}");
            }
            // Blocking reconciliation work is abandoned rather than drained.
            std::process::exit(shutdown.exit_code());
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config) -> Result<Shutdown> {
    info!(
        "acme-txt-sync version {}, found {} domain(s)",
        env!("CARGO_PKG_VERSION"),
        config.checks.domains.len()
    );
    debug!("watched domains: {:?}", config.checks.domains);
    info!("checks frequency is set to '{:?}'", config.checks.frequency);

    let sink: Arc<dyn MetricsSink> = if config.metrics.enabled {
        let prometheus = Arc::new(PrometheusMetrics::new()?);
        let addr = config.metrics.listen_addr();
        let served = Arc::clone(&prometheus);
        tokio::spawn(async move {
            if let Err(err) = metrics::serve(&addr, served).await {
                error!("[metrics] {err:#}");
            }
        });
        prometheus
    } else {
        Arc::new(NoopMetrics)
    };
    sink.set_watched_count(config.checks.domains.len());

    let mut signals = ShutdownSignals::new()?;
    let period = config.checks.frequency.period();
    let dry_run = args.dry_run;
    // The blocking HTTP clients must be built off the async workers.
    let driver = tokio::task::spawn_blocking(move || Driver::from_config(&config, sink, dry_run))
        .await
        .context("driver construction panicked")??;
    let driver = Arc::new(driver);

    if args.once {
        return Ok(scheduler::run_tick(&driver, &mut signals)
            .await
            .unwrap_or(Shutdown::Completed));
    }
    Ok(scheduler::run(driver, period, signals).await)
}
