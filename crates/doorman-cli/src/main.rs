//! doorman - headless host for one NFC access-control station.
//!
//! Wires the layers together and runs until interrupted: serial link to
//! the reader board, access and enrollment engine, mirrored CSV log,
//! nightly SQLite batch and the durable-file sweeper. Also carries two
//! small one-shot modes for commissioning a box: `--list-ports` and
//! `--probe`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use doorman_engine::{AccessEngine, NoticeBus, StationConfig, StationSession};
use doorman_mirror::{BatchJob, MirrorConfig, MirrorDb};
use doorman_serial::{list_ports, probe, probe_expecting};
use doorman_store::{AccessLogWriter, ResilienceSweeper, UserRegistry};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// NFC access-control station host.
#[derive(Parser, Debug)]
#[command(name = "doorman")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the station configuration file
    #[arg(short, long, default_value = "doorman.json")]
    config: PathBuf,

    /// Serial port of the reader, overriding the configured one
    #[arg(short, long)]
    port: Option<String>,

    /// Label for the session log file, overriding the configured one
    #[arg(short, long)]
    label: Option<String>,

    /// Enumerate visible serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Ping this port for station firmware and exit
    #[arg(long, value_name = "PORT")]
    probe: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_ports {
        return print_ports();
    }

    let config = StationConfig::load(&args.config)
        .with_context(|| format!("loading station config from {}", args.config.display()))?;

    if let Some(port) = args.probe.as_deref() {
        return probe_port(&config, port);
    }

    run_station(config, args).await
}

/// One line per visible port, for picking the reader by hand.
fn print_ports() -> Result<()> {
    let ports = list_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
        return Ok(());
    }
    for port in ports {
        match port.description {
            Some(description) => println!("{}  {description}", port.name),
            None => println!("{}", port.name),
        }
    }
    Ok(())
}

/// Ping one port and report the firmware tag it answered with.
fn probe_port(config: &StationConfig, port: &str) -> Result<()> {
    let tag = match config.expected_firmware.as_deref() {
        Some(expected) => probe_expecting(port, config.baud_rate, config.probe_timeout(), expected),
        None => probe(port, config.baud_rate, config.probe_timeout()),
    }
    .with_context(|| format!("probing {port}"))?;
    println!("{port}: {tag}");
    Ok(())
}

/// Build every layer, start the session and block until Ctrl-C.
async fn run_station(config: StationConfig, args: Args) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        station = config.station_id,
        "Doorman station starting"
    );

    let writer = Arc::new(
        AccessLogWriter::open(config.log_config(), &config.session_label)
            .context("opening access log")?,
    );
    let registry =
        Arc::new(UserRegistry::open(config.registry_config()).context("opening user registry")?);
    let bus = NoticeBus::new();

    let engine = AccessEngine::new(
        &config,
        Arc::clone(&writer),
        Arc::clone(&registry),
        bus.clone(),
    )
    .context("building access engine")?;
    let session = StationSession::new(&config, Arc::clone(&engine), Arc::clone(&writer), bus.clone())
        .context("building station session")?;

    let sweep = ResilienceSweeper::new(
        Arc::clone(&writer),
        Arc::clone(&registry),
        config.sweep_interval(),
    )
    .spawn();

    let mirror_config = MirrorConfig::new(config.db_path.display().to_string())
        .schedule(config.batch_hour, config.batch_minute);
    let db = MirrorDb::open(mirror_config.clone())
        .await
        .context("opening mirror database")?;
    let job = BatchJob::new(
        &mirror_config,
        db.clone(),
        Arc::clone(&writer),
        Arc::clone(&registry),
        bus.clone(),
    )
    .context("building batch job")?;
    job.start_schedule();

    let notices = spawn_notice_logger(&bus);

    session
        .start(args.port, args.label)
        .context("starting capture session")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    // Stop the background tasks before the writer so a late sweep or batch
    // does not reopen files the session just closed.
    job.stop();
    sweep.abort();
    notices.abort();
    if let Err(e) = session.stop() {
        warn!(error = %e, "Session did not stop cleanly");
    }
    db.close().await;

    info!("Doorman station stopped");
    Ok(())
}

/// Forward every notice to the log so a headless box still shows the
/// full station activity at debug level.
fn spawn_notice_logger(bus: &NoticeBus) -> tokio::task::JoinHandle<()> {
    let mut notices = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => debug!(?notice, "Notice"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "Notice logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
