//! Sorting machine simulator - command line entry point
//!
//! Loads a machine configuration, runs it for the configured duration and
//! prints the final report.

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use sortsim_rs::{
    config::MachineConfig,
    pipeline::{bridge, MachineObserver},
    MachineBuilder, MachineEvent,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,sortsim_rs=debug";

fn main() -> anyhow::Result<()> {
    let matches = Command::new("sortsim")
        .about("Run a sorting machine simulation and report where every item ended up")
        .arg(
            Arg::new("config")
                .help("Machine configuration (.toml, .json or scenario text)")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .help("Override the run duration in seconds")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the final report as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Tracing filter, e.g. `warn` or `info,sortsim_rs=trace`"),
        )
        .get_matches();

    // Initialize logging
    let filter = match matches.get_one::<String>("log-level") {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .init();

    let path = matches
        .get_one::<PathBuf>("config")
        .context("missing configuration path")?;
    let config = MachineConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let duration = matches
        .get_one::<u64>("duration")
        .map(|secs| Duration::from_secs(*secs))
        .unwrap_or_else(|| config.duration());

    tracing::info!("Configuration: {}", path.display());
    tracing::info!("{}", sortsim_rs::config::summary(&config));

    let (events, observer) = bridge::channel();
    let watcher = std::thread::Builder::new()
        .name("observer".into())
        .spawn(move || watch(observer))
        .context("failed to spawn observer thread")?;

    let mut machine = MachineBuilder::new(config).with_events(events).build()?;
    let result = machine.start(duration);

    // Dropping the machine closes the channel and ends the observer
    drop(machine);
    if watcher.join().is_err() {
        tracing::warn!("Observer thread panicked; some run events were not shown");
    }

    let report = result?;
    if matches.get_flag("json") {
        println!("{}", report.to_json()?);
    } else {
        println!("Configuration: {}", path.display());
        println!("{report}");
    }

    if !report.reconciliation.is_balanced() {
        anyhow::bail!("{} items went missing", report.reconciliation.missing);
    }
    Ok(())
}

fn watch(observer: MachineObserver) {
    while let Some(event) = observer.recv() {
        match event {
            MachineEvent::Started {
                producers,
                routers,
                drainers,
            } => tracing::info!(
                "*** Machine Started *** ({producers} producers, {routers} routers, {drainers} drainers)"
            ),
            MachineEvent::Progress(snapshot) => tracing::debug!(
                "@{}s: {} in producers, {} collected",
                snapshot.elapsed.as_secs(),
                snapshot.in_producers,
                snapshot.collected
            ),
            MachineEvent::SinkDrained {
                drainer,
                sink,
                items,
            } => tracing::debug!("{drainer} emptied {sink} ({items} items)"),
            MachineEvent::InputStopped { elapsed } => {
                tracing::info!("*** Input Stopped after {}s ***", elapsed.as_secs())
            }
            MachineEvent::Drained { complete, .. } if !complete => {
                tracing::warn!("Shutdown proceeding with items still in transit")
            }
            MachineEvent::Drained { .. } => {}
            MachineEvent::Fault(message) => tracing::error!("Fault: {message}"),
            MachineEvent::Shutdown { elapsed } => {
                tracing::info!("*** Machine completed shutdown after {}s ***", elapsed.as_secs())
            }
        }
    }
}
