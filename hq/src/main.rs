//! FleetHQ - instrument-control fleet supervisor
//!
//! CLI entry point for watching and restarting the fleet.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{CommandFactory, Parser};
use colored::*;
use eyre::{Context, Result};
use tracing::{info, warn};

use fleethq::aggregator::UpdateAggregator;
use fleethq::cli::{Cli, Command, get_log_path};
use fleethq::config::Config;
use fleethq::domain::{
    ManagedServerRecord, STATE_ATTRIBUTE, STATUS_ATTRIBUTE, ServerRegistry, UNKNOWN_VALUE, value_to_text,
};
use fleethq::events::{
    ANY_TOPIC, BoundedRollingLog, CHANNEL_STATE, CHANNEL_STATUS, Event, LogEntry, LogRecorder, TOPIC_ERROR,
    create_event_bus,
};
use fleethq::orchestrator::{MSG_SUCCESS, Orchestrator};
use fleethq::transport::{DeviceFilter, RestTransport, Transport};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir).context("Failed to create log directory")?;
    }

    // stdout belongs to event output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        "FleetHQ loaded config: servers={}, gateway={}",
        config.fleet.servers.len(),
        config.transport.base_url
    );

    match cli.command {
        Some(Command::Watch { duration_secs }) => watch(&config, duration_secs.map(Duration::from_secs)).await,
        Some(Command::Restart { collections }) => restart(&config, &collections).await,
        Some(Command::Servers) => servers(&config).await,
        Some(Command::Config) => {
            print!("{}", serde_yaml::to_string(&config).context("Failed to serialize config")?);
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn rest_transport(config: &Config) -> Result<RestTransport> {
    RestTransport::new(config.transport.base_url.clone(), config.transport.timeout())
        .context("Failed to create transport")
}

/// Poll the fleet, aggregate and print each event until Ctrl-C or the deadline
async fn watch(config: &Config, duration: Option<Duration>) -> Result<()> {
    let registry = Arc::new(config.registry());
    if registry.is_empty() {
        println!("{} No servers configured under fleet.servers", "!".yellow());
        return Ok(());
    }

    let bus = create_event_bus(config.bus.channel_capacity);
    let log = Arc::new(BoundedRollingLog::new(config.log.capacity));
    let recorder = LogRecorder::attach(bus.clone(), log.clone(), registry.clone(), ANY_TOPIC);
    let printer = {
        let registry = registry.clone();
        bus.subscribe(ANY_TOPIC, move |event: &Event| {
            print_event(event, &registry);
            Ok(())
        })
    };

    let fleet = registry.records().iter().map(|r| r.identifier.clone()).collect();
    let transport = rest_transport(config)?.with_fleet(fleet, config.poller.interval());
    let feed = transport
        .stream_attribute_updates(DeviceFilter::All)
        .await
        .context("Failed to open update feed")?;
    let aggregator = UpdateAggregator::new(bus.clone(), registry.clone(), config.aggregator.window()).spawn(feed);

    println!(
        "{} Watching {} server(s), window {}ms (Ctrl-C to stop)",
        "→".cyan(),
        registry.len(),
        config.aggregator.window_ms
    );

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        }
        _ = deadline => {}
    }

    aggregator.abort();
    bus.unsubscribe(printer);
    recorder.detach();

    println!(
        "{} {} entries in rolling log (capacity {})",
        "✓".green(),
        log.len(),
        log.capacity()
    );
    Ok(())
}

fn print_event(event: &Event, registry: &ServerRegistry) {
    let entry = LogEntry::from_event(event, registry);
    let text = entry.text();
    let shown = if text.is_empty() { "-".dimmed() } else { text.normal() };
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string();

    let (label, body) = match event.channel.as_str() {
        CHANNEL_STATUS => (STATUS_ATTRIBUTE.cyan(), shown),
        CHANNEL_STATE => (STATE_ATTRIBUTE.green(), shown),
        _ if event.topic.as_str() == TOPIC_ERROR => (event.topic.as_str().red(), text.red()),
        _ => (event.topic.as_str().normal(), shown),
    };
    let body = if text.starts_with("ERROR:") { text.red() } else { body };

    println!("{} {:<24} {:<8} {}", time.dimmed(), entry.name.bold(), label, body);
}

/// Run the update-and-restart sequence once
///
/// Outcome lines published by the orchestrator are printed as they arrive;
/// a failure is reported once, through the returned error.
async fn restart(config: &Config, collections: &[String]) -> Result<()> {
    let registry = Arc::new(config.registry());
    let bus = create_event_bus(config.bus.channel_capacity);
    let printer = bus.subscribe(ANY_TOPIC, move |event: &Event| {
        print_event(event, &registry);
        Ok(())
    });

    let transport: Arc<dyn Transport> = Arc::new(rest_transport(config)?);
    let orchestrator = Orchestrator::new(transport, bus.clone(), config.orchestrator_config());

    println!(
        "{} Restarting fleet with {} collection(s)",
        "→".cyan(),
        collections.len()
    );
    let result = orchestrator.run(collections).await;
    bus.unsubscribe(printer);

    result.context("Restart failed")?;
    info!("{}", MSG_SUCCESS);
    Ok(())
}

/// One-shot State/Status read of every configured server
async fn servers(config: &Config) -> Result<()> {
    let registry = config.registry();
    if registry.is_empty() {
        println!("{} No servers configured under fleet.servers", "!".yellow());
        return Ok(());
    }

    let transport = rest_transport(config)?;
    for record in registry.records() {
        let state = read_text(&transport, record, STATE_ATTRIBUTE).await;
        let status = read_text(&transport, record, STATUS_ATTRIBUTE).await;
        let state = if state == UNKNOWN_VALUE { state.red() } else { state.green() };
        let marker = if config.fleet.main.as_ref() == Some(&record.identifier) {
            "*".yellow()
        } else {
            " ".normal()
        };
        println!(
            "{}{:<24} {:<32} {:<10} {}",
            marker,
            record.display_name.bold(),
            record.identifier.to_string().dimmed(),
            state,
            status
        );
    }
    Ok(())
}

async fn read_text(transport: &RestTransport, record: &ManagedServerRecord, attribute: &str) -> String {
    match transport.read_attribute(&record.identifier, attribute).await {
        Ok(value) if value.error.is_none() && !value.value.is_null() => value_to_text(&value.value),
        Ok(value) => {
            warn!(server = %record.identifier, attribute, error = ?value.error, "Attribute read returned no value");
            UNKNOWN_VALUE.to_string()
        }
        Err(e) => {
            warn!(server = %record.identifier, attribute, error = %e, "Attribute read failed");
            UNKNOWN_VALUE.to_string()
        }
    }
}
