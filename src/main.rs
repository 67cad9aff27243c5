//! Geofence - single-zone containment tracking
//!
//! Tracks a position stream against one saved zone (circle or polygon) and
//! emits a transition whenever the subject moves inside, outside, or the
//! zone itself changes.
//!
//! Module structure:
//! - `domain/` - Geometry, zones, containment types, errors
//! - `io/` - External interfaces (store, position sources, geocoder, egress)
//! - `services/` - Business logic (Tracker, ZoneSession, ZoneWatcher)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::{Parser, Subcommand};
use geofence::domain::zone::parse_radius;
use geofence::domain::{
    distance_meters, ContainmentState, Point, PolygonDraft, PositionEvent, RadiusUnit, Zone,
};
use geofence::infra::{Config, Metrics, SourceKind};
use geofence::io::position_source::run_line_source;
use geofence::io::{create_egress_channel, geocoder, EgressSender, MqttPublisher, ZoneStore};
use geofence::services::{Tracker, ZoneSession, ZoneWatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence - track a position stream against a saved zone
#[derive(Parser, Debug)]
#[command(name = "geofence", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track positions against the saved zone (default)
    Watch,
    /// Inspect or replace the saved zone
    #[command(subcommand)]
    Zone(ZoneCommand),
    /// Evaluate a single point against the saved zone
    Check {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
}

#[derive(Subcommand, Debug)]
enum ZoneCommand {
    /// Print the saved zone and its bounding region
    Show,
    /// Save a circle around a coordinate
    Circle {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        radius: String,
        /// m or km
        #[arg(long, default_value = "m")]
        unit: RadiusUnit,
    },
    /// Save a circle around a geocoded address
    Address {
        address: String,
        #[arg(long)]
        radius: f64,
        /// m or km
        #[arg(long, default_value = "m")]
        unit: RadiusUnit,
    },
    /// Save a polygon from `--vertex lat,lng` in drawing order (at least 3)
    Polygon {
        #[arg(long = "vertex", value_parser = parse_vertex, allow_hyphen_values = true)]
        vertices: Vec<(f64, f64)>,
    },
    /// Remove the saved zone
    Clear,
}

fn parse_vertex(s: &str) -> Result<(f64, f64), String> {
    let (lat, lng) = s.split_once(',').ok_or_else(|| format!("expected lat,lng, got {s:?}"))?;
    let lat = lat.trim().parse::<f64>().map_err(|e| format!("latitude {lat:?}: {e}"))?;
    let lng = lng.trim().parse::<f64>().map_err(|e| format!("longitude {lng:?}: {e}"))?;
    Ok((lat, lng))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-sample visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so subcommand output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };
    let store = ZoneStore::new(config.store_path());

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => run_watch(config, store).await,
        Command::Zone(cmd) => zone(&config, store, cmd).await,
        Command::Check { lat, lng } => check(&store, lat, lng),
    }
}

async fn zone(config: &Config, store: ZoneStore, cmd: ZoneCommand) -> anyhow::Result<()> {
    let mut session = ZoneSession::open(store);

    let created = match cmd {
        ZoneCommand::Show => {
            match session.active() {
                Some(zone) => {
                    println!("{}", serde_json::to_string_pretty(zone)?);
                    println!("bounds: {}", serde_json::to_string(&zone.bounding_region())?);
                }
                None => println!("no zone saved"),
            }
            return Ok(());
        }
        ZoneCommand::Clear => {
            session.delete()?;
            println!("zone cleared");
            return Ok(());
        }
        ZoneCommand::Circle { lat, lng, radius, unit } => {
            Zone::circle_at(lat, lng, parse_radius(&radius, unit)?)?
        }
        ZoneCommand::Address { address, radius, unit } => {
            let geocoder = geocoder::from_config(config)?;
            session
                .create_circle_from_address(geocoder.as_ref(), &address, radius, unit)
                .await?
                .clone()
        }
        ZoneCommand::Polygon { vertices } => {
            let mut draft = PolygonDraft::new();
            for (lat, lng) in vertices {
                draft.push(Point::new(lat, lng)?);
            }
            draft.finish()?
        }
    };

    session.create(created);
    let saved = session.save()?;
    println!("saved {} zone to {}", saved.kind(), config.store_path());
    Ok(())
}

fn check(store: &ZoneStore, lat: f64, lng: f64) -> anyhow::Result<()> {
    let point = Point::new(lat, lng)?;

    let Some(zone) = store.load() else {
        println!("{}", ContainmentState::Unknown);
        return Ok(());
    };

    let state =
        if zone.contains(point) { ContainmentState::Inside } else { ContainmentState::Outside };
    match zone {
        Zone::Circle(ref circle) => println!(
            "{} ({:.1} m from center, radius {:.1} m)",
            state,
            distance_meters(point, circle.center()),
            circle.radius_meters()
        ),
        Zone::Polygon(_) => println!("{}", state),
    }
    Ok(())
}

async fn run_watch(config: Config, store: ZoneStore) -> anyhow::Result<()> {
    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "geofence starting");
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        store = %config.store_path(),
        source = ?config.source_kind(),
        egress_file = %config.egress_file(),
        mqtt_egress = %config.mqtt_egress_enabled(),
        zone_poll_ms = %config.zone_poll_ms(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Create MQTT egress channel and publisher (if enabled)
    let mut publisher_handle = None;
    let egress_sender = if config.mqtt_egress_enabled() {
        let (egress_sender, egress_rx) = create_egress_channel(1000, config.site_id().to_string());
        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        publisher_handle = Some(tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        }));
        Some(egress_sender)
    } else {
        None
    };

    spawn_metrics_reporter(&config, metrics.clone(), egress_sender.clone(), shutdown_rx.clone());

    // Follow the persisted zone
    let (watcher, zone_rx) =
        ZoneWatcher::new(store, Duration::from_millis(config.zone_poll_ms()));
    tokio::spawn(watcher.run(shutdown_rx.clone()));

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(config.event_buffer());
    spawn_position_source(&config, event_tx, metrics.clone(), shutdown_rx.clone()).await?;

    // Handle shutdown on Ctrl+C
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown_signal_received");
            let _ = signal_tx.send(true);
        }
    });

    let mut tracker = Tracker::new(&config, metrics.clone(), egress_sender);
    info!("tracker_started");
    tracker.run(event_rx, zone_rx, shutdown_rx).await;

    // Stop the remaining tasks and let the publisher drain
    let _ = shutdown_tx.send(true);
    if let Some(handle) = publisher_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    metrics.report().log();
    info!(state = %tracker.state(), "geofence shutdown complete");
    Ok(())
}

async fn spawn_position_source(
    config: &Config,
    event_tx: mpsc::Sender<PositionEvent>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    match config.source_kind() {
        SourceKind::Stdin => {
            tokio::spawn(async move {
                let reader = BufReader::new(tokio::io::stdin());
                if let Err(e) = run_line_source(reader, event_tx, shutdown).await {
                    error!(error = %e, "stdin_source_error");
                }
            });
        }
        SourceKind::File => {
            let path = config.source_file().unwrap_or_default().to_string();
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open position file {path}"))?;
            info!(path = %path, "file_source_opened");
            tokio::spawn(async move {
                if let Err(e) = run_line_source(BufReader::new(file), event_tx, shutdown).await {
                    error!(path = %path, error = %e, "file_source_error");
                }
            });
        }
        SourceKind::Mqtt => {
            let mqtt_config = config.clone();
            tokio::spawn(async move {
                if let Err(e) = geofence::io::mqtt::start_mqtt_source(
                    &mqtt_config,
                    event_tx,
                    metrics,
                    shutdown,
                )
                .await
                {
                    error!(error = %e, "mqtt_source_error");
                }
            });
        }
    }
    Ok(())
}

/// Log metrics every interval and publish them when MQTT egress is on
fn spawn_metrics_reporter(
    config: &Config,
    metrics: Arc<Metrics>,
    egress_sender: Option<EgressSender>,
    mut shutdown: watch::Receiver<bool>,
) {
    let log_every = Duration::from_secs(config.metrics_interval_secs());
    let publish_every = Duration::from_secs(config.mqtt_egress_metrics_interval_secs());
    // One reporter so interval counters are not split between consumers
    let period = match egress_sender {
        Some(_) => log_every.min(publish_every),
        None => log_every,
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    let summary = metrics.report();
                    summary.log();
                    if let Some(ref sender) = egress_sender {
                        sender.send_metrics(summary);
                    }
                }
            }
        }
    });
}
