//! RoboFleet entry point
//!
//! Runs the headless warehouse engine: tick loop, command inbox, and
//! notification stream. Transport layers (HTTP/WebSocket) attach to the
//! channels; none are started here.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::{broadcast, mpsc};

use robofleet::core::config::SimulationConfig;
use robofleet::core::error::Result;
use robofleet::llm::policy::AssistPolicy;
use robofleet::sim::command::SimCommand;
use robofleet::sim::runtime;
use robofleet::sim::{Notification, WarehouseSimulation};

/// Warehouse robot fleet simulation engine
#[derive(Parser, Debug)]
#[command(name = "robofleet")]
#[command(about = "Run the warehouse fleet simulation engine")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Seed for the event generator (deterministic runs)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robofleet=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };

    let mut sim = match args.seed {
        Some(seed) => WarehouseSimulation::with_seed(config.clone(), seed),
        None => WarehouseSimulation::new(config.clone()),
    };
    sim.set_speed(args.speed);
    sim.warm_start();

    let policy = AssistPolicy::from_env(&config);
    tracing::info!(
        assist = policy.has_client(),
        speed = args.speed,
        "engine configured"
    );

    let (command_tx, command_rx) = mpsc::channel::<SimCommand>(64);
    let (notify_tx, notify_rx) = broadcast::channel::<Notification>(256);

    // Console observer; a real transport would subscribe the same way
    tokio::spawn(observe(notify_rx));

    // Ctrl-C turns into a regular shutdown command
    let shutdown_tx = command_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(SimCommand::Shutdown).await;
        }
    });

    runtime::run(sim, policy, command_rx, command_tx, notify_tx).await
}

async fn observe(mut notify: broadcast::Receiver<Notification>) {
    loop {
        match notify.recv().await {
            Ok(Notification::EventNew(event)) => {
                tracing::info!(event = %event.event_type, location = %event.location, "{}", event.description);
            }
            Ok(Notification::TaskAssigned {
                robot_id,
                task_type,
                location,
                ..
            }) => {
                tracing::info!(robot = %robot_id, task = %task_type, location = %location, "task assigned");
            }
            Ok(Notification::TaskCompleted {
                robot_id,
                duration_ms,
                ..
            }) => {
                tracing::info!(robot = %robot_id, duration_ms, "task completed");
            }
            Ok(Notification::SafetyAlert { message, .. }) => {
                tracing::warn!("{message}");
            }
            Ok(Notification::AssistResponse(response)) => {
                tracing::info!(
                    fallback = response.fallback,
                    assignments = response.assignments.len(),
                    "{}",
                    response.reasoning
                );
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "observer lagged behind notifications");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
