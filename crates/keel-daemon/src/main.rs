//! Keel Daemon - autonomous operations controller
//!
//! Runs the control plane against a simulated metrics source and a logging
//! executor:
//! - Signal collection and self-healing
//! - Guardian escalation with SLA expiry
//! - Post-deployment rollback monitoring
//! - Audit trail (in memory or JSON lines)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use keel_audit::JsonlAuditSink;
use keel_control::{ControlEventEnvelope, ControlPlane, ControlPlaneBuilder};
use keel_types::{ComponentId, EventSeverity};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod simulation;

use config::DaemonConfig;
use simulation::{LoggingExecutor, SimulatedMetricsSource};

/// Keel Daemon CLI
#[derive(Parser)]
#[command(name = "keeld")]
#[command(about = "Keel Daemon - autonomous operations controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KEEL_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "KEEL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "KEEL_LOG_JSON")]
    json: bool,

    /// Component to monitor (repeatable, replaces the configured list)
    #[arg(long = "component")]
    components: Vec<String>,

    /// Append audit records to this JSON-lines file
    #[arg(long, env = "KEEL_AUDIT_PATH")]
    audit_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if !cli.components.is_empty() {
        config.components = cli.components;
    }
    if cli.audit_path.is_some() {
        config.audit_path = cli.audit_path;
    }
    if config.components.is_empty() {
        anyhow::bail!("No components to monitor");
    }

    let plane = Arc::new(build_control_plane(&config)?);
    for component in &config.components {
        plane
            .register_component(ComponentId::new(component))
            .with_context(|| format!("Failed to register component {component}"))?;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        components = ?config.components,
        audit = config
            .audit_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory".to_string()),
        "keeld starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = plane.start(shutdown_rx.clone());
    handles.push(spawn_event_logger(
        plane.subscribe_events(),
        shutdown_rx.clone(),
    ));
    handles.push(spawn_status_reporter(
        plane.clone(),
        config.status_interval(),
        shutdown_rx,
    ));

    shutdown_signal().await;

    info!("keeld shutting down");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    let status = plane.status();
    info!(
        decisions = status.decisions.overall.total,
        open_tickets = status.open_tickets,
        audit_failures = status.audit_failures,
        "keeld stopped"
    );
    Ok(())
}

fn build_control_plane(config: &DaemonConfig) -> anyhow::Result<ControlPlane> {
    let source = Arc::new(SimulatedMetricsSource::new(config.simulation.clone()));
    let executor = Arc::new(LoggingExecutor::new(source.clone()));

    let mut builder = ControlPlaneBuilder::new()
        .with_config(config.control.clone())
        .with_executor(executor)
        .with_metrics_source(source);

    if let Some(path) = &config.audit_path {
        let sink = JsonlAuditSink::open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        builder = builder.with_audit_sink(Arc::new(sink));
    }

    builder.build().context("Failed to build control plane")
}

fn spawn_event_logger(
    mut events: broadcast::Receiver<ControlEventEnvelope>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(envelope) => log_event(&envelope),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn log_event(envelope: &ControlEventEnvelope) {
    let event = &envelope.event;
    let component = &envelope.component;
    match envelope.severity {
        EventSeverity::Critical | EventSeverity::Error => {
            error!(component = %component, event = ?event, "Control event")
        }
        EventSeverity::Warning => warn!(component = %component, event = ?event, "Control event"),
        EventSeverity::Info => info!(component = %component, event = ?event, "Control event"),
        EventSeverity::Debug => debug!(component = %component, event = ?event, "Control event"),
    }
}

fn spawn_status_reporter(
    plane: Arc<ControlPlane>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = plane.status();
                    info!(
                        decisions = status.decisions.overall.total,
                        auto_approval_rate = status.decisions.overall.auto_approval_rate,
                        open_tickets = status.open_tickets,
                        executed_actions = status.executed_actions,
                        deferred_healing = status.deferred_healing,
                        collector = ?status.collector.state,
                        audit_failures = status.audit_failures,
                        "Status"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
