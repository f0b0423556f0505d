//! Main entry point for the match-allocator service
//!
//! Initializes and runs the allocation service with configuration loading,
//! structured logging, and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use match_allocator::config::{parse_server_pool, validate_config, AppConfig};
use match_allocator::service::{AppState, HealthCheck, HealthStatus, ServiceProbe};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Match Allocator - dedicated game-server allocation service
#[derive(Parser)]
#[command(
    name = "match-allocator",
    version,
    about = "Allocates dedicated game servers to matched parties",
    long_about = "Match Allocator assigns servers from a fixed pool to matches, tracks who \
                 joined each match, expires matches that run too long, and tells clients \
                 where to connect."
)]
struct Args {
    /// TOML configuration file; environment variables are used when absent
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Build the allocator, report its health and exit non-zero if unhealthy
    #[arg(long)]
    health_check: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Port for the HTTP, RPC and metrics endpoints
    #[arg(long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Server pool override
    #[arg(
        long,
        value_name = "POOL",
        help = "Override server pool as id:port,id:port"
    )]
    server_pool: Option<String>,

    /// Maximum match duration override
    #[arg(long, value_name = "SECONDS", help = "Override maximum match duration")]
    max_match_duration: Option<u64>,

    /// Enable AMQP with the given URL
    #[arg(long, value_name = "URL", help = "Enable AMQP and connect to this URL")]
    amqp_url: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    debug: bool,

    /// Load and validate configuration, print it, then exit
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    /// Command-line values win over file and environment
    fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(level) = self.log_level.as_ref() {
            config.service.log_level = level.clone();
        }
        if self.debug {
            config.service.log_level = "debug".to_string();
        }
        if let Some(port) = self.http_port {
            config.service.http_port = port;
        }
        if let Some(pool) = self.server_pool.as_deref() {
            config.pool.slots = parse_server_pool(pool)?;
        }
        if let Some(seconds) = self.max_match_duration {
            config.lifecycle.max_match_duration_seconds = seconds;
        }
        if let Some(url) = self.amqp_url.as_ref() {
            config.amqp.enabled = true;
            config.amqp.url = url.clone();
        }
        Ok(())
    }
}

/// `RUST_LOG` takes precedence over the configured level
fn setup_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Could not install tracing subscriber: {}", e))
}

/// Build the service without serving and report its health
async fn run_health_check(config: AppConfig) -> Result<()> {
    info!("Running one-shot health check");

    let app_state = AppState::new(config).await?;
    let probe = app_state.probe();
    probe.set_running(true);

    match HealthCheck::check(probe) {
        Ok(health) => {
            info!("{} {}", health.service, health.status);
            println!("{}", health.to_json()?);

            if health.status == HealthStatus::Unhealthy {
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        Err(e) => {
            error!("Could not evaluate health: {}", e);
            std::process::exit(1);
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal_name = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!("{} received", signal_name);
}

/// Periodic occupancy summary in the log
async fn log_health_periodically(probe: ServiceProbe, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    while probe.is_running() {
        ticker.tick().await;

        match HealthCheck::check(&probe) {
            Ok(health) => {
                info!(
                    "Health check: {} - {}/{} servers busy, {} active matches",
                    health.status,
                    health.stats.busy_slots,
                    health.stats.pool_size,
                    health.stats.active_matches
                );
            }
            Err(e) => warn!("Periodic health check errored: {}", e),
        }
    }
}

fn log_effective_config(config: &AppConfig) {
    let pool = config
        .pool
        .slots
        .iter()
        .map(|s| format!("{}:{}", s.id, s.port))
        .collect::<Vec<_>>()
        .join(", ");
    let amqp = if config.amqp.enabled {
        config.amqp.url.as_str()
    } else {
        "disabled"
    };

    info!(
        "🚀 {} v{} | http :{} | log {}",
        config.service.name,
        match_allocator::VERSION,
        config.service.http_port,
        config.service.log_level
    );
    info!(
        "   pool [{}] | max match {}s | tick {}s | amqp {}",
        pool,
        config.lifecycle.max_match_duration_seconds,
        config.lifecycle.tick_interval_seconds,
        amqp
    );
}

/// File or environment, then command-line overrides, then validation
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };
    args.apply_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = setup_tracing(&config.service.log_level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return run_health_check(config).await;
    }

    log_effective_config(&config);
    if args.dry_run {
        info!("Configuration is valid; not starting (--dry-run)");
        return Ok(());
    }

    let mut app_state = AppState::new(config.clone()).await.map_err(|e| {
        error!("Startup failed: {}", e);
        anyhow::anyhow!(e)
    })?;

    if let Err(e) = app_state.start().await {
        error!("Could not start services: {}", e);
        // Tear down whatever did start before exiting
        let _ = app_state.shutdown().await;
        std::process::exit(1);
    }

    let health_logger = tokio::spawn(log_health_periodically(
        app_state.probe().clone(),
        Duration::from_secs(30),
    ));

    info!("✅ Accepting matches; Ctrl+C to stop");
    shutdown_signal().await;
    health_logger.abort();

    let deadline = config.shutdown_timeout() + Duration::from_secs(1);
    match tokio::time::timeout(deadline, app_state.shutdown()).await {
        Ok(Ok(())) => info!("🛑 Stopped cleanly"),
        Ok(Err(e)) => warn!("Stopped with error: {}", e),
        Err(_) => warn!("⚠️  Shutdown exceeded {:?}, exiting anyway", deadline),
    }

    Ok(())
}
