//! Remote pointer - streams a normalized cursor position to a broadcast relay

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remote_pointer::cli;
use remote_pointer::config::{AppConfig, ConfigWatcher, FeedConfig, PermissionMode, TransportKind};
use remote_pointer::error::AccessError;
use remote_pointer::input::{FeedReader, InputKind};
use remote_pointer::normalize::NormalizationPolicy;
use remote_pointer::paths::AppPaths;
use remote_pointer::permission::{
    AutoGrant, Capability, ConsoleNotice, PermissionGate, SensorPlatform, TerminalPrompt,
};
use remote_pointer::session::Session;
use remote_pointer::transport::{ConsoleTransport, RelayTransport, Transport};

/// Remote pointer - turn a phone's orientation sensor (or a mouse) into a shared cursor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: ./config.yaml, then the user config dir)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log positions instead of sending them to the relay
    #[arg(long)]
    dry_run: bool,

    /// Read input events from stdin instead of UDP
    #[arg(long)]
    stdin: bool,

    /// Normalization policy, overrides the config file
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(NormalizationPolicy::NAMES))]
    policy: Option<String>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,

    /// Print the config file JSON schema and exit
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.print_schema {
        println!("{}", AppConfig::json_schema()?);
        return Ok(());
    }

    let paths = match &args.config {
        Some(path) => AppPaths::for_config(path),
        None => AppPaths::detect(),
    };

    if args.init_config {
        return init_config(&paths).await;
    }

    paths.ensure_directories()?;
    let _log_guard = init_logging(&args.log_level, &paths)?;

    info!("Starting remote-pointer v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());
    if paths.is_dev {
        info!("Dev mode: using config.yaml and logs/ from the working directory");
    }

    let (config_watcher, mut config) = if paths.config.exists() {
        let (watcher, initial) = ConfigWatcher::new(paths.config.clone()).await?;
        info!("Configuration loaded with hot-reload enabled");
        (Some(watcher), (*initial).clone())
    } else if args.config.is_some() {
        anyhow::bail!("Config file not found: {}", paths.config.display());
    } else {
        info!("No config file found, using defaults (create one with --init-config)");
        (None, AppConfig::default())
    };

    apply_overrides(&args, &mut config)?;

    run_app(config, config_watcher, &args).await?;

    info!("remote-pointer shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    mut config_watcher: Option<ConfigWatcher>,
    args: &Args,
) -> Result<()> {
    // Transport first: the connection comes up while the user answers the prompt
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Relay => Arc::new(RelayTransport::new(&config.relay)?),
        TransportKind::Console => Arc::new(ConsoleTransport::new("dry-run")),
    };
    transport.start().await?;
    spawn_cursor_logger(transport.as_ref());

    let capability = match acquire_capability(&config).await {
        Ok(capability) => capability,
        Err(e) => {
            transport.shutdown().await?;
            return Err(e);
        }
    };

    let feed = match &config.input.feed {
        FeedConfig::Udp { bind } => {
            let addr = bind
                .parse()
                .with_context(|| format!("Invalid input.feed.bind address '{}'", bind))?;
            FeedReader::bind_udp(addr).await?
        }
        FeedConfig::Stdin => FeedReader::stdin(),
    };

    let session = Session::start(capability, &config, feed, Arc::clone(&transport));
    let mut active = config;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            _ = session.input_closed() => {
                info!("Input feed ended, shutting down");
                break;
            }

            Some(mut new_config) = next_config(&mut config_watcher) => {
                if let Err(e) = apply_overrides(args, &mut new_config) {
                    warn!("Ignoring reloaded config: {:#}", e);
                    continue;
                }

                let restart = active.restart_required_changes(&new_config);
                if !restart.is_empty() {
                    warn!("Changes to [{}] take effect after a restart", restart.join(", "));
                }

                if new_config.normalizer != active.normalizer {
                    session.reconfigure(new_config.normalizer);
                    active.normalizer = new_config.normalizer;
                } else {
                    debug!("Normalizer settings unchanged");
                }
            }
        }
    }

    session.teardown().await
}

/// CLI flags win over the config file, including after a reload.
fn apply_overrides(args: &Args, config: &mut AppConfig) -> Result<()> {
    if args.dry_run {
        config.transport = TransportKind::Console;
    }
    if args.stdin {
        config.input.feed = FeedConfig::Stdin;
    }
    if let Some(name) = &args.policy {
        let policy = NormalizationPolicy::from_name(name)
            .with_context(|| format!("Unknown normalization policy '{}'", name))?;
        // Keep tuned constants when the file already selects this policy
        if std::mem::discriminant(&policy) != std::mem::discriminant(&config.normalizer.policy) {
            config.normalizer.policy = policy;
        }
    }
    config.validate()
}

/// Ask for sensor access, offering a retry after a denial.
async fn acquire_capability(config: &AppConfig) -> Result<Capability> {
    let platform: Arc<dyn SensorPlatform> =
        if config.permission.mode == PermissionMode::Auto || config.input.kind == InputKind::Pointer {
            Arc::new(AutoGrant)
        } else {
            Arc::new(TerminalPrompt::new())
        };
    let gate = PermissionGate::new(platform, Arc::new(ConsoleNotice));

    loop {
        match gate.request_access().await {
            Ok(capability) => return Ok(capability),
            Err(AccessError::UnsupportedPlatform) => {
                info!("Hint: set `permission.mode: auto` to run without a terminal");
                return Err(AccessError::UnsupportedPlatform.into());
            }
            Err(AccessError::PermissionDenied) => {
                let retry = tokio::task::spawn_blocking(|| cli::confirm("Ask again?"))
                    .await
                    .context("Retry prompt task failed")??;
                if !retry {
                    return Err(AccessError::PermissionDenied.into());
                }
            }
        }
    }
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

fn spawn_cursor_logger(transport: &dyn Transport) {
    if let Some(mut cursors) = transport.subscribe_cursors() {
        tokio::spawn(async move {
            loop {
                match cursors.recv().await {
                    Ok(list) => debug!("👥 {} cursors on the relay", list.len()),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Cursor logger skipped {} updates", n)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

async fn init_config(paths: &AppPaths) -> Result<()> {
    if paths.config.exists() {
        anyhow::bail!("Config file already exists: {}", paths.config.display());
    }
    paths.ensure_directories()?;
    AppConfig::default().save(&paths.config_str()).await?;
    println!(
        "{} Wrote default config to {}",
        "✓".green().bold(),
        paths.config.display().to_string().cyan()
    );
    Ok(())
}

fn init_logging(level: &str, paths: &AppPaths) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "remote-pointer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
