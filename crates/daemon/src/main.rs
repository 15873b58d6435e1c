// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cortex Dispatch Daemon (cortexd)
//!
//! Background process that schedules work items onto agent CLIs and
//! supervises every dispatch to a terminal state.
//!
//! Architecture:
//! - HTTP task: axum control surface on loopback
//! - Ticker: drives the scheduler at `general.tick_interval`
//! - Reaper: periodically drives live dispatches to terminal states

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use cortex_daemon::{config::Config, graceful_shutdown, http, lifecycle, startup};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// How often the reaper walks the live dispatches.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Bound on the shutdown drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

fn print_help() {
    println!("cortexd {}", env!("CARGO_PKG_VERSION"));
    println!("Cortex dispatch daemon - schedules and supervises agent dispatches");
    println!();
    println!("USAGE:");
    println!("    cortexd [--config <path>]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <path>  Config file (default: $CORTEX_CONFIG or");
    println!("                         ~/.config/cortex/config.toml)");
    println!("    -h, --help           Print help information");
    println!("    -v, --version        Print version information");
}

fn config_path() -> Result<PathBuf, String> {
    let mut args = std::env::args().skip(1);
    let mut path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("cortexd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" | "help" => {
                print_help();
                std::process::exit(0);
            }
            "--config" | "-c" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                path = Some(PathBuf::from(value));
            }
            other => return Err(format!("unexpected argument '{}'", other)),
        }
    }

    if let Some(path) = path {
        return Ok(path);
    }
    if let Ok(env_path) = std::env::var("CORTEX_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("cortex").join("config.toml"))
        .ok_or_else(|| "cannot determine config directory".to_string())
}

#[tokio::main]
async fn main() {
    let path = match config_path() {
        Ok(path) => path,
        Err(message) => {
            eprintln!("error: {}", message);
            eprintln!("Usage: cortexd [--config <path>]");
            std::process::exit(2);
        }
    };

    // Startup validation failure is a non-zero exit before anything runs
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };

    rotate_log_if_needed(&config.daemon_log_path());
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: cannot set up logging: {}", err);
            std::process::exit(2);
        }
    };

    info!(config = %path.display(), "starting cortexd");

    let daemon = match startup(config).await {
        Ok(daemon) => daemon,
        Err(err @ lifecycle::LifecycleError::LockFailed(_)) => {
            eprintln!("cortexd is already running ({})", err);
            std::process::exit(1);
        }
        Err(err) => {
            error!("failed to start daemon: {}", err);
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    let exit_code = run(&daemon).await;

    graceful_shutdown(&daemon, SHUTDOWN_TIMEOUT).await;
    info!("daemon stopped");
    std::process::exit(exit_code);
}

/// Main loop: HTTP server plus tick and reap intervals until a signal or an
/// unrecoverable store failure.
async fn run(daemon: &lifecycle::Daemon) -> i32 {
    let listener = match tokio::net::TcpListener::bind(&daemon.config.general.listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(
                addr = %daemon.config.general.listen_addr,
                "cannot bind control surface: {}", err
            );
            return 1;
        }
    };
    info!(addr = %daemon.config.general.listen_addr, "control surface listening");

    let app = http::router(std::sync::Arc::clone(&daemon.control));
    let http_shutdown = std::sync::Arc::new(tokio::sync::Notify::new());
    let http_shutdown_rx = std::sync::Arc::clone(&http_shutdown);
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown_rx.notified().await })
            .await;
        if let Err(err) = result {
            error!("control surface failed: {}", err);
        }
    });

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            error!("cannot install SIGTERM handler: {}", err);
            return 1;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(err) => {
            error!("cannot install SIGINT handler: {}", err);
            return 1;
        }
    };

    // NOTE: intervals are created outside the loop - tokio::select!
    // re-evaluates branches each iteration, so constructing them inside
    // would reset the period on every event.
    let mut tick = tokio::time::interval(daemon.config.general.tick_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut reap = tokio::time::interval(REAP_INTERVAL);
    reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let exit_code = loop {
        tokio::select! {
            _ = tick.tick() => {
                match daemon.scheduler.tick().await {
                    Ok(Some(outcome)) if outcome.dispatched > 0 => {
                        info!(
                            dispatched = outcome.dispatched,
                            rate_limited = outcome.rate_limited,
                            no_provider = outcome.no_provider,
                            failed = outcome.failed,
                            "tick complete"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        // A store failure here is unrecoverable state
                        // corruption; anything else waits for the next tick.
                        error!("tick failed: {}", err);
                        if matches!(err, cortex_engine::DispatchError::Store(_)) {
                            break 1;
                        }
                    }
                }
            }

            _ = reap.tick() => {
                match cortex_engine::run_reaper_pass(&daemon.ctx).await {
                    Ok(outcome) if outcome != cortex_engine::ReapOutcome::default() => {
                        info!(?outcome, "reaper pass complete");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!("reaper pass failed: {}", err);
                        if matches!(err, cortex_engine::DispatchError::Store(_)) {
                            break 1;
                        }
                    }
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break 0;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break 0;
            }
        }
    };

    // Stop accepting control requests before draining
    http_shutdown.notify_one();
    let _ = server.await;
    exit_code
}

/// Maximum daemon log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `cortexd.log` → `.1` → `.2` → `.3`, deleting the oldest.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{}.{}", log_str, i);
        let to = format!("{}.{}", log_str, i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{}.1", log_str));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.daemon_log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let dir = log_path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = log_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_else(|| "cortexd.log".into());

    let file_appender = tracing_appender::rolling::never(dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
