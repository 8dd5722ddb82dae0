#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{path::PathBuf, time::Duration};

use rama::{error::BoxError, graceful, telemetry::tracing};

use clap::{Parser, Subcommand};

pub mod cmd;
pub mod config;
pub mod report;
pub mod utils;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// CLI arguments for configuring thrpt-bench behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "thrpt-bench")]
#[command(bin_name = "thrpt-bench")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    cmds: CliCommands,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false, global = true)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 0., global = true)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommands {
    Drill(self::cmd::drill::DrillCommand),
    Pace(self::cmd::pace::PaceCommand),
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    })?;

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Runs the selected command until it is finished, failed
/// or the (graceful) shutdown has been initiated.
///
/// A command failure is returned once the shutdown completed.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));

    let (error_tx, error_rx) = tokio::sync::oneshot::channel::<BoxError>();
    let (fatal_tx, fatal_rx) = tokio::sync::oneshot::channel::<BoxError>();
    let graceful = graceful::Shutdown::new(new_shutdown_signal(
        error_rx,
        fatal_tx,
        base_shutdown_signal,
    ));

    graceful.spawn_task_fn(async move |guard| {
        let result = match args.cmds {
            CliCommands::Drill(drill_args) => self::cmd::drill::exec(guard, drill_args).await,
            CliCommands::Pace(pace_args) => self::cmd::pace::exec(pace_args),
        };
        if let Err(err) = result {
            let _ = error_tx.send(err);
        }
    });

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };
    tracing::debug!("gracefully shutdown with a delay of: {delay:?}");

    match fatal_rx.await {
        Ok(err) => Err(err),
        Err(_) => Ok(()),
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::oneshot::Receiver<BoxError>,
    fatal_tx: tokio::sync::oneshot::Sender<BoxError>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        tokio::select! {
            _ = base_shutdown_signal => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            result = error_rx => {
                match result {
                    Ok(err) => {
                        tracing::error!("fatal err received: {err}; abort");
                        let _ = fatal_tx.send(err);
                    },
                    Err(_) => {
                        tracing::debug!("command is finished without error, return control");
                    },
                }
            }
        }
    }
}
