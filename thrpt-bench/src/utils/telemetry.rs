use std::{io::IsTerminal as _, path::Path};

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing::{
        self,
        metadata::LevelFilter,
        subscriber::{EnvFilter, fmt::writer::BoxMakeWriter},
    },
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryConfig<'a> {
    pub verbose: bool,
    pub pretty: bool,
    /// Log into this file instead of stderr.
    pub output: Option<&'a Path>,
}

/// Installs the global tracing subscriber.
///
/// Logs at INFO (DEBUG when verbose) unless overwritten by `RUST_LOG`.
/// Reports go to stdout, so logs never mix with them.
pub fn init_tracing(cfg: TelemetryConfig<'_>) -> Result<(), BoxError> {
    let directive = if cfg.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
    .into();

    let make_writer = match cfg.output {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .context("open log file")
                .with_context_debug_field("path", || path.to_owned())?;

            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing::subscriber::fmt()
        .with_ansi(cfg.output.is_none() && std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(directive)
                .from_env_lossy(),
        )
        .with_writer(make_writer);

    if cfg.pretty {
        subscriber.pretty().try_init()?;
    } else {
        subscriber.try_init()?;
    }

    tracing::debug!(verbose = cfg.verbose, pretty = cfg.pretty, "tracing is set up");
    Ok(())
}
