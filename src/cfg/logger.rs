// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Structured logging setup, trimmed from the teacher's `cfg::logger` down
//! to the fields this crate actually emits: level (from `--log-level`),
//! target, and line, written to stdout as either human-readable or JSON
//! lines.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Installs the global `tracing` subscriber. Returns a `WorkerGuard` that
/// must be kept alive for the process lifetime — dropping it flushes the
/// non-blocking writer.
pub fn init_logger(level: &str, format: LogFormat) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse --log-level")?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let registry = Registry::default().with(env_filter);

    match format {
        LogFormat::Pretty => {
            let layer = fmt::layer().with_writer(writer).with_target(true).with_line_number(true);
            registry.with(layer).try_init()
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_line_number(true)
                .json();
            registry.with(layer).try_init()
        }
    }
    .context("failed to install global tracing subscriber")?;

    Ok(guard)
}
