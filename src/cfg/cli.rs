// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::PathBuf;

use clap::Parser;

use super::logger::LogFormat;

/// Synchronizes legacy master-server listings into the configured sink.
#[derive(Debug, Parser)]
#[command(name = "serverlist-sync", version, about)]
pub struct Cli {
    /// Path to the engine configuration file.
    #[arg(long, default_value = "ms_config.json")]
    pub config: PathBuf,

    /// Skip master-server listers; enumerate previously-published
    /// endpoints from the sink instead.
    #[arg(long)]
    pub refresh_only: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
