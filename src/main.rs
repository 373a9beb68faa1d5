// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use serverlist_sync::{cfg::cli::Cli, cfg::config, cfg::logger::init_logger, driver::Driver};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let _guard = init_logger(&cli.log_level, cli.log_format)?;

    let triples = config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
    info!(count = triples.len(), config = ?cli.config, "loaded engine configuration");

    let driver = Driver::new();
    driver.run(triples, cli.refresh_only).await
}
