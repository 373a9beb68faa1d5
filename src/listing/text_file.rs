// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Text-file listing (spec.md §4.2.5): one `host:port` per line; a
//! non-literal host is resolved to its first A record.

use std::sync::Arc;

use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    endpoint::Endpoint,
    monitor::{ListerId, Monitor},
    query::QueryRunner,
};

#[derive(Debug, Clone)]
pub struct TextFileListerConfig {
    pub path: String,
}

pub async fn run(
    cfg: TextFileListerConfig,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    cancel: CancellationToken,
) {
    if let Err(e) = run_inner(&cfg, lister_id, &monitor, &query, &cancel).await {
        warn!(lister = "file", path = %cfg.path, error = %e, "listing ended with error");
    }
    monitor.end_lister(lister_id).await;
}

async fn run_inner(
    cfg: &TextFileListerConfig,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(&cfg.path).await?;

    for line in contents.lines() {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(endpoint) = resolve_line(line).await else {
            continue;
        };
        if monitor.begin_probe(lister_id, query.id(), endpoint).await {
            let _ = query.send(endpoint).await;
        }
    }

    Ok(())
}

async fn resolve_line(line: &str) -> Option<Endpoint> {
    let (host, port_str) = line.rsplit_once(':')?;
    let port: u16 = port_str.parse().ok()?;

    if let Ok(ip) = host.parse() {
        return Some(Endpoint::new(ip, port));
    }

    let mut addrs = lookup_host((host, port)).await.ok()?;
    let first = addrs.next()?;
    match first {
        std::net::SocketAddr::V4(v4) => Some(Endpoint::new(*v4.ip(), port)),
        std::net::SocketAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_literal_ipv4_without_dns() {
        let ep = resolve_line("10.0.0.1:25000").await.expect("resolve");
        assert_eq!(ep.port, 25000);
    }

    #[tokio::test]
    async fn malformed_line_resolves_to_none() {
        assert!(resolve_line("not-a-host-or-port").await.is_none());
    }
}
