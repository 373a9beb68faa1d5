// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! JSON-over-HTTP listing (spec.md §4.2.4): fetches a JSON array of
//! `{ "ip": "<addr-or-addr:port>", "queryPort": <int>? }` and submits
//! whatever parses, skipping the rest.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    endpoint::Endpoint,
    monitor::{ListerId, Monitor},
    query::QueryRunner,
};

#[derive(Debug, Clone)]
pub struct HttpJsonListerConfig {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct Entry {
    ip: String,
    #[serde(rename = "queryPort")]
    query_port: Option<u16>,
}

pub async fn run(
    cfg: HttpJsonListerConfig,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    cancel: CancellationToken,
) {
    if let Err(e) = run_inner(&cfg, lister_id, &monitor, &query, &cancel).await {
        warn!(lister = "http_json", url = %cfg.url, error = %e, "listing ended with error");
    }
    monitor.end_lister(lister_id).await;
}

async fn run_inner(
    cfg: &HttpJsonListerConfig,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let fetch = client.get(&cfg.url).send();
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled before fetch"),
        res = fetch => res?,
    };
    let entries: Vec<Entry> = response.json().await?;

    for entry in entries {
        let Some(endpoint) = parse_entry(&entry) else {
            continue;
        };
        if monitor.begin_probe(lister_id, query.id(), endpoint).await {
            let _ = query.send(endpoint).await;
        }
    }

    Ok(())
}

fn parse_entry(entry: &Entry) -> Option<Endpoint> {
    if let Some(port) = entry.query_port {
        if let Ok(ip) = entry.ip.parse() {
            return Some(Endpoint::new(ip, port));
        }
    }
    entry.ip.parse().ok()
}
