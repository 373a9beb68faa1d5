// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use serverlist_sync::{
    monitor::Monitor,
    query::{GoaQuery, QueryEngineKind, QueryRunner, SampQuery, UtmsQuery},
    sink::{InMemorySink, Sink},
};

/// Builds a query runner bound to an ephemeral local port, backed by the
/// given sink, ready to drive `run()` in a spawned task.
pub async fn bind_goa_query(monitor: Arc<Monitor>, sink: Arc<dyn Sink>, gamename: &str) -> Arc<QueryRunner> {
    let runner = QueryRunner::bind(
        serverlist_sync::monitor::QueryEngineId(0),
        QueryEngineKind::Goa(GoaQuery),
        0,
        monitor,
        sink,
        gamename.to_string(),
    )
    .await
    .expect("bind goa query runner");
    Arc::new(runner)
}

pub async fn bind_samp_query(monitor: Arc<Monitor>, sink: Arc<dyn Sink>, gamename: &str) -> Arc<QueryRunner> {
    let runner = QueryRunner::bind(
        serverlist_sync::monitor::QueryEngineId(0),
        QueryEngineKind::Samp(SampQuery),
        0,
        monitor,
        sink,
        gamename.to_string(),
    )
    .await
    .expect("bind samp query runner");
    Arc::new(runner)
}

pub async fn bind_utms_query(monitor: Arc<Monitor>, sink: Arc<dyn Sink>, gamename: &str) -> Arc<QueryRunner> {
    let runner = QueryRunner::bind(
        serverlist_sync::monitor::QueryEngineId(0),
        QueryEngineKind::Utms(UtmsQuery { version_id: 128 }),
        0,
        monitor,
        sink,
        gamename.to_string(),
    )
    .await
    .expect("bind utms query runner");
    Arc::new(runner)
}

pub fn in_memory_sink() -> Arc<InMemorySink> {
    Arc::new(InMemorySink::new())
}
