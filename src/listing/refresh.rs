// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Refresh listing (SPEC_FULL.md §4.2.6): the `--refresh-only` substitute
//! for a master-server lister. Instead of a wire conversation it asks the
//! configured sink for every endpoint previously published under the same
//! game name — mirroring the `ZScan`/`HMGet` enumeration
//! `OpenSpyRedisInputHandler.go` performs over its injected-server set —
//! and feeds each through the same `begin_probe`/query path as any other
//! lister.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    monitor::{ListerId, Monitor},
    query::QueryRunner,
    sink::Sink,
};

#[derive(Debug, Clone)]
pub struct RefreshListerConfig {
    pub gamename: String,
}

pub async fn run(
    cfg: RefreshListerConfig,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    sink: Arc<dyn Sink>,
    cancel: CancellationToken,
) {
    let candidates = sink.refresh_candidates(&cfg.gamename);
    for endpoint in candidates {
        if cancel.is_cancelled() {
            break;
        }
        if monitor.begin_probe(lister_id, query.id(), endpoint).await {
            let _ = query.send(endpoint).await;
        }
    }

    monitor.end_lister(lister_id).await;
}
