// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Listing protocols: one per master source (spec.md §4.2). Each protocol
//! is a self-contained async state machine that registers with the
//! [`Monitor`](crate::monitor::Monitor), emits a stream of candidate
//! endpoints, and signals completion. The driver dispatches on
//! [`ListerKind`], the tagged-variant boundary spec.md §9 calls for —
//! every variant shares only the `begin_lister`/`begin_probe`/`end_lister`
//! contract, not a common trait, since each protocol's `configure`
//! parameters differ in shape.

pub mod goa;
pub mod http_json;
pub mod refresh;
pub mod sbv2;
pub mod text_file;
pub mod utms;

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    cipher::Cipher,
    monitor::{ListerId, Monitor},
    query::QueryRunner,
    sink::Sink,
};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub enum ListerKind {
    Goa(goa::GoaListerConfig),
    Sbv2(sbv2::Sbv2ListerConfig),
    Utms(utms::UtmsListerConfig),
    HttpJson(http_json::HttpJsonListerConfig),
    TextFile(text_file::TextFileListerConfig),
    Refresh(refresh::RefreshListerConfig),
}

/// Runs the configured protocol to completion under an already-registered
/// `lister_id` (the caller must have called `begin_lister` on it before
/// spawning this, so the Monitor never observes a window where a lister is
/// counted neither registered nor finished). Returns once the lister has
/// called `end_lister` (including on error — no listing protocol propagates
/// a transport/protocol error past this boundary, per spec.md §7).
pub async fn run_lister(
    kind: ListerKind,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    sink: Arc<dyn Sink>,
    cipher: Arc<dyn Cipher>,
    cancel: CancellationToken,
) {
    match kind {
        ListerKind::Goa(cfg) => goa::run(cfg, lister_id, monitor, query, cancel).await,
        ListerKind::Sbv2(cfg) => sbv2::run(cfg, lister_id, monitor, query, cipher, cancel).await,
        ListerKind::Utms(cfg) => utms::run(cfg, lister_id, monitor, query, cancel).await,
        ListerKind::HttpJson(cfg) => http_json::run(cfg, lister_id, monitor, query, cancel).await,
        ListerKind::TextFile(cfg) => text_file::run(cfg, lister_id, monitor, query, cancel).await,
        ListerKind::Refresh(cfg) => refresh::run(cfg, lister_id, monitor, query, sink, cancel).await,
    }
}
