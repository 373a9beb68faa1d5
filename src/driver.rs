// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Top-level Driver (spec.md §2 item 5): loads configuration, instantiates
//! one `(lister, query, sink)` triple per configured game, starts the
//! Monitor's periodic tick, and shuts down when the Monitor reports idle
//! or the global deadline expires.

use std::{collections::HashMap, sync::Arc};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cfg::config::{EngineTriple, MsEngineConfig, OutputEngineConfig, QueryEngineConfig},
    cipher::{Cipher, IdentityCipher},
    listing::{self, ListerKind},
    monitor::{Monitor, QueryEngineId, GLOBAL_DEADLINE, TICK_PERIOD},
    query::{GoaQuery, Qr2Query, QueryEngineKind, QueryRunner, SampQuery, UtmsQuery},
    sink::{LoggingSink, Sink},
};

pub struct Driver {
    monitor: Arc<Monitor>,
    cancel: CancellationToken,
}

impl Driver {
    pub fn new() -> Self {
        Self { monitor: Arc::new(Monitor::new()), cancel: CancellationToken::new() }
    }

    /// Runs the configured triples to completion, refresh-only mode if
    /// `refresh_only` is set. Configuration errors (spec.md §7 kind 1) are
    /// fatal and propagate to the caller.
    pub async fn run(&self, triples: Vec<EngineTriple>, refresh_only: bool) -> anyhow::Result<()> {
        let cipher: Arc<dyn Cipher> = Arc::new(IdentityCipher);
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut query_runners: HashMap<QueryEngineId, Arc<QueryRunner>> = HashMap::new();

        for (index, triple) in triples.into_iter().enumerate() {
            let query_id = QueryEngineId(index as u32);
            let gamename = output_gamename(&triple.output_engine);
            let sink: Arc<dyn Sink> = build_sink(&triple.output_engine);

            let runner = match build_query_runner(query_id, &triple.query_engine, &self.monitor, &sink, &gamename).await {
                Ok(r) => Arc::new(r),
                Err(e) => {
                    warn!(query_engine = index as u64, error = %e, "failed to bind query engine, skipping triple");
                    continue;
                }
            };

            let recv_runner = Arc::clone(&runner);
            let recv_cancel = self.cancel.clone();
            tasks.spawn(async move { recv_runner.run(recv_cancel).await });

            let lister_kind = if refresh_only {
                ListerKind::Refresh(listing::refresh::RefreshListerConfig { gamename: gamename.clone() })
            } else {
                match build_lister_kind(&triple.ms_engine) {
                    Some(kind) => kind,
                    None => {
                        warn!(ms_engine = index as u64, "unsupported MsEngine, skipping triple");
                        continue;
                    }
                }
            };

            // Registered synchronously, before the task is spawned: if this
            // raced with the shutdown-detection loop's `all_idle` check
            // instead, a lister whose task hadn't been polled yet would be
            // invisible to the Monitor and the whole run could be torn down
            // before a single probe was sent.
            let lister_id = self.monitor.alloc_lister_id();
            self.monitor.begin_lister(lister_id).await;

            let monitor = Arc::clone(&self.monitor);
            let query_for_lister = Arc::clone(&runner);
            let sink_for_lister = Arc::clone(&sink);
            let cipher_for_lister = Arc::clone(&cipher);
            let lister_cancel = self.cancel.clone();
            tasks.spawn(async move {
                listing::run_lister(
                    lister_kind,
                    lister_id,
                    monitor,
                    query_for_lister,
                    sink_for_lister,
                    cipher_for_lister,
                    lister_cancel,
                )
                .await;
            });

            query_runners.insert(query_id, runner);
        }

        self.spawn_tick_loop(&mut tasks, query_runners);
        self.spawn_deadline_timer(&mut tasks);

        loop {
            if self.monitor.all_idle().await {
                info!("all listers and probes drained, shutting down");
                break;
            }
            if self.cancel.is_cancelled() {
                info!("deadline reached, shutting down");
                break;
            }
            tokio::time::sleep(TICK_PERIOD).await;
        }

        self.cancel.cancel();
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn spawn_tick_loop(&self, tasks: &mut JoinSet<()>, query_runners: HashMap<QueryEngineId, Arc<QueryRunner>>) {
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(TICK_PERIOD) => {}
                }
                let retries = monitor.tick().await;
                for retry in retries {
                    if let Some(runner) = query_runners.get(&retry.query) {
                        let _ = runner.send(retry.endpoint).await;
                    }
                }
            }
        });
    }

    fn spawn_deadline_timer(&self, tasks: &mut JoinSet<()>) {
        let cancel = self.cancel.clone();
        tasks.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(GLOBAL_DEADLINE) => cancel.cancel(),
            }
        });
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

fn output_gamename(cfg: &OutputEngineConfig) -> String {
    match cfg {
        OutputEngineConfig::OsRedisOutput(p) => p.gamename.clone(),
    }
}

fn build_sink(_cfg: &OutputEngineConfig) -> Arc<dyn Sink> {
    Arc::new(LoggingSink)
}

async fn build_query_runner(
    id: QueryEngineId,
    cfg: &QueryEngineConfig,
    monitor: &Arc<Monitor>,
    sink: &Arc<dyn Sink>,
    gamename: &str,
) -> anyhow::Result<QueryRunner> {
    let (kind, source_port): (QueryEngineKind, u16) = match cfg {
        QueryEngineConfig::Goa0 { source_port } => (QueryEngineKind::Goa(GoaQuery), *source_port),
        QueryEngineConfig::Qr2(p) => (QueryEngineKind::Qr2(Qr2Query), p.source_port),
        QueryEngineConfig::Samp(p) => (QueryEngineKind::Samp(SampQuery), p.source_port),
        QueryEngineConfig::Ut2k(p) => {
            (QueryEngineKind::Utms(UtmsQuery { version_id: p.versionid }), p.source_port)
        }
    };

    QueryRunner::bind(id, kind, source_port, Arc::clone(monitor), Arc::clone(sink), gamename.to_string()).await
}

fn build_lister_kind(cfg: &MsEngineConfig) -> Option<ListerKind> {
    match cfg {
        MsEngineConfig::Goa0(p) => Some(ListerKind::Goa(listing::goa::GoaListerConfig {
            address: p.address.clone(),
            gamename: p.gamename.clone(),
            secretkey: p.secretkey.clone(),
            query_gamename: p.query_gamename.clone(),
            no_compressed_list: p.no_compressed_list,
            max_challenge_len: p.max_challenge_len,
            gamever: p.gamever.clone(),
            location: p.location.clone(),
            attach_queryid: p.attach_queryid,
            attach_listfinal: p.attach_listfinal,
        })),
        MsEngineConfig::Sbv2(p) => Some(ListerKind::Sbv2(listing::sbv2::Sbv2ListerConfig {
            address: p.address.clone(),
            gamename: p.gamename.clone(),
            secretkey: p.secretkey.clone(),
            query_gamename: p.query_gamename.clone(),
            fields: p.fields.clone(),
        })),
        MsEngineConfig::Ut2k(p) => Some(ListerKind::Utms(listing::utms::UtmsListerConfig {
            address: p.address.clone(),
            cdkey: p.cdkey.clone(),
            client_name: p.client_name.clone(),
            client_version: p.client_version,
            running_os: p.running_os,
            language: p.language.clone(),
            gpu_device_id: p.gpu_device_id,
            gpu_vendor_id: p.gpu_vendor_id,
            cpu_cycles: p.cpu_cycles,
            running_cpus: p.running_cpus,
        })),
        MsEngineConfig::HttpJson(p) => {
            Some(ListerKind::HttpJson(listing::http_json::HttpJsonListerConfig { url: p.url.clone() }))
        }
        MsEngineConfig::TextFile(p) => {
            Some(ListerKind::TextFile(listing::text_file::TextFileListerConfig { path: p.path.clone() }))
        }
    }
}
