// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Probe [`Monitor`]: a single shared coordinator tracking every
//! in-flight probe and every active lister for one process run.
//!
//! Grounded in `Engine/SyncStatusMonitor.go`'s `BeginServerListEngine` /
//! `EndServerListEngine` / `BeginQuery` / `CompleteQuery` / `Think` /
//! `AllEnginesComplete`, translated from the original's plain map-plus-lock
//! into a [`tokio::sync::Mutex`] around a small struct of two collections,
//! matching the narrow-handle design spec.md §9 calls for.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::warn;

use crate::endpoint::Endpoint;

/// Identifies one registered lister instance. Allocated by
/// [`Monitor::alloc_lister_id`] before the lister calls `begin_lister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListerId(u64);

/// Identifies one configured query engine (one per `[MsEngine, QueryEngine,
/// OutputEngine]` triple in the configuration file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryEngineId(pub u32);

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);
pub const TICK_PERIOD: Duration = Duration::from_secs(2);
pub const GLOBAL_DEADLINE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ProbeKey {
    query: QueryEngineId,
    endpoint: Endpoint,
}

#[derive(Debug)]
struct ProbeRecord {
    lister: ListerId,
    #[allow(dead_code)]
    first_sent_at: Instant,
    last_sent_at: Instant,
    attempts: u32,
}

/// One probe `tick()` decided needs a fresh datagram sent.
#[derive(Debug, Clone, Copy)]
pub struct RetryProbe {
    pub query: QueryEngineId,
    pub endpoint: Endpoint,
}

#[derive(Default)]
struct MonitorState {
    /// Active listers, keyed by id, to whether they have signaled
    /// end-of-enumeration. A lister disappears from this map entirely once
    /// it is ended AND no probe record references it anymore.
    listers: HashMap<ListerId, bool>,
    probes: HashMap<ProbeKey, ProbeRecord>,
}

/// The shared coordinator. Cloned cheaply (an `Arc` internally via
/// `tokio::sync::Mutex` wrapped in the owning `Arc<Monitor>` the driver
/// holds) and referenced by every lister task, query task, and the tick
/// loop through this same narrow handle.
pub struct Monitor {
    state: Mutex<MonitorState>,
    next_lister_id: AtomicU64,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            next_lister_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh [`ListerId`] for a not-yet-registered lister.
    pub fn alloc_lister_id(&self) -> ListerId {
        ListerId(self.next_lister_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn begin_lister(&self, lister: ListerId) {
        let mut state = self.state.lock().await;
        state.listers.insert(lister, false);
    }

    /// Idempotent. If the lister no longer has any referencing probe
    /// record it is removed immediately; otherwise it is only marked
    /// ended and removed later by [`Monitor::complete_probe`].
    pub async fn end_lister(&self, lister: ListerId) {
        let mut state = self.state.lock().await;
        Self::mark_ended_and_maybe_remove(&mut state, lister);
    }

    fn mark_ended_and_maybe_remove(state: &mut MonitorState, lister: ListerId) {
        let Some(ended) = state.listers.get_mut(&lister) else {
            return;
        };
        *ended = true;
        let still_referenced = state.probes.values().any(|p| p.lister == lister);
        if !still_referenced {
            state.listers.remove(&lister);
        }
    }

    /// Registers a new probe for `(query, canonicalize(endpoint))` unless
    /// one already exists. Returns `true` only when the caller must send
    /// the initial query.
    pub async fn begin_probe(&self, lister: ListerId, query: QueryEngineId, endpoint: Endpoint) -> bool {
        let key = ProbeKey { query, endpoint: endpoint.canonicalize() };
        let mut state = self.state.lock().await;
        if state.probes.contains_key(&key) {
            return false;
        }
        let now = Instant::now();
        state.probes.insert(
            key,
            ProbeRecord { lister, first_sent_at: now, last_sent_at: now, attempts: 1 },
        );
        true
    }

    /// Removes the matching probe record. If its lister has signaled
    /// end-of-enumeration and no other record references it, the lister is
    /// removed too.
    pub async fn complete_probe(&self, query: QueryEngineId, endpoint: Endpoint) {
        let key = ProbeKey { query, endpoint: endpoint.canonicalize() };
        let mut state = self.state.lock().await;
        let Some(record) = state.probes.remove(&key) else {
            return;
        };
        let lister = record.lister;
        if state.listers.get(&lister).copied() == Some(true) {
            let still_referenced = state.probes.values().any(|p| p.lister == lister);
            if !still_referenced {
                state.listers.remove(&lister);
            }
        }
    }

    /// Abandons probes past `MAX_ATTEMPTS` and returns the set needing a
    /// retry datagram, bumping their `attempts`/`last_sent_at` in place.
    pub async fn tick(&self) -> Vec<RetryProbe> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut retries = Vec::new();
        let mut abandoned = Vec::new();

        state.probes.retain(|key, record| {
            if record.attempts > MAX_ATTEMPTS {
                abandoned.push((*key, record.attempts));
                false
            } else {
                true
            }
        });

        for (key, attempts) in &abandoned {
            warn!(
                endpoint = %key.endpoint,
                query_engine = key.query.0,
                attempts,
                "abandon probe: max attempts exceeded"
            );
        }

        for (key, record) in state.probes.iter_mut() {
            if now.duration_since(record.last_sent_at) > RETRY_INTERVAL {
                record.last_sent_at = now;
                record.attempts += 1;
                retries.push(RetryProbe { query: key.query, endpoint: key.endpoint });
            }
        }

        if !abandoned.is_empty() {
            let drained_listers: Vec<ListerId> = state
                .listers
                .iter()
                .filter(|(lister, ended)| {
                    **ended && !state.probes.values().any(|p| p.lister == **lister)
                })
                .map(|(lister, _)| *lister)
                .collect();
            for lister in drained_listers {
                state.listers.remove(&lister);
            }
        }

        retries
    }

    pub async fn all_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.listers.is_empty() && state.probes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn ep(a: u8, b: u8, c: u8, d: u8, port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::new(a, b, c, d), port)
    }

    #[tokio::test]
    async fn dedup_second_begin_probe_returns_false() {
        let monitor = Monitor::new();
        let lister = monitor.alloc_lister_id();
        monitor.begin_lister(lister).await;
        let q = QueryEngineId(1);
        let e = ep(10, 0, 0, 1, 7777);

        assert!(monitor.begin_probe(lister, q, e).await);
        assert!(!monitor.begin_probe(lister, q, e).await);
    }

    #[tokio::test]
    async fn lister_removed_only_after_end_and_drain() {
        let monitor = Monitor::new();
        let lister = monitor.alloc_lister_id();
        monitor.begin_lister(lister).await;
        let q = QueryEngineId(1);
        let e = ep(10, 0, 0, 1, 7777);
        assert!(monitor.begin_probe(lister, q, e).await);

        monitor.end_lister(lister).await;
        assert!(!monitor.all_idle().await);

        monitor.complete_probe(q, e).await;
        assert!(monitor.all_idle().await);
    }

    #[tokio::test]
    async fn end_lister_with_no_probes_removes_immediately() {
        let monitor = Monitor::new();
        let lister = monitor.alloc_lister_id();
        monitor.begin_lister(lister).await;
        monitor.end_lister(lister).await;
        assert!(monitor.all_idle().await);
    }

    #[tokio::test]
    async fn canonicalized_endpoints_match_for_complete() {
        let monitor = Monitor::new();
        let lister = monitor.alloc_lister_id();
        monitor.begin_lister(lister).await;
        let q = QueryEngineId(1);
        let bare = ep(10, 0, 0, 1, 7777);
        assert!(monitor.begin_probe(lister, q, bare).await);

        let mapped = Endpoint::from_socket_addr(std::net::SocketAddr::new(
            std::net::IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped()),
            7777,
        ))
        .expect("mapped v4");
        monitor.complete_probe(q, mapped).await;
        monitor.end_lister(lister).await;
        assert!(monitor.all_idle().await);
    }

    #[tokio::test]
    async fn tick_abandons_after_max_attempts() {
        let monitor = Monitor::new();
        let lister = monitor.alloc_lister_id();
        monitor.begin_lister(lister).await;
        let q = QueryEngineId(1);
        let e = ep(10, 0, 0, 1, 7777);
        assert!(monitor.begin_probe(lister, q, e).await);

        {
            let mut state = monitor.state.lock().await;
            for record in state.probes.values_mut() {
                record.attempts = MAX_ATTEMPTS + 1;
            }
        }
        let retries = monitor.tick().await;
        assert!(retries.is_empty());
        monitor.end_lister(lister).await;
        assert!(monitor.all_idle().await);
    }
}
