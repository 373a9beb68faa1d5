// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::Ipv4Addr, sync::Arc};

use serverlist_sync::{endpoint::Endpoint, monitor::Monitor};

use crate::integration_tests::common::{bind_goa_query, in_memory_sink};

#[tokio::test]
async fn two_listers_submitting_the_same_endpoint_send_only_once() {
    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_goa_query(Arc::clone(&monitor), sink.clone(), "goa0").await;

    let endpoint = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 7777);

    let lister_a = monitor.alloc_lister_id();
    monitor.begin_lister(lister_a).await;
    let first = monitor.begin_probe(lister_a, query.id(), endpoint).await;
    assert!(first);
    if first {
        query.send(endpoint).await.expect("first send");
    }

    let lister_b = monitor.alloc_lister_id();
    monitor.begin_lister(lister_b).await;
    let second = monitor.begin_probe(lister_b, query.id(), endpoint).await;
    assert!(!second, "second begin_probe for the same endpoint must not register a new send");

    monitor.end_lister(lister_a).await;
    monitor.end_lister(lister_b).await;
    assert!(!monitor.all_idle().await, "the dedup'd probe is still owned by lister_a and outstanding");

    monitor.complete_probe(query.id(), endpoint).await;
    assert!(monitor.all_idle().await);
}
