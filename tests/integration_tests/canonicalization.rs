// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use serverlist_sync::{endpoint::Endpoint, monitor::Monitor};

use crate::integration_tests::common::{bind_goa_query, in_memory_sink};

#[tokio::test]
async fn mapped_ipv6_source_completes_the_bare_ipv4_probe() {
    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_goa_query(Arc::clone(&monitor), sink.clone(), "goa0").await;

    let bare = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 7777);
    let lister = monitor.alloc_lister_id();
    monitor.begin_lister(lister).await;
    assert!(monitor.begin_probe(lister, query.id(), bare).await);

    let mapped_source = SocketAddr::new(
        IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped()),
        7777,
    );
    let mapped_endpoint = Endpoint::from_socket_addr(mapped_source).expect("ipv4-mapped source");
    assert_eq!(mapped_endpoint, bare, "mapped and bare forms must canonicalize equal");

    monitor.complete_probe(query.id(), mapped_endpoint).await;
    monitor.end_lister(lister).await;
    assert!(monitor.all_idle().await, "the probe record must be found and removed via its mapped source address");
}
