// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::Ipv4Addr, sync::Arc};

use serverlist_sync::{
    endpoint::Endpoint,
    monitor::{Monitor, RETRY_INTERVAL, TICK_PERIOD},
};

use crate::integration_tests::common::{bind_goa_query, in_memory_sink};

/// Drives the real tick loop (real `std::time::Instant`, not tokio's mocked
/// clock — the Monitor isn't generic over a clock source) across the first
/// two retry intervals and confirms exactly two retries fire, for a total
/// of three outbound sends (the initial one plus these two). Abandonment at
/// the sixth attempt is covered by `monitor::tests::tick_abandons_after_max_attempts`,
/// which manipulates attempt counts directly rather than waiting out five
/// real `RETRY_INTERVAL`s.
#[tokio::test]
async fn probe_is_resent_twice_within_two_retry_intervals() {
    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_goa_query(Arc::clone(&monitor), sink.clone(), "goa0").await;
    let endpoint = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 7777);

    let lister = monitor.alloc_lister_id();
    monitor.begin_lister(lister).await;
    assert!(monitor.begin_probe(lister, query.id(), endpoint).await);
    query.send(endpoint).await.expect("initial send");

    let mut total_retries = 0u32;
    // `tick()` only notices an elapsed `RETRY_INTERVAL` at the next
    // `TICK_PERIOD` boundary, so each retry can lag the ideal continuous-time
    // boundary by up to one tick period; budget for that drift rather than
    // cutting off at exactly `2 * RETRY_INTERVAL`.
    let deadline = tokio::time::Instant::now() + RETRY_INTERVAL * 2 + TICK_PERIOD * 2;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(TICK_PERIOD).await;
        for retry in monitor.tick().await {
            assert_eq!(retry.endpoint, endpoint);
            query.send(retry.endpoint).await.expect("retry send");
            total_retries += 1;
        }
    }

    assert_eq!(total_retries, 2, "expected exactly two retries (attempts 2 and 3) within two retry intervals");
}
