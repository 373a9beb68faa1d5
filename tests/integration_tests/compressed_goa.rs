// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use serverlist_sync::{
    endpoint::Endpoint,
    listing::goa::{self, GoaListerConfig},
    monitor::Monitor,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common::{bind_goa_query, in_memory_sink};

#[tokio::test]
async fn compressed_list_yields_one_endpoint_and_one_probe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock master");
    let address = listener.local_addr().expect("local addr").to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream.write_all(b"\\secure\\ABCDEF").await.expect("write challenge");

        let mut request = [0u8; 512];
        let n = stream.read(&mut request).await.expect("read list request");
        assert!(String::from_utf8_lossy(&request[..n]).contains("\\list\\cmp\\"));

        let mut payload = vec![0x0A, 0x00, 0x00, 0x01, 0x61, 0xA8];
        payload.extend_from_slice(b"\\final");
        stream.write_all(&payload).await.expect("write compressed record");
    });

    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_goa_query(Arc::clone(&monitor), sink.clone(), "goa0").await;

    let cfg = GoaListerConfig {
        address,
        gamename: "goa0".into(),
        secretkey: "secretkey".into(),
        query_gamename: "goa0".into(),
        no_compressed_list: false,
        max_challenge_len: 0,
        gamever: None,
        location: None,
        attach_queryid: false,
        attach_listfinal: false,
    };
    let lister_id = monitor.alloc_lister_id();
    monitor.begin_lister(lister_id).await;
    goa::run(cfg, lister_id, Arc::clone(&monitor), Arc::clone(&query), CancellationToken::new()).await;

    server.await.expect("mock master task");

    let expected = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 25000);
    // `read_compressed_list` already registered a probe for this endpoint;
    // a second `begin_probe` from an unrelated lister trips the dedup path,
    // confirming exactly one record was decoded from the byte stream.
    let fresh_lister = monitor.alloc_lister_id();
    assert!(!monitor.begin_probe(fresh_lister, query.id(), expected).await);
}

/// A master that keeps the connection open after `\final` (an idle
/// keep-alive) must not hang the lister — it has to return as soon as the
/// marker is found, not wait for a subsequent EOF that never comes.
#[tokio::test]
async fn compressed_list_returns_without_waiting_for_eof_after_final() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock master");
    let address = listener.local_addr().expect("local addr").to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream.write_all(b"\\secure\\ABCDEF").await.expect("write challenge");

        let mut request = [0u8; 512];
        let _ = stream.read(&mut request).await.expect("read list request");

        let mut payload = vec![0x0A, 0x00, 0x00, 0x01, 0x61, 0xA8];
        payload.extend_from_slice(b"\\final");
        stream.write_all(&payload).await.expect("write compressed record");

        // Keep the stream alive instead of closing it or sending EOF.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_goa_query(Arc::clone(&monitor), sink.clone(), "goa0").await;

    let cfg = GoaListerConfig {
        address,
        gamename: "goa0".into(),
        secretkey: "secretkey".into(),
        query_gamename: "goa0".into(),
        no_compressed_list: false,
        max_challenge_len: 0,
        gamever: None,
        location: None,
        attach_queryid: false,
        attach_listfinal: false,
    };
    let lister_id = monitor.alloc_lister_id();
    monitor.begin_lister(lister_id).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        goa::run(cfg, lister_id, Arc::clone(&monitor), Arc::clone(&query), CancellationToken::new()),
    )
    .await
    .expect("lister must return as soon as \\final is seen, not wait for the connection to close");

    server.abort();
}
