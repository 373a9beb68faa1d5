// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use serverlist_sync::{
    listing::utms::{self, UtmsListerConfig},
    monitor::Monitor,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common::{bind_utms_query, in_memory_sink};

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

fn compact_str(s: &str) -> Vec<u8> {
    let mut out = vec![s.len() as u8];
    out.extend_from_slice(s.as_bytes());
    out
}

async fn read_frame(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.expect("read frame length");
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.expect("read frame payload");
    buf
}

#[tokio::test]
async fn rejected_validation_ends_the_lister_without_requesting_a_list() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock master");
    let address = listener.local_addr().expect("local addr").to_string();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream.write_all(&frame(&compact_str("challenge"))).await.expect("write challenge frame");

        let _client_info = read_frame(&mut stream).await;
        stream.write_all(&frame(&compact_str("REJECTED"))).await.expect("write rejection");

        // The lister must never ask for more: a further read either errors
        // (peer closed) or times out, both of which confirm no list request
        // frame was ever sent.
        let mut probe = [0u8; 4];
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(200), stream.read(&mut probe)).await;
        match result {
            Ok(Ok(0)) | Err(_) => {}
            Ok(Ok(n)) => panic!("unexpected {n} bytes read after rejection"),
            Ok(Err(_)) => {}
        }
    });

    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_utms_query(Arc::clone(&monitor), sink.clone(), "ut2k").await;

    let cfg = UtmsListerConfig {
        address,
        cdkey: "ABCDEF1234567890".into(),
        client_name: "Client".into(),
        client_version: 1000,
        running_os: 0,
        language: "int".into(),
        gpu_device_id: 0,
        gpu_vendor_id: 0,
        cpu_cycles: 0,
        running_cpus: 1,
    };
    let lister_id = monitor.alloc_lister_id();
    monitor.begin_lister(lister_id).await;
    utms::run(cfg, lister_id, Arc::clone(&monitor), Arc::clone(&query), CancellationToken::new()).await;

    server.await.expect("mock master task");
    assert!(monitor.all_idle().await, "lister must end cleanly with no outstanding probes");
}
