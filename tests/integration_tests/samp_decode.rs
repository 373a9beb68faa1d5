// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use serverlist_sync::{endpoint::Endpoint, monitor::Monitor};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::integration_tests::common::{bind_samp_query, in_memory_sink};

fn len_prefixed(s: &str) -> Vec<u8> {
    let mut v = (s.len() as u32).to_le_bytes().to_vec();
    v.extend_from_slice(s.as_bytes());
    v
}

#[tokio::test]
async fn samp_reply_decodes_into_expected_property_map() {
    let monitor = Arc::new(Monitor::new());
    let sink = in_memory_sink();
    let query = bind_samp_query(Arc::clone(&monitor), sink.clone(), "samp").await;

    let local_port = query.local_addr().expect("local addr").port();
    let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");

    let mut datagram = Vec::new();
    datagram.extend_from_slice(b"SAMP");
    datagram.extend_from_slice(&[0x0A, 0x00, 0x00, 0x01]);
    datagram.extend_from_slice(&[0x07, 0x1D]);
    datagram.push(b'i');
    datagram.push(0x00);
    datagram.extend_from_slice(&2u16.to_le_bytes());
    datagram.extend_from_slice(&32u16.to_le_bytes());
    datagram.extend_from_slice(&len_prefixed("Host"));
    datagram.extend_from_slice(&len_prefixed("DM"));
    datagram.extend_from_slice(&len_prefixed("en"));

    let cancel = CancellationToken::new();
    let run_query = Arc::clone(&query);
    let run_cancel = cancel.clone();
    let task = tokio::spawn(async move { run_query.run(run_cancel).await });

    sender
        .send_to(&datagram, ("127.0.0.1", local_port))
        .await
        .expect("send samp reply");

    let sender_port = sender.local_addr().expect("sender addr").port();
    let expected_endpoint = Endpoint::new("127.0.0.1".parse().unwrap(), sender_port);

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Some(props) = sink.properties_for("samp", expected_endpoint) {
                assert_eq!(props.get("password"), Some("0"));
                assert_eq!(props.get("numplayers"), Some("2"));
                assert_eq!(props.get("maxplayers"), Some("32"));
                assert_eq!(props.get("hostname"), Some("Host"));
                assert_eq!(props.get("gamemode"), Some("DM"));
                assert_eq!(props.get("gamevariant"), Some("en"));
                assert_eq!(props.get("hostport"), Some(sender_port.to_string().as_str()));
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reply never published");

    cancel.cancel();
    task.await.expect("query runner task");
}
