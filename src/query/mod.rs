// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Query engines: one per wire dialect (spec.md §4.3). Each dialect's
//! pure protocol logic — building a probe datagram, decoding a reply —
//! lives in its own module and is dispatched through [`QueryEngineKind`],
//! the tagged-variant pattern the teacher's `models::parse` module uses
//! for PDU dispatch (spec.md §9 calls for the same shape at this
//! boundary). The async socket machinery that owns the UDP transport is
//! [`QueryRunner`], generic over any `QueryProtocol`.

pub(crate) mod compact;
mod goa;
mod qr2;
mod samp;
mod utms;

use std::{net::SocketAddrV4, sync::Arc};

use enum_dispatch::enum_dispatch;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use goa::GoaQuery;
pub use qr2::Qr2Query;
pub use samp::SampQuery;
pub use utms::UtmsQuery;

use crate::{
    endpoint::Endpoint,
    error::EngineError,
    monitor::{Monitor, QueryEngineId},
    property_map::PropertyMap,
    sink::Sink,
};

/// A decoded reply: the endpoint to mark complete (not necessarily the raw
/// datagram source — UTMS reports under the game port, one less than the
/// query port the datagram actually arrived on) plus its property map.
pub struct DecodedReply {
    pub endpoint: Endpoint,
    pub props: PropertyMap,
}

/// The pure, synchronous half of a query dialect: build an outbound probe,
/// parse an inbound reply. No I/O; every dialect is exercised by unit
/// tests without a socket.
#[enum_dispatch]
pub trait QueryProtocol {
    fn probe_datagram(&self, target: Endpoint) -> Vec<u8>;

    /// Returns `None` to drop a malformed or unrelated datagram silently,
    /// matching spec.md §8's SAMP boundary case ("dropped silently").
    fn decode_reply(&self, source: SocketAddrV4, buf: &[u8]) -> Option<DecodedReply>;
}

#[enum_dispatch(QueryProtocol)]
pub enum QueryEngineKind {
    Goa(GoaQuery),
    Qr2(Qr2Query),
    Samp(SampQuery),
    Utms(UtmsQuery),
}

/// Owns one bound UDP socket, multiplexing outbound probes and
/// demultiplexing inbound replies for one configured query engine.
pub struct QueryRunner {
    id: QueryEngineId,
    protocol: QueryEngineKind,
    socket: UdpSocket,
    monitor: Arc<Monitor>,
    sink: Arc<dyn Sink>,
    gamename: String,
}

impl QueryRunner {
    /// Binds the configured source port. A bind failure is a configuration
    /// error (spec.md §7 kind 1) and is fatal at startup.
    pub async fn bind(
        id: QueryEngineId,
        protocol: QueryEngineKind,
        source_port: u16,
        monitor: Arc<Monitor>,
        sink: Arc<dyn Sink>,
        gamename: String,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", source_port))
            .await
            .map_err(|e| EngineError::configuration(format!("failed to bind query socket on port {source_port}: {e}")))?;
        Ok(Self { id, protocol, socket, monitor, sink, gamename })
    }

    pub fn id(&self) -> QueryEngineId {
        self.id
    }

    /// The locally bound socket address, used by tests to address a
    /// datagram at the probe socket directly.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send(&self, target: Endpoint) -> anyhow::Result<()> {
        let datagram = self.protocol.probe_datagram(target);
        self.socket.send_to(&datagram, target.to_socket_addr_v4()).await?;
        Ok(())
    }

    /// Runs until `cancel` fires, decoding each inbound datagram and
    /// routing it to the sink and the Monitor.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut buf = [0u8; 4096];
        loop {
            let recv = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                recv = self.socket.recv_from(&mut buf) => recv,
            };
            let (len, source) = match recv {
                Ok(v) => v,
                Err(e) => {
                    warn!(query_engine = self.id.0, error = %e, "query socket recv failed");
                    continue;
                }
            };
            let source_v4 = match source {
                std::net::SocketAddr::V4(v4) => v4,
                std::net::SocketAddr::V6(_) => continue,
            };

            let Some(reply) = self.protocol.decode_reply(source_v4, &buf[..len]) else {
                debug!(query_engine = self.id.0, %source, "dropped unparseable reply");
                continue;
            };

            self.sink.publish(source_v4, &self.gamename, reply.props);
            self.monitor.complete_probe(self.id, reply.endpoint).await;
        }
    }
}
