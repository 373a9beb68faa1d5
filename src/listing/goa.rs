// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tagged-text listing ("GOA master", spec.md §4.2.1): a TCP challenge,
//! a validation response, then either a compressed binary record stream
//! or an uncompressed `\ip\a.b.c.d:port` token stream.

use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::CONNECT_TIMEOUT;
use crate::{
    cipher::{Cipher, IdentityCipher},
    endpoint::Endpoint,
    error::EngineError,
    monitor::{ListerId, Monitor},
    query::QueryRunner,
};

#[derive(Debug, Clone)]
pub struct GoaListerConfig {
    pub address: String,
    pub gamename: String,
    pub secretkey: String,
    pub query_gamename: String,
    pub no_compressed_list: bool,
    pub max_challenge_len: usize,
    pub gamever: Option<String>,
    pub location: Option<String>,
    pub attach_queryid: bool,
    pub attach_listfinal: bool,
}

pub async fn run(
    cfg: GoaListerConfig,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    cancel: CancellationToken,
) {
    if let Err(e) = run_inner(&cfg, lister_id, &monitor, &query, &cancel).await {
        warn!(lister = "goa0", address = %cfg.address, error = %e, "listing ended with error");
    }
    monitor.end_lister(lister_id).await;
}

async fn run_inner(
    cfg: &GoaListerConfig,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let cipher = IdentityCipher;
    let mut stream = connect(&cfg.address, cancel).await?;

    let challenge = read_challenge(&mut stream, cfg.max_challenge_len, cancel).await?;
    let validation = cipher.validate(cfg.secretkey.as_bytes(), challenge.as_bytes());
    let request = build_list_request(cfg, &validation);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| EngineError::transport(format!("write list request: {e}")))?;

    if cfg.no_compressed_list {
        read_uncompressed_list(&mut stream, lister_id, monitor, query, cancel).await
    } else {
        read_compressed_list(&mut stream, lister_id, monitor, query, cancel).await
    }
}

async fn connect(address: &str, cancel: &CancellationToken) -> anyhow::Result<TcpStream> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled before connect"),
        res = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address)) => {
            let stream = res
                .map_err(|_| EngineError::transport(format!("connect to {address} timed out")))?
                .map_err(|e| EngineError::transport(format!("connect to {address}: {e}")))?;
            Ok(stream)
        }
    }
}

async fn read_challenge(
    stream: &mut TcpStream,
    max_challenge_len: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    const TAG: &[u8] = b"\\secure\\";
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        if buf.windows(TAG.len()).any(|w| w == TAG) {
            break;
        }
        let n = read_or_cancel(stream, &mut chunk, cancel).await?;
        if n == 0 {
            return Err(EngineError::transport("connection closed before challenge tag").into());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let tag_pos = buf
        .windows(TAG.len())
        .position(|w| w == TAG)
        .ok_or_else(|| EngineError::protocol("missing secure\\ tag"))?;
    if max_challenge_len > 0 {
        while buf.len() - (tag_pos + TAG.len()) < max_challenge_len {
            let n = read_or_cancel(stream, &mut chunk, cancel).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let after = &buf[tag_pos + TAG.len()..];
        let take = max_challenge_len.min(after.len());
        return Ok(String::from_utf8_lossy(&after[..take]).into_owned());
    }

    let after = &buf[tag_pos + TAG.len()..];
    let end = after.iter().position(|&b| b == b'\\').unwrap_or(after.len());
    Ok(String::from_utf8_lossy(&after[..end]).into_owned())
}

fn build_list_request(cfg: &GoaListerConfig, validation: &str) -> String {
    let mut s = format!("\\gamename\\{}", cfg.gamename);
    if let Some(v) = &cfg.gamever {
        s.push_str(&format!("\\gamever\\{v}"));
    }
    if let Some(l) = &cfg.location {
        s.push_str(&format!("\\location\\{l}"));
    }
    s.push_str(&format!("\\validate\\{validation}\\final\\"));
    if cfg.attach_queryid {
        s.push_str("\\queryid\\1.1\\");
    }
    s.push_str("\\list\\");
    if !cfg.no_compressed_list {
        s.push_str("cmp\\");
    }
    s.push_str(&format!("\\gamename\\{}", cfg.query_gamename));
    if cfg.attach_listfinal {
        s.push_str("\\final\\");
    }
    s
}

async fn read_or_cancel(
    stream: &mut TcpStream,
    buf: &mut [u8],
    cancel: &CancellationToken,
) -> anyhow::Result<usize> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled"),
        n = stream.read(buf) => Ok(n.map_err(|e| EngineError::transport(format!("read failed: {e}")))?),
    }
}

async fn read_compressed_list(
    stream: &mut TcpStream,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    const FINAL_MARKER: &[u8] = b"\\final";
    let mut window: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        let n = read_or_cancel(stream, &mut chunk, cancel).await?;
        if n == 0 {
            return Ok(());
        }
        window.extend_from_slice(&chunk[..n]);

        let marker_pos = window.windows(FINAL_MARKER.len()).position(|w| w == FINAL_MARKER);
        if let Some(pos) = marker_pos {
            // Anything fully-formed before the marker is still a valid record stream.
            window.truncate(pos);
        }

        while window.len() >= 6 {
            let record = &window[..6];
            let ip = std::net::Ipv4Addr::new(record[0], record[1], record[2], record[3]);
            let port = u16::from_be_bytes([record[4], record[5]]);
            let ep = Endpoint::new(ip, port);
            window.drain(..6);

            if monitor.begin_probe(lister_id, query.id(), ep).await {
                let _ = query.send(ep).await;
            }
        }

        if marker_pos.is_some() {
            return Ok(());
        }
    }
}

async fn read_uncompressed_list(
    stream: &mut TcpStream,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    const SEP: &str = "\\ip\\";
    let mut carry = String::new();
    let mut chunk = [0u8; 512];

    loop {
        let n = read_or_cancel(stream, &mut chunk, cancel).await?;
        if n == 0 {
            break;
        }
        carry.push_str(&String::from_utf8_lossy(&chunk[..n]));

        let mut tokens: Vec<&str> = carry.split(SEP).collect();
        let trailing = tokens.pop().unwrap_or_default().to_string();
        for token in tokens.into_iter().filter(|t| !t.is_empty()) {
            if let Ok(ep) = token.trim_end_matches('\\').parse::<Endpoint>() {
                if monitor.begin_probe(lister_id, query.id(), ep).await {
                    let _ = query.send(ep).await;
                }
            }
        }
        carry = trailing;
    }

    if carry.len() >= 4 {
        if let Ok(ep) = carry.trim_end_matches('\\').parse::<Endpoint>() {
            if monitor.begin_probe(lister_id, query.id(), ep).await {
                let _ = query.send(ep).await;
            }
        }
    }

    Ok(())
}
