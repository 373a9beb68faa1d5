// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Unreal master listing ("UTMS", spec.md §4.2.3): a length-prefixed frame
//! handshake (challenge → client info → validation → optional magic/verify
//! → list request → list). Text fields inside a frame are compact-strings,
//! the same length-prefixed encoding `query::compact` already decodes for
//! the challenge/validation/verify frames — `build_client_info` writes its
//! four text fields the same way.

use std::{net::Ipv4Addr, sync::Arc};

use md5::{Digest, Md5};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::CONNECT_TIMEOUT;
use crate::{
    endpoint::Endpoint,
    error::EngineError,
    monitor::{ListerId, Monitor},
    query::{
        compact::{decode_compact_string, encode_compact_string},
        QueryRunner,
    },
    wire::Reader,
};

const UT2004_CLIENT_VERSION_THRESHOLD: u32 = 3000;

#[derive(Debug, Clone)]
pub struct UtmsListerConfig {
    pub address: String,
    pub cdkey: String,
    pub client_name: String,
    pub client_version: u32,
    pub running_os: u8,
    pub language: String,
    pub gpu_device_id: u32,
    pub gpu_vendor_id: u32,
    pub cpu_cycles: u32,
    pub running_cpus: u8,
}

pub async fn run(
    cfg: UtmsListerConfig,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    cancel: CancellationToken,
) {
    if let Err(e) = run_inner(&cfg, lister_id, &monitor, &query, &cancel).await {
        warn!(lister = "ut2k", address = %cfg.address, error = %e, "listing ended with error");
    }
    monitor.end_lister(lister_id).await;
}

async fn run_inner(
    cfg: &UtmsListerConfig,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut stream = tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled before connect"),
        res = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&cfg.address)) => {
            let stream = res
                .map_err(|_| EngineError::transport(format!("connect to {} timed out", cfg.address)))?
                .map_err(|e| EngineError::transport(format!("connect to {}: {e}", cfg.address)))?;
            stream
        }
    };

    let challenge_frame = read_frame(&mut stream, cancel).await?;
    let mut r = Reader::new(&challenge_frame);
    let challenge = decode_compact_string(&mut r).map_err(|e| EngineError::protocol(e))?;

    let client_info = build_client_info(cfg, &challenge);
    write_frame(&mut stream, &client_info, cancel).await?;

    let validation_frame = read_frame(&mut stream, cancel).await?;
    let mut r = Reader::new(&validation_frame);
    let validation = decode_compact_string(&mut r).map_err(|e| EngineError::protocol(e))?;
    if validation != "APPROVED" {
        return Ok(());
    }

    if cfg.client_version >= UT2004_CLIENT_VERSION_THRESHOLD {
        let mut magic = vec![0u8; 34];
        magic[1] = 0x14;
        magic[2] = 0xE8;
        write_frame(&mut stream, &magic, cancel).await?;

        let verify_frame = read_frame(&mut stream, cancel).await?;
        let mut r = Reader::new(&verify_frame);
        let verify = decode_compact_string(&mut r).map_err(|e| EngineError::protocol(e))?;
        if verify != "VERIFIED" {
            return Ok(());
        }
    }

    write_frame(&mut stream, &[0, 0], cancel).await?;

    let header_frame = read_frame(&mut stream, cancel).await?;
    let mut r = Reader::new(&header_frame);
    let num_servers = r.read_u32_le().map_err(|e| EngineError::protocol(e))?;
    let _compressed_flag = r.read_u8().map_err(|e| EngineError::protocol(e))?;
    let _ = num_servers;

    loop {
        let server_frame = match read_frame(&mut stream, cancel).await {
            Ok(f) => f,
            Err(_) => break,
        };
        if server_frame.len() < 8 {
            break;
        }
        let ip = Ipv4Addr::new(server_frame[0], server_frame[1], server_frame[2], server_frame[3]);
        let mut r = Reader::new(&server_frame[4..]);
        let _game_port = r.read_u16_le().map_err(|e| EngineError::protocol(e))?;
        let query_port = r.read_u16_le().map_err(|e| EngineError::protocol(e))?;

        let ep = Endpoint::new(ip, query_port);
        if monitor.begin_probe(lister_id, query.id(), ep).await {
            let _ = query.send(ep).await;
        }
    }

    Ok(())
}

fn build_client_info(cfg: &UtmsListerConfig, challenge: &str) -> Vec<u8> {
    let cdkey_hash = hex::encode(Md5::digest(cfg.cdkey.as_bytes()));
    let cdkey_challenge_hash = {
        let mut combined = cfg.cdkey.clone();
        combined.push_str(challenge);
        hex::encode(Md5::digest(combined.as_bytes()))
    };

    let mut out = Vec::new();
    out.extend_from_slice(&encode_compact_string(&cdkey_hash));
    out.extend_from_slice(&encode_compact_string(&cdkey_challenge_hash));
    out.extend_from_slice(&encode_compact_string(&cfg.client_name));
    out.extend_from_slice(&cfg.client_version.to_le_bytes());
    out.push(cfg.running_os);
    out.extend_from_slice(&encode_compact_string(&cfg.language));

    if cfg.client_version >= UT2004_CLIENT_VERSION_THRESHOLD {
        out.extend_from_slice(&cfg.gpu_device_id.to_le_bytes());
        out.extend_from_slice(&cfg.gpu_vendor_id.to_le_bytes());
        out.extend_from_slice(&cfg.cpu_cycles.to_le_bytes());
        out.push(cfg.running_cpus);
    }

    out
}

async fn read_frame(stream: &mut TcpStream, cancel: &CancellationToken) -> anyhow::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    read_exact_or_cancel(stream, &mut len_bytes, cancel).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    read_exact_or_cancel(stream, &mut buf, cancel).await?;
    Ok(buf)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8], cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(payload);
    tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled"),
        res = stream.write_all(&framed) => {
            res.map_err(|e| EngineError::transport(format!("write frame: {e}")))?
        }
    }
    Ok(())
}

async fn read_exact_or_cancel(stream: &mut TcpStream, buf: &mut [u8], cancel: &CancellationToken) -> anyhow::Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled"),
        res = stream.read_exact(buf) => {
            res.map_err(|e| EngineError::transport(format!("read frame: {e}")))?;
        }
    }
    Ok(())
}
