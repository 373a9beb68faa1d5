// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Configuration loading: a JSON array of `{MsEngine, QueryEngine,
//! OutputEngine}` triples (spec.md §6). `name` selects the params shape;
//! an unrecognized name skips the whole triple rather than failing the
//! run, matching the original's "unknown engine name" tolerance.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Goa0Params {
    pub address: String,
    pub gamename: String,
    pub secretkey: String,
    pub query_gamename: String,
    #[serde(default)]
    pub no_compressed_list: bool,
    #[serde(default)]
    pub max_challenge_len: usize,
    #[serde(default)]
    pub gamever: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attach_queryid: bool,
    #[serde(default)]
    pub attach_listfinal: bool,
    pub source_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sbv2Params {
    pub address: String,
    pub gamename: String,
    pub secretkey: String,
    pub query_gamename: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qr2Params {
    pub source_port: u16,
    /// Reserved, not implemented — spec.md §9.
    #[serde(default)]
    #[allow(dead_code)]
    pub prequery_ip_verify: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ut2kParams {
    pub address: String,
    pub cdkey: String,
    pub client_name: String,
    pub client_version: u32,
    pub running_os: u8,
    pub language: String,
    #[serde(default)]
    pub gpu_device_id: u32,
    #[serde(default)]
    pub gpu_vendor_id: u32,
    #[serde(default)]
    pub cpu_cycles: u32,
    #[serde(default)]
    pub running_cpus: u8,
    pub source_port: u16,
    pub versionid: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampParams {
    pub source_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpJsonParams {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextFileParams {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRedisOutputParams {
    pub gamename: String,
    #[serde(default, rename = "injectKeys")]
    #[allow(dead_code)]
    pub inject_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum MsEngineConfig {
    Goa0(Goa0Params),
    Sbv2(Sbv2Params),
    Ut2k(Ut2kParams),
    HttpJson(HttpJsonParams),
    TextFile(TextFileParams),
}

#[derive(Debug, Clone)]
pub enum QueryEngineConfig {
    Goa0 { source_port: u16 },
    Qr2(Qr2Params),
    Ut2k(Ut2kParams),
    Samp(SampParams),
}

#[derive(Debug, Clone)]
pub enum OutputEngineConfig {
    OsRedisOutput(OsRedisOutputParams),
}

#[derive(Debug, Clone)]
pub struct EngineTriple {
    pub ms_engine: MsEngineConfig,
    pub query_engine: QueryEngineConfig,
    pub output_engine: OutputEngineConfig,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    name: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawTriple {
    #[serde(rename = "MsEngine")]
    ms_engine: RawBlock,
    #[serde(rename = "QueryEngine")]
    query_engine: RawBlock,
    #[serde(rename = "OutputEngine")]
    output_engine: RawBlock,
}

pub async fn load(path: &std::path::Path) -> Result<Vec<EngineTriple>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {path:?}"))?;
    parse(&contents)
}

pub fn parse(contents: &str) -> Result<Vec<EngineTriple>> {
    let raw: Vec<RawTriple> = serde_json::from_str(contents).context("failed to parse engine configuration")?;

    let mut triples = Vec::with_capacity(raw.len());
    for entry in raw {
        let ms_engine = match parse_ms_engine(&entry.ms_engine) {
            Some(v) => v,
            None => {
                warn!(name = %entry.ms_engine.name, "unknown MsEngine, skipping triple");
                continue;
            }
        };
        let query_engine = match parse_query_engine(&entry.query_engine) {
            Some(v) => v,
            None => {
                warn!(name = %entry.query_engine.name, "unknown QueryEngine, skipping triple");
                continue;
            }
        };
        let output_engine = match parse_output_engine(&entry.output_engine) {
            Some(v) => v,
            None => {
                warn!(name = %entry.output_engine.name, "unknown OutputEngine, skipping triple");
                continue;
            }
        };
        triples.push(EngineTriple { ms_engine, query_engine, output_engine });
    }
    Ok(triples)
}

fn parse_ms_engine(block: &RawBlock) -> Option<MsEngineConfig> {
    match block.name.as_str() {
        "goa0" => serde_json::from_value(block.params.clone()).ok().map(MsEngineConfig::Goa0),
        "sbv2" => serde_json::from_value(block.params.clone()).ok().map(MsEngineConfig::Sbv2),
        "ut2k" => serde_json::from_value(block.params.clone()).ok().map(MsEngineConfig::Ut2k),
        "openmp_api" | "gameserverlister_api" => {
            serde_json::from_value(block.params.clone()).ok().map(MsEngineConfig::HttpJson)
        }
        "file" => serde_json::from_value(block.params.clone()).ok().map(MsEngineConfig::TextFile),
        _ => None,
    }
}

fn parse_query_engine(block: &RawBlock) -> Option<QueryEngineConfig> {
    match block.name.as_str() {
        "goa0" => {
            let params: SourcePortOnly = serde_json::from_value(block.params.clone()).ok()?;
            Some(QueryEngineConfig::Goa0 { source_port: params.source_port })
        }
        "qr2" => serde_json::from_value(block.params.clone()).ok().map(QueryEngineConfig::Qr2),
        "ut2k" => serde_json::from_value(block.params.clone()).ok().map(QueryEngineConfig::Ut2k),
        "samp" => serde_json::from_value(block.params.clone()).ok().map(QueryEngineConfig::Samp),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct SourcePortOnly {
    source_port: u16,
}

fn parse_output_engine(block: &RawBlock) -> Option<OutputEngineConfig> {
    match block.name.as_str() {
        "OSRedisOutput" => {
            serde_json::from_value(block.params.clone()).ok().map(OutputEngineConfig::OsRedisOutput)
        }
        _ => None,
    }
}
