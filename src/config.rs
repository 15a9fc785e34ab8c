// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : clvault_tvl — per-user active/inactive TVL of CL vaults in Rust
Module  : <module_name>.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Reads concentrated-liquidity vault state at historical blocks,
          splits each holder's share balance into in-range / out-of-range
          parts, allocates the underlying tokens pro-rata, and writes CSV
          rows per user, token and active flag.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use alloy::primitives::Address;
use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

use crate::blocks::BlockSource;

pub const DEFAULT_RPC_URL: &str = "https://mainnet.mode.network";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name} url '{value}': {source}")]
    Url { name: &'static str, value: String, source: url::ParseError },
    #[error("invalid vault address '{0}'")]
    Vault(String),
    #[error("no vaults configured (set VAULTS or --vaults)")]
    NoVaults,
    #[error("--blocks and --blocks-file are mutually exclusive")]
    ConflictingBlocks,
}

/// Flag CLI; setiap flag juga bisa diisi dari ENV / .env.
#[derive(Debug, Clone, Parser)]
#[command(name = "clvault_tvl", about = "Per-user active/inactive TVL of CL vaults at historical blocks")]
pub struct Cli {
    /// JSON-RPC endpoint (harus archive node untuk block lama)
    #[arg(long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// GraphQL endpoint untuk saldo share-token
    #[arg(long, env = "SUBGRAPH_URL")]
    pub subgraph_url: String,

    /// Alamat vault, dipisah koma
    #[arg(long, env = "VAULTS", value_delimiter = ',')]
    pub vaults: Vec<String>,

    /// Daftar block, dipisah koma
    #[arg(long, value_delimiter = ',')]
    pub blocks: Vec<u64>,

    /// CSV dengan kolom `block`
    #[arg(long)]
    pub blocks_file: Option<PathBuf>,

    #[arg(long, env = "OUTPUT_FILE", default_value = "outputData.csv")]
    pub output: PathBuf,

    #[arg(long, env = "SHARE_OUTPUT_FILE", default_value = "shareToken.csv")]
    pub share_output: PathBuf,
}

#[derive(Clone, Debug)]
pub struct Args {
    // endpoints
    pub rpc_url: Url,
    pub subgraph_url: Url,
    pub subgraph_page_size: usize,
    pub http_timeout: Duration,

    // what to compute
    pub vaults: Vec<Address>,
    pub block_source: BlockSource,

    // files
    pub output_file: PathBuf,
    pub share_output_file: PathBuf,
    pub record_file: Option<String>,
    pub metrics_file: Option<PathBuf>,

    pub log_filter: String,
}

/// Parse daftar vault; dedup dengan urutan tetap (vault dobel = split dobel).
pub fn parse_vaults(raw: &[String]) -> Result<Vec<Address>, ConfigError> {
    let mut out: Vec<Address> = Vec::new();
    for s in raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let addr = Address::from_str(s).map_err(|_| ConfigError::Vault(s.to_string()))?;
        if !out.contains(&addr) {
            out.push(addr);
        }
    }
    if out.is_empty() {
        return Err(ConfigError::NoVaults);
    }
    Ok(out)
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::Url { name, value: value.to_string(), source })
}

impl Args {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let block_source = match (cli.blocks.is_empty(), cli.blocks_file) {
            (false, Some(_)) => return Err(ConfigError::ConflictingBlocks),
            (false, None) => BlockSource::List(cli.blocks),
            (true, Some(path)) => BlockSource::CsvFile(path),
            (true, None) => BlockSource::default(),
        };

        // ===== Tuning (ENV saja) =====
        let subgraph_page_size = env::var("SUBGRAPH_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let http_timeout = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Ok(Args {
            rpc_url: parse_url("rpc", &cli.rpc_url)?,
            subgraph_url: parse_url("subgraph", &cli.subgraph_url)?,
            subgraph_page_size,
            http_timeout,
            vaults: parse_vaults(&cli.vaults)?,
            block_source,
            output_file: cli.output,
            share_output_file: cli.share_output,
            record_file: env::var("RECORD_FILE").ok().filter(|s| !s.is_empty()),
            metrics_file: env::var("METRICS_FILE").ok().filter(|s| !s.is_empty()).map(PathBuf::from),
            log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

pub fn load() -> Result<Args, ConfigError> {
    // Pastikan .env dibaca sebelum clap membaca ENV
    let _ = dotenv();
    Args::from_cli(Cli::parse())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn cli(extra: &[&str]) -> Cli {
        let mut argv = vec![
            "clvault_tvl",
            "--rpc-url",
            "http://localhost:8545",
            "--subgraph-url",
            "http://localhost:8000/subgraphs/name/vaults",
            "--vaults",
            "0x1111111111111111111111111111111111111111",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn vaults_are_deduplicated_in_order() {
        let raw = vec![
            "0x2222222222222222222222222222222222222222".to_string(),
            " 0x1111111111111111111111111111111111111111 ".to_string(),
            "0x2222222222222222222222222222222222222222".to_string(),
            "".to_string(),
        ];
        let out = parse_vaults(&raw).unwrap();
        assert_eq!(out, vec![Address::repeat_byte(0x22), Address::repeat_byte(0x11)]);
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![" ".to_string()])]
    fn empty_vault_list_is_rejected(#[case] raw: Vec<String>) {
        assert!(matches!(parse_vaults(&raw), Err(ConfigError::NoVaults)));
    }

    #[test]
    fn invalid_vault_is_rejected() {
        assert!(matches!(parse_vaults(&["0x12".to_string()]), Err(ConfigError::Vault(_))));
    }

    #[test]
    fn block_list_from_cli() {
        let args = Args::from_cli(cli(&["--blocks", "10,20,30"])).unwrap();
        assert_eq!(args.block_source, BlockSource::List(vec![10, 20, 30]));
        assert_eq!(args.vaults, vec![Address::repeat_byte(0x11)]);
    }

    #[test]
    fn blocks_file_from_cli() {
        let args = Args::from_cli(cli(&["--blocks-file", "blocks.csv"])).unwrap();
        assert_eq!(args.block_source, BlockSource::CsvFile(PathBuf::from("blocks.csv")));
    }

    #[test]
    fn blocks_and_file_conflict() {
        let res = Args::from_cli(cli(&["--blocks", "1", "--blocks-file", "b.csv"]));
        assert!(matches!(res, Err(ConfigError::ConflictingBlocks)));
    }

    #[test]
    fn bad_url_is_reported() {
        let mut c = cli(&[]);
        c.rpc_url = "not a url".into();
        assert!(matches!(Args::from_cli(c), Err(ConfigError::Url { name: "rpc", .. })));
    }
}
