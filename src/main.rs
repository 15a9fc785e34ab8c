// ===============================
// src/main.rs
// ===============================
/*
 # contoh run (archive RPC + subgraph saldo share)
 RPC_URL=https://mainnet.mode.network \
 SUBGRAPH_URL=https://api.goldsky.com/.../subgraphs/clvault/gn \
 VAULTS=0xabc...,0xdef... \
 RECORD_FILE=out/events.jsonl METRICS_FILE=out/clvault_tvl.prom \
 cargo run --release -- --blocks-file hourly_blocks.csv

 # ringkasan outcome per vault
 grep '^vaults_total' out/clvault_tvl.prom
*/
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
mod domain;
mod config;
mod metrics;
mod recorder;
mod allocation;
mod ledger;
mod emitter;
mod snapshot;
mod chain;      // alloy provider + sol! bindings (vault/pool/erc20)
mod subgraph;   // GraphQL saldo share-token
mod tvl;
mod blocks;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::chain::ChainReader;
use crate::domain::{Event, OutputRow, ShareTokenRow};
use crate::snapshot::LiveSnapshotReader;
use crate::subgraph::SubgraphClient;
use crate::tvl::TvlCalculator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Load config ----
    let args = config::load().context("invalid configuration")?;

    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter(args.log_filter.as_str()).init();

    // ---- Metrics ----
    metrics::init();

    let blocks = args.block_source.load().context("cannot load block list")?;
    info!(
        rpc = %args.rpc_url,
        subgraph = %args.subgraph_url,
        vaults = ?args.vaults,
        blocks = blocks.len(),
        output = %args.output_file.display(),
        share_output = %args.share_output_file.display(),
        "startup config"
    );

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let recorder = args.record_file.clone().map(|path| tokio::spawn(recorder::run(rec_rx, path)));

    // ---- Reader ----
    let chain = ChainReader::connect(args.rpc_url.clone());
    let subgraph = SubgraphClient::new(args.subgraph_url.clone(), args.subgraph_page_size, args.http_timeout)
        .context("cannot build subgraph client")?;
    let reader = LiveSnapshotReader::new(chain, subgraph);

    let mut calc = TvlCalculator::new(reader, args.vaults.clone());
    if recorder.is_some() {
        calc = calc.with_events(rec_tx);
    }

    // ---- Block loop ----
    let mut rows: Vec<OutputRow> = Vec::new();
    let mut share_rows: Vec<ShareTokenRow> = Vec::new();
    let mut zero_supply_failures = 0usize;

    for number in blocks {
        let block = calc
            .block_data(number)
            .await
            .with_context(|| format!("cannot read block {number}"))?;
        let when = DateTime::<Utc>::from_timestamp(block.timestamp as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        info!(block = number, timestamp = block.timestamp, %when, "processing block");

        let report = calc
            .compute_vault_tvl(block)
            .await
            .with_context(|| format!("block {number} failed"))?;

        for (vault, e) in report.failures() {
            if e.is_zero_supply() {
                error!(%vault, block = number, "vault has active liquidity but zero total supply");
                zero_supply_failures += 1;
            }
        }
        info!(
            block = number,
            rows = report.rows.len(),
            active_total = %tvl::total_balance(&report.rows, true),
            inactive_total = %tvl::total_balance(&report.rows, false),
            "block done"
        );

        metrics::BLOCKS.inc();
        metrics::LAST_BLOCK.set(number as i64);
        rows.extend(report.rows);
        share_rows.extend(report.share_rows);
    }

    // ---- Output ----
    emitter::write_csv(&args.share_output_file, &ShareTokenRow::HEADER, &share_rows)
        .context("cannot write share token file")?;
    emitter::write_csv(&args.output_file, &OutputRow::HEADER, &rows)
        .context("cannot write output file")?;
    info!(path = %args.output_file.display(), rows = rows.len(), "User TVL file has been written.");

    // Tutup channel -> recorder flush & selesai
    drop(calc);
    if let Some(handle) = recorder {
        let _ = handle.await;
    }

    if let Some(path) = &args.metrics_file {
        if let Err(e) = metrics::write_textfile(path) {
            error!(?e, path = %path.display(), "metrics dump failed");
        }
    }

    if zero_supply_failures > 0 {
        bail!("{zero_supply_failures} vault evaluation(s) failed with zero total supply");
    }
    info!("done");
    Ok(())
}
