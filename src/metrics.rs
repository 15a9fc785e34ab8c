// ===============================
// src/metrics.rs
// ===============================
use std::{fs, path::Path};

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static BLOCKS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("blocks_processed_total", "blocks fully processed").unwrap());

pub static LAST_BLOCK: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("last_block_processed", "last block number processed").unwrap());

// outcome: allocated | skipped_no_positions | skipped_no_active | skipped_zero_liquidity | failed
pub static VAULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vaults_total", "vault evaluations per outcome"),
        &["outcome"],
    )
    .unwrap()
});

pub static ROWS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rows_emitted_total", "output rows (label: in_active)"),
        &["in_active"],
    )
    .unwrap()
});

pub static SYMBOL_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("symbol_lookup_failures_total", "token symbol lookups that fell back to empty")
        .unwrap()
});

pub static VAULT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "vault_processing_seconds",
        "Wall time to read and allocate one vault at one block",
    ))
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(BLOCKS.clone())),
        REGISTRY.register(Box::new(LAST_BLOCK.clone())),
        REGISTRY.register(Box::new(VAULTS.clone())),
        REGISTRY.register(Box::new(ROWS.clone())),
        REGISTRY.register(Box::new(SYMBOL_FAILURES.clone())),
        REGISTRY.register(Box::new(VAULT_SECONDS.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// Dump ke file (gaya textfile collector node_exporter). Tulis ke .tmp lalu rename.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, encode_metrics())?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textfile_contains_registered_metrics() {
        init();
        VAULTS.with_label_values(&["allocated"]).inc();
        ROWS.with_label_values(&["true"]).inc_by(3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clvault_tvl.prom");
        write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("vaults_total{outcome=\"allocated\"}"));
        assert!(text.contains("rows_emitted_total{in_active=\"true\"}"));
        assert!(!dir.path().join("clvault_tvl.prom.tmp").exists());
    }
}
