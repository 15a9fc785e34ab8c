// ===============================
// src/blocks.rs (Block Selector)
// ===============================
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Dipakai kalau tidak ada `--blocks` / `--blocks-file`.
pub const DEFAULT_BLOCKS: &[u64] = &[5128059];

#[derive(Debug, Error)]
pub enum BlockSourceError {
    #[error("cannot read blocks file {path}: {source}")]
    Csv { path: String, source: csv::Error },
    #[error("blocks file {path}, row {row}: '{value}' is not a block number")]
    BadBlock { path: String, row: usize, value: String },
    #[error("blocks file {0} has no 'block' column")]
    MissingColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSource {
    List(Vec<u64>),
    CsvFile(PathBuf),
}

impl Default for BlockSource {
    fn default() -> Self {
        BlockSource::List(DEFAULT_BLOCKS.to_vec())
    }
}

impl BlockSource {
    pub fn load(&self) -> Result<Vec<u64>, BlockSourceError> {
        match self {
            BlockSource::List(v) => Ok(v.clone()),
            BlockSource::CsvFile(p) => read_blocks_csv(p),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockRecord {
    #[serde(default)]
    block: Option<String>,
}

/// Baca kolom `block` dari CSV (ber-header). Baris dengan `block` kosong dilewati.
pub fn read_blocks_csv(path: &Path) -> Result<Vec<u64>, BlockSourceError> {
    let path_str = path.display().to_string();
    let csv_err = |source| BlockSourceError::Csv { path: path_str.clone(), source };

    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path).map_err(csv_err)?;
    let has_block = rdr.headers().map_err(csv_err)?.iter().any(|h| h == "block");
    if !has_block {
        return Err(BlockSourceError::MissingColumn(path_str.clone()));
    }

    let mut blocks = Vec::new();
    for (i, rec) in rdr.deserialize::<BlockRecord>().enumerate() {
        let rec = rec.map_err(csv_err)?;
        let Some(value) = rec.block.filter(|v| !v.is_empty()) else { continue };
        let n = value.parse::<u64>().map_err(|_| BlockSourceError::BadBlock {
            path: path_str.clone(),
            row: i + 2, // +1 header, +1 one-based
            value: value.clone(),
        })?;
        blocks.push(n);
    }
    Ok(blocks)
}
