// ===============================
// src/emitter.rs (ledger -> rows -> CSV)
// ===============================
use std::{fs, path::Path};

use alloy::primitives::{Address, U256};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{BlockData, OutputRow, ShareBalance, ShareTokenRow};
use crate::ledger::{SymbolCache, TvlLedger};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("io error on {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("csv error on {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Ratakan ledger jadi baris output.
///
/// Per user (urutan pertama terlihat): semua token aktif, termasuk yang nol,
/// lalu token inactive yang jumlahnya bukan nol.
pub fn emit_rows(block: &BlockData, ledger: &TvlLedger, symbols: &SymbolCache) -> Vec<OutputRow> {
    let mut rows = Vec::new();
    let row = |user: Address, token: Address, amount: U256, in_active: bool| OutputRow {
        block_number: block.number,
        timestamp: block.timestamp,
        user_address: user,
        token_address: token,
        token_balance: amount,
        token_symbol: symbols.symbol(&token).to_string(),
        in_active,
    };

    let inactive_only = ledger.inactive.users().filter(|u| ledger.active.tokens(*u).is_none());
    let users: Vec<_> = ledger.active.users().chain(inactive_only).copied().collect();

    for user in users {
        if let Some(tokens) = ledger.active.tokens(&user) {
            for (token, amount) in tokens {
                rows.push(row(user, *token, *amount, true));
            }
        }
        if let Some(tokens) = ledger.inactive.tokens(&user) {
            for (token, amount) in tokens.iter().filter(|(_, a)| !a.is_zero()) {
                rows.push(row(user, *token, *amount, false));
            }
        }
    }
    rows
}

pub fn share_token_rows(block: &BlockData, balances: &[ShareBalance]) -> Vec<ShareTokenRow> {
    balances
        .iter()
        .map(|b| ShareTokenRow {
            block_number: block.number,
            timestamp: block.timestamp,
            user: b.user,
            contract_id: b.vault,
            balance: b.balance,
            is_active: b.is_active,
        })
        .collect()
}

/// Tulis CSV dengan header (header tetap ditulis walau `rows` kosong).
pub fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), OutputError> {
    let path_str = path.display().to_string();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|source| OutputError::Io { path: path_str.clone(), source })?;
        }
    }

    let csv_err = |source| OutputError::Csv { path: path_str.clone(), source };
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;

    wtr.write_record(header).map_err(csv_err)?;
    for r in rows {
        wtr.serialize(r).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| OutputError::Io { path: path_str.clone(), source })?;
    Ok(())
}
